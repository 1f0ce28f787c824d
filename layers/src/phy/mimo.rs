//! MIMO layer mapping and precoding: single-antenna passthrough and
//! transmit-diversity SFBC (2-port) / SFBC+FSTD (4-port), per spec §4.5.

use num_complex::Complex32;

use crate::{PhyError, PhyResult};

/// Precode a layer-mapped symbol stream for `nof_ports` antennas.
///
/// For `nof_ports == 1` this is a passthrough. For 2 ports it applies the
/// SFBC pair construction; for 4 ports, 36.211 §6.3.4's SFBC+FSTD scheme
/// (2-port SFBC alternated across port pairs {0,2} and {1,3} every 4 REs).
pub fn precode(nof_ports: u8, layer_symbols: &[Complex32]) -> PhyResult<Vec<Vec<Complex32>>> {
    match nof_ports {
        1 => Ok(vec![layer_symbols.to_vec()]),
        2 => Ok(precode_sfbc2(layer_symbols)),
        4 => Ok(precode_sfbc_fstd4(layer_symbols)),
        _ => Err(PhyError::InvalidInput(format!(
            "unsupported antenna port count {}",
            nof_ports
        ))),
    }
}

fn precode_sfbc2(x: &[Complex32]) -> Vec<Vec<Complex32>> {
    const INV_SQRT2: f32 = std::f32::consts::FRAC_1_SQRT_2;
    let mut port0 = Vec::with_capacity(x.len());
    let mut port1 = Vec::with_capacity(x.len());
    for pair in x.chunks(2) {
        let x0 = pair[0];
        let x1 = if pair.len() > 1 { pair[1] } else { Complex32::new(0.0, 0.0) };
        port0.push(x0 * INV_SQRT2);
        port0.push(-x1.conj() * INV_SQRT2);
        port1.push(x1 * INV_SQRT2);
        port1.push(x0.conj() * INV_SQRT2);
    }
    vec![port0, port1]
}

fn precode_sfbc_fstd4(x: &[Complex32]) -> Vec<Vec<Complex32>> {
    const INV_SQRT2: f32 = std::f32::consts::FRAC_1_SQRT_2;
    let zero = Complex32::new(0.0, 0.0);
    let mut ports: Vec<Vec<Complex32>> = vec![Vec::new(); 4];

    for group in x.chunks(4) {
        let mut g = [zero; 4];
        for (i, &v) in group.iter().enumerate() {
            g[i] = v;
        }
        // RE group 0,1 carried on ports {0,2} (FSTD zeros ports {1,3})
        ports[0].push(g[0] * INV_SQRT2);
        ports[0].push(-g[1].conj() * INV_SQRT2);
        ports[2].push(g[1] * INV_SQRT2);
        ports[2].push(g[0].conj() * INV_SQRT2);
        ports[1].push(zero);
        ports[1].push(zero);
        ports[3].push(zero);
        ports[3].push(zero);

        // RE group 2,3 carried on ports {1,3} (FSTD zeros ports {0,2})
        ports[1].push(g[2] * INV_SQRT2);
        ports[1].push(-g[3].conj() * INV_SQRT2);
        ports[3].push(g[3] * INV_SQRT2);
        ports[3].push(g[2].conj() * INV_SQRT2);
        ports[0].push(zero);
        ports[0].push(zero);
        ports[2].push(zero);
        ports[2].push(zero);
    }
    ports
}

/// Zero-forcing (or MMSE, when `noise_var` is `Some`) decode for single-port
/// transmission.
pub fn decode_siso(received: &[Complex32], channel: &[Complex32], noise_var: Option<f32>) -> Vec<Complex32> {
    received
        .iter()
        .zip(channel.iter())
        .map(|(&r, &h)| match noise_var {
            Some(sigma2) => r * h.conj() / (h.norm_sqr() + sigma2),
            None => r / h,
        })
        .collect()
}

/// Alamouti SFBC decode for 2-port diversity, per spec §4.5's analytic
/// inversion: `x0_hat = (h0* r0 + h1 r1*)/|h|^2`, `x1_hat = (-h1 r0* + h0* r1)/|h|^2`.
pub fn decode_sfbc2(
    received: &[Complex32],
    h0: &[Complex32],
    h1: &[Complex32],
) -> PhyResult<Vec<Complex32>> {
    if received.len() != h0.len() || received.len() != h1.len() {
        return Err(PhyError::InvalidInput("mismatched SFBC decode buffer lengths".into()));
    }
    const SQRT2: f32 = std::f32::consts::SQRT_2;
    let mut out = Vec::with_capacity(received.len());
    for pair_idx in (0..received.len()).step_by(2) {
        if pair_idx + 1 >= received.len() {
            break;
        }
        let r0 = received[pair_idx];
        let r1 = received[pair_idx + 1];
        let h0v = h0[pair_idx];
        let h1v = h1[pair_idx];
        let denom = h0v.norm_sqr() + h1v.norm_sqr();
        let x0 = (h0v.conj() * r0 + h1v * r1.conj()) / denom * SQRT2;
        let x1 = (-h1v * r0.conj() + h0v.conj() * r1) / denom * SQRT2;
        out.push(x0);
        out.push(x1);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_port_precode_is_passthrough() {
        let x = vec![Complex32::new(1.0, 1.0), Complex32::new(-1.0, 0.5)];
        let ports = precode(1, &x).unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0], x);
    }

    #[test]
    fn rejects_unsupported_port_count() {
        let x = vec![Complex32::new(1.0, 0.0)];
        assert!(precode(3, &x).is_err());
    }

    #[test]
    fn sfbc2_roundtrip_over_unit_channel() {
        let x = vec![Complex32::new(1.0, -1.0), Complex32::new(0.5, 0.5)];
        let ports = precode_sfbc2(&x);
        let h0 = vec![Complex32::new(1.0, 0.0); 2];
        let h1 = vec![Complex32::new(1.0, 0.0); 2];
        let received: Vec<Complex32> = ports[0]
            .iter()
            .zip(ports[1].iter())
            .map(|(&p0, &p1)| p0 + p1)
            .collect();
        let decoded = decode_sfbc2(&received, &h0, &h1).unwrap();
        for (a, b) in x.iter().zip(decoded.iter()) {
            assert!((a - b).norm() < 1e-3, "{} vs {}", a, b);
        }
    }

    #[test]
    fn siso_zf_recovers_symbol() {
        let tx = Complex32::new(1.0, -2.0);
        let h = Complex32::new(0.5, 0.2);
        let decoded = decode_siso(&[tx * h], &[h], None);
        assert!((decoded[0] - tx).norm() < 1e-4);
    }
}
