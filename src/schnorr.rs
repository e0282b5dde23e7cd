//! The oracle commitment primitive.
//!
//! An oracle announces a public key `V` and one nonce point `R_i` per message
//! position. For a sequence of messages `m_i`, the commitment point is
//!
//! ```not_rust
//! C = sum(R_i + H(R_i, V, m_i) * V)
//! ```
//!
//! When the oracle attests, it publishes one BIP340-style signature scalar
//! `s_i = k_i + H(R_i, V, m_i) * d` per message. The sum of those scalars is the
//! discrete log of `C`, so the attestation can be checked against a commitment
//! computed in advance without learning the outcome ahead of time.

use secp::{MaybePoint, MaybeScalar, Point, Scalar};

fn challenge(oracle_pubkey: &Point, nonce_point: &Point, msg: &[u8]) -> MaybeScalar {
    musig2::compute_challenge_hash_tweak(&nonce_point.serialize_xonly(), oracle_pubkey, msg)
}

/// Computes the commitment point for one sequence of messages. Messages are
/// paired with nonce points by position.
pub fn commit_multi(
    oracle_pubkey: &Point,
    nonce_points: &[Point],
    messages: &[Vec<u8>],
) -> MaybePoint {
    nonce_points
        .iter()
        .zip(messages)
        .fold(MaybePoint::Infinity, |sum, (nonce_point, msg)| {
            let e = challenge(oracle_pubkey, nonce_point, msg);

            // C_i = R + eV
            sum + nonce_point.to_even_y() + e * oracle_pubkey.to_even_y()
        })
}

/// Aggregates the oracle's per-message signature shares into one scalar.
pub fn sum_signs(signs: &[MaybeScalar]) -> MaybeScalar {
    signs
        .iter()
        .fold(MaybeScalar::Zero, |sum, &share| sum + share)
}

/// Returns true if `sign` is the discrete log of `commitment`.
pub fn verify(commitment: MaybePoint, sign: MaybeScalar) -> bool {
    sign.base_point_mul() == commitment
}

/// Computes the oracle's signature share for one message, using the oracle's
/// secret key and the secret nonce committed to for that message position.
pub fn attest(
    oracle_seckey: impl Into<Scalar>,
    secnonce: impl Into<Scalar>,
    msg: &[u8],
) -> MaybeScalar {
    let oracle_seckey = oracle_seckey.into();
    let secnonce = secnonce.into();

    let oracle_pubkey = oracle_seckey.base_point_mul();
    let nonce_point = secnonce.base_point_mul();

    let d = oracle_seckey.negate_if(oracle_pubkey.parity());
    let k = secnonce.negate_if(nonce_point.parity());

    let e = challenge(&oracle_pubkey, &nonce_point, msg);
    k + e * d
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(n: u128) -> Scalar {
        Scalar::try_from(n).unwrap()
    }

    #[test]
    fn attestation_opens_commitment() {
        let oracle_seckey = scalar(0xdeadbeef);
        let secnonces = [scalar(1111), scalar(2222), scalar(3333)];

        let oracle_pubkey = oracle_seckey.base_point_mul();
        let nonce_points: Vec<Point> = secnonces.iter().map(|k| k.base_point_mul()).collect();

        let messages = vec![b"1".to_vec(), b"0".to_vec(), b"7".to_vec()];
        let commitment = commit_multi(&oracle_pubkey, &nonce_points, &messages);

        let shares: Vec<MaybeScalar> = secnonces
            .iter()
            .zip(&messages)
            .map(|(&k, msg)| attest(oracle_seckey, k, msg))
            .collect();

        assert!(verify(commitment, sum_signs(&shares)));

        // A different outcome has a different commitment.
        let other = vec![b"1".to_vec(), b"0".to_vec(), b"8".to_vec()];
        let other_commitment = commit_multi(&oracle_pubkey, &nonce_points, &other);
        assert!(!verify(other_commitment, sum_signs(&shares)));

        // Corrupted shares do not verify.
        let mut corrupted = shares.clone();
        corrupted[1] = corrupted[1] + Scalar::one();
        assert!(!verify(commitment, sum_signs(&corrupted)));
    }

    #[test]
    fn commitment_is_deterministic() {
        let oracle_pubkey = scalar(42).base_point_mul();
        let nonce_points = vec![scalar(7).base_point_mul()];
        let messages = vec![b"yes".to_vec()];
        assert_eq!(
            commit_multi(&oracle_pubkey, &nonce_points, &messages),
            commit_multi(&oracle_pubkey, &nonce_points, &messages),
        );
    }
}
