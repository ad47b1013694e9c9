use rand::Rng;

use crate::fields::MpcField;

use super::{Share, SharingError};

/// Evaluation point of a party. Zero is reserved for the secret.
fn point<T: MpcField>(party_id: usize) -> T {
    T::from(party_id as u64 + 1)
}

/// Evaluate random polynomial of degree `threshold` with constant term `value` at each party's point.
pub(super) fn share<T: MpcField>(
    value: T,
    parties: usize,
    threshold: usize,
    rng: &mut impl Rng,
) -> Vec<Share<T>> {
    let coefficients: Vec<T> = (0..threshold).map(|_| T::random(&mut *rng)).collect();
    (0..parties)
        .map(|id| {
            let x = point::<T>(id);
            // Horner's rule, highest coefficient first.
            let y = coefficients
                .iter()
                .rev()
                .fold(T::zero(), |acc, &c| acc * x + c);
            Share(y * x + value)
        })
        .collect()
}

/// Lagrange interpolation at zero.
pub(super) fn reconstruct<T: MpcField>(
    shares: &[(usize, Share<T>)],
    threshold: usize,
) -> Result<T, SharingError> {
    if shares.len() < threshold + 1 {
        return Err(SharingError::NotEnoughShares {
            got: shares.len(),
            needed: threshold + 1,
        });
    }

    let mut value = T::zero();
    for (i, &(id_i, share)) in shares.iter().enumerate() {
        let x_i = point::<T>(id_i);
        let mut numerator = T::one();
        let mut denominator = T::one();
        for (j, &(id_j, _)) in shares.iter().enumerate() {
            if i != j {
                let x_j = point::<T>(id_j);
                numerator *= x_j;
                denominator *= x_j - x_i;
            }
        }
        let inverse = Option::<T>::from(denominator.invert())
            .ok_or(SharingError::DuplicateParty(id_i))?;
        value += share.0 * numerator * inverse;
    }
    Ok(value)
}
