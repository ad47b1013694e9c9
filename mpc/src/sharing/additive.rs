use rand::Rng;

use crate::fields::MpcField;

use super::{Share, SharingError};

/// Split value into `parties` uniformly random summands.
pub(super) fn share<T: MpcField>(value: T, parties: usize, rng: &mut impl Rng) -> Vec<Share<T>> {
    let mut shares: Vec<_> = (1..parties).map(|_| Share(T::random(&mut *rng))).collect();
    let sum = shares.iter().fold(T::zero(), |acc, x| acc + x.0);
    shares.push(Share(value - sum));
    shares
}

/// Sum of all shares. Every party has to contribute.
pub(super) fn reconstruct<T: MpcField>(
    shares: &[(usize, Share<T>)],
    parties: usize,
) -> Result<T, SharingError> {
    if shares.len() < parties {
        return Err(SharingError::NotEnoughShares {
            got: shares.len(),
            needed: parties,
        });
    }
    Ok(shares.iter().fold(T::zero(), |acc, (_, x)| acc + x.0))
}
