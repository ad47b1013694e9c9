//! Secret sharing schemes over a prime field.
//!
//! Shares of a value are information-theoretically independent of it unless an
//! authorized set of parties combines them: all parties for the additive scheme,
//! any `threshold + 1` parties for Shamir's scheme.

mod additive;
mod shamir;
mod share;

pub use share::Share;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::fields::MpcField;

/// Errors raised while splitting or reconstructing values.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SharingError {
    #[error("Need at least {needed} shares to reconstruct, got {got}")]
    NotEnoughShares { got: usize, needed: usize },
    #[error("Share of party {0} was supplied twice")]
    DuplicateParty(usize),
    #[error("Party {0} does not participate in this scheme")]
    UnknownParty(usize),
    #[error("Shamir sharing of degree {threshold} among {parties} parties is not honest-majority")]
    InvalidThreshold { parties: usize, threshold: usize },
    #[error("Sharing requires at least one party")]
    NoParties,
}

/// Sharing scheme together with its parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingScheme {
    /// Value is the sum of all shares.
    Additive { parties: usize },
    /// Value is the constant term of a polynomial of degree `threshold`; party `i` holds its value at `i + 1`.
    Shamir { parties: usize, threshold: usize },
}

impl SharingScheme {
    pub fn additive(parties: usize) -> Result<Self, SharingError> {
        if parties == 0 {
            return Err(SharingError::NoParties);
        }
        Ok(Self::Additive { parties })
    }

    /// Shamir sharing tolerating `threshold` passively corrupted parties. Requires an honest majority.
    pub fn shamir(parties: usize, threshold: usize) -> Result<Self, SharingError> {
        if parties == 0 {
            return Err(SharingError::NoParties);
        }
        if parties < 2 * threshold + 1 {
            return Err(SharingError::InvalidThreshold { parties, threshold });
        }
        Ok(Self::Shamir { parties, threshold })
    }

    /// Number of computing parties holding shares.
    pub fn num_parties(&self) -> usize {
        match *self {
            Self::Additive { parties } | Self::Shamir { parties, .. } => parties,
        }
    }

    /// Smallest number of shares that determines the value.
    pub fn reconstruction_threshold(&self) -> usize {
        match *self {
            Self::Additive { parties } => parties,
            Self::Shamir { threshold, .. } => threshold + 1,
        }
    }

    /// Split value into one share per party.
    pub fn share<T: MpcField>(&self, value: T, rng: &mut impl Rng) -> Vec<Share<T>> {
        match *self {
            Self::Additive { parties } => additive::share(value, parties, rng),
            Self::Shamir { parties, threshold } => shamir::share(value, parties, threshold, rng),
        }
    }

    /// Recover value from `(party_id, share)` pairs.
    pub fn reconstruct<T: MpcField>(&self, shares: &[(usize, Share<T>)]) -> Result<T, SharingError> {
        let parties = self.num_parties();
        let mut seen = vec![false; parties];
        for &(id, _) in shares {
            match seen.get_mut(id) {
                None => return Err(SharingError::UnknownParty(id)),
                Some(true) => return Err(SharingError::DuplicateParty(id)),
                Some(flag) => *flag = true,
            }
        }

        match *self {
            Self::Additive { parties } => additive::reconstruct(shares, parties),
            Self::Shamir { threshold, .. } => shamir::reconstruct(shares, threshold),
        }
    }

    /// Share of a public constant held by `party_id`. Needs no randomness and no communication.
    pub fn share_of_public<T: MpcField>(&self, party_id: usize, value: T) -> Share<T> {
        match *self {
            Self::Additive { .. } if party_id == 0 => Share(value),
            Self::Additive { .. } => Share::zero(),
            Self::Shamir { .. } => Share(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::fields::{Mersenne127, Mersenne61, MpcField};

    type Fp = Mersenne127;

    fn indexed<T: Copy>(shares: &[T]) -> Vec<(usize, T)> {
        shares.iter().copied().enumerate().collect()
    }

    #[test]
    fn test_additive_reconstruct() {
        let mut rng = StdRng::seed_from_u64(1);
        let scheme = SharingScheme::additive(3).unwrap();
        let shares = scheme.share(Fp::from_i64(-42), &mut rng);
        assert_eq!(shares.len(), 3);
        assert_eq!(scheme.reconstruct(&indexed(&shares)), Ok(Fp::from_i64(-42)));
        assert_eq!(
            scheme.reconstruct(&indexed(&shares[..2])),
            Err(SharingError::NotEnoughShares { got: 2, needed: 3 })
        );
    }

    #[test]
    fn test_shamir_any_subset_reconstructs() {
        let mut rng = StdRng::seed_from_u64(2);
        let scheme = SharingScheme::shamir(5, 2).unwrap();
        let shares = scheme.share(Fp::from(1337), &mut rng);
        let all = indexed(&shares);
        for subset in [[0, 1, 2], [2, 3, 4], [0, 2, 4], [4, 1, 3]] {
            let picked: Vec<_> = subset.iter().map(|&i| all[i]).collect();
            assert_eq!(scheme.reconstruct(&picked), Ok(Fp::from(1337)));
        }
        assert_eq!(scheme.reconstruct(&all), Ok(Fp::from(1337)));
        assert!(scheme.reconstruct(&all[..2]).is_err());
    }

    #[test]
    fn test_reconstruct_rejects_bad_party_sets() {
        let mut rng = StdRng::seed_from_u64(3);
        let scheme = SharingScheme::shamir(3, 1).unwrap();
        let shares = scheme.share(Fp::from(7), &mut rng);
        assert_eq!(
            scheme.reconstruct(&[(0, shares[0]), (0, shares[0])]),
            Err(SharingError::DuplicateParty(0))
        );
        assert_eq!(
            scheme.reconstruct(&[(0, shares[0]), (5, shares[1])]),
            Err(SharingError::UnknownParty(5))
        );
    }

    #[test]
    fn test_threshold_requires_honest_majority() {
        assert!(SharingScheme::shamir(4, 2).is_err());
        assert!(SharingScheme::shamir(5, 2).is_ok());
        assert!(SharingScheme::additive(0).is_err());
    }

    #[test]
    fn test_public_shares_are_linear() {
        let mut rng = StdRng::seed_from_u64(4);
        for scheme in [
            SharingScheme::additive(4).unwrap(),
            SharingScheme::shamir(4, 1).unwrap(),
        ] {
            let shares = scheme.share(Fp::from(10), &mut rng);
            let shifted: Vec<_> = shares
                .iter()
                .enumerate()
                .map(|(id, &s)| (id, s + scheme.share_of_public(id, Fp::from(5))))
                .collect();
            assert_eq!(scheme.reconstruct(&shifted), Ok(Fp::from(15)));
        }
    }

    /// Histogram of the low bits of one party's share must look uniform whatever the secret is.
    fn assert_single_share_uniform(scheme: SharingScheme, party: usize) {
        const SAMPLES: usize = 8000;
        const BUCKETS: usize = 8;
        let mut rng = StdRng::seed_from_u64(5);
        for secret in [0u64, 1, 6] {
            let mut histogram = [0usize; BUCKETS];
            for _ in 0..SAMPLES {
                let shares = scheme.share(Mersenne61::from(secret), &mut rng);
                histogram[(shares[party].0.truncated() % BUCKETS as u64) as usize] += 1;
            }
            let expected = SAMPLES / BUCKETS;
            for count in histogram {
                assert!(
                    count > expected * 8 / 10 && count < expected * 12 / 10,
                    "secret={secret} histogram={histogram:?}"
                );
            }
        }
    }

    #[test]
    fn test_additive_share_distribution_is_uniform() {
        let scheme = SharingScheme::additive(3).unwrap();
        assert_single_share_uniform(scheme, 0);
        assert_single_share_uniform(scheme, 2);
    }

    #[test]
    fn test_shamir_share_distribution_is_uniform() {
        let scheme = SharingScheme::shamir(3, 1).unwrap();
        assert_single_share_uniform(scheme, 1);
    }

    #[test]
    fn test_scheme_survives_bincode() {
        for scheme in [
            SharingScheme::additive(2).unwrap(),
            SharingScheme::shamir(5, 2).unwrap(),
        ] {
            let bytes = bincode::serialize(&scheme).unwrap();
            assert_eq!(bincode::deserialize::<SharingScheme>(&bytes).unwrap(), scheme);
        }
    }
}
