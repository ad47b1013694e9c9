use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    fields::{random_nonzero, MpcField},
    sharing::{Share, SharingScheme},
    MpcContext,
};

use super::{BeaverTriple, DealerError, MpcDealer};

/// Insecure dealer that can be used for tests.
/// Every party expands the same seed, computes the full sharing and keeps its own share.
pub struct FakeDealer<T> {
    scheme: SharingScheme,
    party_id: usize,
    beaver_triple_gen: FakeShareGenerator,
    bits_gen: FakeShareGenerator,
    elements_gen: FakeShareGenerator,
    _field: std::marker::PhantomData<T>,
}

impl<T: MpcField> FakeDealer<T> {
    /// Create new instance. All parties of one execution must use the same seed.
    pub fn new(scheme: SharingScheme, party_id: usize, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        Self {
            scheme,
            party_id,
            beaver_triple_gen: FakeShareGenerator::new(rng.gen()),
            bits_gen: FakeShareGenerator::new(rng.gen()),
            elements_gen: FakeShareGenerator::new(rng.gen()),
            _field: std::marker::PhantomData,
        }
    }
}

impl<T: MpcField> MpcContext for FakeDealer<T> {
    fn num_parties(&self) -> usize {
        self.scheme.num_parties()
    }

    fn party_id(&self) -> usize {
        self.party_id
    }
}

impl<T: MpcField> MpcDealer for FakeDealer<T> {
    type Field = T;

    fn next_beaver_triple(&mut self) -> Result<BeaverTriple<T>, DealerError> {
        let gen = &mut self.beaver_triple_gen;
        let a_plain = T::random(&mut gen.rng);
        let b_plain = T::random(&mut gen.rng);
        Ok(BeaverTriple {
            a: gen.own_share(&self.scheme, self.party_id, a_plain),
            b: gen.own_share(&self.scheme, self.party_id, b_plain),
            c: gen.own_share(&self.scheme, self.party_id, a_plain * b_plain),
        })
    }

    fn next_bit(&mut self) -> Result<Share<T>, DealerError> {
        let value = if self.bits_gen.rng.gen() {
            T::one()
        } else {
            T::zero()
        };
        Ok(self.bits_gen.own_share(&self.scheme, self.party_id, value))
    }

    fn next_random_element(&mut self) -> Result<Share<T>, DealerError> {
        let value = random_nonzero(&mut self.elements_gen.rng);
        Ok(self.elements_gen.own_share(&self.scheme, self.party_id, value))
    }
}

/// Insecure generator of shared values.
struct FakeShareGenerator {
    rng: SmallRng,
}

impl FakeShareGenerator {
    fn new(seed: [u8; 32]) -> Self {
        Self {
            rng: SmallRng::from_seed(seed),
        }
    }

    /// Share value among all parties and return share of `party_id`.
    fn own_share<T: MpcField>(
        &mut self,
        scheme: &SharingScheme,
        party_id: usize,
        value: T,
    ) -> Share<T> {
        scheme.share(value, &mut self.rng)[party_id]
    }
}

#[cfg(test)]
mod tests {
    use ff::Field;

    use super::*;
    use crate::fields::Mersenne127;

    type Fp = Mersenne127;

    fn dealers(scheme: SharingScheme) -> Vec<FakeDealer<Fp>> {
        (0..scheme.num_parties())
            .map(|id| FakeDealer::new(scheme, id, 7))
            .collect()
    }

    #[test]
    fn test_triples_are_consistent() {
        let scheme = SharingScheme::additive(3).unwrap();
        let mut dealers = dealers(scheme);
        for _ in 0..5 {
            let triples: Vec<_> = dealers
                .iter_mut()
                .map(|d| d.next_beaver_triple().unwrap())
                .collect();
            let open = |f: fn(&BeaverTriple<Fp>) -> Share<Fp>| {
                let shares: Vec<_> = triples.iter().map(f).enumerate().collect();
                scheme.reconstruct(&shares).unwrap()
            };
            assert_eq!(open(|t| t.a) * open(|t| t.b), open(|t| t.c));
        }
    }

    #[test]
    fn test_bits_and_uints() {
        let scheme = SharingScheme::shamir(3, 1).unwrap();
        let mut dealers = dealers(scheme);
        for _ in 0..20 {
            let bits: Vec<_> = dealers
                .iter_mut()
                .map(|d| d.next_bit().unwrap())
                .enumerate()
                .collect();
            let bit = scheme.reconstruct(&bits).unwrap();
            assert!(bit == Fp::zero() || bit == Fp::one());
        }
        let uints: Vec<_> = dealers
            .iter_mut()
            .map(|d| d.next_uint(10).unwrap())
            .enumerate()
            .collect();
        assert!(scheme.reconstruct(&uints).unwrap().truncated() < 1024);
    }

    #[test]
    fn test_random_elements_are_nonzero() {
        let scheme = SharingScheme::additive(2).unwrap();
        let mut dealers = dealers(scheme);
        let elements: Vec<_> = dealers
            .iter_mut()
            .map(|d| d.next_random_element().unwrap())
            .enumerate()
            .collect();
        assert_ne!(scheme.reconstruct(&elements).unwrap(), Fp::zero());
    }
}
