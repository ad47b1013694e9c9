use serde::{Deserialize, Serialize};

use crate::{
    fields::MpcField,
    sharing::{Share, SharingScheme},
};

/// Shares of a random triple (a, b, c) with c = ab. Each triple must be used for exactly one multiplication.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaverTriple<T> {
    pub a: Share<T>,
    pub b: Share<T>,
    pub c: Share<T>,
}

impl<T: MpcField> BeaverTriple<T> {
    /// Mask operands. Both results are opened to all parties.
    pub fn prepare_multiplication(&self, x: Share<T>, y: Share<T>) -> (Share<T>, Share<T>) {
        (x - self.a, y - self.b)
    }

    /// Combine opened `e = x - a` and `d = y - b` into a share of xy.
    pub fn finalize_multiplication(
        &self,
        e: T,
        d: T,
        scheme: &SharingScheme,
        party_id: usize,
    ) -> Share<T> {
        self.c + self.b * e + self.a * d + scheme.share_of_public(party_id, e * d)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::fields::Mersenne127;

    type Fp = Mersenne127;

    #[test]
    fn test_multiplication_with_shamir_triple() {
        let mut rng = StdRng::seed_from_u64(9);
        let scheme = SharingScheme::shamir(3, 1).unwrap();
        let (a, b) = (Fp::from(104), Fp::from(31));
        let sa = scheme.share(a, &mut rng);
        let sb = scheme.share(b, &mut rng);
        let sc = scheme.share(a * b, &mut rng);
        let sx = scheme.share(Fp::from(42), &mut rng);
        let sy = scheme.share(Fp::from(1337), &mut rng);

        let triples: Vec<_> = (0..3)
            .map(|i| BeaverTriple { a: sa[i], b: sb[i], c: sc[i] })
            .collect();
        let masked: Vec<_> = (0..3)
            .map(|i| triples[i].prepare_multiplication(sx[i], sy[i]))
            .collect();
        let e = scheme
            .reconstruct(&masked.iter().map(|m| m.0).enumerate().collect::<Vec<_>>())
            .unwrap();
        let d = scheme
            .reconstruct(&masked.iter().map(|m| m.1).enumerate().collect::<Vec<_>>())
            .unwrap();
        let product: Vec<_> = (0..3)
            .map(|i| (i, triples[i].finalize_multiplication(e, d, &scheme, i)))
            .collect();
        assert_eq!(scheme.reconstruct(&product), Ok(Fp::from(42 * 1337)));
    }
}
