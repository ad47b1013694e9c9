use ff::{Field, PrimeField};
use serde::{de::DeserializeOwned, Serialize};

/// Prime field used by the sharing engine.
pub trait MpcField: PrimeField + Serialize + DeserializeOwned {
    /// Masks below 2^SAFE_BITS can be added to values below 2^SAFE_BITS without wrapping around the modulus.
    const SAFE_BITS: u32;

    /// Field element equal to 2^k.
    fn power_of_two(k: u32) -> Self {
        Self::from(2).pow_vartime([k as u64])
    }

    /// Multiplicative inverse of 2^k.
    fn power_of_two_inverse(k: u32) -> Self {
        // The modulus is odd, so 2^k is always invertible.
        Self::power_of_two(k).invert().unwrap_or(Self::zero())
    }

    /// Embed signed integer. Negative values are mapped to `p - |value|`.
    fn from_i64(value: i64) -> Self {
        let elem = Self::from(value.unsigned_abs());
        if value < 0 {
            -elem
        } else {
            elem
        }
    }

    /// Lowest 64 bits of the canonical representative.
    fn truncated(&self) -> u64 {
        let repr = self.to_repr();
        let mut bytes = [0u8; 8];
        for (dst, src) in bytes.iter_mut().zip(repr.as_ref()) {
            *dst = *src;
        }
        u64::from_le_bytes(bytes)
    }
}

/// Encode N-bit signed integer. The caller guarantees `-2^(N-1) <= value < 2^(N-1)`.
pub fn encode_int<T: MpcField>(value: i64) -> T {
    T::from_i64(value)
}

/// Decode N-bit signed integer. Small nonnegative overflows wrap around like N-bit arithmetic,
/// anything else outside the range decodes to an unspecified value.
pub fn decode_int<T: MpcField>(elem: T, bits: u32) -> i64 {
    let offset = 1u64 << (bits - 1);
    let low = (elem + T::from(offset)).truncated() & (u64::MAX >> (64 - bits));
    low.wrapping_sub(offset) as i64
}

/// Decode boolean stored as 0 or 1.
pub fn decode_bool<T: MpcField>(elem: T) -> bool {
    !bool::from(elem.is_zero())
}

mod mersenne_61 {
    use ff::PrimeField;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Finite field mod 2^61-1.
    #[derive(PrimeField)]
    #[PrimeFieldModulus = "2305843009213693951"]
    #[PrimeFieldGenerator = "37"]
    #[PrimeFieldReprEndianness = "little"]
    pub struct Mersenne61([u64; 1]);

    impl super::MpcField for Mersenne61 {
        const SAFE_BITS: u32 = 59;
    }

    impl Serialize for Mersenne61 {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            self.to_repr().0.serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Mersenne61 {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let repr = Mersenne61Repr(Deserialize::deserialize(deserializer)?);
            Option::from(Self::from_repr(repr))
                .ok_or_else(|| serde::de::Error::custom("Invalid field element"))
        }
    }
}

mod mersenne_127 {
    use ff::PrimeField;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Finite field mod 2^127-1.
    #[derive(PrimeField)]
    #[PrimeFieldModulus = "170141183460469231731687303715884105727"]
    #[PrimeFieldGenerator = "43"]
    #[PrimeFieldReprEndianness = "little"]
    pub struct Mersenne127([u64; 2]);

    impl super::MpcField for Mersenne127 {
        const SAFE_BITS: u32 = 125;
    }

    impl Serialize for Mersenne127 {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            self.to_repr().0.serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Mersenne127 {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let repr = Mersenne127Repr(Deserialize::deserialize(deserializer)?);
            Option::from(Self::from_repr(repr))
                .ok_or_else(|| serde::de::Error::custom("Invalid field element"))
        }
    }
}

pub use mersenne_127::{Mersenne127, Mersenne127Repr};
pub use mersenne_61::{Mersenne61, Mersenne61Repr};

/// Random nonzero element.
pub fn random_nonzero<T: MpcField>(mut rng: impl rand::RngCore) -> T {
    loop {
        let elem = T::random(&mut rng);
        if !bool::from(elem.is_zero()) {
            return elem;
        }
    }
}
