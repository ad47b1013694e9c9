//! Correlated randomness consumed by the online phase.

mod fake;
mod precomputed;
mod triple;

pub use fake::FakeDealer;
pub use precomputed::{generate_material, PrecomputedData, PrecomputedDealer};
pub use triple::BeaverTriple;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{fields::MpcField, sharing::Share, MpcContext};

/// Kind of preprocessing material.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialKind {
    BeaverTriple,
    RandomBit,
    RandomElement,
}

impl fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeaverTriple => write!(f, "Beaver triples"),
            Self::RandomBit => write!(f, "random bits"),
            Self::RandomElement => write!(f, "random field elements"),
        }
    }
}

/// Amount of each material kind, e.g. required by a compiled program or left in a dealer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialManifest {
    pub triples: usize,
    pub random_bits: usize,
    pub random_elements: usize,
}

impl MaterialManifest {
    pub fn get(&self, kind: MaterialKind) -> usize {
        match kind {
            MaterialKind::BeaverTriple => self.triples,
            MaterialKind::RandomBit => self.random_bits,
            MaterialKind::RandomElement => self.random_elements,
        }
    }

    /// First kind for which `self` holds less than `required`.
    pub fn first_shortage(&self, required: &MaterialManifest) -> Option<MaterialKind> {
        [
            MaterialKind::BeaverTriple,
            MaterialKind::RandomBit,
            MaterialKind::RandomElement,
        ]
        .into_iter()
        .find(|&kind| self.get(kind) < required.get(kind))
    }
}

/// Error raised by a dealer.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DealerError {
    #[error("Dealer ran out of {0}")]
    Exhausted(MaterialKind),
}

/// Sequential supplier of preprocessing material for one party.
/// All parties have to pull material in the same order.
pub trait MpcDealer: MpcContext {
    /// Field of the dealt shares.
    type Field: MpcField;

    /// Random sharing of a secret random triple (a, b, c) that satisfies ab = c.
    fn next_beaver_triple(&mut self) -> Result<BeaverTriple<Self::Field>, DealerError>;

    /// Random sharing of a secret random bit.
    fn next_bit(&mut self) -> Result<Share<Self::Field>, DealerError>;

    /// Random sharing of a secret uniformly random nonzero element.
    fn next_random_element(&mut self) -> Result<Share<Self::Field>, DealerError>;

    /// Sharing of a random unsigned integer composed of `bits` random bits, least significant first.
    fn next_uint(&mut self, bits: u32) -> Result<Share<Self::Field>, DealerError> {
        let bits: Vec<_> = (0..bits).map(|_| self.next_bit()).collect::<Result<_, _>>()?;
        Ok(bits.into_iter().rev().fold(Share::zero(), |acc, b| acc.double() + b))
    }

    /// Material left, if the supply is finite.
    fn remaining(&self) -> Option<MaterialManifest> {
        None
    }
}
