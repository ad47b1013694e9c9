use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::fields::MpcField;

/// Local fragment of a secret-shared field element.
/// Shares are linear: sums, differences and public multiples are computed without communication.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share<T>(pub T);

impl<T: MpcField> Share<T> {
    /// Share of zero, valid under every scheme.
    pub fn zero() -> Self {
        Share(T::zero())
    }

    /// Raw field element held by this party.
    pub fn raw(self) -> T {
        self.0
    }

    pub fn double(self) -> Self {
        Share(self.0.double())
    }
}

impl<T: MpcField> Add for Share<T> {
    type Output = Share<T>;
    fn add(self, rhs: Self) -> Self::Output {
        Share(self.0 + rhs.0)
    }
}

impl<T: MpcField> Sub for Share<T> {
    type Output = Share<T>;
    fn sub(self, rhs: Self) -> Self::Output {
        Share(self.0 - rhs.0)
    }
}

impl<T: MpcField> Neg for Share<T> {
    type Output = Share<T>;
    fn neg(self) -> Self::Output {
        Share(-self.0)
    }
}

impl<T: MpcField> Mul<T> for Share<T> {
    type Output = Share<T>;
    fn mul(self, rhs: T) -> Self::Output {
        Share(self.0 * rhs)
    }
}
