use serde::{Deserialize, Serialize};

/// Widest supported signed integer. Leaves headroom for `a - b` and the comparison offset within 64 bits.
pub const MAX_INTEGER_BITS: u32 = 62;

/// Width used by the convenience integer constructors.
pub const DEFAULT_INTEGER_BITS: u32 = 32;

/// Who may see a value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// Known to nobody; computing parties hold shares.
    Secret,
    /// Known to all computing parties.
    Public,
}

impl Visibility {
    /// Secret if any of the two is secret.
    pub fn join(self, other: Self) -> Self {
        match (self, other) {
            (Self::Public, Self::Public) => Self::Public,
            _ => Self::Secret,
        }
    }
}

/// Element type of a scalar.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    /// Signed integer in `[-2^(bits-1), 2^(bits-1))`.
    Integer { bits: u32 },
    Boolean,
}

impl ScalarKind {
    /// Bits needed to represent any value of this kind as a signed integer.
    pub fn bits(self) -> u32 {
        match self {
            Self::Integer { bits } => bits,
            Self::Boolean => 1,
        }
    }
}

/// Scalar element type with its visibility.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScalarType {
    pub kind: ScalarKind,
    pub visibility: Visibility,
}

/// Declared type of a circuit node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Scalar(ScalarType),
    Array { elem: Box<ValueType>, len: usize },
    Tuple(Vec<ValueType>),
}

impl ValueType {
    pub fn integer(bits: u32, visibility: Visibility) -> Self {
        Self::Scalar(ScalarType {
            kind: ScalarKind::Integer { bits },
            visibility,
        })
    }

    pub fn boolean(visibility: Visibility) -> Self {
        Self::Scalar(ScalarType {
            kind: ScalarKind::Boolean,
            visibility,
        })
    }

    pub fn array(elem: ValueType, len: usize) -> Self {
        Self::Array {
            elem: Box::new(elem),
            len,
        }
    }

    pub fn as_scalar(&self) -> Option<ScalarType> {
        match self {
            Self::Scalar(scalar) => Some(*scalar),
            _ => None,
        }
    }

    /// Number of scalars stored in a value of this type.
    pub fn num_leaves(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Array { elem, len } => elem.num_leaves() * len,
            Self::Tuple(fields) => fields.iter().map(ValueType::num_leaves).sum(),
        }
    }

    /// Scalars in storage order: array elements and tuple fields left to right, depth first.
    pub fn leaves(&self) -> Vec<ScalarType> {
        let mut leaves = Vec::with_capacity(self.num_leaves());
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves(&self, out: &mut Vec<ScalarType>) {
        match self {
            Self::Scalar(scalar) => out.push(*scalar),
            Self::Array { elem, len } => {
                for _ in 0..*len {
                    elem.collect_leaves(out);
                }
            }
            Self::Tuple(fields) => fields.iter().for_each(|field| field.collect_leaves(out)),
        }
    }

    /// True if any scalar is secret.
    pub fn is_secret(&self) -> bool {
        self.leaves()
            .iter()
            .any(|leaf| leaf.visibility == Visibility::Secret)
    }

    /// Type of element `index` together with the position of its first leaf.
    pub fn element(&self, index: usize) -> Option<(ValueType, usize)> {
        match self {
            Self::Scalar(_) => None,
            Self::Array { elem, len } => {
                (index < *len).then(|| ((**elem).clone(), index * elem.num_leaves()))
            }
            Self::Tuple(fields) => {
                let field = fields.get(index)?;
                let offset = fields[..index].iter().map(ValueType::num_leaves).sum();
                Some((field.clone(), offset))
            }
        }
    }

    /// Same type with every scalar made secret.
    pub fn to_secret(&self) -> Self {
        self.map_leaves(&mut |leaf| ScalarType {
            visibility: Visibility::Secret,
            ..leaf
        })
    }

    /// Combine two types of the same shape, taking the stricter visibility of every scalar.
    /// Returns `None` if shapes or scalar kinds differ.
    pub fn join(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) if a.kind == b.kind => Some(Self::Scalar(ScalarType {
                kind: a.kind,
                visibility: a.visibility.join(b.visibility),
            })),
            (Self::Array { elem: a, len: n }, Self::Array { elem: b, len: m }) if n == m => {
                Some(Self::array(a.join(b)?, *n))
            }
            (Self::Tuple(a), Self::Tuple(b)) if a.len() == b.len() => a
                .iter()
                .zip(b)
                .map(|(a, b)| a.join(b))
                .collect::<Option<_>>()
                .map(Self::Tuple),
            _ => None,
        }
    }

    fn map_leaves(&self, f: &mut impl FnMut(ScalarType) -> ScalarType) -> Self {
        match self {
            Self::Scalar(scalar) => Self::Scalar(f(*scalar)),
            Self::Array { elem, len } => Self::array(elem.map_leaves(f), *len),
            Self::Tuple(fields) => Self::Tuple(fields.iter().map(|x| x.map_leaves(f)).collect()),
        }
    }
}

/// Plaintext value of a typed input or output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlainValue {
    Integer(i64),
    Boolean(bool),
    Array(Vec<PlainValue>),
    Tuple(Vec<PlainValue>),
}

/// Value supplied for a declared input.
pub type InputValue = PlainValue;

/// Decoded value of a declared output.
pub type OutputValue = PlainValue;

/// Scalar of a flattened plain value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlainScalar {
    Integer(i64),
    Boolean(bool),
}

impl PlainValue {
    /// Check that the value inhabits `ty` and flatten it into leaves in storage order.
    pub fn flatten(&self, ty: &ValueType) -> Result<Vec<PlainScalar>, String> {
        let mut out = Vec::with_capacity(ty.num_leaves());
        self.flatten_into(ty, &mut out)?;
        Ok(out)
    }

    fn flatten_into(&self, ty: &ValueType, out: &mut Vec<PlainScalar>) -> Result<(), String> {
        match (self, ty) {
            (Self::Integer(value), ValueType::Scalar(scalar)) => match scalar.kind {
                ScalarKind::Integer { bits } if fits_in_bits(*value, bits) => {
                    out.push(PlainScalar::Integer(*value))
                }
                ScalarKind::Integer { bits } => {
                    return Err(format!("{} does not fit into {} bits", value, bits))
                }
                ScalarKind::Boolean => return Err("expected boolean, got integer".into()),
            },
            (Self::Boolean(value), ValueType::Scalar(scalar)) => match scalar.kind {
                ScalarKind::Boolean => out.push(PlainScalar::Boolean(*value)),
                ScalarKind::Integer { .. } => return Err("expected integer, got boolean".into()),
            },
            (Self::Array(items), ValueType::Array { elem, len }) => {
                if items.len() != *len {
                    return Err(format!("expected {} elements, got {}", len, items.len()));
                }
                for item in items {
                    item.flatten_into(elem, out)?;
                }
            }
            (Self::Tuple(items), ValueType::Tuple(fields)) => {
                if items.len() != fields.len() {
                    return Err(format!("expected {} fields, got {}", fields.len(), items.len()));
                }
                for (item, field) in items.iter().zip(fields) {
                    item.flatten_into(field, out)?;
                }
            }
            (_, ty) => return Err(format!("value does not match type {:?}", ty)),
        }
        Ok(())
    }

    /// Rebuild a value of type `ty` from leaves in storage order.
    /// Returns `None` if there are fewer leaves than `ty` holds.
    pub fn unflatten(
        ty: &ValueType,
        leaves: &mut impl Iterator<Item = PlainScalar>,
    ) -> Option<Self> {
        Some(match ty {
            ValueType::Scalar(_) => match leaves.next()? {
                PlainScalar::Integer(value) => Self::Integer(value),
                PlainScalar::Boolean(value) => Self::Boolean(value),
            },
            ValueType::Array { elem, len } => Self::Array(
                (0..*len)
                    .map(|_| Self::unflatten(elem, leaves))
                    .collect::<Option<_>>()?,
            ),
            ValueType::Tuple(fields) => Self::Tuple(
                fields
                    .iter()
                    .map(|field| Self::unflatten(field, leaves))
                    .collect::<Option<_>>()?,
            ),
        })
    }
}

/// True if `value` is a `bits`-bit signed integer.
pub fn fits_in_bits(value: i64, bits: u32) -> bool {
    let bound = 1i64 << (bits - 1);
    (-bound..bound).contains(&value)
}

/// Reduce `value` modulo `2^bits` into the signed range.
pub fn wrap_to_bits(value: i64, bits: u32) -> i64 {
    let shift = 64 - bits;
    (value << shift) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaves_and_elements() {
        let int = ValueType::integer(8, Visibility::Secret);
        let ty = ValueType::Tuple(vec![
            ValueType::array(int.clone(), 3),
            ValueType::boolean(Visibility::Public),
        ]);
        assert_eq!(ty.num_leaves(), 4);
        assert_eq!(ty.leaves()[3].kind, ScalarKind::Boolean);
        assert_eq!(
            ty.element(1),
            Some((ValueType::boolean(Visibility::Public), 3))
        );
        assert_eq!(ty.element(0).unwrap().0.element(2), Some((int, 2)));
        assert_eq!(ty.element(2), None);
        assert!(ty.is_secret());
    }

    #[test]
    fn test_join() {
        let public = ValueType::integer(8, Visibility::Public);
        let secret = ValueType::integer(8, Visibility::Secret);
        assert_eq!(public.join(&secret), Some(secret.clone()));
        assert_eq!(public.join(&public), Some(public.clone()));
        assert_eq!(public.join(&ValueType::integer(16, Visibility::Public)), None);
        assert_eq!(
            ValueType::array(public.clone(), 2).join(&ValueType::array(public, 3)),
            None
        );
    }

    #[test]
    fn test_flatten() {
        let ty = ValueType::array(ValueType::integer(4, Visibility::Secret), 2);
        let value = PlainValue::Array(vec![PlainValue::Integer(-8), PlainValue::Integer(7)]);
        let leaves = value.flatten(&ty).unwrap();
        assert_eq!(
            PlainValue::unflatten(&ty, &mut leaves.into_iter()),
            Some(value)
        );

        let too_big = PlainValue::Array(vec![PlainValue::Integer(8), PlainValue::Integer(0)]);
        assert!(too_big.flatten(&ty).is_err());
        assert!(PlainValue::Boolean(true).flatten(&ty).is_err());
    }

    #[test]
    fn test_wrap_to_bits() {
        assert_eq!(wrap_to_bits(127, 8), 127);
        assert_eq!(wrap_to_bits(128, 8), -128);
        assert_eq!(wrap_to_bits(-129, 8), 127);
        assert_eq!(wrap_to_bits(1, 1), -1);
        assert_eq!(wrap_to_bits(i64::MAX, 62), -1);
    }
}
