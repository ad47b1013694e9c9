use super::{
    graph::{Circuit, InputDecl, Literal, Node, NodeId, Op, OutputDecl, Party, PartyId},
    types::{
        fits_in_bits, ScalarKind, ScalarType, ValueType, Visibility, DEFAULT_INTEGER_BITS,
        MAX_INTEGER_BITS,
    },
};

/// Error raised by a builder call. The program is left unchanged.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("Type mismatch in {op}: {reason}")]
    TypeMismatch { op: &'static str, reason: String },
    #[error("Party {0:?} is not declared")]
    UndefinedParty(String),
    #[error("Input {0:?} is not declared")]
    UndefinedInput(String),
    #[error("Name {0:?} is already declared")]
    DuplicateName(String),
    #[error("Index {index} out of bounds for {len} elements")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("Node {0:?} does not belong to this program")]
    UnknownNode(NodeId),
    #[error("Integer width {0} is not in 1..=62")]
    InvalidBitWidth(u32),
    #[error("Constant {value} does not fit into {bits} bits")]
    ConstantOutOfRange { value: i64, bits: u32 },
}

fn mismatch(op: &'static str, reason: impl Into<String>) -> BuildError {
    BuildError::TypeMismatch {
        op,
        reason: reason.into(),
    }
}

/// Explicit registry of parties, inputs and nodes of a program under construction.
/// Every combinator validates its operands and appends exactly one node.
#[derive(Clone, Debug, Default)]
pub struct BuildContext {
    circuit: Circuit,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a party.
    pub fn party(&mut self, name: impl Into<String>) -> Result<PartyId, BuildError> {
        let name = name.into();
        if self.circuit.party_by_name(&name).is_some() {
            return Err(BuildError::DuplicateName(name));
        }
        self.circuit.parties.push(Party { name });
        Ok(PartyId(self.circuit.parties.len() - 1))
    }

    pub fn party_by_name(&self, name: &str) -> Result<PartyId, BuildError> {
        self.circuit
            .party_by_name(name)
            .ok_or_else(|| BuildError::UndefinedParty(name.to_string()))
    }

    /// Declare an input of arbitrary type supplied by `party`.
    pub fn input(
        &mut self,
        name: impl Into<String>,
        party: PartyId,
        ty: ValueType,
    ) -> Result<NodeId, BuildError> {
        let name = name.into();
        self.check_party(party)?;
        if self.circuit.inputs.iter().any(|input| input.name == name) {
            return Err(BuildError::DuplicateName(name));
        }
        for leaf in ty.leaves() {
            check_bits(leaf.kind)?;
        }

        let node = self.push(Op::Input(self.circuit.inputs.len()), ty.clone());
        self.circuit.inputs.push(InputDecl {
            name,
            party,
            ty,
            node,
        });
        Ok(node)
    }

    pub fn secret_integer(
        &mut self,
        name: impl Into<String>,
        party: PartyId,
    ) -> Result<NodeId, BuildError> {
        let ty = ValueType::integer(DEFAULT_INTEGER_BITS, Visibility::Secret);
        self.input(name, party, ty)
    }

    pub fn public_integer(
        &mut self,
        name: impl Into<String>,
        party: PartyId,
    ) -> Result<NodeId, BuildError> {
        let ty = ValueType::integer(DEFAULT_INTEGER_BITS, Visibility::Public);
        self.input(name, party, ty)
    }

    pub fn secret_boolean(
        &mut self,
        name: impl Into<String>,
        party: PartyId,
    ) -> Result<NodeId, BuildError> {
        self.input(name, party, ValueType::boolean(Visibility::Secret))
    }

    pub fn input_by_name(&self, name: &str) -> Result<NodeId, BuildError> {
        self.circuit
            .inputs
            .iter()
            .find(|input| input.name == name)
            .map(|input| input.node)
            .ok_or_else(|| BuildError::UndefinedInput(name.to_string()))
    }

    /// Public integer constant of default width.
    pub fn integer(&mut self, value: i64) -> Result<NodeId, BuildError> {
        self.integer_with_bits(value, DEFAULT_INTEGER_BITS)
    }

    pub fn integer_with_bits(&mut self, value: i64, bits: u32) -> Result<NodeId, BuildError> {
        check_bits(ScalarKind::Integer { bits })?;
        if !fits_in_bits(value, bits) {
            return Err(BuildError::ConstantOutOfRange { value, bits });
        }
        Ok(self.push(
            Op::Constant(Literal::Integer(value)),
            ValueType::integer(bits, Visibility::Public),
        ))
    }

    pub fn boolean(&mut self, value: bool) -> NodeId {
        self.push(
            Op::Constant(Literal::Boolean(value)),
            ValueType::boolean(Visibility::Public),
        )
    }

    pub fn add(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, BuildError> {
        let ty = self.integer_operands("add", lhs, rhs)?;
        Ok(self.push(Op::Add(lhs, rhs), ty))
    }

    pub fn subtract(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, BuildError> {
        let ty = self.integer_operands("subtract", lhs, rhs)?;
        Ok(self.push(Op::Sub(lhs, rhs), ty))
    }

    pub fn multiply(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, BuildError> {
        let ty = self.integer_operands("multiply", lhs, rhs)?;
        Ok(self.push(Op::Mul(lhs, rhs), ty))
    }

    /// Equality test. The result is secret unless both operands are public.
    pub fn equals(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, BuildError> {
        let (lhs_ty, rhs_ty) = self.scalar_operands("equals", lhs, rhs)?;
        let visibility = lhs_ty.visibility.join(rhs_ty.visibility);
        Ok(self.push(Op::Equals(lhs, rhs), ValueType::boolean(visibility)))
    }

    /// Equality test whose result is revealed to every computing party.
    pub fn public_equals(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, BuildError> {
        self.scalar_operands("public_equals", lhs, rhs)?;
        Ok(self.push(
            Op::PublicEquals(lhs, rhs),
            ValueType::boolean(Visibility::Public),
        ))
    }

    pub fn less_than(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, BuildError> {
        let ty = self.integer_operands("less_than", lhs, rhs)?;
        Ok(self.push(Op::LessThan(lhs, rhs), boolean_like(&ty)))
    }

    pub fn greater_than(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, BuildError> {
        let ty = self.integer_operands("greater_than", lhs, rhs)?;
        Ok(self.push(Op::LessThan(rhs, lhs), boolean_like(&ty)))
    }

    pub fn and(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, BuildError> {
        let ty = self.boolean_operands("and", lhs, rhs)?;
        Ok(self.push(Op::And(lhs, rhs), ty))
    }

    pub fn or(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, BuildError> {
        let ty = self.boolean_operands("or", lhs, rhs)?;
        Ok(self.push(Op::Or(lhs, rhs), ty))
    }

    pub fn not(&mut self, value: NodeId) -> Result<NodeId, BuildError> {
        let ty = self.boolean_operands("not", value, value)?;
        Ok(self.push(Op::Not(value), ty))
    }

    /// `if_true` if `cond` holds, `if_false` otherwise. Branches may be containers of the same shape.
    pub fn if_else(
        &mut self,
        cond: NodeId,
        if_true: NodeId,
        if_false: NodeId,
    ) -> Result<NodeId, BuildError> {
        let cond_ty = self.scalar("if_else", cond)?;
        if cond_ty.kind != ScalarKind::Boolean {
            return Err(mismatch("if_else", "condition must be boolean"));
        }
        let ty = self
            .ty(if_true)?
            .join(self.ty(if_false)?)
            .ok_or_else(|| mismatch("if_else", "branches have different types"))?;
        let ty = match cond_ty.visibility {
            Visibility::Secret => ty.to_secret(),
            Visibility::Public => ty,
        };
        Ok(self.push(
            Op::Select {
                cond,
                if_true,
                if_false,
            },
            ty,
        ))
    }

    /// Fixed-length array of values of the same type.
    pub fn array(&mut self, items: &[NodeId]) -> Result<NodeId, BuildError> {
        let (first, rest) = items
            .split_first()
            .ok_or_else(|| mismatch("array", "arrays cannot be empty"))?;
        let mut elem = self.ty(*first)?.clone();
        for item in rest {
            elem = elem
                .join(self.ty(*item)?)
                .ok_or_else(|| mismatch("array", "elements have different types"))?;
        }
        Ok(self.push(
            Op::Array(items.to_vec()),
            ValueType::array(elem, items.len()),
        ))
    }

    pub fn tuple(&mut self, items: &[NodeId]) -> Result<NodeId, BuildError> {
        let fields = items
            .iter()
            .map(|item| self.ty(*item).cloned())
            .collect::<Result<_, _>>()?;
        Ok(self.push(Op::Tuple(items.to_vec()), ValueType::Tuple(fields)))
    }

    /// Element of an array or field of a tuple.
    pub fn index(&mut self, src: NodeId, index: usize) -> Result<NodeId, BuildError> {
        let ty = self.ty(src)?;
        let len = match ty {
            ValueType::Scalar(_) => return Err(mismatch("index", "cannot index a scalar")),
            ValueType::Array { len, .. } => *len,
            ValueType::Tuple(fields) => fields.len(),
        };
        let (elem, _) = ty
            .element(index)
            .ok_or(BuildError::IndexOutOfBounds { index, len })?;
        Ok(self.push(Op::Index { src, index }, elem))
    }

    /// Reveal `value` to `party` under `name`.
    pub fn output(
        &mut self,
        value: NodeId,
        name: impl Into<String>,
        party: PartyId,
    ) -> Result<(), BuildError> {
        let name = name.into();
        self.ty(value)?;
        self.check_party(party)?;
        if self.circuit.outputs.iter().any(|output| output.name == name) {
            return Err(BuildError::DuplicateName(name));
        }
        self.circuit.outputs.push(OutputDecl {
            name,
            party,
            node: value,
        });
        Ok(())
    }

    /// Declared type of a node.
    pub fn ty(&self, id: NodeId) -> Result<&ValueType, BuildError> {
        self.circuit
            .node(id)
            .map(|node| &node.ty)
            .ok_or(BuildError::UnknownNode(id))
    }

    pub fn finish(self) -> Circuit {
        self.circuit
    }

    fn push(&mut self, op: Op, ty: ValueType) -> NodeId {
        let id = NodeId(self.circuit.nodes.len() as u32);
        self.circuit.nodes.push(Node { op, ty });
        id
    }

    fn check_party(&self, party: PartyId) -> Result<(), BuildError> {
        match self.circuit.party_name(party) {
            Some(_) => Ok(()),
            None => Err(BuildError::UndefinedParty(format!("#{}", party.index()))),
        }
    }

    fn scalar(&self, op: &'static str, id: NodeId) -> Result<ScalarType, BuildError> {
        self.ty(id)?
            .as_scalar()
            .ok_or_else(|| mismatch(op, "expected scalar operand"))
    }

    fn scalar_operands(
        &self,
        op: &'static str,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<(ScalarType, ScalarType), BuildError> {
        let lhs = self.scalar(op, lhs)?;
        let rhs = self.scalar(op, rhs)?;
        if lhs.kind != rhs.kind {
            return Err(mismatch(
                op,
                format!("{:?} and {:?}", lhs.kind, rhs.kind),
            ));
        }
        Ok((lhs, rhs))
    }

    fn integer_operands(
        &self,
        op: &'static str,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<ValueType, BuildError> {
        let (lhs, rhs) = self.scalar_operands(op, lhs, rhs)?;
        match lhs.kind {
            ScalarKind::Integer { bits } => {
                Ok(ValueType::integer(bits, lhs.visibility.join(rhs.visibility)))
            }
            ScalarKind::Boolean => Err(mismatch(op, "expected integer operands")),
        }
    }

    fn boolean_operands(
        &self,
        op: &'static str,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<ValueType, BuildError> {
        let (lhs, rhs) = self.scalar_operands(op, lhs, rhs)?;
        match lhs.kind {
            ScalarKind::Boolean => Ok(ValueType::boolean(lhs.visibility.join(rhs.visibility))),
            ScalarKind::Integer { .. } => Err(mismatch(op, "expected boolean operands")),
        }
    }
}

fn check_bits(kind: ScalarKind) -> Result<(), BuildError> {
    match kind {
        ScalarKind::Integer { bits } if bits == 0 || bits > MAX_INTEGER_BITS => {
            Err(BuildError::InvalidBitWidth(bits))
        }
        _ => Ok(()),
    }
}

fn boolean_like(ty: &ValueType) -> ValueType {
    let visibility = ty
        .as_scalar()
        .map_or(Visibility::Secret, |scalar| scalar.visibility);
    ValueType::boolean(visibility)
}
