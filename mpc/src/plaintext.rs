//! Reference interpreter working directly on plaintext values.

use std::collections::BTreeMap;

use crate::{
    circuit::{
        wrap_to_bits, Circuit, InputValue, Literal, NodeId, Op, OutputValue, PlainScalar, PlainValue,
        ScalarKind,
    },
    evaluator::RuntimeError,
};

fn malformed(id: usize) -> RuntimeError {
    RuntimeError::InvalidProgram(format!("node {} is malformed", id))
}

/// Evaluate `circuit` on `inputs` and return every output, regardless of its party.
pub fn evaluate(
    circuit: &Circuit,
    inputs: &BTreeMap<String, InputValue>,
) -> Result<BTreeMap<String, OutputValue>, RuntimeError> {
    for name in inputs.keys() {
        if !circuit.inputs.iter().any(|input| &input.name == name) {
            return Err(RuntimeError::UnknownInput(name.clone()));
        }
    }

    let mut values: Vec<Vec<PlainScalar>> = Vec::with_capacity(circuit.nodes.len());
    for (id, node) in circuit.nodes.iter().enumerate() {
        let operand = |op: NodeId| -> Result<&[PlainScalar], RuntimeError> {
            values
                .get(op.index())
                .map(Vec::as_slice)
                .ok_or_else(|| malformed(id))
        };
        let int = |op: NodeId| -> Result<i64, RuntimeError> {
            match operand(op)? {
                [PlainScalar::Integer(value)] => Ok(*value),
                _ => Err(malformed(id)),
            }
        };
        let boolean = |op: NodeId| -> Result<bool, RuntimeError> {
            match operand(op)? {
                [PlainScalar::Boolean(value)] => Ok(*value),
                _ => Err(malformed(id)),
            }
        };
        let wrap = |value: i64| -> Result<Vec<PlainScalar>, RuntimeError> {
            match node.ty.as_scalar().map(|scalar| scalar.kind) {
                Some(ScalarKind::Integer { bits }) => {
                    Ok(vec![PlainScalar::Integer(wrap_to_bits(value, bits))])
                }
                _ => Err(malformed(id)),
            }
        };

        let result = match &node.op {
            Op::Input(index) => {
                let decl = circuit.inputs.get(*index).ok_or_else(|| malformed(id))?;
                let value = inputs
                    .get(&decl.name)
                    .ok_or_else(|| RuntimeError::MissingInput(decl.name.clone()))?;
                value
                    .flatten(&decl.ty)
                    .map_err(|reason| RuntimeError::InvalidInput {
                        name: decl.name.clone(),
                        reason,
                    })?
            }
            Op::Constant(Literal::Integer(value)) => vec![PlainScalar::Integer(*value)],
            Op::Constant(Literal::Boolean(value)) => vec![PlainScalar::Boolean(*value)],
            Op::Add(a, b) => wrap(int(*a)?.wrapping_add(int(*b)?))?,
            Op::Sub(a, b) => wrap(int(*a)?.wrapping_sub(int(*b)?))?,
            Op::Mul(a, b) => wrap(int(*a)?.wrapping_mul(int(*b)?))?,
            Op::Equals(a, b) | Op::PublicEquals(a, b) => {
                let eq = match (operand(*a)?, operand(*b)?) {
                    ([lhs], [rhs]) => lhs == rhs,
                    _ => return Err(malformed(id)),
                };
                vec![PlainScalar::Boolean(eq)]
            }
            Op::LessThan(a, b) => vec![PlainScalar::Boolean(int(*a)? < int(*b)?)],
            Op::And(a, b) => vec![PlainScalar::Boolean(boolean(*a)? && boolean(*b)?)],
            Op::Or(a, b) => vec![PlainScalar::Boolean(boolean(*a)? || boolean(*b)?)],
            Op::Not(a) => vec![PlainScalar::Boolean(!boolean(*a)?)],
            Op::Select {
                cond,
                if_true,
                if_false,
            } => {
                if boolean(*cond)? {
                    operand(*if_true)?.to_vec()
                } else {
                    operand(*if_false)?.to_vec()
                }
            }
            Op::Array(items) | Op::Tuple(items) => {
                let mut leaves = Vec::new();
                for item in items {
                    leaves.extend_from_slice(operand(*item)?);
                }
                leaves
            }
            Op::Index { src, index } => {
                let (elem, offset) = circuit
                    .node(*src)
                    .and_then(|node| node.ty.element(*index))
                    .ok_or_else(|| malformed(id))?;
                operand(*src)?
                    .get(offset..offset + elem.num_leaves())
                    .ok_or_else(|| malformed(id))?
                    .to_vec()
            }
        };
        values.push(result);
    }

    let mut outputs = BTreeMap::new();
    for output in &circuit.outputs {
        let id = output.node.index();
        let (node, leaves) = circuit
            .nodes
            .get(id)
            .zip(values.get(id))
            .ok_or_else(|| RuntimeError::InvalidProgram(format!("output {:?}", output.name)))?;
        let value = PlainValue::unflatten(&node.ty, &mut leaves.iter().copied())
            .ok_or_else(|| malformed(id))?;
        outputs.insert(output.name.clone(), value);
    }
    Ok(outputs)
}
