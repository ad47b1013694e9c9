use serde::{Deserialize, Serialize};

use super::types::ValueType;

/// Position of a node in the circuit arena. Operands always have smaller IDs than their users.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Position of a party in declaration order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartyId(pub(crate) usize);

impl PartyId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Constant embedded into the circuit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Literal {
    Integer(i64),
    Boolean(bool),
}

/// Operation computed by a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Declared input with given index.
    Input(usize),
    Constant(Literal),
    Add(NodeId, NodeId),
    Sub(NodeId, NodeId),
    Mul(NodeId, NodeId),
    /// Equality test whose result stays secret if any operand is secret.
    Equals(NodeId, NodeId),
    /// Equality test whose result is revealed to all computing parties.
    PublicEquals(NodeId, NodeId),
    LessThan(NodeId, NodeId),
    And(NodeId, NodeId),
    Or(NodeId, NodeId),
    Not(NodeId),
    Select {
        cond: NodeId,
        if_true: NodeId,
        if_false: NodeId,
    },
    Array(Vec<NodeId>),
    Tuple(Vec<NodeId>),
    Index {
        src: NodeId,
        index: usize,
    },
}

impl Op {
    /// Nodes this operation reads.
    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            Op::Input(_) | Op::Constant(_) => vec![],
            Op::Add(a, b)
            | Op::Sub(a, b)
            | Op::Mul(a, b)
            | Op::Equals(a, b)
            | Op::PublicEquals(a, b)
            | Op::LessThan(a, b)
            | Op::And(a, b)
            | Op::Or(a, b) => vec![*a, *b],
            Op::Not(a) | Op::Index { src: a, .. } => vec![*a],
            Op::Select {
                cond,
                if_true,
                if_false,
            } => vec![*cond, *if_true, *if_false],
            Op::Array(items) | Op::Tuple(items) => items.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub op: Op,
    pub ty: ValueType,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
}

/// Named input supplied by exactly one party.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDecl {
    pub name: String,
    pub party: PartyId,
    pub ty: ValueType,
    pub node: NodeId,
}

/// Named result revealed to exactly one party.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDecl {
    pub name: String,
    pub party: PartyId,
    pub node: NodeId,
}

/// Finished, immutable program graph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circuit {
    pub parties: Vec<Party>,
    pub inputs: Vec<InputDecl>,
    pub outputs: Vec<OutputDecl>,
    pub nodes: Vec<Node>,
}

impl Circuit {
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn party_name(&self, id: PartyId) -> Option<&str> {
        self.parties.get(id.index()).map(|party| party.name.as_str())
    }

    pub fn party_by_name(&self, name: &str) -> Option<PartyId> {
        self.parties
            .iter()
            .position(|party| party.name == name)
            .map(PartyId)
    }
}
