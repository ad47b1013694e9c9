//! Per-party execution of compiled programs.

mod execution;

pub use execution::Execution;

use serde::{Deserialize, Serialize};

use crate::{
    compiler::Program,
    dealer::{DealerError, MaterialKind},
    sharing::SharingError,
    transport::TransportError,
};

/// Lifecycle of an execution.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionState {
    Idle,
    InputsBound,
    Running,
    Completed,
    Failed,
}

/// Error that aborts an execution. No output is released once one is raised.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("Input {0:?} was not supplied")]
    MissingInput(String),
    #[error("Input {0:?} is not declared by the program")]
    UnknownInput(String),
    #[error("Input {0:?} belongs to a party bound to another node")]
    ForeignInput(String),
    #[error("Invalid value for input {name:?}: {reason}")]
    InvalidInput { name: String, reason: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Malformed message from party {peer}")]
    MalformedMessage { peer: usize },
    #[error("Dealer holds {available} {kind}, program needs {required}")]
    MaterialExhausted {
        kind: MaterialKind,
        required: usize,
        available: usize,
    },
    #[error(transparent)]
    Dealer(#[from] DealerError),
    #[error(transparent)]
    Sharing(#[from] SharingError),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Invalid program: {0}")]
    InvalidProgram(String),
    #[error("Execution is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: ExecutionState,
        actual: ExecutionState,
    },
}

/// Counters collected while running.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Message exchanges with all other parties.
    pub rounds: usize,
    pub triples: usize,
    pub random_bits: usize,
    pub random_elements: usize,
    pub messages_sent: usize,
}

/// Payload exchanged between computing parties.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MpcMessage<T> {
    /// Shares of secret inputs and values of public inputs owned by the sender.
    Inputs(Vec<T>),
    /// Shares of masked values, opened to everybody.
    Openings(Vec<T>),
    /// Shares of outputs addressed to the receiver.
    OutputShares(Vec<T>),
}

/// Which computing party acts for each program party.
/// That node supplies the party's inputs and alone learns its outputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyAssignment {
    nodes: Vec<usize>,
}

impl PartyAssignment {
    /// Bind program parties by name.
    pub fn from_names<'n>(
        program: &Program,
        bindings: impl IntoIterator<Item = (&'n str, usize)>,
    ) -> Result<Self, RuntimeError> {
        let mut nodes = vec![None; program.parties.len()];
        for (name, node) in bindings {
            let index = program
                .parties
                .iter()
                .position(|party| party == name)
                .ok_or_else(|| {
                    RuntimeError::InvalidConfiguration(format!("unknown party {:?}", name))
                })?;
            nodes[index] = Some(node);
        }

        let nodes = nodes
            .into_iter()
            .zip(&program.parties)
            .map(|(node, name)| {
                node.ok_or_else(|| {
                    RuntimeError::InvalidConfiguration(format!("party {:?} is not bound", name))
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { nodes })
    }

    /// Program party `i` is played by node `i % num_nodes`.
    pub fn round_robin(program: &Program, num_nodes: usize) -> Self {
        Self {
            nodes: (0..program.parties.len())
                .map(|i| i % num_nodes.max(1))
                .collect(),
        }
    }

    /// Node playing program party `party`.
    pub fn node(&self, party: usize) -> Option<usize> {
        self.nodes.get(party).copied()
    }

    pub(crate) fn validate(&self, program: &Program, num_nodes: usize) -> Result<(), RuntimeError> {
        if self.nodes.len() != program.parties.len() {
            return Err(RuntimeError::InvalidConfiguration(format!(
                "{} parties bound, program has {}",
                self.nodes.len(),
                program.parties.len()
            )));
        }
        match self.nodes.iter().find(|&&node| node >= num_nodes) {
            Some(node) => Err(RuntimeError::InvalidConfiguration(format!(
                "node {} does not exist",
                node
            ))),
            None => Ok(()),
        }
    }
}
