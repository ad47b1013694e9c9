//! Lowering of circuits into deterministic instruction lists.

mod lowering;
mod program;

pub use program::*;

use serde::{Deserialize, Serialize};

use crate::{
    circuit::Circuit,
    dealer::MaterialKind,
    fields::{Mersenne127, MpcField},
};

/// Knobs of the lowering pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Reject programs needing more Beaver triples than this.
    pub max_triples: Option<usize>,
    pub max_random_bits: Option<usize>,
    pub max_random_elements: Option<usize>,
    /// Width of comparison masks. Must not exceed `SAFE_BITS` of the field the program runs over.
    pub mask_bits: u32,
    /// Bits of statistical hiding required from comparison masks.
    pub statistical_security: u32,
}

impl CompileOptions {
    /// Widest masks the field allows.
    pub fn for_field<F: MpcField>() -> Self {
        Self {
            max_triples: None,
            max_random_bits: None,
            max_random_elements: None,
            mask_bits: F::SAFE_BITS,
            statistical_security: 40,
        }
    }

    fn budget(&self, kind: MaterialKind) -> Option<usize> {
        match kind {
            MaterialKind::BeaverTriple => self.max_triples,
            MaterialKind::RandomBit => self.max_random_bits,
            MaterialKind::RandomElement => self.max_random_elements,
        }
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self::for_field::<Mersenne127>()
    }
}

/// Error raised before any execution begins.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("Output {0:?} refers to a node that is not part of the circuit")]
    UnreachableOutput(String),
    #[error("Node {0} is malformed")]
    MalformedNode(usize),
    #[error("Program needs {required} {kind}, budget is {budget}")]
    MaterialBudgetExceeded {
        kind: MaterialKind,
        required: usize,
        budget: usize,
    },
    #[error("Comparison needs {required}-bit masks, only {available} bits available")]
    FieldTooSmall { required: u32, available: u32 },
}

/// Lower `circuit` into a program. Pure: equal inputs give equal programs.
pub fn compile(circuit: &Circuit, options: &CompileOptions) -> Result<Program, CompileError> {
    let program = lowering::Lowering::new(circuit, options).run()?;

    for kind in [
        MaterialKind::BeaverTriple,
        MaterialKind::RandomBit,
        MaterialKind::RandomElement,
    ] {
        let required = program.manifest.get(kind);
        if let Some(budget) = options.budget(kind) {
            if required > budget {
                return Err(CompileError::MaterialBudgetExceeded {
                    kind,
                    required,
                    budget,
                });
            }
        }
    }

    tracing::debug!(
        instructions = program.instructions.len(),
        triples = program.manifest.triples,
        random_bits = program.manifest.random_bits,
        random_elements = program.manifest.random_elements,
        "Compiled program"
    );
    Ok(program)
}
