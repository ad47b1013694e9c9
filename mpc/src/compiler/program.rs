use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::{circuit::ValueType, dealer::MaterialManifest, fields::MpcField};

/// Virtual register. Every register is written by exactly one instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reg(pub u32);

impl Reg {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Public constant, materialized in whatever field the program runs over.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constant {
    Int(i64),
    PowerOfTwo(u32),
    InvPowerOfTwo(u32),
}

impl Constant {
    pub fn to_field<F: MpcField>(self) -> F {
        match self {
            Self::Int(value) => F::from_i64(value),
            Self::PowerOfTwo(k) => F::power_of_two(k),
            Self::InvPowerOfTwo(k) => F::power_of_two_inverse(k),
        }
    }
}

/// Primitive step of the online phase.
///
/// Registers are either public (same value at every computing party) or secret (shared).
/// Material indices count from the start of the program and let the evaluator verify
/// that it pulls material in the same order as every other party.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    Const { dst: Reg, value: Constant },
    /// Element `element` of secret input `input`, shared by its owner.
    ShareInput { dst: Reg, input: usize, element: usize },
    /// Element `element` of public input `input`, broadcast by its owner.
    PublicInput { dst: Reg, input: usize, element: usize },
    Add { dst: Reg, lhs: Reg, rhs: Reg },
    Sub { dst: Reg, lhs: Reg, rhs: Reg },
    /// Product where at least one operand is public.
    Scale { dst: Reg, lhs: Reg, rhs: Reg },
    ScaleConst { dst: Reg, src: Reg, value: Constant },
    /// Product of two secrets consuming one Beaver triple.
    Mul { dst: Reg, lhs: Reg, rhs: Reg, triple: usize },
    /// `lhs + rhs - 2 * lhs * rhs` for bits, at least one of them public.
    BitXor { dst: Reg, lhs: Reg, rhs: Reg },
    /// `sum(2^i * bits[i])`.
    BitCompose { dst: Reg, bits: Vec<Reg> },
    RandomBit { dst: Reg, bit: usize },
    /// Random unsigned integer built from `bits` random bits starting at `first_bit`.
    RandomUint { dst: Reg, bits: u32, first_bit: usize },
    /// Random nonzero element.
    RandomElement { dst: Reg, element: usize },
    /// Reveal a secret to all computing parties.
    Open { dst: Reg, src: Reg },
    /// Bit `index` of a public value.
    Bit { dst: Reg, src: Reg, index: u32 },
    /// Public value modulo `2^bits`.
    LowBits { dst: Reg, src: Reg, bits: u32 },
    IsZero { dst: Reg, src: Reg },
    /// Signed comparison of two public `bits`-bit integers.
    PublicLess { dst: Reg, lhs: Reg, rhs: Reg, bits: u32 },
    /// Reveal element `element` of output `output` to its party only.
    Output { src: Reg, output: usize, element: usize },
}

/// Communication pattern of an instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundKind {
    Inputs,
    Openings,
    Outputs,
}

impl Instruction {
    pub fn dst(&self) -> Option<Reg> {
        use Instruction::*;
        match *self {
            Const { dst, .. }
            | ShareInput { dst, .. }
            | PublicInput { dst, .. }
            | Add { dst, .. }
            | Sub { dst, .. }
            | Scale { dst, .. }
            | ScaleConst { dst, .. }
            | Mul { dst, .. }
            | BitXor { dst, .. }
            | BitCompose { dst, .. }
            | RandomBit { dst, .. }
            | RandomUint { dst, .. }
            | RandomElement { dst, .. }
            | Open { dst, .. }
            | Bit { dst, .. }
            | LowBits { dst, .. }
            | IsZero { dst, .. }
            | PublicLess { dst, .. } => Some(dst),
            Output { .. } => None,
        }
    }

    /// Registers read by the instruction.
    pub fn sources(&self) -> Vec<Reg> {
        use Instruction::*;
        match self {
            Const { .. }
            | ShareInput { .. }
            | PublicInput { .. }
            | RandomBit { .. }
            | RandomUint { .. }
            | RandomElement { .. } => vec![],
            Add { lhs, rhs, .. }
            | Sub { lhs, rhs, .. }
            | Scale { lhs, rhs, .. }
            | Mul { lhs, rhs, .. }
            | BitXor { lhs, rhs, .. }
            | PublicLess { lhs, rhs, .. } => vec![*lhs, *rhs],
            ScaleConst { src, .. }
            | Open { src, .. }
            | Bit { src, .. }
            | LowBits { src, .. }
            | IsZero { src, .. }
            | Output { src, .. } => vec![*src],
            BitCompose { bits, .. } => bits.clone(),
        }
    }

    /// `None` for instructions computed locally.
    pub fn round_kind(&self) -> Option<RoundKind> {
        match self {
            Self::ShareInput { .. } | Self::PublicInput { .. } => Some(RoundKind::Inputs),
            Self::Mul { .. } | Self::Open { .. } => Some(RoundKind::Openings),
            Self::Output { .. } => Some(RoundKind::Outputs),
            _ => None,
        }
    }
}

/// Contiguous slice of the instruction list executed as a unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Instructions computed without communication.
    Local(Range<usize>),
    /// Independent communication instructions of one kind sharing a single message exchange.
    Round(RoundKind, Range<usize>),
}

/// Input as seen by the evaluator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputBinding {
    pub name: String,
    /// Index into `Program::parties`.
    pub party: usize,
    pub ty: ValueType,
}

/// Output as seen by the evaluator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputBinding {
    pub name: String,
    /// Index into `Program::parties`.
    pub party: usize,
    pub ty: ValueType,
}

/// Compiled program shared by all computing parties.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub parties: Vec<String>,
    pub inputs: Vec<InputBinding>,
    pub outputs: Vec<OutputBinding>,
    pub instructions: Vec<Instruction>,
    pub manifest: MaterialManifest,
    pub num_registers: u32,
    /// Width of the random masks used by comparisons.
    pub mask_bits: u32,
}

impl Program {
    /// Canonical binary encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Split the instruction list into local stretches and communication rounds.
    /// Consecutive communication instructions of one kind share a round unless one reads
    /// a register written earlier in the same round.
    pub fn steps(&self) -> Vec<Step> {
        let mut steps = Vec::new();
        let mut written = vec![false; self.num_registers as usize];
        let mut current: Option<Step> = None;

        for (i, instr) in self.instructions.iter().enumerate() {
            let kind = instr.round_kind();
            let extends = match (&current, kind) {
                (Some(Step::Local(_)), None) => true,
                (Some(Step::Round(current_kind, _)), Some(kind)) => {
                    *current_kind == kind
                        && instr
                            .sources()
                            .iter()
                            .all(|reg| !written.get(reg.index()).copied().unwrap_or(false))
                }
                _ => false,
            };

            if extends {
                if let Some(Step::Local(range) | Step::Round(_, range)) = current.as_mut() {
                    range.end = i + 1;
                }
            } else {
                if let Some(step) = current.take() {
                    if let Step::Round(_, range) = &step {
                        self.clear_written(&mut written, range.clone());
                    }
                    steps.push(step);
                }
                current = Some(match kind {
                    Some(kind) => Step::Round(kind, i..i + 1),
                    None => Step::Local(i..i + 1),
                });
            }

            if kind.is_some() {
                if let Some(slot) = instr.dst().and_then(|dst| written.get_mut(dst.index())) {
                    *slot = true;
                }
            }
        }

        steps.extend(current);
        steps
    }

    /// Number of message exchanges the program needs.
    pub fn num_rounds(&self) -> usize {
        self.steps()
            .iter()
            .filter(|step| matches!(step, Step::Round(..)))
            .count()
    }

    fn clear_written(&self, written: &mut [bool], range: Range<usize>) {
        for instr in &self.instructions[range] {
            if let Some(slot) = instr.dst().and_then(|dst| written.get_mut(dst.index())) {
                *slot = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Instruction::*;

    fn program(instructions: Vec<Instruction>) -> Program {
        Program {
            parties: vec![],
            inputs: vec![],
            outputs: vec![],
            instructions,
            manifest: MaterialManifest::default(),
            num_registers: 16,
            mask_bits: 0,
        }
    }

    #[test]
    fn test_independent_openings_share_round() {
        let p = program(vec![
            ShareInput { dst: Reg(0), input: 0, element: 0 },
            ShareInput { dst: Reg(1), input: 1, element: 0 },
            Mul { dst: Reg(2), lhs: Reg(0), rhs: Reg(1), triple: 0 },
            Open { dst: Reg(3), src: Reg(0) },
            Mul { dst: Reg(4), lhs: Reg(2), rhs: Reg(1), triple: 1 },
            Output { src: Reg(4), output: 0, element: 0 },
        ]);
        assert_eq!(
            p.steps(),
            vec![
                Step::Round(RoundKind::Inputs, 0..2),
                Step::Round(RoundKind::Openings, 2..4),
                Step::Round(RoundKind::Openings, 4..5),
                Step::Round(RoundKind::Outputs, 5..6),
            ]
        );
        assert_eq!(p.num_rounds(), 4);
    }

    #[test]
    fn test_local_instructions_split_rounds() {
        let p = program(vec![
            Const { dst: Reg(0), value: Constant::Int(1) },
            Const { dst: Reg(1), value: Constant::Int(2) },
            RandomBit { dst: Reg(2), bit: 0 },
            Open { dst: Reg(3), src: Reg(2) },
            Add { dst: Reg(4), lhs: Reg(3), rhs: Reg(0) },
            Open { dst: Reg(5), src: Reg(2) },
        ]);
        assert_eq!(
            p.steps(),
            vec![
                Step::Local(0..3),
                Step::Round(RoundKind::Openings, 3..4),
                Step::Local(4..5),
                Step::Round(RoundKind::Openings, 5..6),
            ]
        );
    }

    #[test]
    fn test_bytes_roundtrip() {
        let p = program(vec![Const { dst: Reg(0), value: Constant::InvPowerOfTwo(3) }]);
        assert_eq!(Program::from_bytes(&p.to_bytes().unwrap()).unwrap(), p);
    }
}
