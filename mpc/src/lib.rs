//! Circuit builder, compiler and secret-shared evaluator for semi-honest multiparty computation.
//!
//! A program is built as a typed DAG with [`circuit::BuildContext`], lowered by
//! [`compiler::compile`] into a deterministic instruction list, and executed by every
//! computing party with [`evaluator::Execution`].

pub mod circuit;
pub mod compiler;
pub mod config;
pub mod dealer;
pub mod evaluator;
pub mod fields;
pub mod plaintext;
pub mod programs;
pub mod sharing;
pub mod transport;

#[cfg(test)]
mod testing;

pub use fields::MpcField;

/// Position of the current computing party among all computing parties.
pub trait MpcContext {
    /// Number of parties participating in MPC computation.
    fn num_parties(&self) -> usize;

    /// ID of current party.
    fn party_id(&self) -> usize;
}
