//! Typed program graphs.

mod builder;
mod graph;
mod types;

pub use builder::{BuildContext, BuildError};
pub use graph::{Circuit, InputDecl, Literal, Node, NodeId, Op, OutputDecl, Party, PartyId};
pub use types::*;
