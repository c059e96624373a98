//! # Binary tree
//!
//! Index arithmetic for the array representation of a full binary tree. The
//! ratchet tree and the secret tree both address their nodes through the
//! indices defined here.

mod treemath;

pub use treemath::{LeafNodeIndex, ParentNodeIndex, TreeNodeIndex};
pub(crate) use treemath::*;

#[cfg(test)]
mod tests;
