//! # Secret tree and sender ratchets
//!
//! Per-epoch message key derivation.

pub(crate) mod secret_tree;
pub(crate) mod sender_ratchet;

#[cfg(test)]
mod tests;
