//! Coffer Common Types
//!
//! This crate contains types shared across the Coffer ledger, including
//! account identifiers, checked balance arithmetic and the error taxonomy
//! every operation reports through.

pub mod identifiers;
pub mod monetary;
pub mod error;

pub use identifiers::*;
pub use monetary::*;
pub use error::*;
