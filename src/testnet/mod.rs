//! Test fixtures shared by the unit tests
//!
//! Fixed addresses, a deterministic genesis, well-formed sample transactions
//! and low-difficulty mining helpers.

pub mod test_utils;

pub use test_utils::*;
