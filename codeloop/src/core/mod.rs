//! Deterministic, pure logic shared by the repair loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod decision;
pub mod extract;
pub mod instrument;
pub mod policy;
pub mod types;
