//! Pipettor — compiles declarative liquid-handling recipes into robot protocols.
//!
//! Recipes name labware, pipettes and transfer blocks; the compiler broadcasts
//! each block into single transfers, picks pipettes and tips, and tracks tip and
//! well usage in a snapshot that carries over between runs.

pub mod cli;
pub mod core;
pub mod transport;
