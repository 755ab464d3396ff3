//! Core compilation logic — recipe types, resolution, resource tracking, emission.

pub mod broadcast;
pub mod codegen;
pub mod compiler;
pub mod error;
pub mod location;
pub mod manager;
pub mod parser;
pub mod resolver;
pub mod state;
pub mod tables;
pub mod types;
