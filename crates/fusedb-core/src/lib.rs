//! fusedb-core
//!
//! Shared data model, error taxonomy, collaborator traits and configuration for
//! the hybrid retrieval workspace. Backend crates implement the traits in
//! `traits`; `fusedb-hybrid` wires them together.
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
