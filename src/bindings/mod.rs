// src/bindings/mod.rs

//! Turning caller bindings into something a child process can read.
//!
//! - [`flatten`] converts structured bindings into a flat environment map.
//! - [`substitute`] performs optional `$NAME` replacement in the script text.

pub mod flatten;
pub mod substitute;

pub use flatten::{flatten, flatten_into};
pub use substitute::substitute_variables;
