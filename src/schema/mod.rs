//! Tabular source schema
//!
//! This module holds the in-memory form of a source table and the resolver
//! that locates its identifier, time and value columns by alias.

mod resolver;
mod table;

pub use resolver::*;
pub use table::*;
