//! Parsing and binding of expression text.
//!
//! This module provides:
//! - The single-pass parser that produces typed trees
//! - Lambda scope frames and context keywords
//! - The `@N` parameter table
//! - Overload ranking and the collection-helper catalog

pub mod overload;
pub mod params;
pub mod parser;
pub mod scope;
pub mod sequence;

pub use params::{Parameter, ParameterTable};
pub use parser::{OrderingClause, Parser};
pub use scope::{Frame, ScopeStack};
