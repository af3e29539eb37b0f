//! Bound expression trees and their executable form.
//!
//! This module provides:
//! - The typed expression tree produced by the binder
//! - Operator and collection-helper definitions
//! - Emission of trees into `Send + Sync` closures
//! - Runtime operator semantics and evaluation errors

pub mod emit;
pub mod error;
pub mod expr;
pub mod operator;
pub mod runtime;

pub use emit::{emit, evaluate, Env, Eval};
pub use error::{EvalError, EvalResult};
pub use expr::{DeferredSource, Expr, ExprKind, PlaceholderValue, UserConversion};
pub use operator::{BinaryOperator, SequenceMethod, UnaryOperator};
