pub mod binder;
pub mod compile;
pub mod config;
pub mod error;
pub mod expression;
pub mod syntax;
pub mod types;

pub use binder::Parameter;
pub use compile::{sort_by_keys, CompiledLambda, ExpressionCompiler, OrderingKey, Predicate};
pub use error::{CompileError, CompileResult, LexError, ParseError};
pub use expression::{EvalError, EvalResult, Expr};
pub use types::{ClassDef, ClassRef, EnumDef, EnumRef, MemberResolver, Type, TypeRegistry, Value};
