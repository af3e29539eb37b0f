//! Bound expression tree definitions.
//!
//! Every node carries its resolved type; the binder never builds an untyped node.

use crate::expression::operator::{BinaryOperator, SequenceMethod, UnaryOperator};
use crate::expression::EvalResult;
use crate::types::{ClassRef, ComparisonMatch, Member, MethodDef, Type, Value};
use std::fmt;
use std::sync::Arc;

/// Producer of a deferred parameter value, re-run on every evaluation
pub type DeferredSource = Arc<dyn Fn() -> EvalResult<Value> + Send + Sync>;

/// Value bound to an `@N` placeholder
#[derive(Clone)]
pub enum PlaceholderValue {
    Constant(Value),
    Deferred(DeferredSource),
}

impl fmt::Debug for PlaceholderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaceholderValue::Constant(value) => write!(f, "Constant({:?})", value),
            PlaceholderValue::Deferred(_) => write!(f, "Deferred"),
        }
    }
}

/// Declared conversion on a class, by index into its conversion table
#[derive(Debug, Clone, PartialEq)]
pub struct UserConversion {
    pub class: ClassRef,
    pub index: usize,
}

/// Typed expression node
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Constant value
    Literal(Value),

    /// Lambda parameter; `depth` counts scope frames from the root
    Parameter { depth: usize },

    /// `@N` parameter reference
    Placeholder {
        index: usize,
        value: PlaceholderValue,
    },

    /// Field or property read
    Member { target: Box<Expr>, member: Member },

    /// Native method call
    Call {
        target: Box<Expr>,
        method: Arc<MethodDef>,
        args: Vec<Expr>,
    },

    /// Collection helper with an optional lambda body or plain argument
    SequenceCall {
        target: Box<Expr>,
        method: SequenceMethod,
        lambda: Option<Box<Expr>>,
        arg: Option<Box<Expr>>,
    },

    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
    },

    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },

    /// Positional indexer on sequences and strings
    Index { target: Box<Expr>, index: Box<Expr> },

    /// Conversion to `Expr::ty`, implicit or explicit
    Convert {
        operand: Box<Expr>,
        user: Option<UserConversion>,
    },

    /// Comparison dispatched to a class-declared ordering
    CustomCompare {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
        comparison: ComparisonMatch,
    },

    /// Anonymous object construction
    New { class: ClassRef, fields: Vec<Expr> },
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Self { kind, ty }
    }

    /// Literal typed from its value
    pub fn literal(value: Value) -> Self {
        let ty = value.static_type();
        Self::new(ExprKind::Literal(value), ty)
    }

    pub fn typed_literal(value: Value, ty: Type) -> Self {
        Self::new(ExprKind::Literal(value), ty)
    }

    pub fn parameter(depth: usize, ty: Type) -> Self {
        Self::new(ExprKind::Parameter { depth }, ty)
    }

    pub fn binary(op: BinaryOperator, left: Expr, right: Expr, ty: Type) -> Self {
        Self::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        )
    }

    pub fn unary(op: UnaryOperator, operand: Expr) -> Self {
        let ty = operand.ty.clone();
        Self::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
        )
    }

    pub fn convert(operand: Expr, ty: Type, user: Option<UserConversion>) -> Self {
        Self::new(
            ExprKind::Convert {
                operand: Box::new(operand),
                user,
            },
            ty,
        )
    }

    /// Value known at bind time: literals and constant placeholders
    pub fn constant_value(&self) -> Option<&Value> {
        match &self.kind {
            ExprKind::Literal(value) => Some(value),
            ExprKind::Placeholder {
                value: PlaceholderValue::Constant(value),
                ..
            } => Some(value),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.constant_value().is_some()
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(&self.kind, ExprKind::Literal(Value::Null))
    }

    /// Replace the value of a constant node, keeping its placeholder identity
    pub fn with_constant(self, value: Value, ty: Type) -> Self {
        match self.kind {
            ExprKind::Placeholder { index, .. } => Self::new(
                ExprKind::Placeholder {
                    index,
                    value: PlaceholderValue::Constant(value),
                },
                ty,
            ),
            _ => Self::typed_literal(value, ty),
        }
    }
}
