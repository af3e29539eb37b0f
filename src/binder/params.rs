// Parameter table - values bound to @N placeholders

use crate::error::ParseError;
use crate::expression::{DeferredSource, EvalResult, Expr, ExprKind, PlaceholderValue};
use crate::types::{Type, Value};
use std::fmt;
use std::sync::Arc;

/// Externally supplied value for one placeholder
#[derive(Clone)]
pub enum Parameter {
    /// Known value; binds like a literal, including literal coercions
    Constant { ty: Type, value: Value },
    /// Value produced on every evaluation, e.g. a composed sub-query
    Deferred { ty: Type, source: DeferredSource },
}

impl Parameter {
    /// Constant typed from its value
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        Parameter::Constant {
            ty: value.static_type(),
            value,
        }
    }

    /// Constant with an explicit static type, e.g. an empty sequence of a known element
    pub fn typed(value: impl Into<Value>, ty: Type) -> Self {
        Parameter::Constant {
            ty,
            value: value.into(),
        }
    }

    pub fn deferred<F>(ty: Type, source: F) -> Self
    where
        F: Fn() -> EvalResult<Value> + Send + Sync + 'static,
    {
        Parameter::Deferred {
            ty,
            source: Arc::new(source),
        }
    }

    pub fn ty(&self) -> &Type {
        match self {
            Parameter::Constant { ty, .. } | Parameter::Deferred { ty, .. } => ty,
        }
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameter::Constant { ty, value } => write!(f, "Constant({}: {:?})", ty, value),
            Parameter::Deferred { ty, .. } => write!(f, "Deferred({})", ty),
        }
    }
}

impl From<Value> for Parameter {
    fn from(value: Value) -> Self {
        Parameter::constant(value)
    }
}

/// Ordered parameters of one compile call
#[derive(Debug, Clone, Default)]
pub struct ParameterTable {
    params: Vec<Parameter>,
}

impl ParameterTable {
    pub fn new(params: Vec<Parameter>) -> Self {
        Self { params }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Bind `@index`; out-of-range indices fail at parse time
    pub fn bind(&self, index: usize, offset: usize) -> Result<Expr, ParseError> {
        let param = self
            .params
            .get(index)
            .ok_or(ParseError::PlaceholderOutOfRange {
                index,
                count: self.params.len(),
                offset,
            })?;
        let (ty, value) = match param {
            Parameter::Constant { ty, value } => {
                (ty.clone(), PlaceholderValue::Constant(value.clone()))
            }
            Parameter::Deferred { ty, source } => {
                (ty.clone(), PlaceholderValue::Deferred(source.clone()))
            }
        };
        Ok(Expr::new(ExprKind::Placeholder { index, value }, ty))
    }
}
