// Collection helper signatures - argument shapes and result typing

use crate::expression::SequenceMethod;
use crate::types::Type;

/// What a collection helper accepts between its parentheses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Argument {
    None,
    /// Lambda body evaluated per element; may be omitted
    OptionalLambda,
    Lambda,
    /// Plain expression evaluated once in the enclosing scope
    Value,
}

/// Constraint a lambda body must satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LambdaRole {
    Predicate,
    /// Numeric selector (Sum, Average)
    Numeric,
    /// Selector of an ordered type (Min, Max, OrderBy)
    Comparable,
    /// Unconstrained projection (Select)
    Projection,
}

pub fn argument(method: SequenceMethod) -> Argument {
    match method {
        SequenceMethod::Any
        | SequenceMethod::Count
        | SequenceMethod::Sum
        | SequenceMethod::Min
        | SequenceMethod::Max
        | SequenceMethod::Average
        | SequenceMethod::First
        | SequenceMethod::FirstOrDefault
        | SequenceMethod::Last
        | SequenceMethod::LastOrDefault => Argument::OptionalLambda,
        SequenceMethod::All
        | SequenceMethod::Where
        | SequenceMethod::Select
        | SequenceMethod::OrderBy
        | SequenceMethod::OrderByDescending => Argument::Lambda,
        SequenceMethod::Contains | SequenceMethod::Take | SequenceMethod::Skip => Argument::Value,
        SequenceMethod::Distinct => Argument::None,
    }
}

pub fn lambda_role(method: SequenceMethod) -> LambdaRole {
    match method {
        SequenceMethod::Sum | SequenceMethod::Average => LambdaRole::Numeric,
        SequenceMethod::Min
        | SequenceMethod::Max
        | SequenceMethod::OrderBy
        | SequenceMethod::OrderByDescending => LambdaRole::Comparable,
        SequenceMethod::Select => LambdaRole::Projection,
        _ => LambdaRole::Predicate,
    }
}

/// Whether a selector over the element itself is implied when the lambda is omitted
pub fn implies_identity(method: SequenceMethod) -> bool {
    matches!(lambda_role(method), LambdaRole::Numeric | LambdaRole::Comparable)
}

/// Whether a lambda body of type `ty` fits `role`
pub fn accepts(role: LambdaRole, ty: &Type) -> bool {
    match role {
        LambdaRole::Predicate => *ty == Type::Boolean,
        LambdaRole::Numeric => ty.non_nullable().is_numeric(),
        LambdaRole::Comparable => ty.is_comparable(),
        LambdaRole::Projection => true,
    }
}

/// Accumulator type of Sum over `ty`; narrow integers add up as Int32
pub fn sum_type(ty: &Type) -> Type {
    let promoted = match ty.non_nullable() {
        Type::Int8 | Type::Int16 | Type::UInt8 | Type::UInt16 => Type::Int32,
        other => other.clone(),
    };
    if ty.is_nullable() {
        Type::nullable(promoted)
    } else {
        promoted
    }
}

/// Result of Average over `ty`: Double, Single for Single input, nullable when the input is
pub fn average_type(ty: &Type) -> Type {
    let base = match ty.non_nullable() {
        Type::Float32 => Type::Float32,
        _ => Type::Float64,
    };
    if ty.is_nullable() {
        Type::nullable(base)
    } else {
        base
    }
}

/// Static result type of `method` over elements of `element`.
///
/// `selected` is the lambda body type for selector-shaped helpers.
pub fn result_type(method: SequenceMethod, element: &Type, selected: Option<&Type>) -> Type {
    let selected = selected.unwrap_or(element);
    match method {
        SequenceMethod::Any | SequenceMethod::All | SequenceMethod::Contains => Type::Boolean,
        SequenceMethod::Count => Type::Int32,
        SequenceMethod::Sum => sum_type(selected),
        SequenceMethod::Average => average_type(selected),
        SequenceMethod::Min | SequenceMethod::Max => selected.clone(),
        SequenceMethod::First
        | SequenceMethod::FirstOrDefault
        | SequenceMethod::Last
        | SequenceMethod::LastOrDefault => element.clone(),
        SequenceMethod::Select => Type::sequence(selected.clone()),
        SequenceMethod::Where
        | SequenceMethod::OrderBy
        | SequenceMethod::OrderByDescending
        | SequenceMethod::Distinct
        | SequenceMethod::Take
        | SequenceMethod::Skip => Type::sequence(element.clone()),
    }
}
