//! Operator definitions for bound expressions.

use std::cmp::Ordering;

/// Binary operators supported in expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Rem,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Short-circuit logical
    AndAlso,
    OrElse,

    // Bitwise, or non-short-circuit logical on booleans
    BitAnd,
    BitOr,
    BitXor,

    // Shifts
    Shl,
    Shr,

    // String concatenation via `+`
    Concat,
}

impl BinaryOperator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Le
                | BinaryOperator::Gt
                | BinaryOperator::Ge
        )
    }

    pub fn is_equality(&self) -> bool {
        matches!(self, BinaryOperator::Eq | BinaryOperator::Ne)
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Sub
                | BinaryOperator::Mul
                | BinaryOperator::Div
                | BinaryOperator::Rem
        )
    }

    pub fn is_bitwise(&self) -> bool {
        matches!(
            self,
            BinaryOperator::BitAnd | BinaryOperator::BitOr | BinaryOperator::BitXor
        )
    }

    pub fn is_shift(&self) -> bool {
        matches!(self, BinaryOperator::Shl | BinaryOperator::Shr)
    }

    /// Whether an ordering satisfies this comparison operator
    pub fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            BinaryOperator::Eq => ordering == Ordering::Equal,
            BinaryOperator::Ne => ordering != Ordering::Equal,
            BinaryOperator::Lt => ordering == Ordering::Less,
            BinaryOperator::Le => ordering != Ordering::Greater,
            BinaryOperator::Gt => ordering == Ordering::Greater,
            BinaryOperator::Ge => ordering != Ordering::Less,
            _ => false,
        }
    }

    /// Get the display string for this operator
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Add | BinaryOperator::Concat => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Rem => "%",
            BinaryOperator::Eq => "=",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::AndAlso => "&&",
            BinaryOperator::OrElse => "||",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
        }
    }
}

/// Unary operators supported in expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    /// Logical not on booleans, bitwise complement on integers
    Not,
    Negate,
}

impl UnaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOperator::Not => "!",
            UnaryOperator::Negate => "-",
        }
    }
}

/// Collection helpers callable on sequence-typed receivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceMethod {
    Any,
    All,
    Count,
    Contains,
    Sum,
    Min,
    Max,
    Average,
    First,
    FirstOrDefault,
    Last,
    LastOrDefault,
    Where,
    Select,
    OrderBy,
    OrderByDescending,
    Distinct,
    Take,
    Skip,
}

impl SequenceMethod {
    const ALL: [SequenceMethod; 19] = [
        SequenceMethod::Any,
        SequenceMethod::All,
        SequenceMethod::Count,
        SequenceMethod::Contains,
        SequenceMethod::Sum,
        SequenceMethod::Min,
        SequenceMethod::Max,
        SequenceMethod::Average,
        SequenceMethod::First,
        SequenceMethod::FirstOrDefault,
        SequenceMethod::Last,
        SequenceMethod::LastOrDefault,
        SequenceMethod::Where,
        SequenceMethod::Select,
        SequenceMethod::OrderBy,
        SequenceMethod::OrderByDescending,
        SequenceMethod::Distinct,
        SequenceMethod::Take,
        SequenceMethod::Skip,
    ];

    /// Case-insensitive lookup by method name
    pub fn from_name(name: &str) -> Option<SequenceMethod> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceMethod::Any => "Any",
            SequenceMethod::All => "All",
            SequenceMethod::Count => "Count",
            SequenceMethod::Contains => "Contains",
            SequenceMethod::Sum => "Sum",
            SequenceMethod::Min => "Min",
            SequenceMethod::Max => "Max",
            SequenceMethod::Average => "Average",
            SequenceMethod::First => "First",
            SequenceMethod::FirstOrDefault => "FirstOrDefault",
            SequenceMethod::Last => "Last",
            SequenceMethod::LastOrDefault => "LastOrDefault",
            SequenceMethod::Where => "Where",
            SequenceMethod::Select => "Select",
            SequenceMethod::OrderBy => "OrderBy",
            SequenceMethod::OrderByDescending => "OrderByDescending",
            SequenceMethod::Distinct => "Distinct",
            SequenceMethod::Take => "Take",
            SequenceMethod::Skip => "Skip",
        }
    }
}
