//! Type model: descriptors, runtime values, conversions and member resolution.

pub(crate) mod builtins;
pub mod conversion;
pub mod resolver;
pub mod ty;
pub mod value;

pub use conversion::{Conversion, ConversionKind};
pub use resolver::{ComparisonMatch, Member, MemberKind, MemberResolver, MemberTable, TypeRegistry};
pub use ty::{
    ClassBuilder, ClassDef, ClassRef, ComparisonDef, ConversionDef, EnumBuilder, EnumDef, EnumRef,
    Equality, FieldDef, MethodDef, NativeComparison, NativeConversion, NativeMethod, OperandType,
    Type,
};
pub use value::{EnumValue, Grouping, ObjectValue, Value};
