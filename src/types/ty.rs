//! Type descriptors for elements, members and bound expressions.
//!
//! Enum and class definitions are nominal: two `EnumRef`s are the same type only
//! when they point at the same definition.

use crate::expression::EvalResult;
use crate::types::Value;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Native implementation of an instance method: `(this, args) -> result`
pub type NativeMethod = Arc<dyn Fn(&Value, &[Value]) -> EvalResult<Value> + Send + Sync>;

/// Native comparison between two operands; `None` means unordered
pub type NativeComparison =
    Arc<dyn Fn(&Value, &Value) -> EvalResult<Option<Ordering>> + Send + Sync>;

/// Native implicit conversion into a class
pub type NativeConversion = Arc<dyn Fn(&Value) -> EvalResult<Value> + Send + Sync>;

/// Static type of a value or expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Type of the `null` literal
    Null,
    /// Catch-all type every value converts to
    Object,
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    Guid,
    /// Milliseconds since the Unix epoch, UTC
    DateTime,
    Enum(EnumRef),
    Class(ClassRef),
    Nullable(Box<Type>),
    Sequence(Box<Type>),
    /// Key type, element type
    Grouping(Box<Type>, Box<Type>),
}

impl Type {
    pub fn sequence(element: Type) -> Type {
        Type::Sequence(Box::new(element))
    }

    pub fn grouping(key: Type, element: Type) -> Type {
        Type::Grouping(Box::new(key), Box::new(element))
    }

    /// Wrap a value type in `Nullable`; reference types are returned unchanged
    pub fn nullable(inner: Type) -> Type {
        if inner.accepts_null() {
            inner
        } else {
            Type::Nullable(Box::new(inner))
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || matches!(self, Type::Float32 | Type::Float64)
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Type::Int8
                | Type::Int16
                | Type::Int32
                | Type::Int64
                | Type::UInt8
                | Type::UInt16
                | Type::UInt32
                | Type::UInt64
        )
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            Type::Int8 | Type::Int16 | Type::Int32 | Type::Int64 | Type::Float32 | Type::Float64
        )
    }

    /// Size in bits of a numeric type
    pub fn numeric_bits(&self) -> Option<u32> {
        match self {
            Type::Int8 | Type::UInt8 => Some(8),
            Type::Int16 | Type::UInt16 => Some(16),
            Type::Int32 | Type::UInt32 | Type::Float32 => Some(32),
            Type::Int64 | Type::UInt64 | Type::Float64 => Some(64),
            _ => None,
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Nullable(_))
    }

    /// Whether `null` is a legal value of this type
    pub fn accepts_null(&self) -> bool {
        matches!(
            self,
            Type::Null
                | Type::Object
                | Type::String
                | Type::Class(_)
                | Type::Nullable(_)
                | Type::Sequence(_)
                | Type::Grouping(_, _)
        )
    }

    /// The type with one level of `Nullable` removed
    pub fn non_nullable(&self) -> &Type {
        match self {
            Type::Nullable(inner) => inner,
            other => other,
        }
    }

    /// Element type of a sequence-like type
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Sequence(element) | Type::Grouping(_, element) => Some(element),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumRef> {
        match self {
            Type::Enum(def) => Some(def),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassRef> {
        match self {
            Type::Class(def) => Some(def),
            _ => None,
        }
    }

    /// Whether relational operators and ordering apply to this type
    pub fn is_comparable(&self) -> bool {
        match self.non_nullable() {
            Type::Boolean | Type::String | Type::Guid | Type::DateTime | Type::Enum(_) => true,
            other => other.is_numeric(),
        }
    }

    /// Value produced by `default(T)` in the host: zero for value types, null otherwise
    pub fn default_value(&self) -> Value {
        match self {
            Type::Boolean => Value::Boolean(false),
            Type::Int8 => Value::Int8(0),
            Type::Int16 => Value::Int16(0),
            Type::Int32 => Value::Int32(0),
            Type::Int64 => Value::Int64(0),
            Type::UInt8 => Value::UInt8(0),
            Type::UInt16 => Value::UInt16(0),
            Type::UInt32 => Value::UInt32(0),
            Type::UInt64 => Value::UInt64(0),
            Type::Float32 => Value::Float32(0.0),
            Type::Float64 => Value::Float64(0.0),
            Type::Guid => Value::Guid(uuid::Uuid::nil()),
            Type::DateTime => Value::DateTime(0),
            Type::Enum(def) => Value::enumeration(def, 0),
            _ => Value::Null,
        }
    }

    /// Resolve a predefined type name (`Int32`, `int`, `Guid`, ...)
    pub fn from_predefined_name(name: &str) -> Option<Type> {
        let ty = match name {
            "Object" | "object" => Type::Object,
            "Boolean" | "bool" => Type::Boolean,
            "SByte" | "sbyte" => Type::Int8,
            "Int16" | "short" => Type::Int16,
            "Int32" | "int" => Type::Int32,
            "Int64" | "long" => Type::Int64,
            "Byte" | "byte" => Type::UInt8,
            "UInt16" | "ushort" => Type::UInt16,
            "UInt32" | "uint" => Type::UInt32,
            "UInt64" | "ulong" => Type::UInt64,
            "Single" | "float" => Type::Float32,
            "Double" | "double" => Type::Float64,
            "String" | "string" => Type::String,
            "Guid" => Type::Guid,
            "DateTime" => Type::DateTime,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Null => write!(f, "null"),
            Type::Object => write!(f, "Object"),
            Type::Boolean => write!(f, "Boolean"),
            Type::Int8 => write!(f, "SByte"),
            Type::Int16 => write!(f, "Int16"),
            Type::Int32 => write!(f, "Int32"),
            Type::Int64 => write!(f, "Int64"),
            Type::UInt8 => write!(f, "Byte"),
            Type::UInt16 => write!(f, "UInt16"),
            Type::UInt32 => write!(f, "UInt32"),
            Type::UInt64 => write!(f, "UInt64"),
            Type::Float32 => write!(f, "Single"),
            Type::Float64 => write!(f, "Double"),
            Type::String => write!(f, "String"),
            Type::Guid => write!(f, "Guid"),
            Type::DateTime => write!(f, "DateTime"),
            Type::Enum(def) => write!(f, "{}", def.name()),
            Type::Class(def) => write!(f, "{}", def.name()),
            Type::Nullable(inner) => write!(f, "{}?", inner),
            Type::Sequence(element) => write!(f, "IEnumerable<{}>", element),
            Type::Grouping(key, element) => write!(f, "IGrouping<{}, {}>", key, element),
        }
    }
}

macro_rules! nominal_ref {
    ($name:ident, $def:ident) => {
        /// Shared handle to a definition; equality and hashing use definition identity
        #[derive(Clone)]
        pub struct $name(Arc<$def>);

        impl Deref for $name {
            type Target = $def;

            fn deref(&self) -> &$def {
                &self.0
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0)
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                (Arc::as_ptr(&self.0) as usize).hash(state);
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0.name)
            }
        }
    };
}

nominal_ref!(EnumRef, EnumDef);
nominal_ref!(ClassRef, ClassDef);

/// Enumeration with named integral constants
pub struct EnumDef {
    name: String,
    underlying: Type,
    variants: Vec<(String, i64)>,
    exposed: bool,
}

impl EnumDef {
    pub fn builder(name: impl Into<String>) -> EnumBuilder {
        EnumBuilder {
            def: EnumDef {
                name: name.into(),
                underlying: Type::Int32,
                variants: Vec::new(),
                exposed: false,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn underlying(&self) -> &Type {
        &self.underlying
    }

    pub fn variants(&self) -> &[(String, i64)] {
        &self.variants
    }

    /// Whether the type may be referenced by bare name in expressions
    pub fn is_exposed(&self) -> bool {
        self.exposed
    }

    /// Case-sensitive constant lookup
    pub fn variant_value(&self, name: &str) -> Option<i64> {
        self.variants
            .iter()
            .find(|(variant, _)| variant == name)
            .map(|(_, value)| *value)
    }

    pub fn variant_name(&self, value: i64) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| name.as_str())
    }
}

pub struct EnumBuilder {
    def: EnumDef,
}

impl EnumBuilder {
    pub fn underlying(mut self, ty: Type) -> Self {
        debug_assert!(ty.is_integral(), "enum underlying type must be integral");
        self.def.underlying = ty;
        self
    }

    pub fn variant(mut self, name: impl Into<String>, value: i64) -> Self {
        self.def.variants.push((name.into(), value));
        self
    }

    /// Opt-in marker making the enum resolvable by bare name
    pub fn exposed(mut self) -> Self {
        self.def.exposed = true;
        self
    }

    pub fn build(self) -> EnumRef {
        EnumRef(Arc::new(self.def))
    }
}

impl EnumRef {
    pub fn ty(&self) -> Type {
        Type::Enum(self.clone())
    }

    /// Value of the named constant
    ///
    /// # Panics
    /// Panics when the enum has no such constant; intended for building sample data.
    pub fn value(&self, name: &str) -> Value {
        let value = self
            .variant_value(name)
            .unwrap_or_else(|| panic!("enum {} has no constant {}", self.name, name));
        Value::enumeration(self, value)
    }
}

/// Field of a class, addressed by position at runtime
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: Type,
}

/// Instance method callable from expressions
pub struct MethodDef {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
    pub func: NativeMethod,
}

impl MethodDef {
    pub fn new<F>(name: impl Into<String>, params: Vec<Type>, ret: Type, func: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> EvalResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params,
            ret,
            func: Arc::new(func),
        }
    }

    /// Signature used in diagnostics, e.g. `Substring(Int32, Int32)`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodDef({} -> {})", self.signature(), self.ret)
    }
}

/// Operand of a declared comparison; `This` stands for the declaring class
#[derive(Debug, Clone, PartialEq)]
pub enum OperandType {
    This,
    Other(Type),
}

impl OperandType {
    fn resolve(&self, owner: &ClassRef) -> Type {
        match self {
            OperandType::This => Type::Class(owner.clone()),
            OperandType::Other(ty) => ty.clone(),
        }
    }
}

/// Comparison capability declared by a class: all six comparison operators
/// between `left` and `right` derive from one ordering function
pub struct ComparisonDef {
    pub left: OperandType,
    pub right: OperandType,
    pub compare: NativeComparison,
}

/// Implicit conversion from `from` into the declaring class
pub struct ConversionDef {
    pub from: Type,
    pub convert: NativeConversion,
}

/// How two instances of a class are tested for equality when no comparison is declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equality {
    Reference,
    Structural,
}

/// Record type with positional fields
pub struct ClassDef {
    name: String,
    fields: Vec<FieldDef>,
    methods: Vec<Arc<MethodDef>>,
    comparisons: Vec<Arc<ComparisonDef>>,
    conversions: Vec<Arc<ConversionDef>>,
    equality: Equality,
    exposed: bool,
}

static ANONYMOUS_CLASS_ID: AtomicUsize = AtomicUsize::new(0);

impl ClassDef {
    pub fn builder(name: impl Into<String>) -> ClassBuilder {
        ClassBuilder {
            def: ClassDef {
                name: name.into(),
                fields: Vec::new(),
                methods: Vec::new(),
                comparisons: Vec::new(),
                conversions: Vec::new(),
                equality: Equality::Reference,
                exposed: false,
            },
        }
    }

    /// Fresh anonymous record type with structural equality
    pub fn anonymous(fields: Vec<FieldDef>) -> ClassRef {
        let id = ANONYMOUS_CLASS_ID.fetch_add(1, AtomicOrdering::Relaxed);
        let mut builder = ClassDef::builder(format!("AnonymousType{}", id)).structural_equality();
        builder.def.fields = fields;
        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn methods(&self) -> &[Arc<MethodDef>] {
        &self.methods
    }

    pub fn conversions(&self) -> &[Arc<ConversionDef>] {
        &self.conversions
    }

    pub fn equality(&self) -> Equality {
        self.equality
    }

    pub fn is_exposed(&self) -> bool {
        self.exposed
    }
}

impl ClassRef {
    pub fn ty(&self) -> Type {
        Type::Class(self.clone())
    }

    /// Declared comparisons with `This` resolved to this class
    pub fn comparisons(&self) -> impl Iterator<Item = (Type, Type, &Arc<ComparisonDef>)> + '_ {
        self.0
            .comparisons
            .iter()
            .map(move |c| (c.left.resolve(self), c.right.resolve(self), c))
    }
}

pub struct ClassBuilder {
    def: ClassDef,
}

impl ClassBuilder {
    pub fn field(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.def.fields.push(FieldDef {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, params: Vec<Type>, ret: Type, func: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> EvalResult<Value> + Send + Sync + 'static,
    {
        self.def
            .methods
            .push(Arc::new(MethodDef::new(name, params, ret, func)));
        self
    }

    /// Declare ordering between two instances of this class
    pub fn compare_with_self<F>(self, compare: F) -> Self
    where
        F: Fn(&Value, &Value) -> EvalResult<Option<Ordering>> + Send + Sync + 'static,
    {
        self.comparison(OperandType::This, OperandType::This, compare)
    }

    /// Declare ordering between this class (left) and `other` (right)
    pub fn compare_with<F>(self, other: Type, compare: F) -> Self
    where
        F: Fn(&Value, &Value) -> EvalResult<Option<Ordering>> + Send + Sync + 'static,
    {
        self.comparison(OperandType::This, OperandType::Other(other), compare)
    }

    pub fn comparison<F>(mut self, left: OperandType, right: OperandType, compare: F) -> Self
    where
        F: Fn(&Value, &Value) -> EvalResult<Option<Ordering>> + Send + Sync + 'static,
    {
        self.def.comparisons.push(Arc::new(ComparisonDef {
            left,
            right,
            compare: Arc::new(compare),
        }));
        self
    }

    /// Declare an implicit conversion from `from` into this class
    pub fn convert_from<F>(mut self, from: Type, convert: F) -> Self
    where
        F: Fn(&Value) -> EvalResult<Value> + Send + Sync + 'static,
    {
        self.def.conversions.push(Arc::new(ConversionDef {
            from,
            convert: Arc::new(convert),
        }));
        self
    }

    pub fn structural_equality(mut self) -> Self {
        self.def.equality = Equality::Structural;
        self
    }

    /// Opt-in marker making the class resolvable by bare name
    pub fn exposed(mut self) -> Self {
        self.def.exposed = true;
        self
    }

    pub fn build(self) -> ClassRef {
        ClassRef(Arc::new(self.def))
    }
}
