//! Member, method, comparison and type-name resolution.
//!
//! The binder only talks to [`MemberResolver`]; [`TypeRegistry`] is the default
//! implementation backed by the crate's own type descriptors.

use crate::expression::EvalResult;
use crate::types::builtins;
use crate::types::conversion::{self, Conversion};
use crate::types::{MethodDef, NativeComparison, Type, Value};
use dashmap::DashMap;
use log::trace;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Native property getter
pub type NativeGetter = Arc<dyn Fn(&Value) -> EvalResult<Value> + Send + Sync>;

#[derive(Clone)]
pub enum MemberKind {
    /// Positional class field
    Field(usize),
    /// Computed instance property
    Property(NativeGetter),
    /// Static constant (enum members)
    Constant(Value),
}

#[derive(Clone)]
pub struct Member {
    pub name: String,
    pub ty: Type,
    pub kind: MemberKind,
}

impl Member {
    pub fn is_static(&self) -> bool {
        matches!(self.kind, MemberKind::Constant(_))
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            MemberKind::Field(index) => format!("field #{}", index),
            MemberKind::Property(_) => "property".to_string(),
            MemberKind::Constant(value) => format!("constant {}", value),
        };
        write!(f, "Member({}: {}, {})", self.name, self.ty, kind)
    }
}

/// All members and methods visible on one type
#[derive(Debug, Default)]
pub struct MemberTable {
    members: Vec<Member>,
    methods: Vec<Arc<MethodDef>>,
}

impl MemberTable {
    fn build(ty: &Type) -> Self {
        let mut table = MemberTable::default();
        match ty {
            Type::Class(class) => {
                table.members = class
                    .fields()
                    .iter()
                    .enumerate()
                    .map(|(index, field)| Member {
                        name: field.name.clone(),
                        ty: field.ty.clone(),
                        kind: MemberKind::Field(index),
                    })
                    .collect();
                table.methods = class.methods().to_vec();
            }
            Type::Enum(def) => {
                table.members = builtins::enum_members(def);
                table.methods = builtins::enum_methods(def);
            }
            Type::String => {
                table.members = builtins::string_members();
                table.methods = builtins::string_methods();
            }
            Type::Nullable(inner) => {
                table.members = builtins::nullable_members(inner);
                table.methods = builtins::nullable_methods(inner);
            }
            Type::Grouping(key, _) => {
                table.members = builtins::grouping_members(key);
            }
            _ => {}
        }
        if !table.methods.iter().any(|m| m.name == "ToString") {
            table.methods.push(builtins::to_string_method());
        }
        table
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Exact-case match first, then case-insensitive
    pub fn find_member(&self, name: &str) -> Option<&Member> {
        self.members
            .iter()
            .find(|m| m.name == name)
            .or_else(|| self.members.iter().find(|m| m.name.eq_ignore_ascii_case(name)))
    }

    /// Overloads of `name`; exact-case overloads win over case-insensitive ones
    pub fn find_methods(&self, name: &str) -> Vec<Arc<MethodDef>> {
        let exact: Vec<_> = self
            .methods
            .iter()
            .filter(|m| m.name == name)
            .cloned()
            .collect();
        if !exact.is_empty() {
            return exact;
        }
        self.methods
            .iter()
            .filter(|m| m.name.eq_ignore_ascii_case(name))
            .cloned()
            .collect()
    }
}

/// Comparison capability found for an operand pair
#[derive(Clone)]
pub struct ComparisonMatch {
    pub compare: NativeComparison,
    /// The declaration lists the operands in the opposite order
    pub reversed: bool,
}

impl fmt::Debug for ComparisonMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComparisonMatch(reversed: {})", self.reversed)
    }
}

/// Query surface over type metadata consulted by the binder
pub trait MemberResolver: Send + Sync {
    /// Member table for `ty`, possibly cached
    fn members(&self, ty: &Type) -> Arc<MemberTable>;

    /// Exposed enum or class visible by bare name, either registered or reachable from `context`
    fn find_type(&self, name: &str, context: &Type) -> Option<Type>;

    fn find_member(&self, ty: &Type, name: &str) -> Option<Member> {
        self.members(ty).find_member(name).cloned()
    }

    fn find_methods(&self, ty: &Type, name: &str) -> Vec<Arc<MethodDef>> {
        self.members(ty).find_methods(name)
    }

    /// Declared comparison between `left` and `right`, looked up on both classes
    fn find_comparison(&self, left: &Type, right: &Type) -> Option<ComparisonMatch> {
        for owner in [left, right] {
            let Some(class) = owner.as_class() else {
                continue;
            };
            for (l, r, def) in class.comparisons() {
                if &l == left && &r == right {
                    return Some(ComparisonMatch {
                        compare: def.compare.clone(),
                        reversed: false,
                    });
                }
                if &l == right && &r == left {
                    return Some(ComparisonMatch {
                        compare: def.compare.clone(),
                        reversed: true,
                    });
                }
            }
        }
        None
    }

    /// Cheapest implicit conversion, user-defined ones included
    fn implicit_conversion(&self, from: &Type, to: &Type) -> Option<Conversion> {
        conversion::implicit_conversion(from, to).or_else(|| {
            to.as_class()
                .and_then(|class| conversion::user_defined_conversion(from, class))
        })
    }
}

/// Default resolver with per-type caches.
///
/// Cloning shares the caches.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    tables: DashMap<Type, Arc<MemberTable>>,
    reachable: DashMap<Type, Arc<HashMap<String, Type>>>,
    named: RwLock<HashMap<String, Type>>,
}

fn is_exposed(ty: &Type) -> bool {
    match ty {
        Type::Enum(def) => def.is_exposed(),
        Type::Class(class) => class.is_exposed(),
        _ => false,
    }
}

fn type_name(ty: &Type) -> Option<&str> {
    match ty {
        Type::Enum(def) => Some(def.name()),
        Type::Class(class) => Some(class.name()),
        _ => None,
    }
}

/// Collect exposed enums and classes reachable through members of `ty`
fn collect_reachable(ty: &Type, found: &mut HashMap<String, Type>, visited: &mut HashSet<Type>) {
    if !visited.insert(ty.clone()) {
        return;
    }
    if is_exposed(ty) {
        if let Some(name) = type_name(ty) {
            found.entry(name.to_string()).or_insert_with(|| ty.clone());
        }
    }
    match ty {
        Type::Class(class) => {
            for field in class.fields() {
                collect_reachable(&field.ty, found, visited);
            }
            for method in class.methods() {
                collect_reachable(&method.ret, found, visited);
            }
        }
        Type::Nullable(inner) | Type::Sequence(inner) => collect_reachable(inner, found, visited),
        Type::Grouping(key, element) => {
            collect_reachable(key, found, visited);
            collect_reachable(element, found, visited);
        }
        _ => {}
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an enum or class findable by name; only exposed types resolve
    pub fn register(&self, ty: Type) -> &Self {
        if let Some(name) = type_name(&ty) {
            self.inner.named.write().insert(name.to_string(), ty);
        }
        self
    }

    /// Number of types with a populated member table
    pub fn cached_types(&self) -> usize {
        self.inner.tables.len()
    }

    fn reachable_from(&self, root: &Type) -> Arc<HashMap<String, Type>> {
        if let Some(found) = self.inner.reachable.get(root) {
            return Arc::clone(found.value());
        }
        let mut found = HashMap::new();
        collect_reachable(root, &mut found, &mut HashSet::new());
        trace!("Reachable exposed types from {}: {}", root, found.len());
        let entry = self
            .inner
            .reachable
            .entry(root.clone())
            .or_insert_with(|| Arc::new(found));
        Arc::clone(entry.value())
    }
}

impl MemberResolver for TypeRegistry {
    fn members(&self, ty: &Type) -> Arc<MemberTable> {
        if let Some(table) = self.inner.tables.get(ty) {
            return Arc::clone(table.value());
        }
        // Built outside the shard lock; a racing thread may build the same table
        let table = Arc::new(MemberTable::build(ty));
        trace!(
            "Populated member table for {} ({} members, {} methods)",
            ty,
            table.members.len(),
            table.methods.len()
        );
        let entry = self.inner.tables.entry(ty.clone()).or_insert(table);
        Arc::clone(entry.value())
    }

    fn find_type(&self, name: &str, context: &Type) -> Option<Type> {
        if let Some(ty) = self.inner.named.read().get(name) {
            if is_exposed(ty) {
                return Some(ty.clone());
            }
        }
        self.reachable_from(context).get(name).cloned()
    }
}
