//! Static types, the host type registry and common-base-type inference.
//!
//! The registry is the ahead-of-time replacement for reflection: the host
//! declares each named type with its base type, constructor signatures and
//! indexer signatures before compiling anything that mentions it.

use std::{fmt, sync::Arc};

use indexmap::IndexMap;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Object,
    Bool,
    Char,
    Byte,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    Decimal,
    String,
    /// The type of `typeof` results.
    Type,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Function(Vec<Type>, Box<Type>),
    /// A host type declared in the [`TypeRegistry`].
    Named(Arc<str>),
}

impl Type {
    pub fn list(element: Type) -> Self {
        Type::List(Box::new(element))
    }

    pub fn map(key: Type, value: Type) -> Self {
        Type::Map(Box::new(key), Box::new(value))
    }

    pub fn function(params: Vec<Type>, result: Type) -> Self {
        Type::Function(params, Box::new(result))
    }

    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Type::Named(name.into())
    }

    /// Value types have no `null` and are compared by value.
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            Type::Bool
                | Type::Char
                | Type::Byte
                | Type::Int
                | Type::UInt
                | Type::Long
                | Type::ULong
                | Type::Float
                | Type::Double
                | Type::Decimal
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int | Type::UInt | Type::Long | Type::ULong)
    }

    /// Types with arithmetic and ordering operators.
    pub fn is_arithmetic(&self) -> bool {
        self.is_integer() || matches!(self, Type::Float | Type::Double | Type::Decimal)
    }

    /// Types that take part in explicit numeric conversions.
    pub fn is_convertible_numeric(&self) -> bool {
        self.is_arithmetic() || matches!(self, Type::Byte | Type::Char)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Object => write!(f, "object"),
            Type::Bool => write!(f, "bool"),
            Type::Char => write!(f, "char"),
            Type::Byte => write!(f, "byte"),
            Type::Int => write!(f, "int"),
            Type::UInt => write!(f, "uint"),
            Type::Long => write!(f, "long"),
            Type::ULong => write!(f, "ulong"),
            Type::Float => write!(f, "float"),
            Type::Double => write!(f, "double"),
            Type::Decimal => write!(f, "decimal"),
            Type::String => write!(f, "string"),
            Type::Type => write!(f, "type"),
            Type::List(element) => write!(f, "list<{element}>"),
            Type::Map(key, value) => write!(f, "map<{key}, {value}>"),
            Type::Function(params, result) => {
                write!(f, "func<")?;
                for param in params {
                    write!(f, "{param}, ")?;
                }
                write!(f, "{result}>")
            }
            Type::Named(name) => write!(f, "{name}"),
        }
    }
}

pub type ConstructorFn = dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync;
pub type IndexerFn = dyn Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync;

#[derive(Clone)]
pub struct Constructor {
    pub params: Vec<Type>,
    func: Arc<ConstructorFn>,
}

impl Constructor {
    pub fn new<F>(params: Vec<Type>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            params,
            func: Arc::new(func),
        }
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, String> {
        (self.func)(args)
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A read-only indexer declared by a host type.
#[derive(Clone)]
pub struct HostIndexer {
    pub params: Vec<Type>,
    pub result: Type,
    get: Arc<IndexerFn>,
}

impl HostIndexer {
    pub fn new<F>(params: Vec<Type>, result: Type, get: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            params,
            result,
            get: Arc::new(get),
        }
    }

    pub fn get(&self, target: &Value, args: &[Value]) -> Result<Value, String> {
        (self.get)(target, args)
    }
}

impl fmt::Debug for HostIndexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostIndexer")
            .field("params", &self.params)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

/// An indexer resolved against a target type.
#[derive(Debug, Clone)]
pub enum Indexer {
    ListElement(Type),
    MapEntry(Type, Type),
    StringChar,
    Host(HostIndexer),
}

impl Indexer {
    pub fn params(&self) -> Vec<Type> {
        match self {
            Indexer::ListElement(_) | Indexer::StringChar => vec![Type::Int],
            Indexer::MapEntry(key, _) => vec![key.clone()],
            Indexer::Host(host) => host.params.clone(),
        }
    }

    pub fn result(&self) -> Type {
        match self {
            Indexer::ListElement(element) => element.clone(),
            Indexer::MapEntry(_, value) => value.clone(),
            Indexer::StringChar => Type::Char,
            Indexer::Host(host) => host.result.clone(),
        }
    }
}

/// Declaration of a host type.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: Arc<str>,
    pub base: Option<Type>,
    pub constructors: Vec<Constructor>,
    pub indexers: Vec<HostIndexer>,
}

impl TypeDef {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            base: None,
            constructors: Vec::new(),
            indexers: Vec::new(),
        }
    }

    pub fn ty(&self) -> Type {
        Type::Named(Arc::clone(&self.name))
    }

    pub fn with_base(mut self, base: Type) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_constructor<F>(mut self, params: Vec<Type>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.constructors.push(Constructor::new(params, func));
        self
    }

    pub fn with_indexer<F>(mut self, params: Vec<Type>, result: Type, get: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.indexers.push(HostIndexer::new(params, result, get));
        self
    }
}

/// Type-name keywords and host type declarations.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    keywords: IndexMap<String, Type>,
    types: IndexMap<Arc<str>, TypeDef>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        let keywords = [
            ("bool", Type::Bool),
            ("char", Type::Char),
            ("int", Type::Int),
            ("long", Type::Long),
            ("byte", Type::Byte),
            ("double", Type::Double),
            ("decimal", Type::Decimal),
            ("string", Type::String),
            ("object", Type::Object),
            ("uint", Type::UInt),
            ("ulong", Type::ULong),
            ("float", Type::Float),
        ]
        .into_iter()
        .map(|(name, ty)| (name.to_string(), ty))
        .collect();
        Self {
            keywords,
            types: IndexMap::new(),
        }
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `name` usable wherever a type name is expected.
    pub fn define_keyword(&mut self, name: impl Into<String>, ty: Type) {
        self.keywords.insert(name.into(), ty);
    }

    /// Declares a host type; its name becomes a type keyword.
    pub fn register(&mut self, def: TypeDef) -> Type {
        let ty = def.ty();
        self.keywords.insert(def.name.to_string(), ty.clone());
        self.types.insert(Arc::clone(&def.name), def);
        ty
    }

    pub fn resolve(&self, name: &str) -> Option<Type> {
        self.keywords.get(name).cloned()
    }

    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// `object` has no base; every other type has one.
    pub fn base_type(&self, ty: &Type) -> Option<Type> {
        match ty {
            Type::Object => None,
            Type::Named(name) => Some(
                self.get(name)
                    .and_then(|def| def.base.clone())
                    .unwrap_or(Type::Object),
            ),
            _ => Some(Type::Object),
        }
    }

    /// Reference and boxing assignability: identity, anything to `object`,
    /// and a host type to any type on its base chain.
    pub fn is_assignable(&self, from: &Type, to: &Type) -> bool {
        if from == to || *to == Type::Object {
            return true;
        }
        let mut current = from.clone();
        for _ in 0..=self.types.len() {
            match self.base_type(&current) {
                Some(base) if base == *to => return true,
                Some(base) => current = base,
                None => return false,
            }
        }
        false
    }

    /// Nearest common ancestor of `types`, folded pairwise from the left.
    /// The result depends on input order when unrelated ancestors exist.
    pub fn common_base_type(&self, types: &[Type]) -> Option<Type> {
        let (first, rest) = types.split_first()?;
        rest.iter().try_fold(first.clone(), |acc, ty| {
            self.common_base_pair(acc, ty.clone())
        })
    }

    fn common_base_pair(&self, x: Type, y: Type) -> Option<Type> {
        if x == y || self.is_assignable(&y, &x) {
            return Some(x);
        }
        if self.is_assignable(&x, &y) {
            return Some(y);
        }
        let base = self.base_type(&x)?;
        self.common_base_pair(y, base)
    }

    /// Every indexer `target` declares, in declaration order.
    pub fn indexers(&self, target: &Type) -> Vec<Indexer> {
        match target {
            Type::List(element) => vec![Indexer::ListElement((**element).clone())],
            Type::Map(key, value) => vec![Indexer::MapEntry((**key).clone(), (**value).clone())],
            Type::String => vec![Indexer::StringChar],
            Type::Named(name) => self
                .get(name)
                .map(|def| def.indexers.iter().cloned().map(Indexer::Host).collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn constructors(&self, ty: &Type) -> &[Constructor] {
        match ty {
            Type::Named(name) => self
                .get(name)
                .map(|def| def.constructors.as_slice())
                .unwrap_or(&[]),
            _ => &[],
        }
    }
}
