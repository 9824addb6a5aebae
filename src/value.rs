use std::{
    any::Any,
    fmt,
    hash::{Hash, Hasher},
    mem,
    sync::Arc,
};

use indexmap::IndexMap;
use rust_decimal::Decimal;

use crate::{
    environment::Binding,
    ir::Ir,
    runtime::{Frame, Interpreter},
    types::Type,
};

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Char(char),
    Byte(u8),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    String(Arc<str>),
    Type(Type),
    List(ListValue),
    Map(MapValue),
    Function(Closure),
    Object(HostObject),
}

#[derive(Clone)]
pub struct ListValue {
    pub element: Type,
    pub items: Arc<Vec<Value>>,
}

#[derive(Clone)]
pub struct MapValue {
    pub key: Type,
    pub value: Type,
    pub entries: Arc<IndexMap<Value, Value>>,
}

/// An instance of a host-registered type.
#[derive(Clone)]
pub struct HostObject {
    type_name: Arc<str>,
    data: Arc<dyn Any + Send + Sync>,
}

impl HostObject {
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<Arc<str>>, data: T) -> Self {
        Self {
            type_name: type_name.into(),
            data: Arc::new(data),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }
}

/// A compiled lambda together with the frame it closed over.
#[derive(Clone)]
pub struct Closure {
    pub(crate) params: Arc<[Arc<Binding>]>,
    pub(crate) body: Arc<Ir>,
    pub(crate) frame: Arc<Frame>,
    pub(crate) interpreter: Interpreter,
    pub(crate) ty: Type,
}

impl Closure {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }
}

impl Value {
    pub fn string(value: impl Into<Arc<str>>) -> Self {
        Value::String(value.into())
    }

    pub fn list(element: Type, items: Vec<Value>) -> Self {
        Value::List(ListValue {
            element,
            items: Arc::new(items),
        })
    }

    pub fn map(key: Type, value: Type, entries: IndexMap<Value, Value>) -> Self {
        Value::Map(MapValue {
            key,
            value,
            entries: Arc::new(entries),
        })
    }

    pub fn object<T: Any + Send + Sync>(type_name: impl Into<Arc<str>>, data: T) -> Self {
        Value::Object(HostObject::new(type_name, data))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The dynamic type of this value; `None` for `null`.
    pub fn runtime_type(&self) -> Option<Type> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => Type::Bool,
            Value::Char(_) => Type::Char,
            Value::Byte(_) => Type::Byte,
            Value::Int(_) => Type::Int,
            Value::UInt(_) => Type::UInt,
            Value::Long(_) => Type::Long,
            Value::ULong(_) => Type::ULong,
            Value::Float(_) => Type::Float,
            Value::Double(_) => Type::Double,
            Value::Decimal(_) => Type::Decimal,
            Value::String(_) => Type::String,
            Value::Type(_) => Type::Type,
            Value::List(list) => Type::list(list.element.clone()),
            Value::Map(map) => Type::map(map.key.clone(), map.value.clone()),
            Value::Function(closure) => closure.ty.clone(),
            Value::Object(object) => Type::Named(Arc::clone(&object.type_name)),
        })
    }

    pub fn type_name(&self) -> String {
        self.runtime_type()
            .map(|ty| ty.to_string())
            .unwrap_or_else(|| "null".into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_closure(&self) -> Option<&Closure> {
        match self {
            Value::Function(closure) => Some(closure),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }
}

/// Identity equality: floats compare by bit pattern and functions and host
/// objects by reference, so values can key a map. The `==` operator applies
/// numeric semantics instead.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::ULong(a), Value::ULong(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::List(a), Value::List(b)) => a.element == b.element && a.items == b.items,
            (Value::Map(a), Value::Map(b)) => {
                a.key == b.key && a.value == b.value && a.entries == b.entries
            }
            (Value::Function(a), Value::Function(b)) => {
                Arc::ptr_eq(&a.body, &b.body) && Arc::ptr_eq(&a.frame, &b.frame)
            }
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(&a.data, &b.data),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Char(c) => c.hash(state),
            Value::Byte(n) => n.hash(state),
            Value::Int(n) => n.hash(state),
            Value::UInt(n) => n.hash(state),
            Value::Long(n) => n.hash(state),
            Value::ULong(n) => n.hash(state),
            Value::Float(n) => n.to_bits().hash(state),
            Value::Double(n) => n.to_bits().hash(state),
            Value::Decimal(n) => n.hash(state),
            Value::String(s) => s.hash(state),
            Value::Type(ty) => ty.hash(state),
            Value::List(list) => list.items.hash(state),
            // map equality ignores entry order
            Value::Map(map) => map.entries.len().hash(state),
            Value::Function(closure) => Arc::as_ptr(&closure.body).hash(state),
            Value::Object(object) => object.type_name.hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Char(c) => write!(f, "'{c}'"),
            Value::List(list) => f.debug_list().entries(list.items.iter()).finish(),
            Value::Map(map) => f.debug_map().entries(map.entries.iter()).finish(),
            other => write!(f, "{other}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Char(c) => write!(f, "{c}"),
            Value::Byte(n) => write!(f, "{n}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::UInt(n) => write!(f, "{n}"),
            Value::Long(n) => write!(f, "{n}"),
            Value::ULong(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Double(n) => write!(f, "{n}"),
            Value::Decimal(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Type(ty) => write!(f, "{ty}"),
            Value::List(list) => {
                write!(f, "[")?;
                for (idx, item) in list.items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (idx, (key, value)) in map.entries.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            Value::Function(closure) => write!(f, "<lambda {}>", closure.ty),
            Value::Object(object) => write!(f, "<{}>", object.type_name),
        }
    }
}

macro_rules! value_from_primitive {
    ($($rust:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$rust> for Value {
                fn from(value: $rust) -> Self {
                    Value::$variant(value)
                }
            }

            impl FromValue for $rust {
                fn accepts(ty: &Type) -> bool {
                    *ty == Type::$variant
                }

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }
        )*
    };
}

/// Extraction of a Rust value from an executed unit.
///
/// `accepts` is checked against the unit's static type before execution,
/// `from_value` against the produced value afterwards.
pub trait FromValue: Sized {
    fn accepts(ty: &Type) -> bool;

    fn from_value(value: Value) -> Option<Self>;
}

value_from_primitive! {
    bool => Bool,
    char => Char,
    u8 => Byte,
    i32 => Int,
    u32 => UInt,
    i64 => Long,
    u64 => ULong,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    Type => Type,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::string(value)
    }
}

impl FromValue for String {
    fn accepts(ty: &Type) -> bool {
        *ty == Type::String
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.to_string()),
            _ => None,
        }
    }
}

impl FromValue for Value {
    fn accepts(_: &Type) -> bool {
        true
    }

    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }
}

impl FromValue for Closure {
    fn accepts(ty: &Type) -> bool {
        matches!(ty, Type::Function(..))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Function(closure) => Some(closure),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn accepts(ty: &Type) -> bool {
        T::accepts(ty)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn accepts(ty: &Type) -> bool {
        matches!(ty, Type::List(element) if T::accepts(element))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::List(list) => list.items.iter().cloned().map(T::from_value).collect(),
            _ => None,
        }
    }
}

impl<K, V> FromValue for IndexMap<K, V>
where
    K: FromValue + Hash + Eq,
    V: FromValue,
{
    fn accepts(ty: &Type) -> bool {
        matches!(ty, Type::Map(key, value) if K::accepts(key) && V::accepts(value))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Map(map) => map
                .entries
                .iter()
                .map(|(key, value)| Some((K::from_value(key.clone())?, V::from_value(value.clone())?)))
                .collect(),
            _ => None,
        }
    }
}
