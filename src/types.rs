//! Core value types for blockflow
//!
//! This module contains the dynamically-typed value model carried by
//! properties and the traits that map Rust types onto it.
//!
//! # Main Types
//!
//! - [`ValueKind`] - Semantic type tag of a property (int, double, text, ...)
//! - [`Value`] - A property value, cheap to clone across threads
//! - [`PropertyData`] - Maps a Rust type to a [`ValueKind`] and back
//! - [`NumericProperty`] - Property types that accept range metadata
//!
//! # Custom Types
//!
//! Values produced by native wrappers (images, matrices, point lists) are
//! carried as [`CustomValue`]s, an `Arc` around the payload tagged with its
//! Rust type. Use [`custom_property_type!`](crate::custom_property_type) to
//! make a type usable as a property:
//!
//! ```ignore
//! #[derive(Clone)]
//! struct Frame { width: u32, height: u32, pixels: Vec<u8> }
//! blockflow::custom_property_type!(Frame);
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Identity of a Rust type used as a custom property value
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Fully qualified Rust type name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.name)
    }
}

/// Semantic type tag of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Boolean flag
    Bool,
    /// 32-bit signed integer
    Int,
    /// 64-bit floating point
    Double,
    /// UTF-8 text
    Text,
    /// Sequence of doubles (plot series, histograms)
    DoubleList,
    /// Opaque user type
    Custom(TypeTag),
}

impl ValueKind {
    /// Whether range metadata can be attached to this kind
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueKind::Int | ValueKind::Double)
    }

    /// Whether values of this kind can be given on the command line
    pub fn is_parseable(&self) -> bool {
        matches!(
            self,
            ValueKind::Bool | ValueKind::Int | ValueKind::Double | ValueKind::Text
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Double => "double",
            ValueKind::Text => "text",
            ValueKind::DoubleList => "double list",
            ValueKind::Custom(tag) => tag.name(),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared, immutable payload of a custom property value
#[derive(Clone)]
pub struct CustomValue {
    tag: TypeTag,
    data: Arc<dyn Any + Send + Sync>,
}

impl CustomValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            tag: TypeTag::of::<T>(),
            data: Arc::new(value),
        }
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Custom({})", self.tag.name())
    }
}

impl PartialEq for CustomValue {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag && Arc::ptr_eq(&self.data, &other.data)
    }
}

/// A property value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Double(f64),
    Text(String),
    DoubleList(Vec<f64>),
    Custom(CustomValue),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Double(_) => ValueKind::Double,
            Value::Text(_) => ValueKind::Text,
            Value::DoubleList(_) => ValueKind::DoubleList,
            Value::Custom(c) => ValueKind::Custom(c.tag()),
        }
    }

    /// Numeric view used for range checks
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Parse a command line string as a value of `kind`
    ///
    /// Booleans accept `true`/`false` in any case. Returns `None` for
    /// malformed input or kinds that cannot be given as text.
    pub fn parse(kind: ValueKind, text: &str) -> Option<Value> {
        match kind {
            ValueKind::Bool => match text.to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            ValueKind::Int => text.trim().parse::<i32>().ok().map(Value::Int),
            ValueKind::Double => text.trim().parse::<f64>().ok().map(Value::Double),
            ValueKind::Text => Some(Value::Text(text.to_string())),
            ValueKind::DoubleList | ValueKind::Custom(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "'{}'", v),
            Value::DoubleList(v) => write!(f, "[{} values]", v.len()),
            Value::Custom(c) => write!(f, "<{}>", c.tag().name()),
        }
    }
}

/// A Rust type usable as a property value
pub trait PropertyData: Sized + Send + 'static {
    fn kind() -> ValueKind;

    fn into_value(self) -> Value;

    /// Extract from a value; `None` when the kind differs
    fn from_value(value: &Value) -> Option<Self>;
}

/// Property types that accept `[min, max]` range metadata
pub trait NumericProperty: PropertyData + Copy + PartialOrd {
    fn to_f64(self) -> f64;

    fn from_f64(value: f64) -> Self;
}

impl PropertyData for bool {
    fn kind() -> ValueKind {
        ValueKind::Bool
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl PropertyData for i32 {
    fn kind() -> ValueKind {
        ValueKind::Int
    }

    fn into_value(self) -> Value {
        Value::Int(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl PropertyData for f64 {
    fn kind() -> ValueKind {
        ValueKind::Double
    }

    fn into_value(self) -> Value {
        Value::Double(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl PropertyData for String {
    fn kind() -> ValueKind {
        ValueKind::Text
    }

    fn into_value(self) -> Value {
        Value::Text(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl PropertyData for Vec<f64> {
    fn kind() -> ValueKind {
        ValueKind::DoubleList
    }

    fn into_value(self) -> Value {
        Value::DoubleList(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::DoubleList(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl NumericProperty for i32 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value as i32
    }
}

impl NumericProperty for f64 {
    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }
}

/// Implement [`PropertyData`] for a `Clone + Send + Sync + 'static` type so it
/// can be carried by properties as a [`Value::Custom`].
#[macro_export]
macro_rules! custom_property_type {
    ($ty:ty) => {
        impl $crate::types::PropertyData for $ty {
            fn kind() -> $crate::types::ValueKind {
                $crate::types::ValueKind::Custom($crate::types::TypeTag::of::<$ty>())
            }

            fn into_value(self) -> $crate::types::Value {
                $crate::types::Value::Custom($crate::types::CustomValue::new(self))
            }

            fn from_value(value: &$crate::types::Value) -> Option<Self> {
                match value {
                    $crate::types::Value::Custom(c) => c.downcast_ref::<$ty>().cloned(),
                    _ => None,
                }
            }
        }
    };
}
