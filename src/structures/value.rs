//! Reference-counted, type-tagged values.
//!
//! A [`TaggedValue`] is a cheap handle onto shared, immutable data. Cloning
//! (or [`TaggedValue::share`]) bumps the strong count; dropping (or
//! [`TaggedValue::release`]) decrements it. The backing store is freed when the
//! last handle goes away, so containers can hold the same value without ever
//! deep-copying it.

use crate::types::{Error, Result};
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Shared object payload. Compared by identity, never copied.
pub type SharedObject = Arc<dyn Any + Send + Sync>;

/// Discriminant of a [`TaggedValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    None,
    Int,
    Uint,
    Float,
    Bool,
    Str,
    Bytes,
    Object,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::None => "none",
            ValueKind::Int => "int",
            ValueKind::Uint => "uint",
            ValueKind::Float => "float",
            ValueKind::Bool => "bool",
            ValueKind::Str => "string",
            ValueKind::Bytes => "bytes",
            ValueKind::Object => "object",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

enum Datum {
    None,
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Str(Box<str>),
    Bytes(Box<[u8]>),
    Object(SharedObject),
}

impl Datum {
    fn kind(&self) -> ValueKind {
        match self {
            Datum::None => ValueKind::None,
            Datum::Int(_) => ValueKind::Int,
            Datum::Uint(_) => ValueKind::Uint,
            Datum::Float(_) => ValueKind::Float,
            Datum::Bool(_) => ValueKind::Bool,
            Datum::Str(_) => ValueKind::Str,
            Datum::Bytes(_) => ValueKind::Bytes,
            Datum::Object(_) => ValueKind::Object,
        }
    }
}

/// Reference-counted, type-tagged value handle.
#[derive(Clone)]
pub struct TaggedValue(Arc<Datum>);

impl TaggedValue {
    fn from_datum(datum: Datum) -> Self {
        Self(Arc::new(datum))
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    pub fn none() -> Self {
        Self::from_datum(Datum::None)
    }

    pub fn int(value: i64) -> Self {
        Self::from_datum(Datum::Int(value))
    }

    pub fn uint(value: u64) -> Self {
        Self::from_datum(Datum::Uint(value))
    }

    pub fn float(value: f64) -> Self {
        Self::from_datum(Datum::Float(value))
    }

    pub fn bool(value: bool) -> Self {
        Self::from_datum(Datum::Bool(value))
    }

    /// Copies `value` into a buffer owned by the new handle.
    pub fn string(value: &str) -> Self {
        Self::from_datum(Datum::Str(Box::from(value)))
    }

    /// Copies `value` into a buffer owned by the new handle.
    pub fn bytes(value: &[u8]) -> Self {
        Self::from_datum(Datum::Bytes(Box::from(value)))
    }

    /// Wrap an arbitrary object.
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_datum(Datum::Object(Arc::new(value)))
    }

    /// Wrap an already shared object without copying it.
    pub fn shared_object(value: SharedObject) -> Self {
        Self::from_datum(Datum::Object(value))
    }

    // =========================================================================
    // Reference counting
    // =========================================================================

    /// Another handle to the same backing store.
    pub fn share(&self) -> Self {
        self.clone()
    }

    /// Give up this handle. The store is freed if it was the last one.
    pub fn release(self) {
        drop(self);
    }

    /// Number of live handles to the backing store.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Whether both handles point at the same backing store.
    pub fn ptr_eq(&self, other: &TaggedValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn kind(&self) -> ValueKind {
        self.0.kind()
    }

    pub fn is_none(&self) -> bool {
        matches!(*self.0, Datum::None)
    }

    fn mismatch(&self, expected: ValueKind) -> Error {
        Error::TypeMismatch {
            expected: expected.name(),
            found: self.kind().name(),
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        match *self.0 {
            Datum::Int(v) => Ok(v),
            _ => Err(self.mismatch(ValueKind::Int)),
        }
    }

    pub fn as_uint(&self) -> Result<u64> {
        match *self.0 {
            Datum::Uint(v) => Ok(v),
            _ => Err(self.mismatch(ValueKind::Uint)),
        }
    }

    pub fn as_float(&self) -> Result<f64> {
        match *self.0 {
            Datum::Float(v) => Ok(v),
            _ => Err(self.mismatch(ValueKind::Float)),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match *self.0 {
            Datum::Bool(v) => Ok(v),
            _ => Err(self.mismatch(ValueKind::Bool)),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match &*self.0 {
            Datum::Str(v) => Ok(v),
            _ => Err(self.mismatch(ValueKind::Str)),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match &*self.0 {
            Datum::Bytes(v) => Ok(v),
            _ => Err(self.mismatch(ValueKind::Bytes)),
        }
    }

    pub fn as_object(&self) -> Result<&SharedObject> {
        match &*self.0 {
            Datum::Object(v) => Ok(v),
            _ => Err(self.mismatch(ValueKind::Object)),
        }
    }

    /// Typed view of an object payload.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        let object = Arc::clone(self.as_object()?);
        object.downcast::<T>().map_err(|_| Error::TypeMismatch {
            expected: std::any::type_name::<T>(),
            found: "object",
        })
    }

    // =========================================================================
    // Comparison
    // =========================================================================

    /// Order two values of the same kind.
    ///
    /// Numbers compare numerically (floats by IEEE total order), strings and
    /// bytes byte-wise, objects by address. Different kinds never compare.
    pub fn compare(&self, other: &TaggedValue) -> Result<Ordering> {
        match (&*self.0, &*other.0) {
            (Datum::None, Datum::None) => Ok(Ordering::Equal),
            (Datum::Int(a), Datum::Int(b)) => Ok(a.cmp(b)),
            (Datum::Uint(a), Datum::Uint(b)) => Ok(a.cmp(b)),
            (Datum::Float(a), Datum::Float(b)) => Ok(a.total_cmp(b)),
            (Datum::Bool(a), Datum::Bool(b)) => Ok(a.cmp(b)),
            (Datum::Str(a), Datum::Str(b)) => Ok(a.as_bytes().cmp(b.as_bytes())),
            (Datum::Bytes(a), Datum::Bytes(b)) => Ok(a.cmp(b)),
            (Datum::Object(a), Datum::Object(b)) => Ok(object_addr(a).cmp(&object_addr(b))),
            _ => Err(other.mismatch(self.kind())),
        }
    }
}

fn object_addr(object: &SharedObject) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

impl PartialEq for TaggedValue {
    fn eq(&self, other: &Self) -> bool {
        match (&*self.0, &*other.0) {
            // NaN is never equal, even to itself.
            (Datum::Float(a), Datum::Float(b)) => a == b,
            (Datum::Object(a), Datum::Object(b)) => Arc::ptr_eq(a, b),
            _ => matches!(self.compare(other), Ok(Ordering::Equal)),
        }
    }
}

impl fmt::Debug for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            Datum::None => f.write_str("None"),
            Datum::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Datum::Uint(v) => f.debug_tuple("Uint").field(v).finish(),
            Datum::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Datum::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Datum::Str(v) => f.debug_tuple("Str").field(v).finish(),
            Datum::Bytes(v) => f.debug_tuple("Bytes").field(&v.len()).finish(),
            Datum::Object(o) => write!(f, "Object({:#x})", object_addr(o)),
        }
    }
}

impl From<i64> for TaggedValue {
    fn from(value: i64) -> Self {
        Self::int(value)
    }
}

impl From<u64> for TaggedValue {
    fn from(value: u64) -> Self {
        Self::uint(value)
    }
}

impl From<f64> for TaggedValue {
    fn from(value: f64) -> Self {
        Self::float(value)
    }
}

impl From<bool> for TaggedValue {
    fn from(value: bool) -> Self {
        Self::bool(value)
    }
}

impl From<&str> for TaggedValue {
    fn from(value: &str) -> Self {
        Self::string(value)
    }
}

impl From<&[u8]> for TaggedValue {
    fn from(value: &[u8]) -> Self {
        Self::bytes(value)
    }
}
