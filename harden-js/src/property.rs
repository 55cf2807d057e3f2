use crate::value::SymbolId;
use crate::value::Value;
use crate::VmError;
use std::fmt;
use std::rc::Rc;

/// A JavaScript property key (ECMAScript `PropertyKey`): `String | Symbol`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
  String(Rc<str>),
  Symbol(SymbolId),
}

impl PropertyKey {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      PropertyKey::String(s) => Some(s),
      PropertyKey::Symbol(_) => None,
    }
  }

  /// Attempts to parse this key as an ECMAScript array index.
  ///
  /// This matches the `ToString(ToUint32(P)) === P` and `ToUint32(P) != 2^32-1` conditions used by
  /// `OrdinaryOwnPropertyKeys`.
  pub fn array_index(&self) -> Option<u32> {
    match self {
      PropertyKey::String(s) => string_to_array_index(s),
      PropertyKey::Symbol(_) => None,
    }
  }

  pub fn to_value(&self) -> Value {
    match self {
      PropertyKey::String(s) => Value::String(s.clone()),
      PropertyKey::Symbol(s) => Value::Symbol(*s),
    }
  }
}

impl From<&str> for PropertyKey {
  fn from(value: &str) -> Self {
    PropertyKey::String(Rc::from(value))
  }
}

impl From<String> for PropertyKey {
  fn from(value: String) -> Self {
    PropertyKey::String(Rc::from(value))
  }
}

impl From<SymbolId> for PropertyKey {
  fn from(value: SymbolId) -> Self {
    PropertyKey::Symbol(value)
  }
}

impl fmt::Display for PropertyKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PropertyKey::String(s) => f.write_str(s),
      PropertyKey::Symbol(id) => write!(f, "Symbol({})", id.0),
    }
  }
}

pub fn string_to_array_index(s: &str) -> Option<u32> {
  let bytes = s.as_bytes();
  if bytes.is_empty() {
    return None;
  }
  // No leading zeros (except the single "0").
  if bytes.len() > 1 && bytes[0] == b'0' {
    return None;
  }
  let mut value: u64 = 0;
  for &b in bytes {
    if !b.is_ascii_digit() {
      return None;
    }
    value = value.checked_mul(10)?.checked_add((b - b'0') as u64)?;
    if value > u32::MAX as u64 {
      return None;
    }
  }
  // Exclude 2^32-1.
  if value == u32::MAX as u64 {
    return None;
  }
  Some(value as u32)
}

/// A concrete property descriptor.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
  pub enumerable: bool,
  pub configurable: bool,
  pub kind: PropertyKind,
}

/// The kind of property described by a [`PropertyDescriptor`].
#[derive(Debug, Clone)]
pub enum PropertyKind {
  Data { value: Value, writable: bool },
  Accessor { get: Value, set: Value },
}

impl PropertyDescriptor {
  pub fn data(value: impl Into<Value>, writable: bool, enumerable: bool, configurable: bool) -> Self {
    PropertyDescriptor {
      enumerable,
      configurable,
      kind: PropertyKind::Data {
        value: value.into(),
        writable,
      },
    }
  }

  /// Writable, enumerable, configurable: what assignment creates.
  pub fn plain(value: impl Into<Value>) -> Self {
    PropertyDescriptor::data(value, true, true, true)
  }

  /// Writable, non-enumerable, configurable: how builtin methods are installed.
  pub fn hidden(value: impl Into<Value>) -> Self {
    PropertyDescriptor::data(value, true, false, true)
  }

  /// Non-writable, non-enumerable, non-configurable.
  pub fn constant(value: impl Into<Value>) -> Self {
    PropertyDescriptor::data(value, false, false, false)
  }

  pub fn accessor(get: Value, set: Value, enumerable: bool, configurable: bool) -> Self {
    PropertyDescriptor {
      enumerable,
      configurable,
      kind: PropertyKind::Accessor { get, set },
    }
  }

  pub fn is_data(&self) -> bool {
    matches!(self.kind, PropertyKind::Data { .. })
  }

  pub fn is_accessor(&self) -> bool {
    matches!(self.kind, PropertyKind::Accessor { .. })
  }

  pub fn value(&self) -> Option<&Value> {
    match &self.kind {
      PropertyKind::Data { value, .. } => Some(value),
      PropertyKind::Accessor { .. } => None,
    }
  }

  /// Whether every field matches, comparing values with `SameValue`.
  pub fn same_as(&self, other: &PropertyDescriptor) -> bool {
    if self.enumerable != other.enumerable || self.configurable != other.configurable {
      return false;
    }
    match (&self.kind, &other.kind) {
      (
        PropertyKind::Data { value: a, writable: wa },
        PropertyKind::Data { value: b, writable: wb },
      ) => wa == wb && a.same_value(b),
      (
        PropertyKind::Accessor { get: ga, set: sa },
        PropertyKind::Accessor { get: gb, set: sb },
      ) => ga.same_value(gb) && sa.same_value(sb),
      _ => false,
    }
  }

  pub fn to_patch(&self) -> PropertyDescriptorPatch {
    let mut patch = PropertyDescriptorPatch {
      enumerable: Some(self.enumerable),
      configurable: Some(self.configurable),
      ..Default::default()
    };
    match &self.kind {
      PropertyKind::Data { value, writable } => {
        patch.value = Some(value.clone());
        patch.writable = Some(*writable);
      }
      PropertyKind::Accessor { get, set } => {
        patch.get = Some(get.clone());
        patch.set = Some(set.clone());
      }
    }
    patch
  }
}

/// A "partial" property descriptor patch used by `DefineProperty`-style operations.
#[derive(Debug, Default, Clone)]
pub struct PropertyDescriptorPatch {
  pub enumerable: Option<bool>,
  pub configurable: Option<bool>,
  pub value: Option<Value>,
  pub writable: Option<bool>,
  pub get: Option<Value>,
  pub set: Option<Value>,
}

impl PropertyDescriptorPatch {
  /// Validates that this patch does not mix data and accessor descriptor fields.
  pub fn validate(&self) -> Result<(), VmError> {
    if self.is_data_descriptor() && self.is_accessor_descriptor() {
      return Err(VmError::type_error(
        "Invalid property descriptor. Cannot both specify accessors and a value or writable attribute",
      ));
    }
    Ok(())
  }

  pub fn is_data_descriptor(&self) -> bool {
    self.value.is_some() || self.writable.is_some()
  }

  pub fn is_accessor_descriptor(&self) -> bool {
    self.get.is_some() || self.set.is_some()
  }

  pub fn is_generic_descriptor(&self) -> bool {
    !self.is_data_descriptor() && !self.is_accessor_descriptor()
  }

  /// Fills absent fields with their defaults, as `ValidateAndApplyPropertyDescriptor` does when
  /// creating a new property.
  pub fn complete(self) -> PropertyDescriptor {
    let enumerable = self.enumerable.unwrap_or(false);
    let configurable = self.configurable.unwrap_or(false);
    if self.is_accessor_descriptor() {
      PropertyDescriptor::accessor(
        self.get.unwrap_or(Value::Undefined),
        self.set.unwrap_or(Value::Undefined),
        enumerable,
        configurable,
      )
    } else {
      PropertyDescriptor::data(
        self.value.unwrap_or(Value::Undefined),
        self.writable.unwrap_or(false),
        enumerable,
        configurable,
      )
    }
  }
}
