use crate::js::ast::Func;
use crate::js::env::EnvId;
use crate::property::PropertyDescriptor;
use crate::property::PropertyDescriptorPatch;
use crate::property::PropertyKey;
use crate::property::PropertyKind;
use crate::realm::NativeFn;
use crate::source::SourceText;
use crate::source::StackFrame;
use crate::value::ObjectId;
use crate::value::SymbolId;
use crate::value::Value;
use crate::VmError;
use ahash::HashSet;
use ahash::HashSetExt;
use std::rc::Rc;

/// Index of a compartment record owned by a [`Realm`](crate::Realm).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CompartmentId(pub(crate) u32);

impl CompartmentId {
  /// The compartment whose global object is the realm's host global.
  pub const START: CompartmentId = CompartmentId(0);
}

/// Index of a finalized intrinsic registry owned by a [`Realm`](crate::Realm).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegistryId(pub(crate) u32);

/// Extra state carried by a native function besides its captured value slots.
#[derive(Clone, Debug)]
pub enum NativeData {
  None,
  Compartment(CompartmentId),
  Registry(RegistryId),
}

#[derive(Clone)]
pub struct NativeFunction {
  pub call: NativeFn,
  pub constructable: bool,
  pub slots: Vec<Value>,
  pub data: NativeData,
}

#[derive(Clone)]
pub struct Closure {
  pub func: Rc<Func>,
  pub env: EnvId,
  pub source: Rc<SourceText>,
}

#[derive(Clone)]
pub enum FunctionKind {
  Native(NativeFunction),
  Closure(Closure),
  Bound {
    target: ObjectId,
    this: Value,
    args: Vec<Value>,
  },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArrayIterationKind {
  Keys,
  Values,
  Entries,
}

#[derive(Clone, Debug)]
pub enum PromiseState {
  Pending,
  Fulfilled(Value),
  Rejected(Value),
}

/// Internal slots that distinguish exotic and builtin objects from ordinary ones.
#[derive(Clone)]
pub enum ObjectKind {
  Ordinary,
  Array,
  Function(FunctionKind),
  Error { frames: Vec<StackFrame> },
  Date(f64),
  RegExp { source: Rc<str>, flags: Rc<str> },
  Boolean(bool),
  Number(f64),
  String(Rc<str>),
  Symbol(SymbolId),
  ArrayIterator {
    target: ObjectId,
    next_index: u32,
    kind: ArrayIterationKind,
    done: bool,
  },
  Promise(PromiseState),
  Compartment(CompartmentId),
}

#[derive(Clone)]
pub struct JsObject {
  pub(crate) prototype: Option<ObjectId>,
  pub(crate) extensible: bool,
  pub(crate) properties: Vec<(PropertyKey, PropertyDescriptor)>,
  pub(crate) kind: ObjectKind,
}

impl JsObject {
  pub fn new(prototype: Option<ObjectId>, kind: ObjectKind) -> Self {
    JsObject {
      prototype,
      extensible: true,
      properties: Vec::new(),
      kind,
    }
  }

  pub fn kind(&self) -> &ObjectKind {
    &self.kind
  }

  pub fn is_callable(&self) -> bool {
    matches!(self.kind, ObjectKind::Function(_))
  }

  fn find(&self, key: &PropertyKey) -> Option<usize> {
    self.properties.iter().position(|(k, _)| k == key)
  }
}

/// The object arena of one realm.
pub struct Heap {
  objects: Vec<JsObject>,
  symbols: Vec<Option<Rc<str>>>,
}

impl Default for Heap {
  fn default() -> Self {
    Self::new()
  }
}

impl Heap {
  pub fn new() -> Self {
    Heap {
      objects: Vec::new(),
      symbols: Vec::new(),
    }
  }

  pub fn alloc(&mut self, object: JsObject) -> ObjectId {
    let id = ObjectId(self.objects.len() as u32);
    self.objects.push(object);
    id
  }

  pub fn alloc_ordinary(&mut self, prototype: Option<ObjectId>) -> ObjectId {
    self.alloc(JsObject::new(prototype, ObjectKind::Ordinary))
  }

  pub fn new_symbol(&mut self, description: Option<&str>) -> SymbolId {
    let id = SymbolId(self.symbols.len() as u32);
    self.symbols.push(description.map(Rc::from));
    id
  }

  pub fn symbol_description(&self, id: SymbolId) -> Option<Rc<str>> {
    self.symbols.get(id.0 as usize).cloned().flatten()
  }

  pub fn len(&self) -> usize {
    self.objects.len()
  }

  pub fn is_empty(&self) -> bool {
    self.objects.is_empty()
  }

  pub fn get(&self, id: ObjectId) -> Result<&JsObject, VmError> {
    self.objects.get(id.index()).ok_or(VmError::InvalidHandle)
  }

  pub fn get_mut(&mut self, id: ObjectId) -> Result<&mut JsObject, VmError> {
    self.objects.get_mut(id.index()).ok_or(VmError::InvalidHandle)
  }

  pub fn kind(&self, id: ObjectId) -> Result<&ObjectKind, VmError> {
    Ok(&self.get(id)?.kind)
  }

  pub fn is_callable(&self, value: &Value) -> bool {
    match value {
      Value::Object(id) => self.get(*id).map(|o| o.is_callable()).unwrap_or(false),
      _ => false,
    }
  }

  pub fn is_array(&self, id: ObjectId) -> bool {
    matches!(self.kind(id), Ok(ObjectKind::Array))
  }

  pub fn object_prototype(&self, id: ObjectId) -> Result<Option<ObjectId>, VmError> {
    Ok(self.get(id)?.prototype)
  }

  /// `OrdinarySetPrototypeOf`.
  ///
  /// Returns `Ok(false)` when the object is non-extensible and the prototype differs, and a
  /// `TypeError` when the change would create a cycle.
  pub fn object_set_prototype(
    &mut self,
    id: ObjectId,
    prototype: Option<ObjectId>,
  ) -> Result<bool, VmError> {
    let current = self.get(id)?;
    if current.prototype == prototype {
      return Ok(true);
    }
    if !current.extensible {
      return Ok(false);
    }
    let mut visited = HashSet::new();
    let mut p = prototype;
    while let Some(cur) = p {
      if cur == id {
        return Err(VmError::type_error("Cyclic __proto__ value"));
      }
      if !visited.insert(cur) {
        break;
      }
      p = self.get(cur)?.prototype;
    }
    self.get_mut(id)?.prototype = prototype;
    Ok(true)
  }

  pub fn object_is_extensible(&self, id: ObjectId) -> Result<bool, VmError> {
    Ok(self.get(id)?.extensible)
  }

  pub fn object_prevent_extensions(&mut self, id: ObjectId) -> Result<bool, VmError> {
    self.get_mut(id)?.extensible = false;
    Ok(true)
  }

  pub fn get_own_property(
    &self,
    id: ObjectId,
    key: &PropertyKey,
  ) -> Result<Option<PropertyDescriptor>, VmError> {
    let obj = self.get(id)?;
    if let (ObjectKind::String(s), Some(idx)) = (&obj.kind, key.array_index()) {
      if let Some(unit) = s.encode_utf16().nth(idx as usize) {
        let ch = String::from_utf16_lossy(&[unit]);
        return Ok(Some(PropertyDescriptor::data(ch, false, true, false)));
      }
    }
    Ok(obj.find(key).map(|i| obj.properties[i].1.clone()))
  }

  pub fn has_own_property(&self, id: ObjectId, key: &PropertyKey) -> Result<bool, VmError> {
    Ok(self.get_own_property(id, key)?.is_some())
  }

  /// Walks the prototype chain for `key`, returning the first descriptor found.
  pub fn get_property(
    &self,
    id: ObjectId,
    key: &PropertyKey,
  ) -> Result<Option<PropertyDescriptor>, VmError> {
    let mut visited = HashSet::new();
    let mut cur = Some(id);
    while let Some(obj) = cur {
      if !visited.insert(obj) {
        break;
      }
      if let Some(desc) = self.get_own_property(obj, key)? {
        return Ok(Some(desc));
      }
      cur = self.get(obj)?.prototype;
    }
    Ok(None)
  }

  pub fn has_property(&self, id: ObjectId, key: &PropertyKey) -> Result<bool, VmError> {
    Ok(self.get_property(id, key)?.is_some())
  }

  /// Reads an own data property without invoking accessors.
  pub fn get_own_data_value(&self, id: ObjectId, key: &PropertyKey) -> Result<Option<Value>, VmError> {
    Ok(
      self
        .get_own_property(id, key)?
        .and_then(|desc| desc.value().cloned()),
    )
  }

  /// `OrdinaryDefineOwnProperty`, including the array `length` and index exotics.
  pub fn define_own_property(
    &mut self,
    id: ObjectId,
    key: PropertyKey,
    patch: PropertyDescriptorPatch,
  ) -> Result<bool, VmError> {
    patch.validate()?;
    if self.is_array(id) {
      if key.as_str() == Some("length") {
        return self.define_array_length(id, patch);
      }
      if let Some(index) = key.array_index() {
        let length = self.array_length(id)?;
        if index >= length {
          let length_writable = matches!(
            self.get_own_property(id, &PropertyKey::from("length"))?,
            Some(PropertyDescriptor {
              kind: PropertyKind::Data { writable: true, .. },
              ..
            })
          );
          if !length_writable {
            return Ok(false);
          }
          if !self.ordinary_define_own_property(id, key, patch)? {
            return Ok(false);
          }
          self.set_array_length_unchecked(id, index + 1)?;
          return Ok(true);
        }
      }
    }
    if let ObjectKind::String(s) = &self.get(id)?.kind {
      if key
        .array_index()
        .is_some_and(|idx| (idx as usize) < s.encode_utf16().count())
      {
        return Ok(patch.value.is_none() && patch.writable != Some(true));
      }
    }
    self.ordinary_define_own_property(id, key, patch)
  }

  fn ordinary_define_own_property(
    &mut self,
    id: ObjectId,
    key: PropertyKey,
    patch: PropertyDescriptorPatch,
  ) -> Result<bool, VmError> {
    let obj = self.get_mut(id)?;
    let idx = obj.find(&key);
    let current = idx.map(|i| &obj.properties[i].1);
    let Some(next) = validate_and_apply_property_descriptor(current, obj.extensible, patch) else {
      return Ok(false);
    };
    match idx {
      Some(i) => obj.properties[i].1 = next,
      None => obj.properties.push((key, next)),
    }
    Ok(true)
  }

  pub fn define_own_property_or_throw(
    &mut self,
    id: ObjectId,
    key: PropertyKey,
    patch: PropertyDescriptorPatch,
  ) -> Result<(), VmError> {
    let name = key.to_string();
    if self.define_own_property(id, key, patch)? {
      Ok(())
    } else {
      Err(VmError::type_error(format!("Cannot redefine property: {name}")))
    }
  }

  /// Defines (or redefines) a property from a complete descriptor.
  pub fn define_property(
    &mut self,
    id: ObjectId,
    key: impl Into<PropertyKey>,
    desc: PropertyDescriptor,
  ) -> Result<(), VmError> {
    self.define_own_property_or_throw(id, key.into(), desc.to_patch())
  }

  pub fn create_data_property(
    &mut self,
    id: ObjectId,
    key: impl Into<PropertyKey>,
    value: Value,
  ) -> Result<bool, VmError> {
    self.define_own_property(id, key.into(), PropertyDescriptor::plain(value).to_patch())
  }

  pub fn create_data_property_or_throw(
    &mut self,
    id: ObjectId,
    key: impl Into<PropertyKey>,
    value: Value,
  ) -> Result<(), VmError> {
    self.define_own_property_or_throw(id, key.into(), PropertyDescriptor::plain(value).to_patch())
  }

  pub fn delete_own_property(&mut self, id: ObjectId, key: &PropertyKey) -> Result<bool, VmError> {
    let obj = self.get_mut(id)?;
    if let ObjectKind::String(s) = &obj.kind {
      if key
        .array_index()
        .is_some_and(|idx| (idx as usize) < s.encode_utf16().count())
      {
        return Ok(false);
      }
    }
    match obj.find(key) {
      None => Ok(true),
      Some(i) => {
        if !obj.properties[i].1.configurable {
          return Ok(false);
        }
        obj.properties.remove(i);
        Ok(true)
      }
    }
  }

  /// `OrdinaryOwnPropertyKeys`: array indices ascending, then strings in creation order, then
  /// symbols in creation order.
  pub fn own_property_keys(&self, id: ObjectId) -> Result<Vec<PropertyKey>, VmError> {
    let obj = self.get(id)?;
    let mut indices = Vec::new();
    let mut strings = Vec::new();
    let mut symbols = Vec::new();
    if let ObjectKind::String(s) = &obj.kind {
      for i in 0..s.encode_utf16().count() {
        indices.push((i as u32, PropertyKey::from(i.to_string())));
      }
    }
    for (key, _) in &obj.properties {
      match key {
        PropertyKey::Symbol(_) => symbols.push(key.clone()),
        PropertyKey::String(_) => match key.array_index() {
          Some(i) => indices.push((i, key.clone())),
          None => strings.push(key.clone()),
        },
      }
    }
    indices.sort_by_key(|(i, _)| *i);
    Ok(
      indices
        .into_iter()
        .map(|(_, k)| k)
        .chain(strings)
        .chain(symbols)
        .collect(),
    )
  }

  /// `SetIntegrityLevel(O, frozen)`.
  pub fn freeze(&mut self, id: ObjectId) -> Result<bool, VmError> {
    let obj = self.get_mut(id)?;
    obj.extensible = false;
    for (_, desc) in obj.properties.iter_mut() {
      desc.configurable = false;
      if let PropertyKind::Data { writable, .. } = &mut desc.kind {
        *writable = false;
      }
    }
    Ok(true)
  }

  /// `SetIntegrityLevel(O, sealed)`.
  pub fn seal(&mut self, id: ObjectId) -> Result<bool, VmError> {
    let obj = self.get_mut(id)?;
    obj.extensible = false;
    for (_, desc) in obj.properties.iter_mut() {
      desc.configurable = false;
    }
    Ok(true)
  }

  /// `TestIntegrityLevel(O, frozen)`.
  pub fn is_frozen(&self, id: ObjectId) -> Result<bool, VmError> {
    let obj = self.get(id)?;
    if obj.extensible {
      return Ok(false);
    }
    Ok(obj.properties.iter().all(|(_, desc)| {
      !desc.configurable
        && !matches!(desc.kind, PropertyKind::Data { writable: true, .. })
    }))
  }

  pub fn is_sealed(&self, id: ObjectId) -> Result<bool, VmError> {
    let obj = self.get(id)?;
    Ok(!obj.extensible && obj.properties.iter().all(|(_, desc)| !desc.configurable))
  }

  pub fn array_length(&self, id: ObjectId) -> Result<u32, VmError> {
    match self.get_own_data_value(id, &PropertyKey::from("length"))? {
      Some(Value::Number(n)) => Ok(n as u32),
      _ => Ok(0),
    }
  }

  fn set_array_length_unchecked(&mut self, id: ObjectId, length: u32) -> Result<(), VmError> {
    let obj = self.get_mut(id)?;
    let key = PropertyKey::from("length");
    if let Some(i) = obj.find(&key) {
      if let PropertyKind::Data { value, .. } = &mut obj.properties[i].1.kind {
        *value = Value::Number(length as f64);
      }
    }
    Ok(())
  }

  /// `ArraySetLength`.
  fn define_array_length(
    &mut self,
    id: ObjectId,
    mut patch: PropertyDescriptorPatch,
  ) -> Result<bool, VmError> {
    let key = PropertyKey::from("length");
    let Some(value) = patch.value.take() else {
      return self.ordinary_define_own_property(id, key, patch);
    };
    let new_len = match value {
      Value::Number(n) if n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 => n as u32,
      _ => return Err(VmError::RangeError("Invalid array length".to_string())),
    };
    let old_len = self.array_length(id)?;
    patch.value = Some(Value::Number(new_len as f64));
    if new_len >= old_len {
      return self.ordinary_define_own_property(id, key, patch);
    }
    let writable = matches!(
      self.get_own_property(id, &key)?,
      Some(PropertyDescriptor {
        kind: PropertyKind::Data { writable: true, .. },
        ..
      })
    );
    if !writable {
      return Ok(false);
    }
    let new_writable = patch.writable.unwrap_or(true);
    patch.writable = Some(true);
    if !self.ordinary_define_own_property(id, key.clone(), patch)? {
      return Ok(false);
    }
    let mut doomed: Vec<u32> = self
      .get(id)?
      .properties
      .iter()
      .filter_map(|(k, _)| k.array_index())
      .filter(|i| *i >= new_len)
      .collect();
    doomed.sort_unstable_by(|a, b| b.cmp(a));
    for index in doomed {
      if !self.delete_own_property(id, &PropertyKey::from(index.to_string()))? {
        self.set_array_length_unchecked(id, index + 1)?;
        if !new_writable {
          self.ordinary_define_own_property(id, key, PropertyDescriptorPatch {
            writable: Some(false),
            ..Default::default()
          })?;
        }
        return Ok(false);
      }
    }
    if !new_writable {
      self.ordinary_define_own_property(id, key, PropertyDescriptorPatch {
        writable: Some(false),
        ..Default::default()
      })?;
    }
    Ok(true)
  }
}

/// `ValidateAndApplyPropertyDescriptor`: returns the resulting descriptor, or `None` when the
/// change is rejected.
pub fn validate_and_apply_property_descriptor(
  current: Option<&PropertyDescriptor>,
  extensible: bool,
  patch: PropertyDescriptorPatch,
) -> Option<PropertyDescriptor> {
  let Some(current) = current else {
    if !extensible {
      return None;
    }
    return Some(patch.complete());
  };

  if !current.configurable {
    if patch.configurable == Some(true) {
      return None;
    }
    if patch.enumerable.is_some_and(|e| e != current.enumerable) {
      return None;
    }
    if !patch.is_generic_descriptor() && patch.is_accessor_descriptor() != current.is_accessor() {
      return None;
    }
    match &current.kind {
      PropertyKind::Accessor { get, set } => {
        if patch.get.as_ref().is_some_and(|g| !g.same_value(get)) {
          return None;
        }
        if patch.set.as_ref().is_some_and(|s| !s.same_value(set)) {
          return None;
        }
      }
      PropertyKind::Data { value, writable } => {
        if !*writable {
          if patch.writable == Some(true) {
            return None;
          }
          if patch.value.as_ref().is_some_and(|v| !v.same_value(value)) {
            return None;
          }
        }
      }
    }
  }

  let enumerable = patch.enumerable.unwrap_or(current.enumerable);
  let configurable = patch.configurable.unwrap_or(current.configurable);
  let kind = match (&current.kind, patch.is_accessor_descriptor(), patch.is_data_descriptor()) {
    (PropertyKind::Data { .. }, true, _) => PropertyKind::Accessor {
      get: patch.get.unwrap_or(Value::Undefined),
      set: patch.set.unwrap_or(Value::Undefined),
    },
    (PropertyKind::Accessor { .. }, _, true) => PropertyKind::Data {
      value: patch.value.unwrap_or(Value::Undefined),
      writable: patch.writable.unwrap_or(false),
    },
    (PropertyKind::Data { value, writable }, _, _) => PropertyKind::Data {
      value: patch.value.unwrap_or_else(|| value.clone()),
      writable: patch.writable.unwrap_or(*writable),
    },
    (PropertyKind::Accessor { get, set }, _, _) => PropertyKind::Accessor {
      get: patch.get.unwrap_or_else(|| get.clone()),
      set: patch.set.unwrap_or_else(|| set.clone()),
    },
  };
  Some(PropertyDescriptor {
    enumerable,
    configurable,
    kind,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frozen_objects_reject_changes() -> Result<(), VmError> {
    let mut heap = Heap::new();
    let obj = heap.alloc_ordinary(None);
    heap.create_data_property_or_throw(obj, "x", Value::Number(1.0))?;
    heap.freeze(obj)?;
    assert!(heap.is_frozen(obj)?);
    assert!(!heap.create_data_property(obj, "y", Value::Null)?);
    assert!(!heap.create_data_property(obj, "x", Value::Number(2.0))?);
    assert!(!heap.delete_own_property(obj, &PropertyKey::from("x"))?);
    let other = heap.alloc_ordinary(None);
    assert!(!heap.object_set_prototype(obj, Some(other))?);
    Ok(())
  }

  #[test]
  fn prototype_cycles_are_rejected() -> Result<(), VmError> {
    let mut heap = Heap::new();
    let a = heap.alloc_ordinary(None);
    let b = heap.alloc_ordinary(Some(a));
    assert!(matches!(
      heap.object_set_prototype(a, Some(b)),
      Err(VmError::TypeError(_))
    ));
    Ok(())
  }

  #[test]
  fn own_keys_order_indices_first() -> Result<(), VmError> {
    let mut heap = Heap::new();
    let sym = heap.new_symbol(Some("s"));
    let obj = heap.alloc_ordinary(None);
    heap.create_data_property_or_throw(obj, "b", Value::Null)?;
    heap.create_data_property_or_throw(obj, PropertyKey::Symbol(sym), Value::Null)?;
    heap.create_data_property_or_throw(obj, "10", Value::Null)?;
    heap.create_data_property_or_throw(obj, "a", Value::Null)?;
    heap.create_data_property_or_throw(obj, "2", Value::Null)?;
    let keys = heap.own_property_keys(obj)?;
    assert_eq!(keys, vec![
      PropertyKey::from("2"),
      PropertyKey::from("10"),
      PropertyKey::from("b"),
      PropertyKey::from("a"),
      PropertyKey::Symbol(sym),
    ]);
    Ok(())
  }
}
