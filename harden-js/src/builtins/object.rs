use super::require_callable;
use super::HostIntrinsics;
use super::Installer;
use crate::heap::ObjectKind;
use crate::property::PropertyDescriptor;
use crate::property::PropertyDescriptorPatch;
use crate::property::PropertyKey;
use crate::property::PropertyKind;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;

pub(crate) fn install(ins: &mut Installer<'_>, i: &HostIntrinsics) -> Result<(), VmError> {
  let ctor = i.object;
  ins.method(ctor, "assign", 2, object_assign)?;
  ins.method(ctor, "create", 2, object_create)?;
  ins.method(ctor, "defineProperties", 2, object_define_properties)?;
  ins.method(ctor, "defineProperty", 3, object_define_property)?;
  ins.method(ctor, "entries", 1, object_entries)?;
  ins.method(ctor, "freeze", 1, object_freeze)?;
  ins.method(ctor, "fromEntries", 1, object_from_entries)?;
  ins.method(ctor, "getOwnPropertyDescriptor", 2, object_get_own_property_descriptor)?;
  ins.method(ctor, "getOwnPropertyDescriptors", 1, object_get_own_property_descriptors)?;
  ins.method(ctor, "getOwnPropertyNames", 1, object_get_own_property_names)?;
  ins.method(ctor, "getOwnPropertySymbols", 1, object_get_own_property_symbols)?;
  ins.method(ctor, "getPrototypeOf", 1, object_get_prototype_of)?;
  ins.method(ctor, "hasOwn", 2, object_has_own)?;
  ins.method(ctor, "is", 2, object_is)?;
  ins.method(ctor, "isExtensible", 1, object_is_extensible)?;
  ins.method(ctor, "isFrozen", 1, object_is_frozen)?;
  ins.method(ctor, "isSealed", 1, object_is_sealed)?;
  ins.method(ctor, "keys", 1, object_keys)?;
  ins.method(ctor, "preventExtensions", 1, object_prevent_extensions)?;
  ins.method(ctor, "seal", 1, object_seal)?;
  ins.method(ctor, "setPrototypeOf", 2, object_set_prototype_of)?;
  ins.method(ctor, "values", 1, object_values)?;

  let proto = i.object_prototype;
  ins.method(proto, "hasOwnProperty", 1, object_prototype_has_own_property)?;
  ins.method(proto, "isPrototypeOf", 1, object_prototype_is_prototype_of)?;
  ins.method(proto, "propertyIsEnumerable", 1, object_prototype_property_is_enumerable)?;
  ins.method(proto, "toLocaleString", 0, object_prototype_to_locale_string)?;
  ins.method(proto, "toString", 0, object_prototype_to_string)?;
  ins.method(proto, "valueOf", 0, object_prototype_value_of)?;
  ins.method(proto, "__defineGetter__", 2, object_prototype_define_getter)?;
  ins.method(proto, "__defineSetter__", 2, object_prototype_define_setter)?;
  ins.method(proto, "__lookupGetter__", 1, object_prototype_lookup_getter)?;
  ins.method(proto, "__lookupSetter__", 1, object_prototype_lookup_setter)?;
  ins.accessor(proto, "__proto__", object_prototype_get_proto, object_prototype_set_proto)?;
  Ok(())
}

// Descriptor conversion.

/// `ToPropertyDescriptor`.
pub(crate) fn to_property_descriptor(
  realm: &mut Realm,
  value: &Value,
) -> Result<PropertyDescriptorPatch, VmError> {
  let Value::Object(obj) = value else {
    return Err(VmError::type_error(format!(
      "Property description must be an object: {}",
      realm.display(value)
    )));
  };
  let obj = *obj;
  let mut patch = PropertyDescriptorPatch::default();
  let field = |realm: &mut Realm, name: &str| -> Result<Option<Value>, VmError> {
    let key = PropertyKey::from(name);
    if realm.heap.has_property(obj, &key)? {
      Ok(Some(realm.get(obj, &key)?))
    } else {
      Ok(None)
    }
  };
  patch.enumerable = field(realm, "enumerable")?.map(|v| v.truthy());
  patch.configurable = field(realm, "configurable")?.map(|v| v.truthy());
  patch.value = field(realm, "value")?;
  patch.writable = field(realm, "writable")?.map(|v| v.truthy());
  for (name, slot) in [("get", &mut patch.get), ("set", &mut patch.set)] {
    if let Some(f) = field(realm, name)? {
      if !f.is_undefined() && !realm.heap.is_callable(&f) {
        let kind = if name == "get" { "Getter" } else { "Setter" };
        return Err(VmError::type_error(format!(
          "{kind} must be a function: {}",
          realm.display(&f)
        )));
      }
      *slot = Some(f);
    }
  }
  patch.validate()?;
  Ok(patch)
}

/// `FromPropertyDescriptor`.
pub(crate) fn from_property_descriptor(
  realm: &mut Realm,
  desc: Option<PropertyDescriptor>,
) -> Result<Value, VmError> {
  let Some(desc) = desc else {
    return Ok(Value::Undefined);
  };
  let obj = realm.new_object();
  match desc.kind {
    PropertyKind::Data { value, writable } => {
      realm.heap.create_data_property_or_throw(obj, "value", value)?;
      realm
        .heap
        .create_data_property_or_throw(obj, "writable", Value::Bool(writable))?;
    }
    PropertyKind::Accessor { get, set } => {
      realm.heap.create_data_property_or_throw(obj, "get", get)?;
      realm.heap.create_data_property_or_throw(obj, "set", set)?;
    }
  }
  realm
    .heap
    .create_data_property_or_throw(obj, "enumerable", Value::Bool(desc.enumerable))?;
  realm
    .heap
    .create_data_property_or_throw(obj, "configurable", Value::Bool(desc.configurable))?;
  Ok(Value::Object(obj))
}

fn require_target(value: &Value, method: &str) -> Result<ObjectId, VmError> {
  match value {
    Value::Object(id) => Ok(*id),
    _ => Err(VmError::type_error(format!(
      "Object.{method} called on non-object"
    ))),
  }
}

fn enumerable_own_string_keys(realm: &mut Realm, obj: ObjectId) -> Result<Vec<PropertyKey>, VmError> {
  let mut out = Vec::new();
  for key in realm.heap.own_property_keys(obj)? {
    if matches!(key, PropertyKey::Symbol(_)) {
      continue;
    }
    if realm
      .heap
      .get_own_property(obj, &key)?
      .is_some_and(|d| d.enumerable)
    {
      out.push(key);
    }
  }
  Ok(out)
}

// Constructor.

pub(crate) fn object_constructor(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  if let Some(new_target) = inv.new_target {
    if new_target != inv.callee {
      let proto = realm.prototype_from_constructor(new_target, realm.intrinsics.object_prototype)?;
      return Ok(Value::Object(realm.heap.alloc_ordinary(Some(proto))));
    }
  }
  let value = inv.arg(0);
  if value.is_nullish() {
    return Ok(Value::Object(realm.new_object()));
  }
  Ok(Value::Object(realm.to_object(&value)?))
}

// Static methods.

fn object_assign(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let target = realm.to_object(&inv.arg(0))?;
  for source in inv.args.iter().skip(1) {
    if source.is_nullish() {
      continue;
    }
    let from = realm.to_object(source)?;
    for key in realm.heap.own_property_keys(from)? {
      let enumerable = realm
        .heap
        .get_own_property(from, &key)?
        .is_some_and(|d| d.enumerable);
      if enumerable {
        let value = realm.get(from, &key)?;
        realm.put(&Value::Object(target), key, value)?;
      }
    }
  }
  Ok(Value::Object(target))
}

fn object_create(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let proto = match inv.arg(0) {
    Value::Object(id) => Some(id),
    Value::Null => None,
    other => {
      return Err(VmError::type_error(format!(
        "Object prototype may only be an Object or null: {}",
        realm.display(&other)
      )))
    }
  };
  let obj = realm.heap.alloc_ordinary(proto);
  let props = inv.arg(1);
  if !props.is_undefined() {
    define_properties(realm, obj, &props)?;
  }
  Ok(Value::Object(obj))
}

fn define_properties(realm: &mut Realm, obj: ObjectId, props: &Value) -> Result<(), VmError> {
  let props = realm.to_object(props)?;
  let mut patches = Vec::new();
  for key in realm.heap.own_property_keys(props)? {
    let enumerable = realm
      .heap
      .get_own_property(props, &key)?
      .is_some_and(|d| d.enumerable);
    if enumerable {
      let desc = realm.get(props, &key)?;
      patches.push((key, to_property_descriptor(realm, &desc)?));
    }
  }
  for (key, patch) in patches {
    realm.heap.define_own_property_or_throw(obj, key, patch)?;
  }
  Ok(())
}

fn object_define_properties(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = require_target(&inv.arg(0), "defineProperties")?;
  define_properties(realm, obj, &inv.arg(1))?;
  Ok(Value::Object(obj))
}

fn object_define_property(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = require_target(&inv.arg(0), "defineProperty")?;
  let key = realm.to_property_key(&inv.arg(1))?;
  let patch = to_property_descriptor(realm, &inv.arg(2))?;
  realm.heap.define_own_property_or_throw(obj, key, patch)?;
  Ok(Value::Object(obj))
}

fn object_entries(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = realm.to_object(&inv.arg(0))?;
  let mut entries = Vec::new();
  for key in enumerable_own_string_keys(realm, obj)? {
    let value = realm.get(obj, &key)?;
    let pair = realm.new_array(vec![key.to_value(), value])?;
    entries.push(Value::Object(pair));
  }
  Ok(Value::Object(realm.new_array(entries)?))
}

fn object_freeze(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let value = inv.arg(0);
  if let Value::Object(id) = value {
    if !realm.heap.freeze(id)? {
      return Err(VmError::type_error("Cannot freeze"));
    }
  }
  Ok(value)
}

fn object_from_entries(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let entries = realm.iterate_to_vec(&inv.arg(0))?;
  let obj = realm.new_object();
  for entry in entries {
    if !entry.is_object() {
      return Err(VmError::type_error(format!(
        "Iterator value {} is not an entry object",
        realm.display(&entry)
      )));
    }
    let key = realm.get_value(&entry, &PropertyKey::from("0"))?;
    let value = realm.get_value(&entry, &PropertyKey::from("1"))?;
    let key = realm.to_property_key(&key)?;
    realm.heap.create_data_property_or_throw(obj, key, value)?;
  }
  Ok(Value::Object(obj))
}

fn object_get_own_property_descriptor(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = realm.to_object(&inv.arg(0))?;
  let key = realm.to_property_key(&inv.arg(1))?;
  let desc = realm.heap.get_own_property(obj, &key)?;
  from_property_descriptor(realm, desc)
}

fn object_get_own_property_descriptors(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = realm.to_object(&inv.arg(0))?;
  let out = realm.new_object();
  for key in realm.heap.own_property_keys(obj)? {
    let desc = realm.heap.get_own_property(obj, &key)?;
    let desc = from_property_descriptor(realm, desc)?;
    realm.heap.create_data_property_or_throw(out, key, desc)?;
  }
  Ok(Value::Object(out))
}

fn object_get_own_property_names(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = realm.to_object(&inv.arg(0))?;
  let names = realm
    .heap
    .own_property_keys(obj)?
    .into_iter()
    .filter(|k| matches!(k, PropertyKey::String(_)))
    .map(|k| k.to_value())
    .collect();
  Ok(Value::Object(realm.new_array(names)?))
}

fn object_get_own_property_symbols(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = realm.to_object(&inv.arg(0))?;
  let symbols = realm
    .heap
    .own_property_keys(obj)?
    .into_iter()
    .filter(|k| matches!(k, PropertyKey::Symbol(_)))
    .map(|k| k.to_value())
    .collect();
  Ok(Value::Object(realm.new_array(symbols)?))
}

fn object_get_prototype_of(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = realm.to_object(&inv.arg(0))?;
  Ok(match realm.heap.object_prototype(obj)? {
    Some(proto) => Value::Object(proto),
    None => Value::Null,
  })
}

fn object_has_own(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = realm.to_object(&inv.arg(0))?;
  let key = realm.to_property_key(&inv.arg(1))?;
  Ok(Value::Bool(realm.heap.has_own_property(obj, &key)?))
}

fn object_is(_realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Bool(inv.arg(0).same_value(&inv.arg(1))))
}

fn object_is_extensible(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Bool(match inv.arg(0) {
    Value::Object(id) => realm.heap.object_is_extensible(id)?,
    _ => false,
  }))
}

fn object_is_frozen(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Bool(match inv.arg(0) {
    Value::Object(id) => realm.heap.is_frozen(id)?,
    _ => true,
  }))
}

fn object_is_sealed(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Bool(match inv.arg(0) {
    Value::Object(id) => realm.heap.is_sealed(id)?,
    _ => true,
  }))
}

fn object_keys(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = realm.to_object(&inv.arg(0))?;
  let keys = enumerable_own_string_keys(realm, obj)?
    .into_iter()
    .map(|k| k.to_value())
    .collect();
  Ok(Value::Object(realm.new_array(keys)?))
}

fn object_prevent_extensions(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let value = inv.arg(0);
  if let Value::Object(id) = value {
    realm.heap.object_prevent_extensions(id)?;
  }
  Ok(value)
}

fn object_seal(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let value = inv.arg(0);
  if let Value::Object(id) = value {
    realm.heap.seal(id)?;
  }
  Ok(value)
}

pub(crate) fn set_prototype_or_throw(
  realm: &mut Realm,
  obj: ObjectId,
  proto: Option<ObjectId>,
) -> Result<(), VmError> {
  if realm.heap.object_set_prototype(obj, proto)? {
    Ok(())
  } else {
    Err(VmError::type_error(format!(
      "{} is not extensible",
      realm.display(&Value::Object(obj))
    )))
  }
}

fn object_set_prototype_of(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let target = inv.arg(0);
  if target.is_nullish() {
    return Err(VmError::type_error(
      "Object.setPrototypeOf called on null or undefined",
    ));
  }
  let proto = match inv.arg(1) {
    Value::Object(id) => Some(id),
    Value::Null => None,
    other => {
      return Err(VmError::type_error(format!(
        "Object prototype may only be an Object or null: {}",
        realm.display(&other)
      )))
    }
  };
  if let Value::Object(obj) = target {
    set_prototype_or_throw(realm, obj, proto)?;
  }
  Ok(target)
}

fn object_values(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = realm.to_object(&inv.arg(0))?;
  let mut values = Vec::new();
  for key in enumerable_own_string_keys(realm, obj)? {
    values.push(realm.get(obj, &key)?);
  }
  Ok(Value::Object(realm.new_array(values)?))
}

// Object.prototype.

fn object_prototype_has_own_property(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let key = realm.to_property_key(&inv.arg(0))?;
  let obj = realm.to_object(inv.this)?;
  Ok(Value::Bool(realm.heap.has_own_property(obj, &key)?))
}

fn object_prototype_is_prototype_of(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let Value::Object(mut cur) = inv.arg(0) else {
    return Ok(Value::Bool(false));
  };
  let obj = realm.to_object(inv.this)?;
  while let Some(proto) = realm.heap.object_prototype(cur)? {
    if proto == obj {
      return Ok(Value::Bool(true));
    }
    cur = proto;
  }
  Ok(Value::Bool(false))
}

fn object_prototype_property_is_enumerable(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let key = realm.to_property_key(&inv.arg(0))?;
  let obj = realm.to_object(inv.this)?;
  Ok(Value::Bool(
    realm
      .heap
      .get_own_property(obj, &key)?
      .is_some_and(|d| d.enumerable),
  ))
}

fn object_prototype_to_locale_string(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let to_string = realm.get_value(inv.this, &PropertyKey::from("toString"))?;
  require_callable(realm, &to_string)?;
  realm.call(&to_string, inv.this.clone(), &[])
}

fn builtin_tag(realm: &Realm, obj: ObjectId) -> &'static str {
  match realm.heap.kind(obj) {
    Ok(ObjectKind::Array) => "Array",
    Ok(ObjectKind::Function(_)) => "Function",
    Ok(ObjectKind::Error { .. }) => "Error",
    Ok(ObjectKind::Boolean(_)) => "Boolean",
    Ok(ObjectKind::Number(_)) => "Number",
    Ok(ObjectKind::String(_)) => "String",
    Ok(ObjectKind::Date(_)) => "Date",
    Ok(ObjectKind::RegExp { .. }) => "RegExp",
    _ => "Object",
  }
}

pub(crate) fn object_prototype_to_string(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  match inv.this {
    Value::Undefined => return Ok(Value::from("[object Undefined]")),
    Value::Null => return Ok(Value::from("[object Null]")),
    _ => {}
  }
  let obj = realm.to_object(inv.this)?;
  let tag = match realm.get(obj, &PropertyKey::Symbol(realm.symbols.to_string_tag))? {
    Value::String(tag) => tag.to_string(),
    _ => builtin_tag(realm, obj).to_string(),
  };
  Ok(Value::from(format!("[object {tag}]")))
}

fn object_prototype_value_of(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Object(realm.to_object(inv.this)?))
}

fn define_legacy_accessor(realm: &mut Realm, inv: Invocation<'_>, getter: bool) -> Result<Value, VmError> {
  let obj = realm.to_object(inv.this)?;
  let func = inv.arg(1);
  if !realm.heap.is_callable(&func) {
    let which = if getter { "Getter" } else { "Setter" };
    return Err(VmError::type_error(format!(
      "Object.prototype.__define{which}__: Expecting function"
    )));
  }
  let key = realm.to_property_key(&inv.arg(0))?;
  let patch = PropertyDescriptorPatch {
    get: getter.then(|| func.clone()),
    set: (!getter).then(|| func.clone()),
    enumerable: Some(true),
    configurable: Some(true),
    ..Default::default()
  };
  realm.heap.define_own_property_or_throw(obj, key, patch)?;
  Ok(Value::Undefined)
}

fn object_prototype_define_getter(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  define_legacy_accessor(realm, inv, true)
}

fn object_prototype_define_setter(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  define_legacy_accessor(realm, inv, false)
}

fn lookup_legacy_accessor(realm: &mut Realm, inv: Invocation<'_>, getter: bool) -> Result<Value, VmError> {
  let mut cur = Some(realm.to_object(inv.this)?);
  let key = realm.to_property_key(&inv.arg(0))?;
  while let Some(obj) = cur {
    if let Some(desc) = realm.heap.get_own_property(obj, &key)? {
      return Ok(match desc.kind {
        PropertyKind::Accessor { get, set } => {
          if getter {
            get
          } else {
            set
          }
        }
        PropertyKind::Data { .. } => Value::Undefined,
      });
    }
    cur = realm.heap.object_prototype(obj)?;
  }
  Ok(Value::Undefined)
}

fn object_prototype_lookup_getter(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  lookup_legacy_accessor(realm, inv, true)
}

fn object_prototype_lookup_setter(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  lookup_legacy_accessor(realm, inv, false)
}

fn object_prototype_get_proto(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = realm.to_object(inv.this)?;
  Ok(match realm.heap.object_prototype(obj)? {
    Some(proto) => Value::Object(proto),
    None => Value::Null,
  })
}

fn object_prototype_set_proto(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  if inv.this.is_nullish() {
    return Err(VmError::type_error(
      "Object.prototype.__proto__ called on null or undefined",
    ));
  }
  let proto = match inv.arg(0) {
    Value::Object(id) => Some(id),
    Value::Null => None,
    _ => return Ok(Value::Undefined),
  };
  if let Value::Object(obj) = inv.this {
    set_prototype_or_throw(realm, *obj, proto)?;
  }
  Ok(Value::Undefined)
}
