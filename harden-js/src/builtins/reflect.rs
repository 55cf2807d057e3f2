use super::object::from_property_descriptor;
use super::object::to_property_descriptor;
use super::require_callable;
use super::HostIntrinsics;
use super::Installer;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;

pub(crate) fn install(ins: &mut Installer<'_>, i: &HostIntrinsics) -> Result<(), VmError> {
  let reflect = i.reflect;
  ins.method(reflect, "apply", 3, reflect_apply)?;
  ins.method(reflect, "construct", 2, reflect_construct)?;
  ins.method(reflect, "defineProperty", 3, reflect_define_property)?;
  ins.method(reflect, "deleteProperty", 2, reflect_delete_property)?;
  ins.method(reflect, "get", 2, reflect_get)?;
  ins.method(reflect, "getOwnPropertyDescriptor", 2, reflect_get_own_property_descriptor)?;
  ins.method(reflect, "getPrototypeOf", 1, reflect_get_prototype_of)?;
  ins.method(reflect, "has", 2, reflect_has)?;
  ins.method(reflect, "isExtensible", 1, reflect_is_extensible)?;
  ins.method(reflect, "ownKeys", 1, reflect_own_keys)?;
  ins.method(reflect, "preventExtensions", 1, reflect_prevent_extensions)?;
  ins.method(reflect, "set", 3, reflect_set)?;
  ins.method(reflect, "setPrototypeOf", 2, reflect_set_prototype_of)?;
  ins.to_string_tag(reflect, "Reflect")?;
  Ok(())
}

fn target(realm: &Realm, value: &Value, method: &str) -> Result<ObjectId, VmError> {
  match value {
    Value::Object(id) => Ok(*id),
    other => Err(VmError::type_error(format!(
      "Reflect.{method} called on non-object {}",
      realm.display(other)
    ))),
  }
}

fn argument_list(realm: &mut Realm, value: &Value) -> Result<Vec<Value>, VmError> {
  match value {
    Value::Object(id) => realm.array_like_to_vec(*id),
    _ => Err(VmError::type_error("CreateListFromArrayLike called on non-object")),
  }
}

fn reflect_apply(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let func = inv.arg(0);
  require_callable(realm, &func)?;
  let args = argument_list(realm, &inv.arg(2))?;
  realm.call(&func, inv.arg(1), &args)
}

fn reflect_construct(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let ctor = inv.arg(0);
  if !realm.is_constructor(&ctor) {
    return Err(VmError::type_error(format!(
      "{} is not a constructor",
      realm.display(&ctor)
    )));
  }
  let new_target = match inv.args.get(2) {
    Some(nt) if !realm.is_constructor(nt) => {
      return Err(VmError::type_error(format!(
        "{} is not a constructor",
        realm.display(nt)
      )))
    }
    Some(Value::Object(nt)) => Some(*nt),
    _ => None,
  };
  let args = argument_list(realm, &inv.arg(1))?;
  realm.construct(&ctor, &args, new_target)
}

fn reflect_define_property(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = target(realm, &inv.arg(0), "defineProperty")?;
  let key = realm.to_property_key(&inv.arg(1))?;
  let patch = to_property_descriptor(realm, &inv.arg(2))?;
  Ok(Value::Bool(realm.heap.define_own_property(obj, key, patch)?))
}

fn reflect_delete_property(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = target(realm, &inv.arg(0), "deleteProperty")?;
  let key = realm.to_property_key(&inv.arg(1))?;
  Ok(Value::Bool(realm.heap.delete_own_property(obj, &key)?))
}

fn reflect_get(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = target(realm, &inv.arg(0), "get")?;
  let key = realm.to_property_key(&inv.arg(1))?;
  let receiver = inv.args.get(2).cloned().unwrap_or(Value::Object(obj));
  realm.get_with_receiver(obj, &key, receiver)
}

fn reflect_get_own_property_descriptor(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = target(realm, &inv.arg(0), "getOwnPropertyDescriptor")?;
  let key = realm.to_property_key(&inv.arg(1))?;
  let desc = realm.heap.get_own_property(obj, &key)?;
  from_property_descriptor(realm, desc)
}

fn reflect_get_prototype_of(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = target(realm, &inv.arg(0), "getPrototypeOf")?;
  Ok(match realm.heap.object_prototype(obj)? {
    Some(proto) => Value::Object(proto),
    None => Value::Null,
  })
}

fn reflect_has(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = target(realm, &inv.arg(0), "has")?;
  let key = realm.to_property_key(&inv.arg(1))?;
  Ok(Value::Bool(realm.heap.has_property(obj, &key)?))
}

fn reflect_is_extensible(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = target(realm, &inv.arg(0), "isExtensible")?;
  Ok(Value::Bool(realm.heap.object_is_extensible(obj)?))
}

fn reflect_own_keys(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = target(realm, &inv.arg(0), "ownKeys")?;
  let keys = realm
    .heap
    .own_property_keys(obj)?
    .iter()
    .map(|k| k.to_value())
    .collect();
  Ok(Value::Object(realm.new_array(keys)?))
}

fn reflect_prevent_extensions(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = target(realm, &inv.arg(0), "preventExtensions")?;
  Ok(Value::Bool(realm.heap.object_prevent_extensions(obj)?))
}

fn reflect_set(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = target(realm, &inv.arg(0), "set")?;
  let key = realm.to_property_key(&inv.arg(1))?;
  let receiver = inv.args.get(3).cloned().unwrap_or(Value::Object(obj));
  Ok(Value::Bool(realm.set(obj, key, inv.arg(2), receiver)?))
}

fn reflect_set_prototype_of(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = target(realm, &inv.arg(0), "setPrototypeOf")?;
  let proto = match inv.arg(1) {
    Value::Object(p) => Some(p),
    Value::Null => None,
    _ => return Err(VmError::type_error("Object prototype may only be an Object or null")),
  };
  match realm.heap.object_set_prototype(obj, proto) {
    Ok(changed) => Ok(Value::Bool(changed)),
    Err(VmError::TypeError(_)) => Ok(Value::Bool(false)),
    Err(err) => Err(err),
  }
}

