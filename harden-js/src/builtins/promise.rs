//! `Promise` settles synchronously; there is no job queue, so reactions cannot be registered.

use super::require_callable;
use super::slot;
use super::HostIntrinsics;
use super::Installer;
use crate::heap::JsObject;
use crate::heap::NativeData;
use crate::heap::ObjectKind;
use crate::heap::PromiseState;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;

pub(crate) fn install(ins: &mut Installer<'_>, i: &HostIntrinsics) -> Result<(), VmError> {
  ins.method(i.promise, "reject", 1, promise_reject)?;
  ins.method(i.promise, "resolve", 1, promise_resolve)?;

  let proto = i.promise_prototype;
  ins.method(proto, "catch", 1, promise_prototype_catch)?;
  ins.method(proto, "then", 2, promise_prototype_then)?;
  ins.to_string_tag(proto, "Promise")?;
  Ok(())
}

fn alloc_promise(realm: &mut Realm, prototype: ObjectId, state: PromiseState) -> ObjectId {
  realm
    .heap
    .alloc(JsObject::new(Some(prototype), ObjectKind::Promise(state)))
}

fn settle(realm: &mut Realm, promise: ObjectId, state: PromiseState) -> Result<(), VmError> {
  let obj = realm.heap.get_mut(promise)?;
  if matches!(obj.kind, ObjectKind::Promise(PromiseState::Pending)) {
    obj.kind = ObjectKind::Promise(state);
  }
  Ok(())
}

fn resolve_function(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  if let Value::Object(promise) = slot(realm, &inv, 0)? {
    settle(realm, promise, PromiseState::Fulfilled(inv.arg(0)))?;
  }
  Ok(Value::Undefined)
}

fn reject_function(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  if let Value::Object(promise) = slot(realm, &inv, 0)? {
    settle(realm, promise, PromiseState::Rejected(inv.arg(0)))?;
  }
  Ok(Value::Undefined)
}

pub(crate) fn promise_constructor(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let Some(new_target) = inv.new_target else {
    return Err(VmError::type_error(
      "Promise constructor cannot be invoked without 'new'",
    ));
  };
  let executor = inv.arg(0);
  require_callable(realm, &executor)?;
  let prototype = realm.prototype_from_constructor(new_target, realm.intrinsics.promise_prototype)?;
  let promise = alloc_promise(realm, prototype, PromiseState::Pending);
  let slots = vec![Value::Object(promise)];
  let resolve = realm.new_native("", 1, resolve_function, false, slots.clone(), NativeData::None)?;
  let reject = realm.new_native("", 1, reject_function, false, slots, NativeData::None)?;
  if let Err(err) = realm.call(&executor, Value::Undefined, &[
    Value::Object(resolve),
    Value::Object(reject),
  ]) {
    if !err.is_catchable() {
      return Err(err);
    }
    let reason = realm.materialize_error(err)?;
    settle(realm, promise, PromiseState::Rejected(reason))?;
  }
  Ok(Value::Object(promise))
}

fn promise_resolve(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let value = inv.arg(0);
  if let Value::Object(id) = value {
    if matches!(realm.heap.kind(id)?, ObjectKind::Promise(_)) {
      return Ok(value);
    }
  }
  let prototype = realm.intrinsics.promise_prototype;
  Ok(Value::Object(alloc_promise(
    realm,
    prototype,
    PromiseState::Fulfilled(value),
  )))
}

fn promise_reject(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let prototype = realm.intrinsics.promise_prototype;
  Ok(Value::Object(alloc_promise(
    realm,
    prototype,
    PromiseState::Rejected(inv.arg(0)),
  )))
}

fn require_promise(realm: &Realm, this: &Value, method: &str) -> Result<(), VmError> {
  if let Value::Object(id) = this {
    if matches!(realm.heap.kind(*id)?, ObjectKind::Promise(_)) {
      return Ok(());
    }
  }
  Err(VmError::type_error(format!(
    "Method Promise.prototype.{method} called on incompatible receiver {}",
    realm.display(this)
  )))
}

fn promise_prototype_then(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  require_promise(realm, inv.this, "then")?;
  Err(VmError::type_error("Promise reactions require a job queue"))
}

fn promise_prototype_catch(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  require_promise(realm, inv.this, "catch")?;
  Err(VmError::type_error("Promise reactions require a job queue"))
}

#[cfg(test)]
mod tests {
  use crate::heap::ObjectKind;
  use crate::heap::PromiseState;
  use crate::Realm;
  use crate::Value;
  use crate::VmError;

  #[test]
  fn executor_settles_synchronously() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script("t", "new Promise((res, rej) => { res(1); rej(2); })")?;
    let Value::Object(id) = v else {
      panic!("expected a promise");
    };
    assert!(matches!(
      realm.heap().kind(id)?,
      ObjectKind::Promise(PromiseState::Fulfilled(Value::Number(n))) if *n == 1.0
    ));
    Ok(())
  }

  #[test]
  fn then_is_a_catchable_type_error() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script("t", "try { Promise.resolve(1).then(x => x); } catch (e) { e.message }")?;
    assert_eq!(v.as_str(), Some("Promise reactions require a job queue"));
    Ok(())
  }
}
