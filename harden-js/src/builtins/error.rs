use super::require_object;
use super::slot;
use super::HostIntrinsics;
use super::Installer;
use crate::diagnostics::stack::render_frames;
use crate::heap::FunctionKind;
use crate::heap::ObjectKind;
use crate::property::PropertyDescriptor;
use crate::property::PropertyKey;
use crate::realm::ErrorKind;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::source::StackFrame;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;

/// The default of `Error.stackTraceLimit`.
pub(crate) const DEFAULT_STACK_TRACE_LIMIT: f64 = 10.0;

pub(crate) fn install(ins: &mut Installer<'_>, i: &HostIntrinsics) -> Result<(), VmError> {
  let ctor = i.error;
  ins.method(ctor, "captureStackTrace", 2, error_capture_stack_trace)?;
  install_stack_trace_limit(ins, ctor)?;

  let proto = i.error_prototype;
  ins.value(proto, "message", "")?;
  ins.value(proto, "name", "Error")?;
  ins.method(proto, "toString", 0, error_prototype_to_string)?;
  ins.method(proto, "toLocaleString", 0, error_prototype_to_string)?;
  ins.accessor(proto, "stack", error_prototype_get_stack, error_prototype_set_stack)?;

  for kind in ErrorKind::NATIVE {
    let proto = i.error_prototype_for(kind);
    ins.value(proto, "message", "")?;
    ins.value(proto, "name", kind.name())?;
  }
  Ok(())
}

/// Defines a `stackTraceLimit` accessor on `ctor` whose state lives in the getter's first slot.
pub(crate) fn install_stack_trace_limit(ins: &mut Installer<'_>, ctor: ObjectId) -> Result<(), VmError> {
  let getter = ins.function("get stackTraceLimit", 0, stack_trace_limit_get)?;
  set_native_slots(ins.heap, getter, vec![Value::Number(DEFAULT_STACK_TRACE_LIMIT)])?;
  let setter = ins.function("set stackTraceLimit", 1, stack_trace_limit_set)?;
  set_native_slots(ins.heap, setter, vec![Value::Object(getter)])?;
  ins.heap.define_property(
    ctor,
    "stackTraceLimit",
    PropertyDescriptor::accessor(Value::Object(getter), Value::Object(setter), false, true),
  )
}

pub(crate) fn set_native_slots(
  heap: &mut crate::heap::Heap,
  func: ObjectId,
  slots: Vec<Value>,
) -> Result<(), VmError> {
  match &mut heap.get_mut(func)?.kind {
    ObjectKind::Function(FunctionKind::Native(native)) => {
      native.slots = slots;
      Ok(())
    }
    _ => Err(VmError::InvalidHandle),
  }
}

fn stack_trace_limit_get(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  slot(realm, &inv, 0)
}

fn stack_trace_limit_set(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let Value::Object(getter) = slot(realm, &inv, 0)? else {
    return Err(VmError::InvalidHandle);
  };
  let limit = realm.to_number(&inv.arg(0))?;
  set_native_slots(&mut realm.heap, getter, vec![Value::Number(limit)])?;
  Ok(Value::Undefined)
}

/// Shared by `Error`, the native error constructors and their tamed replacements; the
/// prototype comes from the callee (or `new.target`).
pub(crate) fn error_constructor(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let ctor = inv.new_target.unwrap_or(inv.callee);
  let prototype = realm.prototype_from_constructor(ctor, realm.intrinsics.error_prototype)?;
  let message = match inv.arg(0) {
    Value::Undefined => None,
    other => Some(realm.to_string(&other)?),
  };
  let error = realm.new_error_with_prototype(prototype, message.as_deref())?;
  if let Value::Object(options) = inv.arg(1) {
    let cause_key = PropertyKey::from("cause");
    if realm.heap.has_property(options, &cause_key)? {
      let cause = realm.get(options, &cause_key)?;
      realm
        .heap
        .define_property(error, "cause", PropertyDescriptor::hidden(cause))?;
    }
  }
  Ok(Value::Object(error))
}

pub(crate) fn error_frames(realm: &Realm, error: ObjectId) -> Option<Vec<StackFrame>> {
  match realm.heap.kind(error) {
    Ok(ObjectKind::Error { frames }) => Some(frames.clone()),
    _ => None,
  }
}

/// The frames of `error` after stack filtering, each rendered as `"\n  at {frame}"`.
pub(crate) fn stack_string(realm: &Realm, error: ObjectId) -> String {
  match error_frames(realm, error) {
    Some(frames) => render_frames(&frames, realm.stack_filtering),
    None => String::new(),
  }
}

/// `%InitialGetStackString%`.
pub(crate) fn get_stack_string(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  match inv.arg(0) {
    Value::Object(error) => Ok(Value::from(stack_string(realm, error))),
    _ => Ok(Value::from("")),
  }
}

pub(crate) fn error_capture_stack_trace(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let target = require_object(realm, &inv.arg(0), "Error.captureStackTrace")?;
  let frames = realm.capture_frames();
  let header = error_header(realm, target)?;
  let stack = format!("{header}{}", render_frames(&frames, realm.stack_filtering));
  realm
    .heap
    .define_property(target, "stack", PropertyDescriptor::hidden(stack))?;
  Ok(Value::Undefined)
}

/// `Error.prototype.toString` applied to `error`.
fn error_header(realm: &mut Realm, error: ObjectId) -> Result<String, VmError> {
  let name = match realm.get(error, &PropertyKey::from("name"))? {
    Value::Undefined => "Error".into(),
    other => realm.to_string(&other)?,
  };
  let message = match realm.get(error, &PropertyKey::from("message"))? {
    Value::Undefined => "".into(),
    other => realm.to_string(&other)?,
  };
  Ok(match (name.is_empty(), message.is_empty()) {
    (_, true) => name.to_string(),
    (true, false) => message.to_string(),
    (false, false) => format!("{name}: {message}"),
  })
}

fn error_prototype_to_string(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let error = require_object(realm, inv.this, "Error.prototype.toString")?;
  Ok(Value::from(error_header(realm, error)?))
}

fn error_prototype_get_stack(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let Value::Object(error) = inv.this else {
    return Ok(Value::Undefined);
  };
  let error = *error;
  if error_frames(realm, error).is_none() {
    return Ok(Value::Undefined);
  }
  let header = error_header(realm, error)?;
  Ok(Value::from(format!("{header}{}", stack_string(realm, error))))
}

fn error_prototype_set_stack(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let Value::Object(target) = inv.this else {
    return Ok(Value::Undefined);
  };
  realm.heap.define_own_property_or_throw(
    *target,
    PropertyKey::from("stack"),
    PropertyDescriptor::hidden(inv.arg(0)).to_patch(),
  )?;
  Ok(Value::Undefined)
}

#[cfg(test)]
mod tests {
  use crate::Realm;
  use crate::VmError;

  #[test]
  fn native_errors_inherit_from_error() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script(
      "t",
      "const e = new TypeError('bad'); [e instanceof Error, String(e), Object.getPrototypeOf(TypeError) === Error].join()",
    )?;
    assert_eq!(v.as_str(), Some("true,TypeError: bad,true"));
    Ok(())
  }

  #[test]
  fn stack_trace_limit_round_trips_through_the_accessor() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script("t", "Error.stackTraceLimit = 3; Error.stackTraceLimit")?;
    assert_eq!(v.as_number(), Some(3.0));
    Ok(())
  }

  #[test]
  fn stack_starts_with_the_header() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script("t", "function f() { return new Error('x'); } f().stack")?;
    let stack = v.as_str().unwrap_or_default().to_string();
    assert!(stack.starts_with("Error: x\n  at f (t:1:"), "{stack}");
    Ok(())
  }
}
