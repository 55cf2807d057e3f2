use super::installer;
use super::untamed;
use super::Tamed;
use super::Taming;
use crate::builtins::error::error_capture_stack_trace;
use crate::builtins::error::error_constructor;
use crate::builtins::error::install_stack_trace_limit;
use crate::property::PropertyDescriptor;
use crate::realm::ErrorKind;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;

/// `%InitialError%` keeps `captureStackTrace` and a live `stackTraceLimit`; `%SharedError%` gets a
/// `stackTraceLimit` that reads `undefined` and ignores writes. The native error constructors are
/// re-parented onto `%SharedError%`.
pub(crate) fn tame_error(realm: &mut Realm, taming: Taming) -> Result<Tamed, VmError> {
  let i = realm.intrinsics.clone();
  let mut tamed = if taming == Taming::Unsafe {
    untamed("%InitialError%", "%SharedError%", Value::Object(i.error))
  } else {
    let prototype = i.error_prototype;
    let mut ins = installer(realm);

    let initial = error_constructor_for(&mut ins, prototype)?;
    ins.method(initial, "captureStackTrace", 2, error_capture_stack_trace)?;
    install_stack_trace_limit(&mut ins, initial)?;

    let shared = error_constructor_for(&mut ins, prototype)?;
    ins.accessor(shared, "stackTraceLimit", powerless_limit_get, powerless_limit_set)?;

    ins
      .heap
      .define_property(prototype, "constructor", PropertyDescriptor::hidden(shared))?;
    for kind in ErrorKind::NATIVE {
      ins
        .heap
        .object_set_prototype(i.error_constructor_for(kind), Some(shared))?;
    }
    vec![
      ("%InitialError%", Value::Object(initial)),
      ("%SharedError%", Value::Object(shared)),
    ]
  };
  tamed.push(("%InitialGetStackString%", Value::Object(i.get_stack_string)));
  Ok(tamed)
}

fn error_constructor_for(
  ins: &mut crate::builtins::Installer<'_>,
  prototype: ObjectId,
) -> Result<ObjectId, VmError> {
  let ctor = ins.constructable("Error", 1, error_constructor)?;
  ins.constant(ctor, "prototype", prototype)?;
  Ok(ctor)
}

fn powerless_limit_get(_realm: &mut Realm, _inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Undefined)
}

fn powerless_limit_set(_realm: &mut Realm, _inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Undefined)
}
