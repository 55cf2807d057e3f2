use super::HostIntrinsics;
use super::Installer;
use crate::heap::FunctionKind;
use crate::heap::JsObject;
use crate::heap::ObjectKind;
use crate::js::parse::check_formal_parameters;
use crate::js::parse::check_function_body;
use crate::property::PropertyDescriptor;
use crate::property::PropertyKey;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::Value;
use crate::VmError;

pub(crate) fn install(ins: &mut Installer<'_>, i: &HostIntrinsics) -> Result<(), VmError> {
  let proto = i.function_prototype;
  ins.method(proto, "apply", 2, function_prototype_apply)?;
  ins.method(proto, "bind", 1, function_prototype_bind)?;
  ins.method(proto, "call", 1, function_prototype_call_method)?;
  ins.method(proto, "toString", 0, function_prototype_to_string)?;
  let has_instance = ins.function("[Symbol.hasInstance]", 1, function_prototype_has_instance)?;
  let key = ins.symbols.has_instance;
  ins
    .heap
    .define_property(proto, key, PropertyDescriptor::constant(has_instance))?;
  Ok(())
}

/// `%FunctionPrototype%` is itself callable and returns `undefined`.
pub(crate) fn function_prototype_call(_realm: &mut Realm, _inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Undefined)
}

/// Assembles `(function anonymous(params\n) {\nbody\n})` from `Function` constructor arguments,
/// checking each piece on its own first so neither can close the wrapper early.
pub(crate) fn function_source_from_args(realm: &mut Realm, args: &[Value]) -> Result<String, VmError> {
  let (body, params) = match args.split_last() {
    Some((body, params)) => (realm.to_string(body)?.to_string(), params),
    None => (String::new(), &[][..]),
  };
  let mut names = Vec::with_capacity(params.len());
  for param in params {
    names.push(realm.to_string(param)?.to_string());
  }
  let params = names.join(",");
  check_formal_parameters(&params).map_err(VmError::Syntax)?;
  check_function_body(&body).map_err(VmError::Syntax)?;
  Ok(format!("(function anonymous({params}\n) {{\n{body}\n}})"))
}

/// The host `Function` constructor, which evaluates against the host global object.
pub(crate) fn function_constructor(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let source = function_source_from_args(realm, inv.args)?;
  realm.evaluate_script("anonymous", &source)
}

fn require_function(realm: &Realm, this: &Value, method: &str) -> Result<(), VmError> {
  if realm.heap.is_callable(this) {
    Ok(())
  } else {
    Err(VmError::type_error(format!(
      "Function.prototype.{method} called on a non-function"
    )))
  }
}

fn function_prototype_apply(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  require_function(realm, inv.this, "apply")?;
  let args = match inv.arg(1) {
    Value::Undefined | Value::Null => Vec::new(),
    Value::Object(list) => realm.array_like_to_vec(list)?,
    _ => {
      return Err(VmError::type_error(
        "CreateListFromArrayLike called on non-object",
      ))
    }
  };
  realm.call(inv.this, inv.arg(0), &args)
}

fn function_prototype_call_method(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  require_function(realm, inv.this, "call")?;
  let rest = inv.args.get(1..).unwrap_or(&[]);
  realm.call(inv.this, inv.arg(0), rest)
}

fn function_prototype_bind(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  require_function(realm, inv.this, "bind")?;
  let Value::Object(target) = inv.this else {
    return Err(VmError::NotCallable);
  };
  let target = *target;
  let bound_args = inv.args.get(1..).unwrap_or(&[]).to_vec();
  let proto = realm.heap.object_prototype(target)?;
  let target_length = match realm.get(target, &PropertyKey::from("length"))? {
    Value::Number(n) if n.is_finite() => n.trunc().max(0.0),
    Value::Number(n) if n == f64::INFINITY => n,
    _ => 0.0,
  };
  let length = (target_length - bound_args.len() as f64).max(0.0);
  let target_name = match realm.get(target, &PropertyKey::from("name"))? {
    Value::String(name) => name.to_string(),
    _ => String::new(),
  };
  let id = realm.heap.alloc(JsObject::new(
    proto,
    ObjectKind::Function(FunctionKind::Bound {
      target,
      this: inv.arg(0),
      args: bound_args,
    }),
  ));
  realm
    .heap
    .define_property(id, "length", PropertyDescriptor::data(length, false, false, true))?;
  realm.heap.define_property(
    id,
    "name",
    PropertyDescriptor::data(format!("bound {target_name}"), false, false, true),
  )?;
  Ok(Value::Object(id))
}

fn native_source(name: &str) -> String {
  format!("function {name}() {{ [native code] }}")
}

pub(crate) fn function_prototype_to_string(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let Value::Object(id) = inv.this else {
    return Err(VmError::type_error(
      "Function.prototype.toString requires that 'this' be a Function",
    ));
  };
  let name = match realm.heap.get_own_data_value(*id, &PropertyKey::from("name"))? {
    Some(Value::String(name)) => name.to_string(),
    _ => String::new(),
  };
  match realm.heap.kind(*id)? {
    ObjectKind::Function(FunctionKind::Closure(closure)) => {
      if realm.native_brands.contains(id) {
        Ok(Value::from(native_source(&name)))
      } else {
        Ok(Value::String(closure.func.text.clone()))
      }
    }
    ObjectKind::Function(_) => Ok(Value::from(native_source(&name))),
    _ => Err(VmError::type_error(
      "Function.prototype.toString requires that 'this' be a Function",
    )),
  }
}

fn function_prototype_has_instance(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Bool(realm.ordinary_has_instance(inv.this, &inv.arg(0))?))
}

/// `%ThrowTypeError%`.
pub(crate) fn throw_type_error(_realm: &mut Realm, _inv: Invocation<'_>) -> Result<Value, VmError> {
  Err(VmError::type_error(
    "'caller', 'callee', and 'arguments' properties may not be accessed on strict mode functions or the arguments objects for calls to them",
  ))
}

/// `%InertFunction%`: what `Function.prototype.constructor` points at after lockdown.
pub(crate) fn inert_function(_realm: &mut Realm, _inv: Invocation<'_>) -> Result<Value, VmError> {
  Err(VmError::type_error("Not available"))
}
