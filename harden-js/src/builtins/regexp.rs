use super::HostIntrinsics;
use super::Installer;
use crate::heap::JsObject;
use crate::heap::ObjectKind;
use crate::property::PropertyDescriptor;
use crate::realm::ErrorKind;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;
use std::rc::Rc;

const FLAGS: &str = "dgimsuy";

pub(crate) fn install(ins: &mut Installer<'_>, i: &HostIntrinsics) -> Result<(), VmError> {
  let proto = i.regexp_prototype;
  ins.method(proto, "compile", 2, regexp_prototype_compile)?;
  ins.getter(proto, "dotAll", regexp_prototype_dot_all)?;
  ins.getter(proto, "flags", regexp_prototype_flags)?;
  ins.getter(proto, "global", regexp_prototype_global)?;
  ins.getter(proto, "hasIndices", regexp_prototype_has_indices)?;
  ins.getter(proto, "ignoreCase", regexp_prototype_ignore_case)?;
  ins.getter(proto, "multiline", regexp_prototype_multiline)?;
  ins.getter(proto, "source", regexp_prototype_source)?;
  ins.getter(proto, "sticky", regexp_prototype_sticky)?;
  ins.getter(proto, "unicode", regexp_prototype_unicode)?;
  ins.method(proto, "toString", 0, regexp_prototype_to_string)?;
  Ok(())
}

fn syntax_error(realm: &mut Realm, message: String) -> VmError {
  match realm.new_error(ErrorKind::Syntax, &message) {
    Ok(err) => VmError::Throw(Value::Object(err)),
    Err(err) => err,
  }
}

fn check_flags(flags: &str) -> bool {
  flags
    .char_indices()
    .all(|(i, c)| FLAGS.contains(c) && !flags[..i].contains(c))
}

/// `RegExpCreate`. The pattern is kept as text; matching is not supported.
pub(crate) fn create_regexp(
  realm: &mut Realm,
  source: Rc<str>,
  flags: Rc<str>,
  new_target: Option<ObjectId>,
) -> Result<ObjectId, VmError> {
  if !check_flags(&flags) {
    return Err(syntax_error(
      realm,
      format!("Invalid flags supplied to RegExp constructor '{flags}'"),
    ));
  }
  let prototype = match new_target {
    Some(nt) => realm.prototype_from_constructor(nt, realm.intrinsics.regexp_prototype)?,
    None => realm.intrinsics.regexp_prototype,
  };
  let source: Rc<str> = if source.is_empty() {
    Rc::from("(?:)")
  } else {
    source
  };
  let id = realm
    .heap
    .alloc(JsObject::new(Some(prototype), ObjectKind::RegExp { source, flags }));
  realm
    .heap
    .define_property(id, "lastIndex", PropertyDescriptor::data(0.0, true, false, false))?;
  Ok(id)
}

fn regexp_parts(realm: &Realm, value: &Value) -> Option<(Rc<str>, Rc<str>)> {
  let Value::Object(id) = value else {
    return None;
  };
  match realm.heap.kind(*id) {
    Ok(ObjectKind::RegExp { source, flags }) => Some((source.clone(), flags.clone())),
    _ => None,
  }
}

fn pattern_and_flags(realm: &mut Realm, inv: &Invocation<'_>) -> Result<(Rc<str>, Rc<str>), VmError> {
  let (source, own_flags) = match regexp_parts(realm, &inv.arg(0)) {
    Some((source, flags)) => (source, Some(flags)),
    None => match inv.arg(0) {
      Value::Undefined => (Rc::from(""), None),
      other => (realm.to_string(&other)?, None),
    },
  };
  let flags = match (inv.arg(1), own_flags) {
    (Value::Undefined, Some(flags)) => flags,
    (Value::Undefined, None) => Rc::from(""),
    (other, _) => realm.to_string(&other)?,
  };
  Ok((source, flags))
}

pub(crate) fn regexp_constructor(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  if inv.new_target.is_none() && inv.arg(1).is_undefined() && regexp_parts(realm, &inv.arg(0)).is_some() {
    return Ok(inv.arg(0));
  }
  let (source, flags) = pattern_and_flags(realm, &inv)?;
  let id = create_regexp(realm, source, flags, Some(inv.new_target.unwrap_or(inv.callee)))?;
  Ok(Value::Object(id))
}

fn regexp_prototype_compile(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let Value::Object(id) = inv.this else {
    return Err(VmError::type_error("RegExp.prototype.compile called on incompatible receiver"));
  };
  let id = *id;
  if regexp_parts(realm, inv.this).is_none() {
    return Err(VmError::type_error("RegExp.prototype.compile called on incompatible receiver"));
  }
  let (source, flags) = pattern_and_flags(realm, &inv)?;
  if !check_flags(&flags) {
    return Err(syntax_error(realm, format!("Invalid regular expression flags '{flags}'")));
  }
  realm.heap.get_mut(id)?.kind = ObjectKind::RegExp { source, flags };
  realm.put(inv.this, "lastIndex".into(), Value::Number(0.0))?;
  Ok(inv.this.clone())
}

/// Reads a flag of `this`; `%RegExpPrototype%` itself reports `undefined`.
fn flag(realm: &mut Realm, inv: &Invocation<'_>, flag: char) -> Result<Value, VmError> {
  match regexp_parts(realm, inv.this) {
    Some((_, flags)) => Ok(Value::Bool(flags.contains(flag))),
    None if matches!(inv.this, Value::Object(id) if *id == realm.intrinsics.regexp_prototype) => {
      Ok(Value::Undefined)
    }
    None => Err(VmError::type_error("RegExp flag getter called on incompatible receiver")),
  }
}

fn regexp_prototype_dot_all(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  flag(realm, &inv, 's')
}

fn regexp_prototype_global(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  flag(realm, &inv, 'g')
}

fn regexp_prototype_has_indices(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  flag(realm, &inv, 'd')
}

fn regexp_prototype_ignore_case(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  flag(realm, &inv, 'i')
}

fn regexp_prototype_multiline(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  flag(realm, &inv, 'm')
}

fn regexp_prototype_sticky(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  flag(realm, &inv, 'y')
}

fn regexp_prototype_unicode(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  flag(realm, &inv, 'u')
}

fn regexp_prototype_flags(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  match regexp_parts(realm, inv.this) {
    Some((_, flags)) => {
      let mut sorted: Vec<char> = flags.chars().collect();
      sorted.sort_by_key(|c| FLAGS.find(*c));
      Ok(Value::from(sorted.into_iter().collect::<String>()))
    }
    None => Ok(Value::from("")),
  }
}

fn regexp_prototype_source(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  match regexp_parts(realm, inv.this) {
    Some((source, _)) => Ok(Value::String(source)),
    None => Ok(Value::from("(?:)")),
  }
}

fn regexp_prototype_to_string(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let source = realm.get_value(inv.this, &"source".into())?;
  let flags = realm.get_value(inv.this, &"flags".into())?;
  let source = realm.to_string(&source)?;
  let flags = realm.to_string(&flags)?;
  Ok(Value::from(format!("/{source}/{flags}")))
}

#[cfg(test)]
mod tests {
  use super::check_flags;
  use crate::Realm;
  use crate::VmError;

  #[test]
  fn flags_are_validated() {
    assert!(check_flags("gimsuy"));
    assert!(!check_flags("gg"));
    assert!(!check_flags("x"));
  }

  #[test]
  fn literals_keep_source_and_flags() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script("t", "const r = /a+b/gi; [String(r), r.global, r.sticky, r.flags].join()")?;
    assert_eq!(v.as_str(), Some("/a+b/gi,true,false,gi"));
    Ok(())
  }
}
