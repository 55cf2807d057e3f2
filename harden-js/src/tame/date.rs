use super::installer;
use super::untamed;
use super::Tamed;
use super::Taming;
use crate::builtins::date::alloc_date;
use crate::builtins::date::date_constructor;
use crate::builtins::date::date_now;
use crate::builtins::date::install_statics;
use crate::builtins::date::time_value_from_args;
use crate::property::PropertyDescriptor;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;

/// `%InitialDate%` reads the clock; `%SharedDate%` never does.
pub(crate) fn tame_date(realm: &mut Realm, taming: Taming) -> Result<Tamed, VmError> {
  let original = realm.intrinsics.date;
  if taming == Taming::Unsafe {
    return Ok(untamed("%InitialDate%", "%SharedDate%", Value::Object(original)));
  }
  let prototype = realm.intrinsics.date_prototype;
  let initial = date_constructor_with(realm, prototype, date_constructor, date_now)?;
  let shared = date_constructor_with(realm, prototype, shared_date, shared_date_now)?;
  realm
    .heap
    .define_property(prototype, "constructor", PropertyDescriptor::hidden(shared))?;
  Ok(vec![
    ("%InitialDate%", Value::Object(initial)),
    ("%SharedDate%", Value::Object(shared)),
  ])
}

fn date_constructor_with(
  realm: &mut Realm,
  prototype: ObjectId,
  call: crate::realm::NativeFn,
  now: crate::realm::NativeFn,
) -> Result<ObjectId, VmError> {
  let mut ins = installer(realm);
  let ctor = ins.constructable("Date", 7, call)?;
  ins.constant(ctor, "prototype", prototype)?;
  install_statics(&mut ins, ctor, now)?;
  Ok(ctor)
}

fn shared_date(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let Some(new_target) = inv.new_target else {
    return Ok(Value::from("Invalid Date"));
  };
  let t = time_value_from_args(realm, inv.args, f64::NAN)?;
  alloc_date(realm, new_target, t)
}

fn shared_date_now(_realm: &mut Realm, _inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Number(f64::NAN))
}

#[cfg(test)]
mod tests {
  use super::tame_date;
  use crate::tame::Taming;
  use crate::Realm;
  use crate::Value;
  use crate::VmError;

  #[test]
  fn shared_date_has_no_clock() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let tamed = tame_date(&mut realm, Taming::Safe)?;
    let global = realm.global();
    for (name, value) in tamed {
      let binding = name.trim_matches('%').to_string();
      realm.heap_mut().create_data_property_or_throw(global, binding, value)?;
    }
    let v = realm.evaluate_script(
      "t",
      "[SharedDate.now(), SharedDate(), String(new SharedDate()), new SharedDate(0).getTime(), InitialDate.now() > 0].join()",
    )?;
    assert_eq!(v.as_str(), Some("NaN,Invalid Date,Invalid Date,0,true"));
    Ok(())
  }

  #[test]
  fn unsafe_keeps_the_original() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let tamed = tame_date(&mut realm, Taming::Unsafe)?;
    let original = Value::Object(realm.intrinsics.date);
    assert!(tamed.iter().all(|(_, v)| v.same_value(&original)));
    Ok(())
  }
}
