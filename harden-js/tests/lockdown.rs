use harden_js::harden;
use harden_js::lockdown;
use harden_js::repair_intrinsics;
use harden_js::realm::Invocation;
use harden_js::CompartmentOptions;
use harden_js::EvaluateOptions;
use harden_js::Lockdown;
use harden_js::LockdownOptions;
use harden_js::OverrideTaming;
use harden_js::Realm;
use harden_js::Taming;
use harden_js::Value;
use harden_js::VmError;

fn add(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let a = realm.to_number(&inv.arg(0))?;
  let b = realm.to_number(&inv.arg(1))?;
  Ok(Value::Number(a + b))
}

#[test]
fn second_lockdown_is_a_no_op() -> Result<(), VmError> {
  let mut realm = Realm::new()?;
  assert!(!realm.is_locked_down());
  assert_eq!(lockdown(&mut realm, LockdownOptions::default())?, Lockdown::Hardened);
  assert!(realm.is_locked_down());
  assert_eq!(lockdown(&mut realm, LockdownOptions::default())?, Lockdown::AlreadyHardened);
  let explicit_default = LockdownOptions {
    override_taming: Some(OverrideTaming::Moderate),
    date_taming: Some(Taming::Safe),
    ..Default::default()
  };
  assert_eq!(lockdown(&mut realm, explicit_default)?, Lockdown::AlreadyHardened);
  Ok(())
}

#[test]
fn harden_opens_only_when_the_lockdown_is_committed() -> Result<(), VmError> {
  let mut realm = Realm::new()?;
  let pending = repair_intrinsics(&mut realm, LockdownOptions::default())?;
  assert!(pending.is_pending());
  assert!(!realm.is_locked_down());
  let obj = realm.new_object();
  assert!(matches!(
    harden(&mut realm, Value::Object(obj)),
    Err(VmError::HardenBeforeLockdown)
  ));
  let frozen = realm.evaluate_script("t", "Object.isFrozen(Array.prototype)")?;
  assert!(frozen.same_value(&Value::Bool(false)));

  assert_eq!(pending.commit(&mut realm)?, Lockdown::Hardened);
  assert!(realm.is_locked_down());
  harden(&mut realm, Value::Object(obj))?;
  let frozen = realm.evaluate_script("t", "Object.isFrozen(Array.prototype)")?;
  assert!(frozen.same_value(&Value::Bool(true)));
  Ok(())
}

#[test]
fn an_uncommitted_lockdown_is_never_retried() -> Result<(), VmError> {
  let mut realm = Realm::new()?;
  let abandoned = repair_intrinsics(&mut realm, LockdownOptions::default())?;
  drop(abandoned);
  let again = repair_intrinsics(&mut realm, LockdownOptions::default())?;
  assert!(!again.is_pending());
  assert_eq!(again.commit(&mut realm)?, Lockdown::AlreadyHardened);
  assert!(!realm.is_locked_down());
  Ok(())
}

#[test]
fn differing_options_conflict() -> Result<(), VmError> {
  let mut realm = Realm::new()?;
  lockdown(&mut realm, LockdownOptions::default())?;
  let conflicting = LockdownOptions {
    override_taming: Some(OverrideTaming::Min),
    ..Default::default()
  };
  match lockdown(&mut realm, conflicting) {
    Err(VmError::LockdownOptionConflict { name }) => assert_eq!(name, "overrideTaming"),
    other => panic!("unexpected {other:?}"),
  }
  Ok(())
}

#[test]
fn script_lockdown_follows_the_first_call() -> Result<(), VmError> {
  let mut realm = Realm::new()?;
  let v = realm.evaluate_script(
    "t",
    "[lockdown({ dateTaming: 'unsafe' }), lockdown(), lockdown({ dateTaming: 'unsafe' })].join()",
  )?;
  assert_eq!(v.as_str(), Some("true,already hardened,already hardened"));
  let conflict = realm.evaluate_script(
    "t",
    "try { lockdown({ dateTaming: 'safe' }); 'ok' } catch (e) { 'caught' }",
  );
  assert!(matches!(
    conflict,
    Err(VmError::LockdownOptionConflict { name }) if name == "dateTaming"
  ));
  Ok(())
}

#[test]
fn bad_options_from_script_are_named() -> Result<(), VmError> {
  let mut realm = Realm::new()?;
  match realm.evaluate_script("t", "lockdown({ mathTaming: 'sorta' })") {
    Err(err @ VmError::UnrecognizedOptionValue { .. }) => {
      assert_eq!(err.to_string(), "unrecognized mathTaming sorta")
    }
    other => panic!("unexpected {other:?}"),
  }
  match realm.evaluate_script("t", "lockdown({ fooTaming: 'safe' })") {
    Err(VmError::UnsupportedOption { names }) => assert_eq!(names, "fooTaming"),
    other => panic!("unexpected {other:?}"),
  }
  Ok(())
}

#[test]
fn harden_is_gated_on_lockdown() -> Result<(), VmError> {
  let mut realm = Realm::new()?;
  let obj = realm.new_object();
  assert!(matches!(
    harden(&mut realm, Value::Object(obj)),
    Err(VmError::HardenBeforeLockdown)
  ));
  assert!(!realm.heap().is_frozen(obj)?);
  lockdown(&mut realm, LockdownOptions::default())?;
  harden(&mut realm, Value::Object(obj))?;
  assert!(realm.heap().is_frozen(obj)?);
  Ok(())
}

#[test]
fn primordials_are_frozen() -> Result<(), VmError> {
  let mut realm = Realm::new()?;
  lockdown(&mut realm, LockdownOptions::default())?;
  let v = realm.evaluate_script(
    "t",
    "[Object.prototype, Array.prototype, Function.prototype, JSON, Reflect, Object, Promise].every(Object.isFrozen)",
  )?;
  assert!(v.same_value(&Value::Bool(true)));
  let v = realm.evaluate_script(
    "t",
    "try { Array.prototype.push = null; 'assigned' } catch (e) { e.name }",
  )?;
  assert_eq!(v.as_str(), Some("TypeError"));
  Ok(())
}

#[test]
fn function_constructors_are_inert() -> Result<(), VmError> {
  let mut realm = Realm::new()?;
  lockdown(&mut realm, LockdownOptions::default())?;
  let v = realm.evaluate_script(
    "t",
    "try { (function () {}).constructor('return 1'); 'constructed' } catch (e) { e.message }",
  )?;
  assert_eq!(v.as_str(), Some("Not available"));
  Ok(())
}

#[test]
fn endowed_functions_run_in_a_tamed_compartment() -> Result<(), VmError> {
  let mut realm = Realm::new()?;
  lockdown(&mut realm, LockdownOptions::default())?;
  let add = realm.new_native_function("add", 2, add)?;
  let endowments = realm.new_object();
  realm
    .heap_mut()
    .create_data_property_or_throw(endowments, "add", Value::Object(add))?;
  let c = realm.new_compartment(Some(endowments), CompartmentOptions::new().name("guest"))?;
  let v = realm.evaluate_in(c, "add(2, 3)", EvaluateOptions::new())?;
  assert_eq!(v.as_number(), Some(5.0));
  let v = realm.evaluate_in(c, "Date.now()", EvaluateOptions::new())?;
  assert!(v.as_number().is_some_and(f64::is_nan));
  let v = realm.evaluate_script("t", "Date.now() > 0")?;
  assert!(v.same_value(&Value::Bool(true)));
  Ok(())
}
