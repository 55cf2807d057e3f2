use harden_js::lockdown;
use harden_js::CompartmentOptions;
use harden_js::EvaluateOptions;
use harden_js::LockdownOptions;
use harden_js::Realm;
use harden_js::VmError;
use proptest::prelude::*;

#[test]
fn injected_prototype_properties_are_removed() -> Result<(), VmError> {
  let mut realm = Realm::new()?;
  realm.evaluate_script(
    "inject.js",
    "Object.prototype.mallory = function () { return 'pwned'; }; JSON.extra = 1;",
  )?;
  lockdown(&mut realm, LockdownOptions::default())?;
  let v = realm.evaluate_script("t", "['mallory' in Object.prototype, 'extra' in JSON].join()")?;
  assert_eq!(v.as_str(), Some("false,false"));

  let c = realm.new_compartment(None, CompartmentOptions::new())?;
  let v = realm.evaluate_in(c, "typeof ({}).mallory", EvaluateOptions::new())?;
  assert_eq!(v.as_str(), Some("undefined"));
  Ok(())
}

#[test]
fn permitted_properties_survive() -> Result<(), VmError> {
  let mut realm = Realm::new()?;
  lockdown(&mut realm, LockdownOptions::default())?;
  let c = realm.new_compartment(None, CompartmentOptions::new())?;
  let v = realm.evaluate_in(
    c,
    "[typeof Array.prototype.map, typeof Object.keys, typeof JSON.stringify, typeof Math.random].join()",
    EvaluateOptions::new(),
  )?;
  assert_eq!(v.as_str(), Some("function,function,function,undefined"));
  let v = realm.evaluate_script("t", "typeof Math.random")?;
  assert_eq!(v.as_str(), Some("function"));
  Ok(())
}

#[test]
fn every_registry_object_is_frozen() -> Result<(), VmError> {
  let mut realm = Realm::new()?;
  assert!(realm.lockdown_intrinsics().is_none());
  lockdown(&mut realm, LockdownOptions::default())?;
  let Some(registry) = realm.lockdown_intrinsics().cloned() else {
    panic!("lockdown left no registry");
  };
  assert!(registry.is_finalized());
  assert!(registry.contains("%SharedDate%") && registry.contains("%InitialDate%"));
  for (name, value) in registry.iter() {
    if let Some(obj) = value.as_object() {
      assert!(realm.heap().is_frozen(obj)?, "{name} is not frozen");
    }
  }
  Ok(())
}

fn name() -> impl Strategy<Value = String> {
  "[a-z]{1,6}".prop_map(|s| format!("injected_{s}"))
}

fn target() -> impl Strategy<Value = &'static str> {
  prop::sample::select(vec![
    "Object.prototype",
    "Array.prototype",
    "Function.prototype",
    "String.prototype",
    "Object",
    "JSON",
    "Reflect",
    "Promise",
  ])
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(24))]

  #[test]
  fn any_injected_property_is_removed(
    injections in prop::collection::vec((target(), name()), 1..5),
  ) {
    let mut realm = Realm::new().unwrap();
    let script: String = injections
      .iter()
      .map(|(target, name)| format!("{target}.{name} = 1;"))
      .collect();
    realm.evaluate_script("inject.js", &script).unwrap();
    lockdown(&mut realm, LockdownOptions::default()).unwrap();
    for (target, name) in &injections {
      let v = realm
        .evaluate_script("check.js", &format!("Object.getOwnPropertyNames({target}).includes('{name}')"))
        .unwrap();
      prop_assert!(v.same_value(&harden_js::Value::Bool(false)), "{target}.{name} survived");
    }
  }
}
