use harden_js::lockdown;
use harden_js::CompartmentOptions;
use harden_js::EvaluateOptions;
use harden_js::LockdownOptions;
use harden_js::OverrideTaming;
use harden_js::Realm;
use harden_js::VmError;

fn locked_down(override_taming: OverrideTaming) -> Result<Realm, VmError> {
  let mut realm = Realm::new()?;
  lockdown(
    &mut realm,
    LockdownOptions {
      override_taming: Some(override_taming),
      ..Default::default()
    },
  )?;
  Ok(realm)
}

fn eval(realm: &mut Realm, source: &str) -> Result<String, VmError> {
  let c = realm.new_compartment(None, CompartmentOptions::new())?;
  let v = realm.evaluate_in(c, source, EvaluateOptions::new())?;
  Ok(realm.display(&v))
}

#[test]
fn instances_can_override_repaired_properties() -> Result<(), VmError> {
  let mut realm = locked_down(OverrideTaming::Moderate)?;
  let out = eval(
    &mut realm,
    r#"
      const point = { x: 1 };
      point.toString = function () { return 'point'; };
      const list = [];
      list.push = function () { return 'pushed'; };
      [String(point), list.push(), Object.prototype.hasOwnProperty.call(point, 'toString')].join()
    "#,
  )?;
  assert_eq!(out, "point,pushed,true");
  Ok(())
}

#[test]
fn overrides_leave_reads_unchanged() -> Result<(), VmError> {
  let mut realm = locked_down(OverrideTaming::Moderate)?;
  let out = eval(
    &mut realm,
    "[({}).toString(), [1, 2].toString(), typeof Function.prototype.bind, new TypeError('m').name].join('|')",
  )?;
  assert_eq!(out, "[object Object]|1,2|function|TypeError");
  Ok(())
}

#[test]
fn assigning_through_the_prototype_is_rejected() -> Result<(), VmError> {
  let mut realm = locked_down(OverrideTaming::Moderate)?;
  let out = eval(
    &mut realm,
    "try { Object.prototype.toString = null; 'assigned' } catch (e) { e.message }",
  )?;
  assert_eq!(
    out,
    "Cannot assign to read only property 'toString' of 'root.ObjectPrototype.toString'"
  );
  Ok(())
}

#[test]
fn min_taming_leaves_other_properties_read_only() -> Result<(), VmError> {
  let mut realm = locked_down(OverrideTaming::Min)?;
  let out = eval(
    &mut realm,
    r#"
      const o = {};
      o.toString = () => 'ok';
      let pushed;
      try { const a = []; a.push = null; pushed = 'assigned'; } catch (e) { pushed = e.name; }
      [o.toString(), pushed].join()
    "#,
  )?;
  assert_eq!(out, "ok,TypeError");
  Ok(())
}

#[test]
fn severe_taming_repairs_every_object_prototype_property() -> Result<(), VmError> {
  let mut realm = locked_down(OverrideTaming::Severe)?;
  let out = eval(
    &mut realm,
    r#"
      const o = {};
      o.hasOwnProperty = () => 'mine';
      o.isPrototypeOf = () => 'also mine';
      [o.hasOwnProperty(), o.isPrototypeOf(), typeof Object.getOwnPropertyDescriptor(Object.prototype, 'valueOf').get].join()
    "#,
  )?;
  assert_eq!(out, "mine,also mine,function");
  Ok(())
}

#[test]
fn repaired_error_prototypes_keep_error_names() -> Result<(), VmError> {
  let mut realm = locked_down(OverrideTaming::Moderate)?;
  let c = realm.new_compartment(None, CompartmentOptions::new())?;
  let type_error = realm.evaluate_in(c, "new TypeError('boom')", EvaluateOptions::new())?;
  assert_eq!(realm.display(&type_error), "TypeError: boom");
  let range_error = realm.evaluate_in(c, "new RangeError()", EvaluateOptions::new())?;
  assert_eq!(realm.display(&range_error), "RangeError: ");
  let plain = realm.evaluate_in(c, "String(new TypeError('boom'))", EvaluateOptions::new())?;
  assert_eq!(plain.as_str(), Some("TypeError: boom"));
  Ok(())
}
