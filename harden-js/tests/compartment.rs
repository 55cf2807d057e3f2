use harden_js::lockdown;
use harden_js::CompartmentId;
use harden_js::CompartmentOptions;
use harden_js::CompartmentState;
use harden_js::EvaluateOptions;
use harden_js::LockdownOptions;
use harden_js::Realm;
use harden_js::Transform;
use harden_js::Value;
use harden_js::VmError;
use serde_json::json;

fn locked_down() -> Result<Realm, VmError> {
  let mut realm = Realm::new()?;
  lockdown(&mut realm, LockdownOptions::default())?;
  Ok(realm)
}

fn endowed(realm: &mut Realm, endowments: serde_json::Value) -> Result<CompartmentId, VmError> {
  let Value::Object(endowments) = realm.value_from_json(&endowments)? else {
    panic!("endowments must be an object");
  };
  realm.new_compartment(Some(endowments), CompartmentOptions::new())
}

fn eval_str(realm: &mut Realm, c: CompartmentId, source: &str) -> Result<String, VmError> {
  let v = realm.evaluate_in(c, source, EvaluateOptions::new())?;
  Ok(realm.display(&v))
}

#[test]
fn compartments_have_disjoint_globals() -> Result<(), VmError> {
  let mut realm = locked_down()?;
  let a = endowed(&mut realm, json!({ "who": "a" }))?;
  let b = endowed(&mut realm, json!({ "who": "b" }))?;
  assert_ne!(realm.compartment_global(a)?, realm.compartment_global(b)?);
  assert_eq!(eval_str(&mut realm, a, "globalThis.note = who; who")?, "a");
  assert_eq!(eval_str(&mut realm, b, "[who, typeof note].join()")?, "b,undefined");
  let v = realm.evaluate_script("t", "[typeof who, typeof note].join()")?;
  assert_eq!(v.as_str(), Some("undefined,undefined"));
  Ok(())
}

#[test]
fn compartments_share_hardened_intrinsics() -> Result<(), VmError> {
  let mut realm = locked_down()?;
  let a = realm.new_compartment(None, CompartmentOptions::new())?;
  let b = realm.new_compartment(None, CompartmentOptions::new())?;
  let array_a = realm.evaluate_in(a, "Array", EvaluateOptions::new())?;
  let array_b = realm.evaluate_in(b, "Array", EvaluateOptions::new())?;
  assert!(array_a.same_value(&array_b));
  let eval_a = realm.evaluate_in(a, "globalThis.eval", EvaluateOptions::new())?;
  let eval_b = realm.evaluate_in(b, "globalThis.eval", EvaluateOptions::new())?;
  assert!(!eval_a.same_value(&eval_b));
  assert_eq!(eval_str(&mut realm, a, "Object.isFrozen(globalThis)")?, "false");
  Ok(())
}

#[test]
fn top_level_declarations_stay_local_to_one_evaluation() -> Result<(), VmError> {
  let mut realm = locked_down()?;
  let c = realm.new_compartment(None, CompartmentOptions::new())?;
  assert_eq!(eval_str(&mut realm, c, "const local = 1; var alsoLocal = 2; local + alsoLocal")?, "3");
  assert_eq!(eval_str(&mut realm, c, "[typeof local, typeof alsoLocal].join()")?, "undefined,undefined");
  assert_eq!(eval_str(&mut realm, c, "this === globalThis")?, "true");
  Ok(())
}

#[test]
fn eval_inside_a_compartment_is_the_compartment_evaluator() -> Result<(), VmError> {
  let mut realm = locked_down()?;
  let c = realm.new_compartment(None, CompartmentOptions::new())?;
  let options = EvaluateOptions::new().reject_some_direct_eval_expressions(false);
  let v = realm.evaluate_in(
    c,
    "globalThis.g = 40; const hidden = 1; [eval('g + 2'), eval === globalThis.eval, eval('typeof hidden')].join()",
    options,
  )?;
  assert_eq!(v.as_str(), Some("42,true,undefined"));
  Ok(())
}

#[test]
fn direct_eval_looking_source_is_rejected_by_default() -> Result<(), VmError> {
  let mut realm = locked_down()?;
  let c = realm.new_compartment(None, CompartmentOptions::new())?;
  match realm.evaluate_in(c, "eval('1')", EvaluateOptions::new()) {
    Err(VmError::RejectedSource { code, .. }) => assert_eq!(code, "SES_EVAL_REJECTED"),
    other => panic!("unexpected {other:?}"),
  }
  assert_eq!(realm.compartment_state(c)?, CompartmentState::Constructed);
  let v = realm.evaluate_in(c, "const evaluate = 1; evaluate", EvaluateOptions::new())?;
  assert_eq!(v.as_number(), Some(1.0));
  Ok(())
}

#[test]
fn global_lexicals_are_visible_but_not_global() -> Result<(), VmError> {
  let mut realm = locked_down()?;
  let c = realm.new_compartment(
    None,
    CompartmentOptions::new().name("lexical").global_lexical("answer", 42.0),
  )?;
  assert_eq!(
    eval_str(&mut realm, c, "[answer, typeof globalThis.answer, 'answer' in globalThis].join()")?,
    "42,undefined,false"
  );
  assert_eq!(
    eval_str(&mut realm, c, "try { answer = 1; 'assigned' } catch (e) { e.name }")?,
    "TypeError"
  );
  Ok(())
}

#[test]
fn unmentionable_lexical_names_are_refused() -> Result<(), VmError> {
  let mut realm = locked_down()?;
  let options = CompartmentOptions::new()
    .global_lexical("ok", 1.0)
    .global_lexical("eval", 2.0)
    .global_lexical("not-an-identifier", 3.0);
  match realm.new_compartment(None, options) {
    Err(VmError::TypeError(message)) => assert_eq!(
      message,
      "Cannot create compartment with invalid names for global lexicals: eval, not-an-identifier; these names would not be lexically mentionable"
    ),
    other => panic!("unexpected {other:?}"),
  }
  Ok(())
}

#[test]
fn sloppy_globals_mode_creates_globals() -> Result<(), VmError> {
  let mut realm = locked_down()?;
  let c = realm.new_compartment(None, CompartmentOptions::new())?;
  assert!(matches!(
    realm.evaluate_in(c, "undeclared = 1", EvaluateOptions::new()),
    Err(VmError::ReferenceError(_))
  ));
  let v = realm.evaluate_in(
    c,
    "created = 7; globalThis.created",
    EvaluateOptions::new().sloppy_globals_mode(true),
  )?;
  assert_eq!(v.as_number(), Some(7.0));
  assert_eq!(eval_str(&mut realm, c, "created")?, "7");
  Ok(())
}

#[test]
fn compartments_nest() -> Result<(), VmError> {
  let mut realm = locked_down()?;
  let c = realm.new_compartment(None, CompartmentOptions::new().name("outer"))?;
  let out = eval_str(
    &mut realm,
    c,
    r#"
      const inner = new Compartment({ x: 1 }, {}, { name: 'inner' });
      [
        inner.evaluate('x + 1'),
        inner.name,
        inner.globalThis === globalThis,
        inner.evaluate('Compartment') === Compartment,
        String(inner),
      ].join()
    "#,
  )?;
  assert_eq!(out, "2,inner,false,false,[object Compartment]");
  Ok(())
}

#[test]
fn function_constructor_evaluates_in_the_compartment() -> Result<(), VmError> {
  let mut realm = locked_down()?;
  let c = endowed(&mut realm, json!({ "base": 10 }))?;
  let out = eval_str(
    &mut realm,
    c,
    "[Function('a', 'b', 'return a + b + base')(1, 2), Function('return globalThis')() === globalThis, typeof Function('return this')()].join()",
  )?;
  assert_eq!(out, "13,true,undefined");
  Ok(())
}

#[test]
fn transforms_run_local_first() -> Result<(), VmError> {
  let mut realm = locked_down()?;
  let c = realm.new_compartment(
    None,
    CompartmentOptions::new().transform(Transform::native(|s| Ok(s.replace("ANSWER", "42")))),
  )?;
  let local = Transform::native(|s| Ok(s.replace("QUESTION", "ANSWER")));
  let v = realm.evaluate_in(c, "QUESTION", EvaluateOptions::new().transform(local))?;
  assert_eq!(v.as_number(), Some(42.0));

  let out = eval_str(
    &mut realm,
    c,
    "new Compartment({}, {}, { transforms: [s => s.replace('one', '1')] }).evaluate('one + 1')",
  )?;
  assert_eq!(out, "2");
  Ok(())
}

#[test]
fn html_comments_are_rejected_unless_evaded() -> Result<(), VmError> {
  let mut realm = locked_down()?;
  let c = realm.new_compartment(None, CompartmentOptions::new())?;
  match realm.evaluate_in(c, "'<!--'", EvaluateOptions::new()) {
    Err(VmError::RejectedSource { code, message }) => {
      assert_eq!(code, "SES_HTML_COMMENT_REJECTED");
      assert_eq!(message, "Possible HTML comment rejected at <unknown>:1.");
    }
    other => panic!("unexpected {other:?}"),
  }
  let v = realm.evaluate_in(c, "'<!--'", EvaluateOptions::new().evade_html_comment_test(true))?;
  assert_eq!(v.as_str(), Some("< ! --"));
  let out = eval_str(
    &mut realm,
    c,
    "try { new Compartment().evaluate('imp' + 'ort(\"m\")') } catch (e) { e.name }",
  )?;
  assert_eq!(out, "SyntaxError");
  Ok(())
}

#[test]
fn evaluate_requires_a_string() -> Result<(), VmError> {
  let mut realm = locked_down()?;
  let c = realm.new_compartment(None, CompartmentOptions::new())?;
  let out = eval_str(
    &mut realm,
    c,
    "try { new Compartment().evaluate(42) } catch (e) { e.message }",
  )?;
  assert_eq!(out, "first argument of evaluate() must be a string");
  Ok(())
}
