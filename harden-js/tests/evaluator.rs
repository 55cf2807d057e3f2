use harden_js::lockdown;
use harden_js::CompartmentId;
use harden_js::CompartmentOptions;
use harden_js::EvaluateOptions;
use harden_js::LockdownOptions;
use harden_js::Realm;
use harden_js::Value;
use harden_js::VmError;
use serde_json::json;

fn guest() -> Result<(Realm, CompartmentId), VmError> {
  let mut realm = Realm::new()?;
  lockdown(&mut realm, LockdownOptions::default())?;
  let c = realm.new_compartment(None, CompartmentOptions::new().name("guest"))?;
  Ok((realm, c))
}

fn eval(source: &str) -> Result<Value, VmError> {
  let (mut realm, c) = guest()?;
  realm.evaluate_in(c, source, EvaluateOptions::new())
}

#[test]
fn function_declaration_call_and_closure_capture() -> Result<(), VmError> {
  let value = eval(
    r#"
      function makeAdder(x) {
        return function (y) { return x + y; };
      }
      const add5 = makeAdder(5);
      add5(3)
    "#,
  )?;
  assert_eq!(value.as_number(), Some(8.0));
  Ok(())
}

#[test]
fn new_and_prototype_lookup() -> Result<(), VmError> {
  let value = eval(
    r#"
      function C() { this.x = 1; }
      C.prototype.y = 2;
      const o = new C();
      o.x + o.y
    "#,
  )?;
  assert_eq!(value.as_number(), Some(3.0));
  Ok(())
}

#[test]
fn try_catch_finally_ordering() -> Result<(), VmError> {
  let value = eval(
    r#"
      const log = [];
      function f() {
        try { log.push('try'); throw { x: 1 }; }
        catch (e) { log.push('catch ' + e.x); return 'returned'; }
        finally { log.push('finally'); }
      }
      log.push(f());
      log.join('|')
    "#,
  )?;
  assert_eq!(value.as_str(), Some("try|catch 1|finally|returned"));
  Ok(())
}

#[test]
fn loops_templates_and_spread() -> Result<(), VmError> {
  let value = eval(
    r#"
      const parts = [];
      for (const n of [1, 2, 3]) { if (n === 2) continue; parts.push(`n=${n}`); }
      for (const k in { a: 1, b: 2 }) parts.push(k);
      let i = 0;
      while (true) { if (++i > 2) break; }
      parts.push(Math.max(...[4, 9, 2]), i, null ?? 'dflt');
      parts.join()
    "#,
  )?;
  assert_eq!(value.as_str(), Some("n=1,n=3,a,b,9,3,dflt"));
  Ok(())
}

#[test]
fn accessors_in_object_literals() -> Result<(), VmError> {
  let value = eval(
    r#"
      let stored = 0;
      const o = { get v() { return stored * 2; }, set v(x) { stored = x; } };
      o.v = 21;
      o.v
    "#,
  )?;
  assert_eq!(value.as_number(), Some(42.0));
  Ok(())
}

#[test]
fn thrown_values_reach_the_host() -> Result<(), VmError> {
  let (mut realm, c) = guest()?;
  match realm.evaluate_in(c, "throw 'plain'", EvaluateOptions::new()) {
    Err(VmError::Throw(v)) => assert_eq!(v.as_str(), Some("plain")),
    other => panic!("unexpected {other:?}"),
  }
  assert!(matches!(
    realm.evaluate_in(c, "missing + 1", EvaluateOptions::new()),
    Err(VmError::ReferenceError(_))
  ));
  assert!(matches!(
    realm.evaluate_in(c, "let = ;", EvaluateOptions::new()),
    Err(VmError::Syntax(_))
  ));
  Ok(())
}

#[test]
fn json_crosses_the_host_boundary() -> Result<(), VmError> {
  let (mut realm, c) = guest()?;
  let input = realm.value_from_json(&json!({ "items": [1, 2, 3], "label": "sum" }))?;
  let global = realm.compartment_global(c)?;
  realm.heap_mut().create_data_property_or_throw(global, "input", input)?;
  let out = realm.evaluate_in(
    c,
    "({ label: input.label, total: input.items.reduce((a, b) => a + b, 0) })",
    EvaluateOptions::new(),
  )?;
  assert_eq!(realm.to_json(out)?.as_deref(), Some(r#"{"label":"sum","total":6}"#));
  let nothing = realm.evaluate_in(c, "undefined", EvaluateOptions::new())?;
  assert_eq!(realm.to_json(nothing)?, None);
  Ok(())
}

#[test]
fn deeply_nested_source_is_a_syntax_error() -> Result<(), VmError> {
  let (mut realm, c) = guest()?;
  let arrays = format!("{}1{}", "[".repeat(5000), "]".repeat(5000));
  let sum = vec!["1"; 5000].join(" + ");
  let members = format!("a{}", ".b".repeat(5000));
  let blocks = format!("{}{}", "{".repeat(5000), "}".repeat(5000));
  for source in [&arrays, &sum, &members, &blocks] {
    assert!(matches!(
      realm.evaluate_in(c, source, EvaluateOptions::new()),
      Err(VmError::Syntax(_))
    ));
  }
  // The parser is still usable afterwards.
  let value = realm.evaluate_in(c, "[[[1]]][0][0][0] + 1", EvaluateOptions::new())?;
  assert_eq!(value.as_number(), Some(2.0));
  Ok(())
}

#[test]
fn nesting_across_calls_exhausts_the_stack() -> Result<(), VmError> {
  let (mut realm, c) = guest()?;
  let nested = format!("{}f(n - 1){}", "[".repeat(30), "]".repeat(30));
  let source = format!(
    r#"
      function f(n) {{ return n === 0 ? 0 : {nested}; }}
      function g(n) {{ return n === 0 ? 0 : 1 + g(n - 1); }}
      let shallow;
      try {{ f(40); shallow = 'returned'; }} catch (e) {{ shallow = e instanceof RangeError; }}
      [shallow, g(30)].join()
    "#
  );
  let value = realm.evaluate_in(c, &source, EvaluateOptions::new())?;
  assert_eq!(value.as_str(), Some("true,30"));
  let value = realm.evaluate_in(
    c,
    "function g(n) { return n === 0 ? 0 : 1 + g(n - 1); } g(50)",
    EvaluateOptions::new(),
  )?;
  assert_eq!(value.as_number(), Some(50.0));
  Ok(())
}
