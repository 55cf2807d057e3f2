use harden_js::lockdown;
use harden_js::CompartmentOptions;
use harden_js::EvaluateOptions;
use harden_js::LockdownOptions;
use harden_js::Realm;
use harden_js::Taming;
use harden_js::VmError;

fn run(options: LockdownOptions, source: &str) -> Result<(String, String), VmError> {
  let mut realm = Realm::new()?;
  lockdown(&mut realm, options)?;
  let c = realm.new_compartment(None, CompartmentOptions::new())?;
  let guest = realm.evaluate_in(c, source, EvaluateOptions::new())?;
  let host = realm.evaluate_script("host.js", source)?;
  Ok((realm.display(&guest), realm.display(&host)))
}

#[test]
fn shared_date_has_no_clock() -> Result<(), VmError> {
  let (guest, host) = run(
    LockdownOptions::default(),
    "[Date.now() > 0, String(new Date()), new Date(0).getTime(), typeof Date.parse].join()",
  )?;
  assert_eq!(guest, "false,Invalid Date,0,function");
  assert!(host.starts_with("true,"), "{host}");
  Ok(())
}

#[test]
fn unsafe_date_taming_keeps_the_clock() -> Result<(), VmError> {
  let options = LockdownOptions {
    date_taming: Some(Taming::Unsafe),
    ..Default::default()
  };
  let (guest, _) = run(options, "Date.now() > 0")?;
  assert_eq!(guest, "true");
  Ok(())
}

#[test]
fn shared_math_has_no_random() -> Result<(), VmError> {
  let (guest, host) = run(LockdownOptions::default(), "[typeof Math.random, Math.max(1, 3)].join()")?;
  assert_eq!(guest, "undefined,3");
  assert_eq!(host, "function,3");
  let options = LockdownOptions {
    math_taming: Some(Taming::Unsafe),
    ..Default::default()
  };
  let (guest, _) = run(options, "typeof Math.random")?;
  assert_eq!(guest, "function");
  Ok(())
}

#[test]
fn shared_error_hides_stack_trace_controls() -> Result<(), VmError> {
  let (guest, host) = run(
    LockdownOptions::default(),
    "Error.stackTraceLimit = 5; [typeof Error.captureStackTrace, Error.stackTraceLimit, new TypeError('x') instanceof Error].join()",
  )?;
  assert_eq!(guest, "undefined,,true");
  assert_eq!(host, "function,5,true");
  Ok(())
}

#[test]
fn error_prototype_loses_its_stack_accessor() -> Result<(), VmError> {
  let (guest, _) = run(
    LockdownOptions::default(),
    "'stack' in Error.prototype",
  )?;
  assert_eq!(guest, "false");
  let options = LockdownOptions {
    error_taming: Some(Taming::Unsafe),
    ..Default::default()
  };
  let (guest, _) = run(options, "'stack' in Error.prototype")?;
  assert_eq!(guest, "false");
  Ok(())
}

#[test]
fn regexp_compile_is_removed() -> Result<(), VmError> {
  let (guest, host) = run(
    LockdownOptions::default(),
    "[typeof RegExp.prototype.compile, /a+/g.global, RegExp === /x/.constructor].join()",
  )?;
  assert_eq!(guest, "undefined,true,true");
  assert_eq!(host, "undefined,true,false");
  Ok(())
}

#[test]
fn locale_methods_fall_back_to_their_plain_forms() -> Result<(), VmError> {
  let source = "['b'.localeCompare('a'), 'a'.localeCompare('b'), 'a'.localeCompare('a'), Object.prototype.toLocaleString === Object.prototype.toString, 'abc'.toLocaleUpperCase() === 'abc'.toUpperCase()].join()";
  let (guest, host) = run(LockdownOptions::default(), source)?;
  assert_eq!(guest, "1,-1,0,true,true");
  assert_eq!(host, guest);
  Ok(())
}
