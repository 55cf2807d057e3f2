use harden_js::diagnostics::console::log_error;
use harden_js::diagnostics::console::LogLevel;
use harden_js::diagnostics::console::LoggingConsole;
use harden_js::diagnostics::details;
use harden_js::diagnostics::make_error;
use harden_js::diagnostics::note;
use harden_js::diagnostics::quote;
use harden_js::diagnostics::redact;
use harden_js::diagnostics::console::ConsoleLog;
use harden_js::lockdown;
use harden_js::property::PropertyKey;
use harden_js::ErrorKind;
use harden_js::LockdownOptions;
use harden_js::Realm;
use harden_js::StackFiltering;
use harden_js::Taming;
use harden_js::VmError;

fn realm_with_log(options: LockdownOptions) -> Result<(Realm, ConsoleLog), VmError> {
  let mut realm = Realm::new()?;
  let (sink, log) = LoggingConsole::new();
  realm.set_console_sink(Box::new(sink));
  lockdown(&mut realm, options)?;
  Ok((realm, log))
}

fn args(items: &[&str]) -> Vec<String> {
  items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn causal_console_replaces_errors_with_tags() -> Result<(), VmError> {
  let (mut realm, log) = realm_with_log(LockdownOptions::default())?;
  realm.evaluate_script(
    "app.js",
    "const e = new TypeError('boom'); console.error('failed:', e); console.log('again', e);",
  )?;
  let entries = log.take();
  assert_eq!(entries.len(), 4, "{entries:?}");
  assert_eq!(entries[0].level, LogLevel::Error);
  assert_eq!(entries[0].args, args(&["failed:", "(TypeError#1)"]));
  assert_eq!(entries[1].method, "debug");
  assert_eq!(entries[1].args, args(&["TypeError#1:", "boom"]));
  assert!(entries[2].args[0].contains("app.js"), "{:?}", entries[2]);
  // Each error's details are logged once.
  assert_eq!(entries[3].args, args(&["again", "(TypeError#1)"]));
  Ok(())
}

#[test]
fn untamed_console_renders_errors_inline() -> Result<(), VmError> {
  let options = LockdownOptions {
    console_taming: Some(Taming::Unsafe),
    ..Default::default()
  };
  let (mut realm, log) = realm_with_log(options)?;
  realm.evaluate_script("app.js", "console.warn('n =', 1, new RangeError('far'))")?;
  let entries = log.take();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].level, LogLevel::Warn);
  assert_eq!(entries[0].args, args(&["n =", "1", "RangeError: far"]));
  Ok(())
}

#[test]
fn redacted_details_reach_only_the_console() -> Result<(), VmError> {
  let (mut realm, log) = realm_with_log(LockdownOptions::default())?;
  let d = details(
    &["Password ", " rejected for ", ""],
    vec![redact("hunter2"), quote("alice")],
  );
  let error = make_error(&mut realm, &d, ErrorKind::Type)?;
  let message = realm.get(error, &PropertyKey::from("message"))?;
  assert_eq!(message.as_str(), Some("Password (a string) rejected for \"alice\""));

  note(&mut realm, error, &details(&["while logging in"], Vec::new()));
  log_error(&mut realm, error);
  let entries = log.take();
  assert_eq!(entries.len(), 3, "{entries:?}");
  assert_eq!(
    entries[0].args,
    args(&["TypeError#1:", "Password", "hunter2", "rejected for", "alice"])
  );
  assert_eq!(entries[2].args, args(&["TypeError#1 ERROR_NOTE:", "while logging in"]));

  note(&mut realm, error, &details(&["late"], Vec::new()));
  let entries = log.take();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].args, args(&["TypeError#1 ERROR_NOTE:", "late"]));
  Ok(())
}

fn stack_through_a_dependency(filtering: StackFiltering) -> Result<String, VmError> {
  let (mut realm, _) = realm_with_log(LockdownOptions {
    stack_filtering: Some(filtering),
    ..Default::default()
  })?;
  realm.evaluate_script(
    "/app/node_modules/dep/index.js",
    "globalThis.make = function make() { return new Error('x'); };",
  )?;
  let v = realm.evaluate_script("app.js", "function outer() { return make(); } getStackString(outer())")?;
  Ok(v.as_str().unwrap_or_default().to_string())
}

#[test]
fn concise_stacks_hide_dependency_frames() -> Result<(), VmError> {
  let concise = stack_through_a_dependency(StackFiltering::Concise)?;
  assert!(concise.contains("outer (app.js:"), "{concise}");
  assert!(!concise.contains("node_modules"), "{concise}");
  let verbose = stack_through_a_dependency(StackFiltering::Verbose)?;
  assert!(verbose.contains("make (/app/node_modules/dep/index.js:"), "{verbose}");
  Ok(())
}
