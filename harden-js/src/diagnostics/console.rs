//! Console sinks and the causal console.
//!
//! The realm owns one [`ConsoleSink`]. With console taming off, the JavaScript `console` methods
//! render their arguments and hand them straight to the sink. With taming on, they go through
//! the causal console first: error arguments are replaced by tags, and each tagged error is then
//! logged once with its message, filtered stack, notes and nested errors.

use super::annotations::tag_error;
use super::details::best_effort_stringify;
use super::details::is_error;
use crate::property::PropertyKey;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;
use std::cell::RefCell;
use std::rc::Rc;

/// Console severities, least severe first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
  Debug,
  Log,
  Info,
  Warn,
  Error,
}

impl LogLevel {
  /// The severity a console method logs at.
  pub fn for_method(method: &str) -> Option<LogLevel> {
    Some(match method {
      "debug" => LogLevel::Debug,
      "log" | "trace" | "dirxml" | "group" | "groupCollapsed" | "groupEnd" => LogLevel::Log,
      "info" => LogLevel::Info,
      "warn" => LogLevel::Warn,
      "error" => LogLevel::Error,
      _ => return None,
    })
  }
}

/// The console methods installed on every `console` object.
pub const CONSOLE_METHODS: [&str; 10] = [
  "debug",
  "log",
  "info",
  "warn",
  "error",
  "trace",
  "dirxml",
  "group",
  "groupCollapsed",
  "groupEnd",
];

/// Where rendered console output goes.
pub trait ConsoleSink {
  fn write(&mut self, level: LogLevel, method: &str, args: &[String]);
}

/// Emits console output as `tracing` events under the `harden_js::console` target.
pub struct TracingConsole;

impl ConsoleSink for TracingConsole {
  fn write(&mut self, level: LogLevel, method: &str, args: &[String]) {
    let text = args.join(" ");
    match level {
      LogLevel::Debug => tracing::debug!(target: "harden_js::console", method, "{text}"),
      LogLevel::Log | LogLevel::Info => tracing::info!(target: "harden_js::console", method, "{text}"),
      LogLevel::Warn => tracing::warn!(target: "harden_js::console", method, "{text}"),
      LogLevel::Error => tracing::error!(target: "harden_js::console", method, "{text}"),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
  pub level: LogLevel,
  pub method: String,
  pub args: Vec<String>,
}

/// Shared handle to the entries recorded by a [`LoggingConsole`].
#[derive(Clone, Default)]
pub struct ConsoleLog(Rc<RefCell<Vec<LogEntry>>>);

impl ConsoleLog {
  /// Returns everything logged since the last take.
  pub fn take(&self) -> Vec<LogEntry> {
    std::mem::take(&mut *self.0.borrow_mut())
  }
}

/// Records entries in memory.
pub struct LoggingConsole {
  log: ConsoleLog,
}

impl LoggingConsole {
  pub fn new() -> (LoggingConsole, ConsoleLog) {
    let log = ConsoleLog::default();
    (LoggingConsole { log: log.clone() }, log)
  }
}

impl ConsoleSink for LoggingConsole {
  fn write(&mut self, level: LogLevel, method: &str, args: &[String]) {
    self.log.0.borrow_mut().push(LogEntry {
      level,
      method: method.to_string(),
      args: args.to_vec(),
    });
  }
}

/// Passes on only entries at or above `threshold`.
pub struct FilteringConsole {
  inner: Box<dyn ConsoleSink>,
  threshold: LogLevel,
}

impl FilteringConsole {
  pub fn new(inner: Box<dyn ConsoleSink>, threshold: LogLevel) -> FilteringConsole {
    FilteringConsole { inner, threshold }
  }
}

impl ConsoleSink for FilteringConsole {
  fn write(&mut self, level: LogLevel, method: &str, args: &[String]) {
    if level >= self.threshold {
      self.inner.write(level, method, args);
    }
  }
}

/// Prefix of note lines.
const ERROR_NOTE: &str = "ERROR_NOTE:";

fn write(realm: &mut Realm, level: LogLevel, method: &str, args: Vec<String>) {
  realm.console.write(level, method, &args);
}

/// Renders one console argument without running JavaScript.
fn render(realm: &Realm, value: &Value) -> String {
  match value {
    Value::String(s) => s.to_string(),
    Value::Object(id) if !realm.heap.is_callable(value) && !is_error(realm, *id) => {
      best_effort_stringify(realm, value)
    }
    other => realm.display(other),
  }
}

/// Logs `args` through `method`, via the causal console when console taming is on.
pub(crate) fn dispatch(realm: &mut Realm, method: &str, args: &[Value]) {
  let level = LogLevel::for_method(method).unwrap_or(LogLevel::Log);
  if !realm.lockdown.causal_console {
    let rendered = args.iter().map(|a| render(realm, a)).collect();
    write(realm, level, method, rendered);
    return;
  }
  let mut sub_errors = Vec::new();
  let rendered = extract_error_args(realm, args, &mut sub_errors);
  write(realm, level, method, rendered);
  log_sub_errors(realm, sub_errors, None);
}

fn extract_error_args(realm: &mut Realm, args: &[Value], sub_errors: &mut Vec<ObjectId>) -> Vec<String> {
  let mut out = Vec::with_capacity(args.len());
  for arg in args {
    match arg {
      Value::Object(id) if is_error(realm, *id) => {
        sub_errors.push(*id);
        out.push(format!("({})", tag_error(realm, *id)));
      }
      other => out.push(render(realm, other)),
    }
  }
  out
}

fn log_error_info(
  realm: &mut Realm,
  error: ObjectId,
  note: bool,
  args: &[Value],
  sub_errors: &mut Vec<ObjectId>,
) {
  let tag = tag_error(realm, error);
  let head = if note {
    format!("{tag} {ERROR_NOTE}")
  } else {
    format!("{tag}:")
  };
  let mut line = vec![head];
  line.extend(extract_error_args(realm, args, sub_errors));
  write(realm, LogLevel::Debug, "debug", line);
}

fn log_sub_errors(realm: &mut Realm, sub_errors: Vec<ObjectId>, tag: Option<String>) {
  match (sub_errors.as_slice(), &tag) {
    ([], _) => return,
    ([only], None) => {
      log_error(realm, *only);
      return;
    }
    _ => {}
  }
  let mut label = match sub_errors.len() {
    1 => "Nested error".to_string(),
    n => format!("Nested {n} errors"),
  };
  if let Some(tag) = tag {
    label = format!("{label} under {tag}");
  }
  write(realm, LogLevel::Log, "group", vec![label]);
  for error in sub_errors {
    log_error(realm, error);
  }
  write(realm, LogLevel::Log, "groupEnd", Vec::new());
}

/// Logs a note that arrived after its error was logged.
pub(crate) fn log_note(realm: &mut Realm, error: ObjectId, args: Vec<Value>) {
  let mut sub_errors = Vec::new();
  log_error_info(realm, error, true, &args, &mut sub_errors);
  let tag = tag_error(realm, error);
  log_sub_errors(realm, sub_errors, Some(tag));
}

/// Logs `error` with its message, filtered stack, notes and nested errors. Each error is logged
/// at most once per realm.
pub fn log_error(realm: &mut Realm, error: ObjectId) {
  if realm.annotations.is_logged(error) {
    return;
  }
  let tag = tag_error(realm, error);
  let message = realm.annotations.take_message(error);
  let notes = realm.annotations.take_notes(error);
  let mut sub_errors = Vec::new();
  match message {
    Some(args) => log_error_info(realm, error, false, &args, &mut sub_errors),
    None => {
      let message = realm
        .inert_value(error, &PropertyKey::from("message"))
        .map(|v| realm.display(&v))
        .unwrap_or_default();
      write(realm, LogLevel::Debug, "debug", vec![format!("{tag}:"), message]);
    }
  }
  let frames = crate::builtins::error::stack_string(realm, error);
  let mut stack = frames.strip_prefix('\n').unwrap_or(&frames).to_string();
  if !stack.is_empty() && !stack.ends_with('\n') {
    stack.push('\n');
  }
  write(realm, LogLevel::Debug, "debug", vec![stack]);
  for note in notes {
    log_error_info(realm, error, true, &note, &mut sub_errors);
  }
  log_sub_errors(realm, sub_errors, Some(tag));
}

/// Logs any thrown value: errors through [`log_error`], anything else as one `error` line.
pub fn log_thrown(realm: &mut Realm, thrown: &Value) {
  match thrown {
    Value::Object(id) if is_error(realm, *id) => {
      let tag = tag_error(realm, *id);
      write(realm, LogLevel::Error, "error", vec![format!("({tag})")]);
      log_error(realm, *id);
    }
    other => {
      let rendered = render(realm, other);
      write(realm, LogLevel::Error, "error", vec![rendered]);
    }
  }
}

/// Logs an error returned to the host. Errors evaluated code could have caught are logged as the
/// JavaScript value it would have seen; the rest are returned unchanged.
pub fn log_vm_error(realm: &mut Realm, err: VmError) -> Result<(), VmError> {
  if !err.is_catchable() {
    return Err(err);
  }
  let thrown = realm.materialize_error(err)?;
  log_thrown(realm, &thrown);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::FilteringConsole;
  use super::LogLevel;
  use super::LoggingConsole;
  use super::ConsoleSink;

  #[test]
  fn filtering_console_drops_lower_levels() {
    let (logging, log) = LoggingConsole::new();
    let mut filtering = FilteringConsole::new(Box::new(logging), LogLevel::Warn);
    filtering.write(LogLevel::Info, "info", &["quiet".to_string()]);
    filtering.write(LogLevel::Error, "error", &["loud".to_string()]);
    let entries = log.take();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].args, vec!["loud".to_string()]);
    assert!(log.take().is_empty());
  }

  #[test]
  fn method_levels() {
    assert_eq!(LogLevel::for_method("groupCollapsed"), Some(LogLevel::Log));
    assert_eq!(LogLevel::for_method("table"), None);
    assert!(LogLevel::Debug < LogLevel::Error);
  }
}
