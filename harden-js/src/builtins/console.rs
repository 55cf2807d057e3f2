use super::HostIntrinsics;
use super::Installer;
use crate::diagnostics::console::dispatch;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::Value;
use crate::VmError;

macro_rules! console_methods {
  ($($name:ident => $method:literal;)*) => {
    $(
      fn $name(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
        dispatch(realm, $method, inv.args);
        Ok(Value::Undefined)
      }
    )*

    pub(crate) fn install(ins: &mut Installer<'_>, i: &HostIntrinsics) -> Result<(), VmError> {
      $(
        ins.method(i.console, $method, 0, $name)?;
      )*
      Ok(())
    }
  };
}

console_methods! {
  console_debug => "debug";
  console_log => "log";
  console_info => "info";
  console_warn => "warn";
  console_error => "error";
  console_trace => "trace";
  console_dirxml => "dirxml";
  console_group => "group";
  console_group_collapsed => "groupCollapsed";
  console_group_end => "groupEnd";
}

#[cfg(test)]
mod tests {
  use crate::diagnostics::console::LogLevel;
  use crate::diagnostics::console::LoggingConsole;
  use crate::Realm;
  use crate::VmError;

  #[test]
  fn raw_console_renders_arguments() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let (sink, log) = LoggingConsole::new();
    realm.set_console_sink(Box::new(sink));
    realm.evaluate_script("t", "console.warn('n =', 1, { a: 'b' }, [1, 2]); console.groupEnd()")?;
    let entries = log.take();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].level, LogLevel::Warn);
    assert_eq!(entries[0].args, vec!["n =", "1", r#"{"a":"b"}"#, "[1,2]"]);
    assert_eq!(entries[1].method, "groupEnd");
    Ok(())
  }
}
