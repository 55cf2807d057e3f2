use super::HostIntrinsics;
use super::Installer;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;

/// Indirect calls to the host `eval` run the text as a script on the host global object. Direct
/// calls are handled by the interpreter.
pub(crate) fn feral_eval(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  match inv.arg(0) {
    Value::String(text) => realm.evaluate_script("eval", &text),
    other => Ok(other),
  }
}

/// Builds the host global object. Every binding is writable and configurable so host code and
/// lockdown can still rearrange it.
pub(crate) fn create_host_global(ins: &mut Installer<'_>, i: &HostIntrinsics) -> Result<ObjectId, VmError> {
  let global = ins.heap.alloc_ordinary(Some(i.object_prototype));
  let bindings = [
    ("Array", i.array),
    ("Boolean", i.boolean),
    ("Compartment", i.compartment),
    ("Date", i.date),
    ("Error", i.error),
    ("EvalError", i.eval_error),
    ("Function", i.function),
    ("JSON", i.json),
    ("Math", i.math),
    ("Number", i.number),
    ("Object", i.object),
    ("Promise", i.promise),
    ("RangeError", i.range_error),
    ("ReferenceError", i.reference_error),
    ("Reflect", i.reflect),
    ("RegExp", i.regexp),
    ("String", i.string),
    ("Symbol", i.symbol),
    ("SyntaxError", i.syntax_error),
    ("TypeError", i.type_error),
    ("URIError", i.uri_error),
    ("console", i.console),
    ("eval", i.feral_eval),
    ("harden", i.harden),
    ("isFinite", i.is_finite),
    ("isNaN", i.is_nan),
    ("lockdown", i.lockdown),
    ("parseFloat", i.parse_float),
    ("parseInt", i.parse_int),
  ];
  for (name, value) in bindings {
    ins.value(global, name, value)?;
  }
  ins.value(global, "globalThis", global)?;
  ins.constant(global, "Infinity", f64::INFINITY)?;
  ins.constant(global, "NaN", f64::NAN)?;
  ins.constant(global, "undefined", Value::Undefined)?;
  Ok(global)
}

#[cfg(test)]
mod tests {
  use crate::Realm;
  use crate::VmError;

  #[test]
  fn indirect_eval_runs_on_the_host_global() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script(
      "t",
      "const e = eval; globalThis.marker = 1; [e('marker + 1'), e(5), typeof e('this')].join()",
    )?;
    assert_eq!(v.as_str(), Some("2,5,object"));
    Ok(())
  }

  #[test]
  fn value_properties_are_constant() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script(
      "t",
      "try { NaN = 1; 'assigned' } catch (e) { e instanceof TypeError }",
    )?;
    assert!(v.truthy());
    Ok(())
  }
}
