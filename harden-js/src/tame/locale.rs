use super::installer;
use super::Taming;
use crate::builtins::string::compare_code_units;
use crate::intrinsics::IntrinsicRegistry;
use crate::property::PropertyDescriptor;
use crate::property::PropertyKey;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::Value;
use crate::VmError;
use once_cell::sync::Lazy;
use regex::Regex;

static LOCALE_METHOD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^toLocale([A-Z].*)$").unwrap());

/// Points every `toLocaleX` method of a registry object at the same object's `toX`, and replaces
/// `String.prototype.localeCompare` with a code unit comparison. Returns how many methods were
/// replaced.
pub(crate) fn tame_locale_methods(
  realm: &mut Realm,
  registry: &IntrinsicRegistry,
  taming: Taming,
) -> Result<usize, VmError> {
  if taming == Taming::Unsafe {
    return Ok(0);
  }
  let mut replaced = 0;
  let objects: Vec<_> = registry.iter().filter_map(|(_, v)| v.as_object()).collect();
  for obj in objects {
    for key in realm.heap.own_property_keys(obj)? {
      let Some(name) = key.as_str() else {
        continue;
      };
      let Some(captures) = LOCALE_METHOD.captures(name) else {
        continue;
      };
      let Some(locale_method) = realm.heap.get_own_data_value(obj, &key)? else {
        continue;
      };
      if !realm.heap.is_callable(&locale_method) {
        continue;
      }
      let plain = PropertyKey::from(format!("to{}", &captures[1]));
      match realm.heap.get_own_data_value(obj, &plain)? {
        Some(method) if realm.heap.is_callable(&method) => {
          realm
            .heap
            .define_property(obj, key.clone(), PropertyDescriptor::hidden(method))?;
          replaced += 1;
        }
        _ => {}
      }
    }
  }

  let string_prototype = realm.intrinsics.string_prototype;
  let compare = installer(realm).function("localeCompare", 1, locale_compare)?;
  realm.heap.define_property(
    string_prototype,
    "localeCompare",
    PropertyDescriptor::hidden(compare),
  )?;
  Ok(replaced + 1)
}

fn locale_compare(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let this = match inv.this {
    Value::Undefined | Value::Null => {
      return Err(VmError::type_error(
        "String.prototype.localeCompare called on null or undefined",
      ));
    }
    other => realm.to_string(other)?,
  };
  let that = realm.to_string(&inv.arg(0))?;
  Ok(Value::Number(compare_code_units(&this, &that)))
}
