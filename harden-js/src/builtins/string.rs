use super::array::create_array_iterator;
use super::HostIntrinsics;
use super::Installer;
use crate::heap::ArrayIterationKind;
use crate::heap::JsObject;
use crate::heap::ObjectKind;
use crate::property::PropertyDescriptor;
use crate::realm::relative_index;
use crate::realm::to_integer;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::Value;
use crate::VmError;
use std::cmp::Ordering;
use std::rc::Rc;

pub(crate) fn install(ins: &mut Installer<'_>, i: &HostIntrinsics) -> Result<(), VmError> {
  ins.method(i.string, "fromCharCode", 1, string_from_char_code)?;

  let proto = i.string_prototype;
  ins.method(proto, "charAt", 1, string_prototype_char_at)?;
  ins.method(proto, "charCodeAt", 1, string_prototype_char_code_at)?;
  ins.method(proto, "concat", 1, string_prototype_concat)?;
  ins.method(proto, "endsWith", 1, string_prototype_ends_with)?;
  ins.method(proto, "includes", 1, string_prototype_includes)?;
  ins.method(proto, "indexOf", 1, string_prototype_index_of)?;
  ins.method(proto, "lastIndexOf", 1, string_prototype_last_index_of)?;
  ins.method(proto, "localeCompare", 1, string_prototype_locale_compare)?;
  ins.method(proto, "padEnd", 1, string_prototype_pad_end)?;
  ins.method(proto, "padStart", 1, string_prototype_pad_start)?;
  ins.method(proto, "repeat", 1, string_prototype_repeat)?;
  ins.method(proto, "replace", 2, string_prototype_replace)?;
  ins.method(proto, "slice", 2, string_prototype_slice)?;
  ins.method(proto, "split", 2, string_prototype_split)?;
  ins.method(proto, "startsWith", 1, string_prototype_starts_with)?;
  ins.method(proto, "substring", 2, string_prototype_substring)?;
  ins.method(proto, "toLocaleLowerCase", 0, string_prototype_to_locale_lower_case)?;
  ins.method(proto, "toLocaleUpperCase", 0, string_prototype_to_locale_upper_case)?;
  ins.method(proto, "toLowerCase", 0, string_prototype_to_lower_case)?;
  ins.method(proto, "toString", 0, string_prototype_value_of)?;
  ins.method(proto, "toUpperCase", 0, string_prototype_to_upper_case)?;
  ins.method(proto, "trim", 0, string_prototype_trim)?;
  ins.method(proto, "trimEnd", 0, string_prototype_trim_end)?;
  ins.method(proto, "trimStart", 0, string_prototype_trim_start)?;
  ins.method(proto, "valueOf", 0, string_prototype_value_of)?;
  let iterator = ins.symbols.iterator;
  ins.symbol_method(proto, iterator, "[Symbol.iterator]", 0, string_prototype_iterator)?;
  Ok(())
}

pub(crate) fn string_constructor(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s: Rc<str> = match (inv.args.first(), inv.new_target) {
    (None, _) => Rc::from(""),
    (Some(Value::Symbol(sym)), None) => {
      let description = realm.heap.symbol_description(*sym);
      return Ok(Value::from(format!(
        "Symbol({})",
        description.as_deref().unwrap_or("")
      )));
    }
    (Some(v), _) => realm.to_string(v)?,
  };
  let Some(new_target) = inv.new_target else {
    return Ok(Value::String(s));
  };
  let prototype = realm.prototype_from_constructor(new_target, realm.intrinsics.string_prototype)?;
  let id = realm
    .heap
    .alloc(JsObject::new(Some(prototype), ObjectKind::String(s.clone())));
  realm.heap.define_property(
    id,
    "length",
    PropertyDescriptor::data(s.encode_utf16().count() as f64, false, false, false),
  )?;
  Ok(Value::Object(id))
}

/// `thisStringValue`, falling back to `ToString` of a coercible receiver.
fn this_str(realm: &mut Realm, this: &Value, method: &str) -> Result<Rc<str>, VmError> {
  match this {
    Value::String(s) => Ok(s.clone()),
    Value::Undefined | Value::Null => Err(VmError::type_error(format!(
      "String.prototype.{method} called on null or undefined"
    ))),
    Value::Object(id) => match realm.heap.kind(*id)? {
      ObjectKind::String(s) => Ok(s.clone()),
      _ => realm.to_string(this),
    },
    other => realm.to_string(other),
  }
}

fn units(s: &str) -> Vec<u16> {
  s.encode_utf16().collect()
}

fn from_units(units: &[u16]) -> Value {
  Value::from(String::from_utf16_lossy(units))
}

fn find_units(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
  if needle.is_empty() {
    return (from <= haystack.len()).then_some(from);
  }
  (from..haystack.len().saturating_sub(needle.len()) + 1)
    .find(|&i| haystack[i..].starts_with(needle))
}

fn string_from_char_code(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let mut out = Vec::with_capacity(inv.args.len());
  for arg in inv.args {
    out.push(crate::js::interp::to_uint32(realm.to_number(arg)?) as u16);
  }
  Ok(from_units(&out))
}

fn string_prototype_char_at(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s = units(&this_str(realm, inv.this, "charAt")?);
  let pos = to_integer(realm.to_number(&inv.arg(0))?);
  if pos < 0.0 || pos >= s.len() as f64 {
    return Ok(Value::from(""));
  }
  Ok(from_units(&s[pos as usize..pos as usize + 1]))
}

fn string_prototype_char_code_at(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s = units(&this_str(realm, inv.this, "charCodeAt")?);
  let pos = to_integer(realm.to_number(&inv.arg(0))?);
  if pos < 0.0 || pos >= s.len() as f64 {
    return Ok(Value::Number(f64::NAN));
  }
  Ok(Value::Number(s[pos as usize] as f64))
}

fn string_prototype_concat(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let mut out = this_str(realm, inv.this, "concat")?.to_string();
  for arg in inv.args {
    out.push_str(&realm.to_string(arg)?);
  }
  Ok(Value::from(out))
}

fn search_arg(realm: &mut Realm, value: &Value, method: &str) -> Result<Rc<str>, VmError> {
  if let Value::Object(id) = value {
    if matches!(realm.heap.kind(*id)?, ObjectKind::RegExp { .. }) {
      return Err(VmError::type_error(format!(
        "First argument to String.prototype.{method} must not be a regular expression"
      )));
    }
  }
  realm.to_string(value)
}

fn string_prototype_ends_with(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s = units(&this_str(realm, inv.this, "endsWith")?);
  let search = units(&search_arg(realm, &inv.arg(0), "endsWith")?);
  let end = match inv.arg(1) {
    Value::Undefined => s.len(),
    other => to_integer(realm.to_number(&other)?).clamp(0.0, s.len() as f64) as usize,
  };
  Ok(Value::Bool(s[..end].ends_with(&search)))
}

fn string_prototype_starts_with(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s = units(&this_str(realm, inv.this, "startsWith")?);
  let search = units(&search_arg(realm, &inv.arg(0), "startsWith")?);
  let start = to_integer(realm.to_number(&inv.arg(1))?).clamp(0.0, s.len() as f64) as usize;
  Ok(Value::Bool(s[start..].starts_with(&search)))
}

fn string_prototype_includes(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s = units(&this_str(realm, inv.this, "includes")?);
  let search = units(&search_arg(realm, &inv.arg(0), "includes")?);
  let start = to_integer(realm.to_number(&inv.arg(1))?).clamp(0.0, s.len() as f64) as usize;
  Ok(Value::Bool(find_units(&s, &search, start).is_some()))
}

fn string_prototype_index_of(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s = units(&this_str(realm, inv.this, "indexOf")?);
  let search = units(&realm.to_string(&inv.arg(0))?);
  let start = to_integer(realm.to_number(&inv.arg(1))?).clamp(0.0, s.len() as f64) as usize;
  Ok(Value::Number(
    find_units(&s, &search, start).map(|i| i as f64).unwrap_or(-1.0),
  ))
}

fn string_prototype_last_index_of(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s = units(&this_str(realm, inv.this, "lastIndexOf")?);
  let search = units(&realm.to_string(&inv.arg(0))?);
  let pos = realm.to_number(&inv.arg(1))?;
  let max_start = s.len().saturating_sub(search.len());
  let start = if pos.is_nan() {
    max_start
  } else {
    (to_integer(pos).max(0.0) as usize).min(max_start)
  };
  if search.len() > s.len() {
    return Ok(Value::Number(-1.0));
  }
  Ok(Value::Number(
    (0..=start)
      .rev()
      .find(|&i| s[i..].starts_with(&search))
      .map(|i| i as f64)
      .unwrap_or(-1.0),
  ))
}

/// Code unit order, reported as `-1`, `0` or `1`.
pub(crate) fn compare_code_units(a: &str, b: &str) -> f64 {
  match a.encode_utf16().cmp(b.encode_utf16()) {
    Ordering::Less => -1.0,
    Ordering::Equal => 0.0,
    Ordering::Greater => 1.0,
  }
}

pub(crate) fn string_prototype_locale_compare(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s = this_str(realm, inv.this, "localeCompare")?;
  let that = realm.to_string(&inv.arg(0))?;
  Ok(Value::Number(compare_code_units(&s, &that)))
}

fn pad(realm: &mut Realm, inv: &Invocation<'_>, at_start: bool) -> Result<Value, VmError> {
  let s = this_str(realm, inv.this, if at_start { "padStart" } else { "padEnd" })?;
  let target = to_integer(realm.to_number(&inv.arg(0))?);
  let filler = match inv.arg(1) {
    Value::Undefined => Rc::from(" "),
    other => realm.to_string(&other)?,
  };
  let s_units = units(&s);
  if target <= s_units.len() as f64 || filler.is_empty() {
    return Ok(Value::String(s));
  }
  let fill_len = target as usize - s_units.len();
  let fill: Vec<u16> = filler.encode_utf16().cycle().take(fill_len).collect();
  let out = if at_start {
    [fill, s_units].concat()
  } else {
    [s_units, fill].concat()
  };
  Ok(from_units(&out))
}

fn string_prototype_pad_end(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  pad(realm, &inv, false)
}

fn string_prototype_pad_start(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  pad(realm, &inv, true)
}

fn string_prototype_repeat(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s = this_str(realm, inv.this, "repeat")?;
  let count = to_integer(realm.to_number(&inv.arg(0))?);
  if count < 0.0 || count.is_infinite() {
    return Err(VmError::RangeError(format!("Invalid count value: {count}")));
  }
  if s.len() as f64 * count > (1u64 << 28) as f64 {
    return Err(VmError::RangeError("Invalid string length".to_string()));
  }
  Ok(Value::from(s.repeat(count as usize)))
}

/// `GetSubstitution` without capture groups.
fn substitute(replacement: &str, matched: &str, before: &str, after: &str) -> String {
  let mut out = String::with_capacity(replacement.len());
  let mut chars = replacement.chars().peekable();
  while let Some(c) = chars.next() {
    if c != '$' {
      out.push(c);
      continue;
    }
    match chars.peek() {
      Some('$') => out.push('$'),
      Some('&') => out.push_str(matched),
      Some('`') => out.push_str(before),
      Some('\'') => out.push_str(after),
      _ => {
        out.push('$');
        continue;
      }
    }
    chars.next();
  }
  out
}

fn string_prototype_replace(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s = this_str(realm, inv.this, "replace")?;
  let pattern = search_arg(realm, &inv.arg(0), "replace")?;
  let replacement = inv.arg(1);
  let Some(pos) = s.find(&*pattern) else {
    return Ok(Value::String(s));
  };
  let before = &s[..pos];
  let after = &s[pos + pattern.len()..];
  let replaced = if realm.heap.is_callable(&replacement) {
    let position = before.encode_utf16().count() as f64;
    let result = realm.call(&replacement, Value::Undefined, &[
      Value::String(pattern.clone()),
      Value::Number(position),
      Value::String(s.clone()),
    ])?;
    realm.to_string(&result)?.to_string()
  } else {
    let replacement = realm.to_string(&replacement)?;
    substitute(&replacement, &pattern, before, after)
  };
  Ok(Value::from(format!("{before}{replaced}{after}")))
}

fn string_prototype_slice(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s = units(&this_str(realm, inv.this, "slice")?);
  let start = relative_index(realm.to_number(&inv.arg(0))?, s.len());
  let end = match inv.arg(1) {
    Value::Undefined => s.len(),
    other => relative_index(realm.to_number(&other)?, s.len()),
  };
  Ok(from_units(&s[start..end.max(start)]))
}

fn string_prototype_substring(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s = units(&this_str(realm, inv.this, "substring")?);
  let clamp = |n: f64| to_integer(n).clamp(0.0, s.len() as f64) as usize;
  let start = clamp(realm.to_number(&inv.arg(0))?);
  let end = match inv.arg(1) {
    Value::Undefined => s.len(),
    other => clamp(realm.to_number(&other)?),
  };
  let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
  Ok(from_units(&s[lo..hi]))
}

fn string_prototype_split(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s = this_str(realm, inv.this, "split")?;
  let limit = match inv.arg(1) {
    Value::Undefined => u32::MAX as usize,
    other => crate::js::interp::to_uint32(realm.to_number(&other)?) as usize,
  };
  let parts: Vec<Value> = match inv.arg(0) {
    Value::Undefined => vec![Value::String(s)],
    sep => {
      let sep = search_arg(realm, &sep, "split")?;
      if sep.is_empty() {
        s.encode_utf16()
          .map(|u| Value::from(String::from_utf16_lossy(&[u])))
          .collect()
      } else {
        s.split(&*sep).map(Value::from).collect()
      }
    }
  };
  let parts = parts.into_iter().take(limit).collect();
  Ok(Value::Object(realm.new_array(parts)?))
}

fn string_prototype_to_lower_case(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::from(this_str(realm, inv.this, "toLowerCase")?.to_lowercase()))
}

fn string_prototype_to_upper_case(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::from(this_str(realm, inv.this, "toUpperCase")?.to_uppercase()))
}

// The host has no locale data; these follow the root locale.

fn string_prototype_to_locale_lower_case(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::from(this_str(realm, inv.this, "toLocaleLowerCase")?.to_lowercase()))
}

fn string_prototype_to_locale_upper_case(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::from(this_str(realm, inv.this, "toLocaleUpperCase")?.to_uppercase()))
}

fn is_js_whitespace(c: char) -> bool {
  c.is_whitespace() || c == '\u{feff}'
}

fn string_prototype_trim(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::from(this_str(realm, inv.this, "trim")?.trim_matches(is_js_whitespace)))
}

fn string_prototype_trim_end(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::from(this_str(realm, inv.this, "trimEnd")?.trim_end_matches(is_js_whitespace)))
}

fn string_prototype_trim_start(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::from(this_str(realm, inv.this, "trimStart")?.trim_start_matches(is_js_whitespace)))
}

fn string_prototype_value_of(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  match inv.this {
    Value::String(s) => Ok(Value::String(s.clone())),
    Value::Object(id) => match realm.heap.kind(*id)? {
      ObjectKind::String(s) => Ok(Value::String(s.clone())),
      _ => Err(VmError::type_error("String.prototype.valueOf requires that 'this' be a String")),
    },
    _ => Err(VmError::type_error("String.prototype.valueOf requires that 'this' be a String")),
  }
}

/// Iterates code points by materializing them into an array first.
fn string_prototype_iterator(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s = this_str(realm, inv.this, "[Symbol.iterator]")?;
  let chars = s.chars().map(|c| Value::from(c.to_string())).collect();
  let arr = realm.new_array(chars)?;
  create_array_iterator(realm, arr, ArrayIterationKind::Values)
}

#[cfg(test)]
mod tests {
  use crate::Realm;
  use crate::VmError;

  #[test]
  fn indices_count_utf16_code_units() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script("t", "'a😀b'.length + ':' + 'a😀b'.indexOf('b') + ':' + 'a😀b'.slice(-1)")?;
    assert_eq!(v.as_str(), Some("4:3:b"));
    Ok(())
  }

  #[test]
  fn replace_expands_dollar_patterns() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script("t", "'abc'.replace('b', '[$&$`$\\'$$]')")?;
    assert_eq!(v.as_str(), Some("a[bac$]c"));
    Ok(())
  }

  #[test]
  fn locale_compare_orders_by_code_unit() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script("t", "[ 'a'.localeCompare('b'), 'b'.localeCompare('a'), 'a'.localeCompare('a') ].join()")?;
    assert_eq!(v.as_str(), Some("-1,1,0"));
    Ok(())
  }
}
