use super::HostIntrinsics;
use super::Installer;
use crate::heap::JsObject;
use crate::heap::ObjectKind;
use crate::realm::to_integer;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::number_to_string;
use crate::value::parse_radix_digits;
use crate::value::Value;
use crate::VmError;

pub(crate) fn install(ins: &mut Installer<'_>, i: &HostIntrinsics) -> Result<(), VmError> {
  let ctor = i.number;
  ins.constant(ctor, "EPSILON", f64::EPSILON)?;
  ins.constant(ctor, "MAX_SAFE_INTEGER", 9007199254740991.0)?;
  ins.constant(ctor, "MAX_VALUE", f64::MAX)?;
  ins.constant(ctor, "MIN_SAFE_INTEGER", -9007199254740991.0)?;
  ins.constant(ctor, "MIN_VALUE", 5e-324)?;
  ins.constant(ctor, "NaN", f64::NAN)?;
  ins.constant(ctor, "NEGATIVE_INFINITY", f64::NEG_INFINITY)?;
  ins.constant(ctor, "POSITIVE_INFINITY", f64::INFINITY)?;
  ins.method(ctor, "isFinite", 1, number_is_finite)?;
  ins.method(ctor, "isInteger", 1, number_is_integer)?;
  ins.method(ctor, "isNaN", 1, number_is_nan)?;
  ins.method(ctor, "isSafeInteger", 1, number_is_safe_integer)?;
  ins.value(ctor, "parseFloat", i.parse_float)?;
  ins.value(ctor, "parseInt", i.parse_int)?;

  let proto = i.number_prototype;
  ins.method(proto, "toFixed", 1, number_prototype_to_fixed)?;
  ins.method(proto, "toLocaleString", 0, number_prototype_to_locale_string)?;
  ins.method(proto, "toString", 1, number_prototype_to_string)?;
  ins.method(proto, "valueOf", 0, number_prototype_value_of)?;

  let proto = i.boolean_prototype;
  ins.method(proto, "toString", 0, boolean_prototype_to_string)?;
  ins.method(proto, "valueOf", 0, boolean_prototype_value_of)?;
  Ok(())
}

pub(crate) fn number_constructor(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let n = match inv.args.first() {
    Some(v) => realm.to_number(v)?,
    None => 0.0,
  };
  let Some(new_target) = inv.new_target else {
    return Ok(Value::Number(n));
  };
  let prototype = realm.prototype_from_constructor(new_target, realm.intrinsics.number_prototype)?;
  Ok(Value::Object(
    realm.heap.alloc(JsObject::new(Some(prototype), ObjectKind::Number(n))),
  ))
}

pub(crate) fn boolean_constructor(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let b = inv.arg(0).truthy();
  let Some(new_target) = inv.new_target else {
    return Ok(Value::Bool(b));
  };
  let prototype = realm.prototype_from_constructor(new_target, realm.intrinsics.boolean_prototype)?;
  Ok(Value::Object(
    realm.heap.alloc(JsObject::new(Some(prototype), ObjectKind::Boolean(b))),
  ))
}

fn this_number(realm: &Realm, this: &Value, method: &str) -> Result<f64, VmError> {
  match this {
    Value::Number(n) => return Ok(*n),
    Value::Object(id) => {
      if let ObjectKind::Number(n) = realm.heap.kind(*id)? {
        return Ok(*n);
      }
    }
    _ => {}
  }
  Err(VmError::type_error(format!(
    "Number.prototype.{method} requires that 'this' be a Number"
  )))
}

fn this_boolean(realm: &Realm, this: &Value, method: &str) -> Result<bool, VmError> {
  match this {
    Value::Bool(b) => return Ok(*b),
    Value::Object(id) => {
      if let ObjectKind::Boolean(b) = realm.heap.kind(*id)? {
        return Ok(*b);
      }
    }
    _ => {}
  }
  Err(VmError::type_error(format!(
    "Boolean.prototype.{method} requires that 'this' be a Boolean"
  )))
}

fn number_is_finite(_realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Bool(matches!(inv.arg(0), Value::Number(n) if n.is_finite())))
}

fn number_is_integer(_realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Bool(
    matches!(inv.arg(0), Value::Number(n) if n.is_finite() && n.trunc() == n),
  ))
}

fn number_is_nan(_realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Bool(matches!(inv.arg(0), Value::Number(n) if n.is_nan())))
}

fn number_is_safe_integer(_realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Bool(matches!(
    inv.arg(0),
    Value::Number(n) if n.is_finite() && n.trunc() == n && n.abs() <= 9007199254740991.0
  )))
}

pub(crate) fn global_is_finite(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Bool(realm.to_number(&inv.arg(0))?.is_finite()))
}

pub(crate) fn global_is_nan(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Bool(realm.to_number(&inv.arg(0))?.is_nan()))
}

/// The longest prefix of `s` that is a `StrDecimalLiteral`.
fn parse_float_prefix(s: &str) -> f64 {
  let s = s.trim_start();
  let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
  if unsigned.starts_with("Infinity") {
    return if s.starts_with('-') {
      f64::NEG_INFINITY
    } else {
      f64::INFINITY
    };
  }
  let bytes = s.as_bytes();
  let mut end = s.len() - unsigned.len();
  let mut seen_digit = false;
  let mut seen_dot = false;
  while end < bytes.len() {
    match bytes[end] {
      b'0'..=b'9' => seen_digit = true,
      b'.' if !seen_dot => seen_dot = true,
      _ => break,
    }
    end += 1;
  }
  if !seen_digit {
    return f64::NAN;
  }
  if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
    let mut exp_end = end + 1;
    if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
      exp_end += 1;
    }
    let digits_start = exp_end;
    while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
      exp_end += 1;
    }
    if exp_end > digits_start {
      end = exp_end;
    }
  }
  s[..end].parse::<f64>().unwrap_or(f64::NAN)
}

pub(crate) fn global_parse_float(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s = realm.to_string(&inv.arg(0))?;
  Ok(Value::Number(parse_float_prefix(&s)))
}

pub(crate) fn global_parse_int(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s = realm.to_string(&inv.arg(0))?;
  let mut radix = crate::js::interp::to_int32(realm.to_number(&inv.arg(1))?) as u32;
  let s = s.trim_start();
  let negative = s.starts_with('-');
  let mut digits = s.strip_prefix(['+', '-']).unwrap_or(s);
  if radix == 0 || radix == 16 {
    if let Some(rest) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
      digits = rest;
      radix = 16;
    }
  }
  if radix == 0 {
    radix = 10;
  }
  if !(2..=36).contains(&radix) {
    return Ok(Value::Number(f64::NAN));
  }
  let end = digits
    .char_indices()
    .find(|(_, c)| c.to_digit(radix).is_none())
    .map(|(i, _)| i)
    .unwrap_or(digits.len());
  let n = parse_radix_digits(&digits[..end], radix).unwrap_or(f64::NAN);
  Ok(Value::Number(if negative { -n } else { n }))
}

fn number_prototype_to_fixed(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let n = this_number(realm, inv.this, "toFixed")?;
  let digits = to_integer(realm.to_number(&inv.arg(0))?);
  if !(0.0..=100.0).contains(&digits) {
    return Err(VmError::RangeError(
      "toFixed() digits argument must be between 0 and 100".to_string(),
    ));
  }
  if !n.is_finite() || n.abs() >= 1e21 {
    return Ok(Value::from(number_to_string(n)));
  }
  Ok(Value::from(format!("{:.*}", digits as usize, n)))
}

/// `Number::toString(x, radix)` for radixes other than 10.
fn number_to_radix_string(n: f64, radix: u32) -> String {
  if !n.is_finite() {
    return number_to_string(n);
  }
  let negative = n < 0.0;
  let n = n.abs();
  let mut int = n.trunc();
  let mut frac = n - int;
  let mut int_digits = Vec::new();
  loop {
    let d = (int % radix as f64) as u32;
    int_digits.push(std::char::from_digit(d, radix).unwrap_or('0'));
    int = (int / radix as f64).trunc();
    if int < 1.0 {
      break;
    }
  }
  let mut out = String::new();
  if negative {
    out.push('-');
  }
  out.extend(int_digits.iter().rev());
  if frac > 0.0 {
    out.push('.');
    for _ in 0..52 {
      frac *= radix as f64;
      let d = frac.trunc();
      out.push(std::char::from_digit(d as u32, radix).unwrap_or('0'));
      frac -= d;
      if frac <= 0.0 {
        break;
      }
    }
  }
  out
}

fn number_prototype_to_string(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let n = this_number(realm, inv.this, "toString")?;
  let radix = match inv.arg(0) {
    Value::Undefined => 10.0,
    other => to_integer(realm.to_number(&other)?),
  };
  if !(2.0..=36.0).contains(&radix) {
    return Err(VmError::RangeError(
      "toString() radix must be between 2 and 36".to_string(),
    ));
  }
  Ok(Value::from(if radix == 10.0 {
    number_to_string(n)
  } else {
    number_to_radix_string(n, radix as u32)
  }))
}

fn number_prototype_to_locale_string(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let n = this_number(realm, inv.this, "toLocaleString")?;
  Ok(Value::from(number_to_string(n)))
}

fn number_prototype_value_of(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Number(this_number(realm, inv.this, "valueOf")?))
}

fn boolean_prototype_to_string(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::from(
    if this_boolean(realm, inv.this, "toString")? {
      "true"
    } else {
      "false"
    },
  ))
}

fn boolean_prototype_value_of(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Bool(this_boolean(realm, inv.this, "valueOf")?))
}

#[cfg(test)]
mod tests {
  use super::number_to_radix_string;
  use super::parse_float_prefix;

  #[test]
  fn parse_float_takes_longest_decimal_prefix() {
    assert_eq!(parse_float_prefix("  3.25abc"), 3.25);
    assert_eq!(parse_float_prefix("1e3x"), 1000.0);
    assert_eq!(parse_float_prefix("1e"), 1.0);
    assert_eq!(parse_float_prefix("-Infinityx"), f64::NEG_INFINITY);
    assert!(parse_float_prefix(".x").is_nan());
  }

  #[test]
  fn radix_strings() {
    assert_eq!(number_to_radix_string(255.0, 16), "ff");
    assert_eq!(number_to_radix_string(-5.0, 2), "-101");
    assert_eq!(number_to_radix_string(0.5, 2), "0.1");
  }
}
