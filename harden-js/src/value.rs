use std::fmt;
use std::rc::Rc;

/// Index of an object record in a [`Heap`](crate::Heap).
///
/// Object records are never freed: a realm's graph only grows, and a hardened object stays
/// reachable for the lifetime of its realm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) u32);

impl ObjectId {
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

/// Index of a symbol record in a [`Heap`](crate::Heap).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub(crate) u32);

/// A JavaScript value.
#[derive(Clone, Debug)]
pub enum Value {
  /// The JavaScript `undefined` value.
  Undefined,
  /// The JavaScript `null` value.
  Null,
  /// A JavaScript boolean.
  Bool(bool),
  /// A JavaScript number (IEEE-754 double).
  Number(f64),
  /// An immutable JavaScript string.
  String(Rc<str>),
  /// A symbol in the realm's symbol table.
  Symbol(SymbolId),
  /// An object in the realm's heap.
  Object(ObjectId),
}

impl Value {
  pub fn string(s: &str) -> Value {
    Value::String(Rc::from(s))
  }

  pub fn as_object(&self) -> Option<ObjectId> {
    match self {
      Value::Object(o) => Some(*o),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_number(&self) -> Option<f64> {
    match self {
      Value::Number(n) => Some(*n),
      _ => None,
    }
  }

  pub fn is_undefined(&self) -> bool {
    matches!(self, Value::Undefined)
  }

  pub fn is_nullish(&self) -> bool {
    matches!(self, Value::Undefined | Value::Null)
  }

  pub fn is_object(&self) -> bool {
    matches!(self, Value::Object(_))
  }

  /// ECMAScript `ToBoolean`.
  pub fn truthy(&self) -> bool {
    match self {
      Value::Undefined | Value::Null => false,
      Value::Bool(b) => *b,
      Value::Number(n) => *n != 0.0 && !n.is_nan(),
      Value::String(s) => !s.is_empty(),
      Value::Symbol(_) | Value::Object(_) => true,
    }
  }

  /// ECMAScript `SameValue(x, y)`.
  ///
  /// This differs from `===` for Numbers:
  /// - `NaN` is the same as `NaN`
  /// - `+0` and `-0` are distinct
  pub fn same_value(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Number(a), Value::Number(b)) => {
        if a.is_nan() && b.is_nan() {
          return true;
        }
        if *a == 0.0 && *b == 0.0 {
          // Distinguish +0 and -0.
          return a.to_bits() == b.to_bits();
        }
        a == b
      }
      _ => self.strict_equals(other),
    }
  }

  /// ECMAScript `IsStrictlyEqual(x, y)`.
  pub fn strict_equals(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Undefined, Value::Undefined) => true,
      (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Number(a), Value::Number(b)) => a == b,
      (Value::String(a), Value::String(b)) => a == b,
      (Value::Symbol(a), Value::Symbol(b)) => a == b,
      (Value::Object(a), Value::Object(b)) => a == b,
      _ => false,
    }
  }

  /// The primitive part of `typeof`; objects are resolved by the realm.
  pub(crate) fn primitive_type_name(&self) -> Option<&'static str> {
    Some(match self {
      Value::Undefined => "undefined",
      Value::Null => "object",
      Value::Bool(_) => "boolean",
      Value::Number(_) => "number",
      Value::String(_) => "string",
      Value::Symbol(_) => "symbol",
      Value::Object(_) => return None,
    })
  }
}

impl From<ObjectId> for Value {
  fn from(value: ObjectId) -> Self {
    Self::Object(value)
  }
}

impl From<SymbolId> for Value {
  fn from(value: SymbolId) -> Self {
    Self::Symbol(value)
  }
}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Self::Bool(value)
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Self::Number(value)
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Self::String(Rc::from(value))
  }
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Self::String(Rc::from(value))
  }
}

impl From<Rc<str>> for Value {
  fn from(value: Rc<str>) -> Self {
    Self::String(value)
  }
}

impl fmt::Display for ObjectId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// ECMAScript `Number::toString(x)` for radix 10.
pub fn number_to_string(n: f64) -> String {
  if n.is_nan() {
    return "NaN".to_string();
  }
  if n == 0.0 {
    // `ToString(-0)` is `"0"` in ECMAScript.
    return "0".to_string();
  }
  if n.is_infinite() {
    return if n < 0.0 { "-Infinity" } else { "Infinity" }.to_string();
  }

  let mut buf = ryu::Buffer::new();
  let formatted = buf.format_finite(n.abs());
  let (mantissa, exp) = match formatted.split_once('e') {
    Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
    None => (formatted, 0),
  };
  let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
  let all_digits = format!("{int_part}{frac_part}");
  let trimmed = all_digits.trim_start_matches('0');
  // The decimal point sits after `point` digits of `digits`.
  let point = int_part.len() as i32 + exp - (all_digits.len() - trimmed.len()) as i32;
  let digits = trimmed.trim_end_matches('0');
  let k = digits.len() as i32;

  let mut out = String::new();
  if n < 0.0 {
    out.push('-');
  }
  if k <= point && point <= 21 {
    out.push_str(digits);
    out.extend(std::iter::repeat('0').take((point - k) as usize));
  } else if 0 < point && point <= 21 {
    out.push_str(&digits[..point as usize]);
    out.push('.');
    out.push_str(&digits[point as usize..]);
  } else if -6 < point && point <= 0 {
    out.push_str("0.");
    out.extend(std::iter::repeat('0').take((-point) as usize));
    out.push_str(digits);
  } else {
    let e = point - 1;
    out.push_str(&digits[..1]);
    if k > 1 {
      out.push('.');
      out.push_str(&digits[1..]);
    }
    out.push('e');
    out.push(if e >= 0 { '+' } else { '-' });
    out.push_str(&e.abs().to_string());
  }
  out
}

/// ECMAScript `StringToNumber`.
pub fn string_to_number(s: &str) -> f64 {
  let s = s.trim();
  if s.is_empty() {
    return 0.0;
  }
  let radix = match s.get(..2) {
    Some("0x") | Some("0X") => Some(16),
    Some("0o") | Some("0O") => Some(8),
    Some("0b") | Some("0B") => Some(2),
    _ => None,
  };
  if let Some(radix) = radix {
    return parse_radix_digits(&s[2..], radix).unwrap_or(f64::NAN);
  }
  let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
  if unsigned == "Infinity" {
    return if s.starts_with('-') {
      f64::NEG_INFINITY
    } else {
      f64::INFINITY
    };
  }
  // Rust's float parser also accepts "inf" and "nan".
  if !unsigned
    .chars()
    .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
  {
    return f64::NAN;
  }
  s.parse::<f64>().unwrap_or(f64::NAN)
}

pub(crate) fn parse_radix_digits(digits: &str, radix: u32) -> Option<f64> {
  if digits.is_empty() {
    return None;
  }
  let mut value = 0f64;
  for c in digits.chars() {
    let d = c.to_digit(radix)?;
    value = value * radix as f64 + d as f64;
  }
  Some(value)
}

#[cfg(test)]
mod tests {
  use super::number_to_string;
  use super::string_to_number;

  #[test]
  fn formats_numbers_like_ecmascript() {
    assert_eq!(number_to_string(5.0), "5");
    assert_eq!(number_to_string(-1.5), "-1.5");
    assert_eq!(number_to_string(0.000001), "0.000001");
    assert_eq!(number_to_string(1e-7), "1e-7");
    assert_eq!(number_to_string(1e21), "1e+21");
    assert_eq!(number_to_string(123456789012345680000.0), "123456789012345680000");
    assert_eq!(number_to_string(f64::NAN), "NaN");
  }

  #[test]
  fn parses_numeric_strings() {
    assert_eq!(string_to_number("  42 "), 42.0);
    assert_eq!(string_to_number("0x1f"), 31.0);
    assert_eq!(string_to_number(""), 0.0);
    assert!(string_to_number("inf").is_nan());
    assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
  }
}
