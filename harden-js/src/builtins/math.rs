use super::HostIntrinsics;
use super::Installer;
use crate::js::interp::js_pow;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::Value;
use crate::VmError;

macro_rules! unary_math {
  ($($name:ident => $f:expr;)*) => {
    $(
      fn $name(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
        let x = realm.to_number(&inv.arg(0))?;
        let f: fn(f64) -> f64 = $f;
        Ok(Value::Number(f(x)))
      }
    )*
  };
}

unary_math! {
  math_abs => f64::abs;
  math_acos => f64::acos;
  math_asin => f64::asin;
  math_atan => f64::atan;
  math_cbrt => f64::cbrt;
  math_ceil => f64::ceil;
  math_cos => f64::cos;
  math_exp => f64::exp;
  math_floor => f64::floor;
  math_log => f64::ln;
  math_log10 => f64::log10;
  math_log2 => f64::log2;
  math_round => |x| if x.is_finite() { (x + 0.5).floor() } else { x };
  math_sign => |x| if x.is_nan() || x == 0.0 { x } else { x.signum() };
  math_sin => f64::sin;
  math_sqrt => f64::sqrt;
  math_tan => f64::tan;
  math_trunc => f64::trunc;
}

pub(crate) fn install(ins: &mut Installer<'_>, i: &HostIntrinsics) -> Result<(), VmError> {
  let math = i.math;
  ins.constant(math, "E", std::f64::consts::E)?;
  ins.constant(math, "LN10", std::f64::consts::LN_10)?;
  ins.constant(math, "LN2", std::f64::consts::LN_2)?;
  ins.constant(math, "LOG10E", std::f64::consts::LOG10_E)?;
  ins.constant(math, "LOG2E", std::f64::consts::LOG2_E)?;
  ins.constant(math, "PI", std::f64::consts::PI)?;
  ins.constant(math, "SQRT1_2", std::f64::consts::FRAC_1_SQRT_2)?;
  ins.constant(math, "SQRT2", std::f64::consts::SQRT_2)?;
  ins.method(math, "abs", 1, math_abs)?;
  ins.method(math, "acos", 1, math_acos)?;
  ins.method(math, "asin", 1, math_asin)?;
  ins.method(math, "atan", 1, math_atan)?;
  ins.method(math, "atan2", 2, math_atan2)?;
  ins.method(math, "cbrt", 1, math_cbrt)?;
  ins.method(math, "ceil", 1, math_ceil)?;
  ins.method(math, "cos", 1, math_cos)?;
  ins.method(math, "exp", 1, math_exp)?;
  ins.method(math, "floor", 1, math_floor)?;
  ins.method(math, "hypot", 2, math_hypot)?;
  ins.method(math, "log", 1, math_log)?;
  ins.method(math, "log10", 1, math_log10)?;
  ins.method(math, "log2", 1, math_log2)?;
  ins.method(math, "max", 2, math_max)?;
  ins.method(math, "min", 2, math_min)?;
  ins.method(math, "pow", 2, math_pow)?;
  ins.method(math, "random", 0, math_random)?;
  ins.method(math, "round", 1, math_round)?;
  ins.method(math, "sign", 1, math_sign)?;
  ins.method(math, "sin", 1, math_sin)?;
  ins.method(math, "sqrt", 1, math_sqrt)?;
  ins.method(math, "tan", 1, math_tan)?;
  ins.method(math, "trunc", 1, math_trunc)?;
  ins.to_string_tag(math, "Math")?;
  Ok(())
}

fn numbers(realm: &mut Realm, args: &[Value]) -> Result<Vec<f64>, VmError> {
  args.iter().map(|a| realm.to_number(a)).collect()
}

fn math_atan2(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let y = realm.to_number(&inv.arg(0))?;
  let x = realm.to_number(&inv.arg(1))?;
  Ok(Value::Number(y.atan2(x)))
}

fn math_hypot(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let ns = numbers(realm, inv.args)?;
  if ns.iter().any(|n| n.is_infinite()) {
    return Ok(Value::Number(f64::INFINITY));
  }
  Ok(Value::Number(ns.iter().map(|n| n * n).sum::<f64>().sqrt()))
}

fn math_max(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let ns = numbers(realm, inv.args)?;
  Ok(Value::Number(ns.into_iter().fold(f64::NEG_INFINITY, |acc, n| {
    if acc.is_nan() || n.is_nan() {
      f64::NAN
    } else if n > acc || (n == 0.0 && acc == 0.0 && acc.is_sign_negative()) {
      n
    } else {
      acc
    }
  })))
}

fn math_min(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let ns = numbers(realm, inv.args)?;
  Ok(Value::Number(ns.into_iter().fold(f64::INFINITY, |acc, n| {
    if acc.is_nan() || n.is_nan() {
      f64::NAN
    } else if n < acc || (n == 0.0 && acc == 0.0 && n.is_sign_negative()) {
      n
    } else {
      acc
    }
  })))
}

fn math_pow(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let base = realm.to_number(&inv.arg(0))?;
  let exponent = realm.to_number(&inv.arg(1))?;
  Ok(Value::Number(js_pow(base, exponent)))
}

/// Ambient entropy. Absent from `%SharedMath%`.
fn math_random(_realm: &mut Realm, _inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Number(rand::random::<f64>()))
}

#[cfg(test)]
mod tests {
  use crate::Realm;
  use crate::VmError;

  #[test]
  fn min_max_and_rounding() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script(
      "t",
      "[Math.max(1, 3, 2), Math.min(), Math.round(-2.5), Math.round(2.5), Math.max(1, NaN)].join()",
    )?;
    assert_eq!(v.as_str(), Some("3,Infinity,-2,3,NaN"));
    Ok(())
  }

  #[test]
  fn random_is_in_unit_interval() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script("t", "const r = Math.random(); r >= 0 && r < 1")?;
    assert!(v.truthy());
    Ok(())
  }
}
