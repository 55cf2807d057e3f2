//! `Date`, with every local-time operation pinned to UTC.

use super::HostIntrinsics;
use super::Installer;
use crate::heap::JsObject;
use crate::heap::ObjectKind;
use crate::realm::to_integer;
use crate::realm::Invocation;
use crate::realm::PrimitiveHint;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

const MS_PER_DAY: f64 = 86_400_000.0;
const MAX_TIME: f64 = 8.64e15;

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
  "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub(crate) fn install(ins: &mut Installer<'_>, i: &HostIntrinsics) -> Result<(), VmError> {
  install_statics(ins, i.date, date_now)?;

  let proto = i.date_prototype;
  ins.method(proto, "getDate", 0, date_prototype_get_date)?;
  ins.method(proto, "getDay", 0, date_prototype_get_day)?;
  ins.method(proto, "getFullYear", 0, date_prototype_get_full_year)?;
  ins.method(proto, "getHours", 0, date_prototype_get_hours)?;
  ins.method(proto, "getMilliseconds", 0, date_prototype_get_milliseconds)?;
  ins.method(proto, "getMinutes", 0, date_prototype_get_minutes)?;
  ins.method(proto, "getMonth", 0, date_prototype_get_month)?;
  ins.method(proto, "getSeconds", 0, date_prototype_get_seconds)?;
  ins.method(proto, "getTime", 0, date_prototype_get_time)?;
  ins.method(proto, "getTimezoneOffset", 0, date_prototype_get_timezone_offset)?;
  ins.method(proto, "getUTCDate", 0, date_prototype_get_date)?;
  ins.method(proto, "getUTCDay", 0, date_prototype_get_day)?;
  ins.method(proto, "getUTCFullYear", 0, date_prototype_get_full_year)?;
  ins.method(proto, "getUTCHours", 0, date_prototype_get_hours)?;
  ins.method(proto, "getUTCMilliseconds", 0, date_prototype_get_milliseconds)?;
  ins.method(proto, "getUTCMinutes", 0, date_prototype_get_minutes)?;
  ins.method(proto, "getUTCMonth", 0, date_prototype_get_month)?;
  ins.method(proto, "getUTCSeconds", 0, date_prototype_get_seconds)?;
  ins.method(proto, "setTime", 1, date_prototype_set_time)?;
  ins.method(proto, "toDateString", 0, date_prototype_to_date_string)?;
  ins.method(proto, "toISOString", 0, date_prototype_to_iso_string)?;
  ins.method(proto, "toJSON", 1, date_prototype_to_json)?;
  ins.method(proto, "toLocaleDateString", 0, date_prototype_to_date_string)?;
  ins.method(proto, "toLocaleString", 0, date_prototype_to_string)?;
  ins.method(proto, "toLocaleTimeString", 0, date_prototype_to_time_string)?;
  ins.method(proto, "toString", 0, date_prototype_to_string)?;
  ins.method(proto, "toTimeString", 0, date_prototype_to_time_string)?;
  ins.method(proto, "toUTCString", 0, date_prototype_to_utc_string)?;
  ins.method(proto, "valueOf", 0, date_prototype_get_time)?;
  Ok(())
}

/// `now`, `parse` and `UTC` on a `Date` constructor.
pub(crate) fn install_statics(
  ins: &mut Installer<'_>,
  ctor: ObjectId,
  now: crate::realm::NativeFn,
) -> Result<(), VmError> {
  ins.method(ctor, "now", 0, now)?;
  ins.method(ctor, "parse", 1, date_parse)?;
  ins.method(ctor, "UTC", 7, date_utc)?;
  Ok(())
}

// Time arithmetic (ECMA-262 21.4.1), in UTC.

fn day(t: f64) -> f64 {
  (t / MS_PER_DAY).floor()
}

fn days_from_civil(year: f64, month: f64, date: f64) -> f64 {
  let y = year + (month / 12.0).floor();
  let m = month.rem_euclid(12.0);
  let (y, m) = if m < 2.0 { (y - 1.0, m + 12.0) } else { (y, m) };
  let era = (y / 400.0).floor();
  let yoe = y - era * 400.0;
  let doy = ((153.0 * (m - 2.0) + 2.0) / 5.0).floor() + date - 1.0;
  let doe = yoe * 365.0 + (yoe / 4.0).floor() - (yoe / 100.0).floor() + doy;
  era * 146_097.0 + doe - 719_468.0
}

/// `(year, month0, date)` of a day number.
fn civil_from_days(days: f64) -> (f64, f64, f64) {
  let z = days + 719_468.0;
  let era = (z / 146_097.0).floor();
  let doe = z - era * 146_097.0;
  let yoe = ((doe - (doe / 1460.0).floor() + (doe / 36_524.0).floor() - (doe / 146_096.0).floor())
    / 365.0)
    .floor();
  let doy = doe - (365.0 * yoe + (yoe / 4.0).floor() - (yoe / 100.0).floor());
  let mp = ((5.0 * doy + 2.0) / 153.0).floor();
  let date = doy - ((153.0 * mp + 2.0) / 5.0).floor() + 1.0;
  let month = if mp < 10.0 { mp + 3.0 } else { mp - 9.0 };
  let year = yoe + era * 400.0 + if month <= 2.0 { 1.0 } else { 0.0 };
  (year, month - 1.0, date)
}

/// `MakeDate(MakeDay(..), MakeTime(..))` followed by `TimeClip`.
pub(crate) fn make_time(fields: [f64; 7]) -> f64 {
  if fields.iter().any(|f| !f.is_finite()) {
    return f64::NAN;
  }
  let [year, month, date, h, m, s, ms] = fields.map(to_integer);
  let days = days_from_civil(year, month, 1.0) + date - 1.0;
  let time = h * 3_600_000.0 + m * 60_000.0 + s * 1000.0 + ms;
  time_clip(days * MS_PER_DAY + time)
}

fn time_clip(t: f64) -> f64 {
  if !t.is_finite() || t.abs() > MAX_TIME {
    f64::NAN
  } else {
    to_integer(t) + 0.0
  }
}

struct Fields {
  year: f64,
  month: f64,
  date: f64,
  weekday: usize,
  hours: f64,
  minutes: f64,
  seconds: f64,
  millis: f64,
}

fn fields(t: f64) -> Fields {
  let d = day(t);
  let (year, month, date) = civil_from_days(d);
  let in_day = t.rem_euclid(MS_PER_DAY);
  Fields {
    year,
    month,
    date,
    weekday: (d + 4.0).rem_euclid(7.0) as usize,
    hours: (in_day / 3_600_000.0).floor(),
    minutes: (in_day / 60_000.0).floor() % 60.0,
    seconds: (in_day / 1000.0).floor() % 60.0,
    millis: in_day % 1000.0,
  }
}

fn format_year(year: f64) -> String {
  if year < 0.0 {
    format!("-{:06}", -year)
  } else if year > 9999.0 {
    format!("+{:06}", year)
  } else {
    format!("{:04}", year)
  }
}

pub(crate) fn iso_string(t: f64) -> String {
  let f = fields(t);
  format!(
    "{}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
    format_year(f.year),
    f.month + 1.0,
    f.date,
    f.hours,
    f.minutes,
    f.seconds,
    f.millis
  )
}

fn date_string(t: f64) -> String {
  let f = fields(t);
  format!(
    "{} {} {:02} {:04}",
    WEEKDAYS[f.weekday], MONTHS[f.month as usize], f.date, f.year
  )
}

fn time_string(t: f64) -> String {
  let f = fields(t);
  format!(
    "{:02}:{:02}:{:02} GMT+0000 (Coordinated Universal Time)",
    f.hours, f.minutes, f.seconds
  )
}

pub(crate) fn to_date_string(t: f64) -> String {
  if t.is_nan() {
    return "Invalid Date".to_string();
  }
  format!("{} {}", date_string(t), time_string(t))
}

static ISO_DATE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"^([+-]\d{6}|\d{4})(?:-(\d{2})(?:-(\d{2}))?)?(?:T(\d{2}):(\d{2})(?::(\d{2})(?:\.(\d{1,3})\d*)?)?(Z|[+-]\d{2}:\d{2})?)?$",
  )
  .expect("valid ISO date pattern")
});

/// Parses the ECMAScript date-time string format.
pub(crate) fn parse_date(s: &str) -> f64 {
  let Some(caps) = ISO_DATE.captures(s.trim()) else {
    return f64::NAN;
  };
  let num = |i: usize, default: f64| {
    caps
      .get(i)
      .and_then(|m| m.as_str().parse::<f64>().ok())
      .unwrap_or(default)
  };
  let millis = caps
    .get(7)
    .map(|m| format!("{:0<3}", m.as_str()).parse::<f64>().unwrap_or(0.0))
    .unwrap_or(0.0);
  let t = make_time([
    num(1, f64::NAN),
    num(2, 1.0) - 1.0,
    num(3, 1.0),
    num(4, 0.0),
    num(5, 0.0),
    num(6, 0.0),
    millis,
  ]);
  let offset = match caps.get(8).map(|m| m.as_str()) {
    None | Some("Z") => 0.0,
    Some(tz) => {
      let sign = if tz.starts_with('-') { -1.0 } else { 1.0 };
      let h: f64 = tz[1..3].parse().unwrap_or(0.0);
      let m: f64 = tz[4..6].parse().unwrap_or(0.0);
      sign * (h * 60.0 + m) * 60_000.0
    }
  };
  time_clip(t - offset)
}

pub(crate) fn current_time() -> f64 {
  match SystemTime::now().duration_since(UNIX_EPOCH) {
    Ok(d) => d.as_millis() as f64,
    Err(_) => f64::NAN,
  }
}

pub(crate) fn date_now(_realm: &mut Realm, _inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Number(current_time()))
}

fn date_parse(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let s = realm.to_string(&inv.arg(0))?;
  Ok(Value::Number(parse_date(&s)))
}

fn time_fields(realm: &mut Realm, args: &[Value]) -> Result<[f64; 7], VmError> {
  let mut fields = [f64::NAN, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
  for (i, arg) in args.iter().take(7).enumerate() {
    fields[i] = realm.to_number(arg)?;
  }
  let year = to_integer(fields[0]);
  if fields[0].is_finite() && (0.0..=99.0).contains(&year) {
    fields[0] = 1900.0 + year;
  }
  Ok(fields)
}

fn date_utc(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let fields = time_fields(realm, inv.args)?;
  Ok(Value::Number(make_time(fields)))
}

/// The time value `new Date(...args)` produces, with `now` standing in for the clock.
pub(crate) fn time_value_from_args(
  realm: &mut Realm,
  args: &[Value],
  now: f64,
) -> Result<f64, VmError> {
  Ok(match args {
    [] => now,
    [value] => {
      if let Value::Object(id) = value {
        if let ObjectKind::Date(t) = realm.heap.kind(*id)? {
          return Ok(*t);
        }
      }
      match realm.to_primitive(value, PrimitiveHint::Default)? {
        Value::String(s) => parse_date(&s),
        other => time_clip(realm.to_number(&other)?),
      }
    }
    args => make_time(time_fields(realm, args)?),
  })
}

pub(crate) fn alloc_date(realm: &mut Realm, new_target: ObjectId, t: f64) -> Result<Value, VmError> {
  let prototype = realm.prototype_from_constructor(new_target, realm.intrinsics.date_prototype)?;
  Ok(Value::Object(
    realm.heap.alloc(JsObject::new(Some(prototype), ObjectKind::Date(t))),
  ))
}

pub(crate) fn date_constructor(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let Some(new_target) = inv.new_target else {
    return Ok(Value::from(to_date_string(current_time())));
  };
  let t = time_value_from_args(realm, inv.args, current_time())?;
  alloc_date(realm, new_target, t)
}

fn this_time(realm: &Realm, this: &Value) -> Result<f64, VmError> {
  if let Value::Object(id) = this {
    if let ObjectKind::Date(t) = realm.heap.kind(*id)? {
      return Ok(*t);
    }
  }
  Err(VmError::type_error("this is not a Date object."))
}

fn field_getter(
  realm: &mut Realm,
  inv: &Invocation<'_>,
  pick: impl Fn(&Fields) -> f64,
) -> Result<Value, VmError> {
  let t = this_time(realm, inv.this)?;
  if t.is_nan() {
    return Ok(Value::Number(f64::NAN));
  }
  Ok(Value::Number(pick(&fields(t))))
}

fn date_prototype_get_date(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  field_getter(realm, &inv, |f| f.date)
}

fn date_prototype_get_day(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  field_getter(realm, &inv, |f| f.weekday as f64)
}

fn date_prototype_get_full_year(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  field_getter(realm, &inv, |f| f.year)
}

fn date_prototype_get_hours(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  field_getter(realm, &inv, |f| f.hours)
}

fn date_prototype_get_milliseconds(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  field_getter(realm, &inv, |f| f.millis)
}

fn date_prototype_get_minutes(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  field_getter(realm, &inv, |f| f.minutes)
}

fn date_prototype_get_month(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  field_getter(realm, &inv, |f| f.month)
}

fn date_prototype_get_seconds(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  field_getter(realm, &inv, |f| f.seconds)
}

fn date_prototype_get_time(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Number(this_time(realm, inv.this)?))
}

fn date_prototype_get_timezone_offset(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  field_getter(realm, &inv, |_| 0.0)
}

fn date_prototype_set_time(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  this_time(realm, inv.this)?;
  let t = time_clip(realm.to_number(&inv.arg(0))?);
  if let Value::Object(id) = inv.this {
    realm.heap.get_mut(*id)?.kind = ObjectKind::Date(t);
  }
  Ok(Value::Number(t))
}

fn formatted(realm: &mut Realm, inv: &Invocation<'_>, f: fn(f64) -> String) -> Result<Value, VmError> {
  let t = this_time(realm, inv.this)?;
  if t.is_nan() {
    return Ok(Value::from("Invalid Date"));
  }
  Ok(Value::from(f(t)))
}

fn date_prototype_to_date_string(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  formatted(realm, &inv, date_string)
}

fn date_prototype_to_time_string(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  formatted(realm, &inv, time_string)
}

fn date_prototype_to_string(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  formatted(realm, &inv, to_date_string)
}

fn date_prototype_to_utc_string(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  formatted(realm, &inv, |t| {
    let f = fields(t);
    format!(
      "{}, {:02} {} {:04} {:02}:{:02}:{:02} GMT",
      WEEKDAYS[f.weekday], f.date, MONTHS[f.month as usize], f.year, f.hours, f.minutes, f.seconds
    )
  })
}

fn date_prototype_to_iso_string(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let t = this_time(realm, inv.this)?;
  if t.is_nan() {
    return Err(VmError::RangeError("Invalid time value".to_string()));
  }
  Ok(Value::from(iso_string(t)))
}

fn date_prototype_to_json(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let prim = realm.to_primitive(inv.this, PrimitiveHint::Number)?;
  if let Value::Number(n) = prim {
    if !n.is_finite() {
      return Ok(Value::Null);
    }
  }
  let method = realm.get_value(inv.this, &crate::property::PropertyKey::from("toISOString"))?;
  realm.call(&method, inv.this.clone(), &[])
}

#[cfg(test)]
mod tests {
  use super::iso_string;
  use super::make_time;
  use super::parse_date;
  use super::to_date_string;

  #[test]
  fn civil_round_trip() {
    let t = make_time([2024.0, 1.0, 29.0, 13.0, 5.0, 9.0, 7.0]);
    assert_eq!(iso_string(t), "2024-02-29T13:05:09.007Z");
    assert_eq!(parse_date("2024-02-29T13:05:09.007Z"), t);
    assert_eq!(make_time([1970.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]), 0.0);
  }

  #[test]
  fn parses_offsets_and_date_only_forms() {
    assert_eq!(parse_date("1970-01-01T01:00+01:00"), 0.0);
    assert_eq!(parse_date("1970-01-02"), 86_400_000.0);
    assert!(parse_date("yesterday").is_nan());
  }

  #[test]
  fn formats_to_string() {
    assert_eq!(
      to_date_string(0.0),
      "Thu Jan 01 1970 00:00:00 GMT+0000 (Coordinated Universal Time)"
    );
    assert_eq!(to_date_string(f64::NAN), "Invalid Date");
  }
}
