//! `JSON`, converting through `serde_json::Value`.

use super::HostIntrinsics;
use super::Installer;
use crate::heap::ObjectKind;
use crate::property::PropertyKey;
use crate::realm::ErrorKind;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Map;
use serde_json::Number;

pub(crate) fn install(ins: &mut Installer<'_>, i: &HostIntrinsics) -> Result<(), VmError> {
  ins.method(i.json, "parse", 2, json_parse)?;
  ins.method(i.json, "stringify", 3, json_stringify)?;
  ins.to_string_tag(i.json, "JSON")?;
  Ok(())
}

enum Replacer {
  None,
  Function(Value),
  AllowList(Vec<PropertyKey>),
}

struct Serializer {
  replacer: Replacer,
  stack: Vec<ObjectId>,
}

impl Serializer {
  /// `SerializeJSONProperty`: `None` means the value is skipped.
  fn property(
    &mut self,
    realm: &mut Realm,
    holder: ObjectId,
    key: &PropertyKey,
  ) -> Result<Option<serde_json::Value>, VmError> {
    let mut value = realm.get(holder, key)?;
    if value.is_object() {
      let to_json = realm.get_value(&value, &PropertyKey::from("toJSON"))?;
      if realm.heap.is_callable(&to_json) {
        value = realm.call(&to_json, value.clone(), &[key.to_value()])?;
      }
    }
    if let Replacer::Function(replacer) = &self.replacer {
      let replacer = replacer.clone();
      value = realm.call(&replacer, Value::Object(holder), &[key.to_value(), value])?;
    }
    self.value(realm, value)
  }

  fn value(&mut self, realm: &mut Realm, value: Value) -> Result<Option<serde_json::Value>, VmError> {
    let value = match value {
      Value::Object(id) => match realm.heap.kind(id)? {
        ObjectKind::Number(n) => Value::Number(*n),
        ObjectKind::String(s) => Value::String(s.clone()),
        ObjectKind::Boolean(b) => Value::Bool(*b),
        _ => value,
      },
      other => other,
    };
    Ok(Some(match value {
      Value::Null => serde_json::Value::Null,
      Value::Bool(b) => serde_json::Value::Bool(b),
      Value::Number(n) => number(n),
      Value::String(s) => serde_json::Value::String(s.to_string()),
      Value::Undefined | Value::Symbol(_) => return Ok(None),
      Value::Object(_) if realm.heap.is_callable(&value) => return Ok(None),
      Value::Object(id) => {
        if self.stack.contains(&id) {
          return Err(VmError::type_error("Converting circular structure to JSON"));
        }
        self.stack.push(id);
        let out = if realm.heap.is_array(id) {
          self.array(realm, id)
        } else {
          self.object(realm, id)
        };
        self.stack.pop();
        out?
      }
    }))
  }

  fn array(&mut self, realm: &mut Realm, id: ObjectId) -> Result<serde_json::Value, VmError> {
    let len = realm.heap.array_length(id)?;
    let mut out = Vec::with_capacity(len as usize);
    for i in 0..len {
      let item = self.property(realm, id, &PropertyKey::from(i.to_string()))?;
      out.push(item.unwrap_or(serde_json::Value::Null));
    }
    Ok(serde_json::Value::Array(out))
  }

  fn object(&mut self, realm: &mut Realm, id: ObjectId) -> Result<serde_json::Value, VmError> {
    let keys = match &self.replacer {
      Replacer::AllowList(keys) => keys.clone(),
      _ => {
        let mut keys = Vec::new();
        for key in realm.heap.own_property_keys(id)? {
          if !matches!(key, PropertyKey::String(_)) {
            continue;
          }
          if realm.heap.get_own_property(id, &key)?.is_some_and(|d| d.enumerable) {
            keys.push(key);
          }
        }
        keys
      }
    };
    let mut out = Map::new();
    for key in keys {
      if let Some(value) = self.property(realm, id, &key)? {
        out.insert(key.to_string(), value);
      }
    }
    Ok(serde_json::Value::Object(out))
  }
}

fn number(n: f64) -> serde_json::Value {
  if n.is_finite() && n.trunc() == n && n.abs() < 9007199254740992.0 {
    serde_json::Value::Number(Number::from(n as i64))
  } else {
    Number::from_f64(n)
      .map(serde_json::Value::Number)
      .unwrap_or(serde_json::Value::Null)
  }
}

fn gap(realm: &mut Realm, space: &Value) -> Result<String, VmError> {
  let space = match space {
    Value::Object(id) => match realm.heap.kind(*id)? {
      ObjectKind::Number(n) => Value::Number(*n),
      ObjectKind::String(s) => Value::String(s.clone()),
      _ => space.clone(),
    },
    other => other.clone(),
  };
  Ok(match space {
    Value::Number(n) => " ".repeat(n.clamp(0.0, 10.0) as usize),
    Value::String(s) => s.chars().take(10).collect(),
    _ => String::new(),
  })
}

fn write(value: &serde_json::Value, indent: &str) -> Result<String, VmError> {
  let bytes = if indent.is_empty() {
    serde_json::to_vec(value)
  } else {
    let mut out = Vec::new();
    let mut ser =
      serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(indent.as_bytes()));
    value.serialize(&mut ser).map(|_| out)
  }
  .map_err(|err| VmError::type_error(err.to_string()))?;
  String::from_utf8(bytes).map_err(|err| VmError::type_error(err.to_string()))
}

/// `JSON.stringify(value)` with no replacer or indent.
pub(crate) fn stringify(realm: &mut Realm, value: Value) -> Result<Option<String>, VmError> {
  let mut ser = Serializer {
    replacer: Replacer::None,
    stack: Vec::new(),
  };
  let holder = realm.new_object();
  realm.heap.create_data_property_or_throw(holder, "", value)?;
  match ser.property(realm, holder, &PropertyKey::from(""))? {
    Some(json) => Ok(Some(write(&json, "")?)),
    None => Ok(None),
  }
}

fn json_stringify(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let replacer = match inv.arg(1) {
    f if realm.heap.is_callable(&f) => Replacer::Function(f),
    Value::Object(list) if realm.heap.is_array(list) => {
      let mut keys = Vec::new();
      for item in realm.array_like_to_vec(list)? {
        let key = match item {
          Value::String(_) | Value::Number(_) => realm.to_property_key(&item)?,
          _ => continue,
        };
        if !keys.contains(&key) {
          keys.push(key);
        }
      }
      Replacer::AllowList(keys)
    }
    _ => Replacer::None,
  };
  let indent = gap(realm, &inv.arg(2))?;
  let mut ser = Serializer {
    replacer,
    stack: Vec::new(),
  };
  let holder = realm.new_object();
  realm.heap.create_data_property_or_throw(holder, "", inv.arg(0))?;
  match ser.property(realm, holder, &PropertyKey::from(""))? {
    Some(json) => Ok(Value::from(write(&json, &indent)?)),
    None => Ok(Value::Undefined),
  }
}

/// Builds plain JavaScript data from parsed JSON.
pub(crate) fn from_json(realm: &mut Realm, json: &serde_json::Value) -> Result<Value, VmError> {
  Ok(match json {
    serde_json::Value::Null => Value::Null,
    serde_json::Value::Bool(b) => Value::Bool(*b),
    serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
    serde_json::Value::String(s) => Value::from(s.as_str()),
    serde_json::Value::Array(items) => {
      let mut values = Vec::with_capacity(items.len());
      for item in items {
        values.push(from_json(realm, item)?);
      }
      Value::Object(realm.new_array(values)?)
    }
    serde_json::Value::Object(map) => {
      let obj = realm.new_object();
      for (key, value) in map {
        let value = from_json(realm, value)?;
        realm
          .heap
          .create_data_property_or_throw(obj, key.as_str(), value)?;
      }
      Value::Object(obj)
    }
  })
}

/// `InternalizeJSONProperty`.
fn internalize(realm: &mut Realm, reviver: &Value, holder: ObjectId, key: PropertyKey) -> Result<Value, VmError> {
  let value = realm.get(holder, &key)?;
  if let Value::Object(obj) = value {
    let keys = if realm.heap.is_array(obj) {
      (0..realm.heap.array_length(obj)?)
        .map(|i| PropertyKey::from(i.to_string()))
        .collect()
    } else {
      realm.heap.own_property_keys(obj)?
    };
    for k in keys {
      let revived = internalize(realm, reviver, obj, k.clone())?;
      if revived.is_undefined() {
        realm.heap.delete_own_property(obj, &k)?;
      } else {
        realm.heap.create_data_property(obj, k, revived)?;
      }
    }
  }
  realm.call(reviver, Value::Object(holder), &[key.to_value(), value])
}

fn json_parse(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let text = realm.to_string(&inv.arg(0))?;
  let json: serde_json::Value = match serde_json::from_str(&text) {
    Ok(json) => json,
    Err(err) => {
      let error = realm.new_error(ErrorKind::Syntax, &format!("JSON.parse: {err}"))?;
      return Err(VmError::Throw(Value::Object(error)));
    }
  };
  let value = from_json(realm, &json)?;
  let reviver = inv.arg(1);
  if !realm.heap.is_callable(&reviver) {
    return Ok(value);
  }
  let root = realm.new_object();
  realm.heap.create_data_property_or_throw(root, "", value)?;
  internalize(realm, &reviver, root, PropertyKey::from(""))
}

#[cfg(test)]
mod tests {
  use crate::Realm;
  use crate::VmError;

  #[test]
  fn stringify_keeps_key_order_and_skips_functions() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script(
      "t",
      "JSON.stringify({ b: 1, a: [1.5, undefined, 'x'], f: function () {}, n: NaN })",
    )?;
    assert_eq!(v.as_str(), Some(r#"{"b":1,"a":[1.5,null,"x"],"n":null}"#));
    Ok(())
  }

  #[test]
  fn stringify_rejects_cycles() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script(
      "t",
      "const a = {}; a.self = a; try { JSON.stringify(a) } catch (e) { e.message }",
    )?;
    assert_eq!(v.as_str(), Some("Converting circular structure to JSON"));
    Ok(())
  }

  #[test]
  fn parse_with_reviver() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script(
      "t",
      "JSON.parse('{\"a\":1,\"b\":[2,3]}', (k, v) => typeof v === 'number' ? v * 10 : v).b[1]",
    )?;
    assert_eq!(v.as_number(), Some(30.0));
    Ok(())
  }
}
