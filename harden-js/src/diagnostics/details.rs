//! Message templates whose substitutions are redacted unless explicitly quoted.

use crate::heap::ObjectKind;
use crate::property::PropertyKey;
use crate::realm::Realm;
use crate::value::number_to_string;
use crate::value::ObjectId;
use crate::value::Value;
use ahash::AHashSet;

/// One substitution of a [`Details`] template.
#[derive(Clone, Debug)]
pub enum Substitution {
  /// Shown in the error message.
  Quote(Value),
  /// Replaced by a type description in the message; only the console sees the value.
  Redact(Value),
}

impl Substitution {
  pub fn value(&self) -> &Value {
    match self {
      Substitution::Quote(v) | Substitution::Redact(v) => v,
    }
  }
}

/// Marks `value` as safe to show in error messages.
pub fn quote(value: impl Into<Value>) -> Substitution {
  Substitution::Quote(value.into())
}

/// The default treatment of a substitution.
pub fn redact(value: impl Into<Value>) -> Substitution {
  Substitution::Redact(value.into())
}

/// A template with `parts.len() == subs.len() + 1`.
#[derive(Clone, Debug)]
pub struct Details {
  parts: Vec<String>,
  subs: Vec<Substitution>,
}

/// Builds a template from literal pieces and the substitutions between them. Missing trailing
/// pieces are treated as empty.
pub fn details(parts: &[&str], subs: Vec<Substitution>) -> Details {
  let mut parts: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
  parts.resize(subs.len() + 1, String::new());
  Details { parts, subs }
}

impl Details {
  /// A template with no substitutions.
  pub fn text(message: &str) -> Details {
    details(&[message], Vec::new())
  }

  pub fn substitutions(&self) -> &[Substitution] {
    &self.subs
  }

  /// The message an error built from this template carries: quoted values are rendered,
  /// everything else is reduced to a type description.
  pub fn message(&self, realm: &Realm) -> String {
    let mut out = self.parts[0].clone();
    for (sub, part) in self.subs.iter().zip(&self.parts[1..]) {
      match sub {
        Substitution::Quote(v) => out.push_str(&best_effort_stringify(realm, v)),
        Substitution::Redact(v) => {
          let kind = match v {
            Value::Object(id) if is_error(realm, *id) => realm.error_name(*id),
            other => realm.typeof_value(other).to_string(),
          };
          out.push_str(&format!("({} {kind})", an(&kind)));
        }
      }
      out.push_str(part);
    }
    out
  }

  /// Console arguments: the literal pieces interleaved with the raw substitution values, with
  /// the single spaces around each substitution dropped.
  pub fn log_args(&self) -> Vec<Value> {
    let mut args: Vec<Value> = vec![Value::from(self.parts[0].as_str())];
    for (sub, next) in self.subs.iter().zip(&self.parts[1..]) {
      let prior = match args.pop() {
        Some(Value::String(s)) => s.strip_suffix(' ').unwrap_or(&s).to_string(),
        Some(other) => {
          args.push(other);
          String::new()
        }
        None => String::new(),
      };
      if !prior.is_empty() {
        args.push(Value::from(prior));
      }
      args.push(sub.value().clone());
      args.push(Value::from(next.strip_prefix(' ').unwrap_or(next)));
    }
    if matches!(args.last(), Some(Value::String(s)) if s.is_empty()) {
      args.pop();
    }
    args
  }
}

/// `"a"` or `"an"`, by the first letter of `word`.
pub fn an(word: &str) -> &'static str {
  match word.chars().next() {
    Some(c) if "aeiouAEIOU".contains(c) => "an",
    _ => "a",
  }
}

pub(crate) fn is_error(realm: &Realm, id: ObjectId) -> bool {
  matches!(realm.heap.kind(id), Ok(ObjectKind::Error { .. }))
}

/// A JSON-like rendering that never calls into JavaScript and never fails: strings are quoted,
/// non-JSON values are bracketed and cycles print as `[Seen]`.
pub fn best_effort_stringify(realm: &Realm, value: &Value) -> String {
  let mut seen = AHashSet::new();
  stringify_inner(realm, value, &mut seen)
}

fn stringify_inner(realm: &Realm, value: &Value, seen: &mut AHashSet<ObjectId>) -> String {
  match value {
    Value::Undefined => "[undefined]".to_string(),
    Value::Null => "null".to_string(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) if n.is_finite() => number_to_string(*n),
    Value::Number(n) => format!("[{}]", number_to_string(*n)),
    Value::String(s) => serde_json::to_string(&**s).unwrap_or_else(|_| format!("\"{s}\"")),
    Value::Symbol(_) => format!("[{}]", realm.display(value)),
    Value::Object(id) => {
      let id = *id;
      match realm.heap.kind(id) {
        Ok(ObjectKind::Function(_)) => {
          return format!("[{}]", capitalize_function(&realm.display(value)));
        }
        Ok(ObjectKind::Error { .. }) => return format!("[{}]", realm.display(value)),
        _ => {}
      }
      if !seen.insert(id) {
        return "[Seen]".to_string();
      }
      let keys = realm.heap.own_property_keys(id).unwrap_or_default();
      let mut entries = Vec::new();
      let is_array = realm.heap.is_array(id);
      for key in keys {
        let PropertyKey::String(name) = &key else {
          continue;
        };
        let Ok(Some(desc)) = realm.heap.get_own_property(id, &key) else {
          continue;
        };
        if !desc.enumerable {
          continue;
        }
        let rendered = match desc.value() {
          Some(v) => stringify_inner(realm, v, seen),
          None => "[Accessor]".to_string(),
        };
        if is_array {
          entries.push(rendered);
        } else {
          let name = serde_json::to_string(&**name).unwrap_or_else(|_| format!("\"{name}\""));
          entries.push(format!("{name}:{rendered}"));
        }
      }
      seen.remove(&id);
      if is_array {
        format!("[{}]", entries.join(","))
      } else {
        format!("{{{}}}", entries.join(","))
      }
    }
  }
}

fn capitalize_function(display: &str) -> String {
  match display.strip_prefix("function") {
    Some(rest) => format!("Function{rest}"),
    None => display.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::an;
  use super::best_effort_stringify;
  use super::details;
  use super::quote;
  use super::redact;
  use crate::Realm;
  use crate::Value;
  use crate::VmError;

  #[test]
  fn message_redacts_unless_quoted() -> Result<(), VmError> {
    let realm = Realm::new()?;
    let d = details(&["got ", " and ", ""], vec![redact("secret"), quote("shown")]);
    assert_eq!(d.message(&realm), "got (a string) and \"shown\"");
    let d = details(&["n=", ""], vec![redact(Value::Number(1.0))]);
    assert_eq!(d.message(&realm), "n=(a number)");
    Ok(())
  }

  #[test]
  fn log_args_trim_single_spaces() {
    let d = details(&["Expected ", " is same as ", ""], vec![redact(1.0), redact(2.0)]);
    let args = d.log_args();
    assert_eq!(args.len(), 4);
    assert_eq!(args[0].as_str(), Some("Expected"));
    assert_eq!(args[1].as_number(), Some(1.0));
    assert_eq!(args[2].as_str(), Some("is same as"));
    assert_eq!(args[3].as_number(), Some(2.0));
  }

  #[test]
  fn stringify_marks_cycles_and_specials() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script("t", "const o = { a: [1, NaN], u: undefined }; o.self = o; o")?;
    assert_eq!(
      best_effort_stringify(&realm, &v),
      r#"{"a":[1,[NaN]],"u":[undefined],"self":[Seen]}"#
    );
    assert_eq!(an("error"), "an");
    assert_eq!(an("TypeError"), "a");
    Ok(())
  }
}
