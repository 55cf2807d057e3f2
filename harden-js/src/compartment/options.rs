use super::transforms;
use super::transforms::Transform;
use crate::js::lex::is_reserved_word;
use crate::property::PropertyKey;
use crate::realm::Realm;
use crate::value::Value;
use crate::VmError;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z_$][\w$]*$").unwrap());

/// Whether `name` can be mentioned as a free variable in evaluated code.
pub fn is_valid_identifier_name(name: &str) -> bool {
  name != "eval" && !is_reserved_word(name) && IDENTIFIER.is_match(name)
}

/// Options fixed when a compartment is constructed.
#[derive(Clone, Debug, Default)]
pub struct CompartmentOptions {
  pub name: Option<String>,
  pub transforms: Vec<Transform>,
  /// Bindings visible to every evaluation as if declared in an enclosing scope. They are frozen
  /// when the compartment is constructed.
  pub global_lexicals: Vec<(PropertyKey, Value)>,
}

impl CompartmentOptions {
  pub fn new() -> CompartmentOptions {
    CompartmentOptions::default()
  }

  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn transform(mut self, transform: Transform) -> Self {
    self.transforms.push(transform);
    self
  }

  pub fn global_lexical(mut self, name: &str, value: impl Into<Value>) -> Self {
    self.global_lexicals.push((PropertyKey::from(name), value.into()));
    self
  }

  /// Reads `{ name, transforms, globalLexicals }` from a JavaScript options bag.
  pub(crate) fn from_js(realm: &mut Realm, options: &Value) -> Result<CompartmentOptions, VmError> {
    let Value::Object(obj) = options else {
      return Ok(CompartmentOptions::default());
    };
    let name = match realm.get(*obj, &PropertyKey::from("name"))? {
      Value::Undefined => None,
      other => Some(realm.to_string(&other)?.to_string()),
    };
    let transforms = read_transforms(realm, options)?;
    // Only the current values of enumerable own properties are captured.
    let mut global_lexicals = Vec::new();
    if let Value::Object(lexicals) = realm.get(*obj, &PropertyKey::from("globalLexicals"))? {
      for key in realm.heap.own_property_keys(lexicals)? {
        match realm.heap.get_own_property(lexicals, &key)? {
          Some(desc) if desc.enumerable => {
            let value = realm.get(lexicals, &key)?;
            global_lexicals.push((key, value));
          }
          _ => {}
        }
      }
    }
    Ok(CompartmentOptions {
      name,
      transforms,
      global_lexicals,
    })
  }

  pub(crate) fn check_global_lexicals(&self) -> Result<(), VmError> {
    let invalid = self
      .global_lexicals
      .iter()
      .filter_map(|(key, _)| key.as_str())
      .filter(|name| !is_valid_identifier_name(name))
      .join(", ");
    if invalid.is_empty() {
      Ok(())
    } else {
      Err(VmError::type_error(format!(
        "Cannot create compartment with invalid names for global lexicals: {invalid}; these names would not be lexically mentionable"
      )))
    }
  }
}

/// Options for one `evaluate` call.
#[derive(Clone, Debug)]
pub struct EvaluateOptions {
  pub transforms: Vec<Transform>,
  /// Every free name resolves through the compartment global, so assignments to undeclared
  /// names create global properties.
  pub sloppy_globals_mode: bool,
  pub evade_html_comment_test: bool,
  pub evade_import_expression_test: bool,
  pub reject_some_direct_eval_expressions: bool,
}

impl Default for EvaluateOptions {
  fn default() -> Self {
    EvaluateOptions {
      transforms: Vec::new(),
      sloppy_globals_mode: false,
      evade_html_comment_test: false,
      evade_import_expression_test: false,
      reject_some_direct_eval_expressions: true,
    }
  }
}

impl EvaluateOptions {
  pub fn new() -> EvaluateOptions {
    EvaluateOptions::default()
  }

  pub fn transform(mut self, transform: Transform) -> Self {
    self.transforms.push(transform);
    self
  }

  pub fn sloppy_globals_mode(mut self, on: bool) -> Self {
    self.sloppy_globals_mode = on;
    self
  }

  pub fn evade_html_comment_test(mut self, on: bool) -> Self {
    self.evade_html_comment_test = on;
    self
  }

  pub fn evade_import_expression_test(mut self, on: bool) -> Self {
    self.evade_import_expression_test = on;
    self
  }

  pub fn reject_some_direct_eval_expressions(mut self, on: bool) -> Self {
    self.reject_some_direct_eval_expressions = on;
    self
  }

  /// The caller's transforms followed by the built-in ones these options switch on.
  pub(crate) fn local_transforms(&self) -> Vec<Transform> {
    let mut local = self.transforms.clone();
    if self.evade_html_comment_test {
      local.push(Transform::native(transforms::evade_html_comment_test));
    }
    if self.evade_import_expression_test {
      local.push(Transform::native(transforms::evade_import_expression_test));
    }
    if self.reject_some_direct_eval_expressions {
      local.push(Transform::native(transforms::reject_some_direct_eval_expressions));
    }
    local
  }

  pub(crate) fn from_js(realm: &mut Realm, options: &Value) -> Result<EvaluateOptions, VmError> {
    let mut out = EvaluateOptions::default();
    let Value::Object(obj) = options else {
      return Ok(out);
    };
    out.transforms = read_transforms(realm, options)?;
    let flag = |realm: &mut Realm, name: &str, default: bool| -> Result<bool, VmError> {
      Ok(match realm.get(*obj, &PropertyKey::from(name))? {
        Value::Undefined => default,
        other => matches!(other, Value::Bool(true)),
      })
    };
    out.sloppy_globals_mode = flag(realm, "sloppyGlobalsMode", false)?;
    out.evade_html_comment_test = flag(realm, "__evadeHtmlCommentTest__", false)?;
    out.evade_import_expression_test = flag(realm, "__evadeImportExpressionTest__", false)?;
    out.reject_some_direct_eval_expressions =
      flag(realm, "__rejectSomeDirectEvalExpressions__", true)?;
    Ok(out)
  }
}

fn read_transforms(realm: &mut Realm, options: &Value) -> Result<Vec<Transform>, VmError> {
  let list = realm.get_value(options, &PropertyKey::from("transforms"))?;
  if list.is_undefined() {
    return Ok(Vec::new());
  }
  let mut transforms = Vec::new();
  for item in realm.iterate_to_vec(&list)? {
    match item {
      Value::Object(func) if realm.heap.is_callable(&item) => transforms.push(Transform::Function(func)),
      other => {
        return Err(VmError::type_error(format!(
          "transform {} is not a function",
          realm.display(&other)
        )));
      }
    }
  }
  Ok(transforms)
}

#[cfg(test)]
mod tests {
  use super::is_valid_identifier_name;
  use super::CompartmentOptions;
  use super::EvaluateOptions;
  use crate::VmError;

  #[test]
  fn lexical_names_must_be_mentionable() {
    assert!(is_valid_identifier_name("$x_1"));
    assert!(!is_valid_identifier_name("eval"));
    assert!(!is_valid_identifier_name("class"));
    assert!(!is_valid_identifier_name("1abc"));
    assert!(!is_valid_identifier_name("a-b"));

    let options = CompartmentOptions::new()
      .global_lexical("ok", 1.0)
      .global_lexical("for", 2.0)
      .global_lexical("a b", 3.0);
    match options.check_global_lexicals() {
      Err(VmError::TypeError(msg)) => assert!(msg.contains("for, a b;"), "{msg}"),
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn switched_on_transforms_follow_the_callers() {
    let local = EvaluateOptions::new().evade_html_comment_test(true).local_transforms();
    assert_eq!(local.len(), 2);
    let off = EvaluateOptions::new()
      .reject_some_direct_eval_expressions(false)
      .local_transforms();
    assert!(off.is_empty());
  }
}
