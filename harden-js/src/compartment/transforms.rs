//! Source rewriting applied before compartment evaluation.
//!
//! The evaluator does not fully parse source before scanning it, so the mandatory transforms are
//! deliberately conservative: anything that looks like an HTML comment or a dynamic `import`
//! is rejected even inside strings and comments. The `evade_*` transforms rewrite such text into
//! something equivalent in strings and comments but harmless in code.

use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;
use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::rc::Rc;

/// A source-to-source rewrite.
#[derive(Clone)]
pub enum Transform {
  Native(Rc<dyn Fn(&str) -> Result<String, VmError>>),
  /// A JavaScript function called with the source text; it must return a string.
  Function(ObjectId),
}

impl Transform {
  pub fn native(f: impl Fn(&str) -> Result<String, VmError> + 'static) -> Transform {
    Transform::Native(Rc::new(f))
  }
}

impl fmt::Debug for Transform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Transform::Native(_) => f.write_str("Transform::Native"),
      Transform::Function(id) => f.debug_tuple("Transform::Function").field(id).finish(),
    }
  }
}

pub(crate) fn apply_transforms(
  realm: &mut Realm,
  mut source: String,
  transforms: &[Transform],
) -> Result<String, VmError> {
  for transform in transforms {
    source = match transform {
      Transform::Native(f) => f(&source)?,
      Transform::Function(func) => {
        let result = realm.call(&Value::Object(*func), Value::Undefined, &[Value::from(source)])?;
        match result {
          Value::String(s) => s.to_string(),
          other => {
            return Err(VmError::type_error(format!(
              "transform must return a string, got {}",
              realm.typeof_value(&other)
            )));
          }
        }
      }
    };
  }
  Ok(source)
}

static HTML_COMMENT: Lazy<AhoCorasick> = Lazy::new(|| AhoCorasick::new(["<!--", "-->"]).unwrap());
static IMPORT_PATTERN: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"\bimport(\s*(?:\(|/[/*]))").unwrap());
static EVAL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\beval(\s*\()").unwrap());
static SOURCE_META: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"(?:\s*//\s*[@#]\s*([a-zA-Z][a-zA-Z0-9]*)\s*=\s*([^\s\*]*)|/\*\s*[@#]\s*([a-zA-Z][a-zA-Z0-9]*)\s*=\s*([^\s\*]*)\s*\*/)\s*$",
  )
  .unwrap()
});

/// The URL named by trailing `//# sourceURL=` (or `/*# sourceURL= */`) comments, or
/// `<unknown>`. When several trailing comments name one, the earliest wins.
pub fn source_url(source: &str) -> String {
  let mut rest = source;
  let mut url = None;
  while !rest.is_empty() {
    let Some(captures) = SOURCE_META.captures(rest) else {
      break;
    };
    let Some(whole) = captures.get(0) else {
      break;
    };
    let (name, value) = match (captures.get(1), captures.get(3)) {
      (Some(name), _) => (name.as_str(), captures.get(2)),
      (None, Some(name)) => (name.as_str(), captures.get(4)),
      (None, None) => break,
    };
    if name == "sourceURL" {
      url = value.map(|v| v.as_str().to_string());
    }
    if whole.start() == rest.len() {
      break;
    }
    rest = &rest[..whole.start()];
  }
  url.unwrap_or_else(|| "<unknown>".to_string())
}

/// 1-based line of byte offset `at`.
fn line_number(source: &str, at: usize) -> usize {
  memchr::memchr_iter(b'\n', &source.as_bytes()[..at]).count() + 1
}

fn rejection(source: &str, at: usize, what: &str, code: &'static str) -> VmError {
  VmError::RejectedSource {
    code,
    message: format!(
      "Possible {what} rejected at {}:{}.",
      source_url(source),
      line_number(source, at)
    ),
  }
}

pub fn reject_html_comments(source: &str) -> Result<String, VmError> {
  match HTML_COMMENT.find(source) {
    Some(m) => Err(rejection(source, m.start(), "HTML comment", "SES_HTML_COMMENT_REJECTED")),
    None => Ok(source.to_string()),
  }
}

/// Rewrites `<!--` to `< ! --` and `-->` to `-- >`.
pub fn evade_html_comment_test(source: &str) -> Result<String, VmError> {
  Ok(HTML_COMMENT.replace_all(source, &["< ! --", "-- >"]))
}

pub fn reject_import_expressions(source: &str) -> Result<String, VmError> {
  match IMPORT_PATTERN.find(source) {
    Some(m) => Err(rejection(source, m.start(), "import expression", "SES_IMPORT_REJECTED")),
    None => Ok(source.to_string()),
  }
}

/// Rewrites `import(` to `__import__(`.
pub fn evade_import_expression_test(source: &str) -> Result<String, VmError> {
  Ok(IMPORT_PATTERN.replace_all(source, "__import__$1").into_owned())
}

pub fn reject_some_direct_eval_expressions(source: &str) -> Result<String, VmError> {
  match EVAL_PATTERN.find(source) {
    Some(m) => Err(rejection(source, m.start(), "direct eval expression", "SES_EVAL_REJECTED")),
    None => Ok(source.to_string()),
  }
}

/// The transforms every evaluation goes through last.
pub fn mandatory_transforms(source: &str) -> Result<String, VmError> {
  let source = reject_html_comments(source)?;
  reject_import_expressions(&source)
}

#[cfg(test)]
mod tests {
  use super::evade_html_comment_test;
  use super::evade_import_expression_test;
  use super::mandatory_transforms;
  use super::reject_some_direct_eval_expressions;
  use super::source_url;
  use crate::VmError;

  fn rejected(result: Result<String, VmError>) -> (String, &'static str) {
    match result {
      Err(VmError::RejectedSource { code, message }) => (message, code),
      other => panic!("expected rejection, got {other:?}"),
    }
  }

  #[test]
  fn html_comments_cite_the_line() {
    let (message, code) = rejected(mandatory_transforms("let a = 1;\nlet b = 2;\na <!-- b\n"));
    assert_eq!(code, "SES_HTML_COMMENT_REJECTED");
    assert_eq!(message, "Possible HTML comment rejected at <unknown>:3.");
    let (_, code) = rejected(mandatory_transforms("x --> y"));
    assert_eq!(code, "SES_HTML_COMMENT_REJECTED");
  }

  #[test]
  fn import_expressions_are_rejected_with_source_url() {
    let (message, code) =
      rejected(mandatory_transforms("import('x');\n//# sourceURL=mod.js\n"));
    assert_eq!(code, "SES_IMPORT_REJECTED");
    assert_eq!(message, "Possible import expression rejected at mod.js:1.");
    assert!(mandatory_transforms("const important = 1; important").is_ok());
  }

  #[test]
  fn evasion_rewrites_in_place() -> Result<(), VmError> {
    assert_eq!(evade_html_comment_test("'<!--' + '-->'")?, "'< ! --' + '-- >'");
    assert_eq!(evade_import_expression_test("import ('m')")?, "__import__ ('m')");
    assert!(mandatory_transforms(&evade_import_expression_test("import('m')")?).is_ok());
    Ok(())
  }

  #[test]
  fn direct_eval_lookalikes_are_rejected() {
    let (_, code) = rejected(reject_some_direct_eval_expressions("eval ('1')"));
    assert_eq!(code, "SES_EVAL_REJECTED");
    assert!(reject_some_direct_eval_expressions("(0, eval)('1')").is_ok());
    assert!(reject_some_direct_eval_expressions("medieval('1')").is_ok());
  }

  #[test]
  fn source_url_prefers_the_earliest_trailing_comment() {
    assert_eq!(source_url("1"), "<unknown>");
    assert_eq!(source_url("1\n//# sourceURL=a.js"), "a.js");
    assert_eq!(source_url("1\n/*# sourceURL=b.js */\n//@ sourceMappingURL=x.map\n"), "b.js");
    assert_eq!(source_url("1\n//# sourceURL=first.js\n//# sourceURL=second.js"), "first.js");
  }
}
