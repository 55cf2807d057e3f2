//! Out-of-band annotations on error objects and the assertion helpers that create them.
//!
//! Annotations live in side tables keyed by the error's [`ObjectId`]; nothing is stored on the
//! error itself, so a frozen error can still be annotated. The causal console takes them when the
//! error is logged.

use super::details::Details;
use crate::realm::ErrorKind;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;
use ahash::AHashMap;
use ahash::AHashSet;

#[derive(Default)]
pub struct Annotations {
  /// Unredacted console arguments for errors built by [`make_error`].
  messages: AHashMap<ObjectId, Vec<Value>>,
  notes: AHashMap<ObjectId, Vec<Vec<Value>>>,
  /// Errors already logged by the causal console; later notes are logged immediately.
  logged: AHashSet<ObjectId>,
  tags: AHashMap<ObjectId, usize>,
}

impl Annotations {
  pub(crate) fn take_message(&mut self, error: ObjectId) -> Option<Vec<Value>> {
    self.messages.remove(&error)
  }

  /// Takes the pending notes of `error` and marks it logged.
  pub(crate) fn take_notes(&mut self, error: ObjectId) -> Vec<Vec<Value>> {
    self.logged.insert(error);
    self.notes.remove(&error).unwrap_or_default()
  }

  pub(crate) fn is_logged(&self, error: ObjectId) -> bool {
    self.logged.contains(&error)
  }

  /// The ordinal of `error` among all errors tagged so far, starting at 1.
  pub(crate) fn tag_number(&mut self, error: ObjectId) -> usize {
    let next = self.tags.len() + 1;
    *self.tags.entry(error).or_insert(next)
  }

  pub fn pending_notes(&self, error: ObjectId) -> usize {
    self.notes.get(&error).map_or(0, Vec::len)
  }
}

/// `"{name}#{n}"`, where `n` is stable for the life of the realm.
pub fn tag_error(realm: &mut Realm, error: ObjectId) -> String {
  let n = realm.annotations.tag_number(error);
  format!("{}#{n}", realm.error_name(error))
}

/// Creates an error whose message redacts unquoted substitutions, remembering the unredacted
/// arguments for the causal console.
pub fn make_error(realm: &mut Realm, details: &Details, kind: ErrorKind) -> Result<ObjectId, VmError> {
  let message = details.message(realm);
  let error = realm.new_error(kind, &message)?;
  realm.annotations.messages.insert(error, details.log_args());
  Ok(error)
}

/// Attaches a note to `error`. If the causal console has already logged the error the note is
/// logged right away.
pub fn note(realm: &mut Realm, error: ObjectId, details: &Details) {
  let args = details.log_args();
  if realm.annotations.is_logged(error) {
    super::console::log_note(realm, error, args);
  } else {
    realm.annotations.notes.entry(error).or_default().push(args);
  }
}

/// An error thrown from `details`, `"Assert failed"` by default.
pub fn fail(realm: &mut Realm, details: Option<&Details>, kind: ErrorKind) -> VmError {
  let default = Details::text("Assert failed");
  match make_error(realm, details.unwrap_or(&default), kind) {
    Ok(error) => VmError::Throw(Value::Object(error)),
    Err(err) => err,
  }
}

pub fn assert(realm: &mut Realm, flag: bool, details: Option<&Details>) -> Result<(), VmError> {
  if flag {
    return Ok(());
  }
  let default = Details::text("Check failed");
  Err(fail(realm, Some(details.unwrap_or(&default)), ErrorKind::Error))
}

/// Requires `SameValue(actual, expected)`; fails with a `RangeError`.
pub fn assert_equal(
  realm: &mut Realm,
  actual: &Value,
  expected: &Value,
  details: Option<&Details>,
) -> Result<(), VmError> {
  if actual.same_value(expected) {
    return Ok(());
  }
  let default = super::details::details(
    &["Expected ", " is same as ", ""],
    vec![
      super::details::redact(actual.clone()),
      super::details::redact(expected.clone()),
    ],
  );
  Err(fail(realm, Some(details.unwrap_or(&default)), ErrorKind::Range))
}

/// Requires `typeof specimen === type_name`; fails with a `TypeError`.
pub fn assert_typeof(
  realm: &mut Realm,
  specimen: &Value,
  type_name: &str,
  details: Option<&Details>,
) -> Result<(), VmError> {
  if realm.typeof_value(specimen) == type_name {
    return Ok(());
  }
  let suffix = format!(" must be {} {type_name}", super::details::an(type_name));
  let default = super::details::details(&["", &suffix], vec![super::details::redact(specimen.clone())]);
  Err(fail(realm, Some(details.unwrap_or(&default)), ErrorKind::Type))
}

#[cfg(test)]
mod tests {
  use super::assert_equal;
  use super::assert_typeof;
  use super::make_error;
  use super::note;
  use super::tag_error;
  use crate::diagnostics::details::details;
  use crate::diagnostics::details::quote;
  use crate::realm::ErrorKind;
  use crate::Realm;
  use crate::Value;
  use crate::VmError;

  fn message(realm: &mut Realm, err: VmError) -> Result<String, VmError> {
    let VmError::Throw(Value::Object(error)) = err else {
      return Err(err);
    };
    Ok(realm.display(&Value::Object(error)))
  }

  #[test]
  fn assertion_messages() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let err = assert_equal(&mut realm, &Value::Number(1.0), &Value::Number(2.0), None).unwrap_err();
    assert_eq!(message(&mut realm, err)?, "RangeError: Expected (a number) is same as (a number)");
    let err = assert_typeof(&mut realm, &Value::Null, "object", None).map(|_| ());
    assert!(err.is_ok());
    let err = assert_typeof(&mut realm, &Value::from("x"), "object", None).unwrap_err();
    assert_eq!(message(&mut realm, err)?, "TypeError: (a string) must be an object");
    Ok(())
  }

  #[test]
  fn notes_queue_until_logged() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let d = details(&["bad ", ""], vec![quote("x")]);
    let error = make_error(&mut realm, &d, ErrorKind::Type)?;
    note(&mut realm, error, &details(&["first"], vec![]));
    note(&mut realm, error, &details(&["second"], vec![]));
    assert_eq!(realm.annotations.pending_notes(error), 2);
    assert_eq!(tag_error(&mut realm, error), "TypeError#1");
    assert_eq!(tag_error(&mut realm, error), "TypeError#1");
    Ok(())
  }
}
