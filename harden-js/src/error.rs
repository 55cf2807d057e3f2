use crate::js::error::SyntaxError;
use crate::value::Value;

/// Errors produced while repairing, hardening and evaluating inside a realm.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VmError {
  /// Two sources disagree on the descriptor registered for one intrinsic name.
  #[error("Conflicting definitions of {name}")]
  ConflictingDefinition { name: String },

  /// A constructor's `prototype` resolves to a different object than the one already registered
  /// under the permitted prototype name.
  #[error("Conflicting bindings of {name}")]
  ConflictingBinding { name: String },

  /// `lockdown` was re-invoked with an option that differs from the first invocation.
  #[error("lockdown(): cannot re-invoke with different option {name}")]
  LockdownOptionConflict { name: String },

  #[error("lockdown(): non supported option {names}")]
  UnsupportedOption { names: String },

  #[error("unrecognized {option} {value}")]
  UnrecognizedOptionValue { option: String, value: String },

  /// The intrinsic registry was modified after it was finalized.
  #[error("intrinsic registry already finalized: {0}")]
  RegistryFinalized(&'static str),

  /// The permit tree holds an entry the validator cannot interpret at this position.
  #[error("Unexpected whitelist permit {permit} at {path}")]
  UnexpectedPermit { path: String, permit: String },

  /// An intrinsic has a `[[Prototype]]` other than the one its permit names.
  #[error("Unexpected intrinsic {path}.__proto__ at {expected}")]
  UnexpectedPrototype { path: String, expected: String },

  /// A property value disagrees with the primitive type its permit names.
  #[error("At {path} expected {expected} not {actual}")]
  PermitMismatch {
    path: String,
    expected: String,
    actual: String,
  },

  /// A permit names an intrinsic by identity but the property holds another object.
  #[error("Does not match whitelist {path}")]
  IntrinsicMismatch { path: String },

  #[error("Accessor expected at {path}")]
  AccessorExpected { path: String },

  #[error("Accessor not expected at {path}")]
  AccessorNotExpected { path: String },

  /// A property without a permit could not be removed.
  #[error("failed to delete {path}")]
  UndeletableProperty { path: String },

  /// `harden` was called on a realm that has not completed `lockdown`.
  #[error("harden() is only available after lockdown()")]
  HardenBeforeLockdown,

  /// Parse failure inside evaluated source.
  #[error("{0}")]
  Syntax(SyntaxError),

  /// Source text rejected by a mandatory or optional safety transform.
  #[error("{message} ({code})")]
  RejectedSource { code: &'static str, message: String },

  /// A JavaScript `throw` value. This is catchable from JS.
  #[error("uncaught exception")]
  Throw(Value),

  #[error("TypeError: {0}")]
  TypeError(String),

  #[error("RangeError: {0}")]
  RangeError(String),

  #[error("ReferenceError: {0}")]
  ReferenceError(String),

  /// Assignment through an override accessor with the prototype itself as receiver.
  #[error("Cannot assign to read only property '{property}' of '{path}'")]
  ReadOnlyViolation { property: String, path: String },

  /// Attempted to call a non-callable value.
  #[error("value is not callable")]
  NotCallable,

  /// Attempted to construct a non-constructable value.
  #[error("value is not a constructor")]
  NotConstructable,

  /// An arena id does not refer to a live record.
  #[error("invalid handle")]
  InvalidHandle,

  /// A stubbed/unfinished codepath.
  #[error("unimplemented: {0}")]
  Unimplemented(&'static str),

  /// The scope handler of an evaluation was not consumed the way the bootstrap requires. The
  /// compartment is revoked.
  #[error("confinement breach in compartment {compartment}: {cause}")]
  ConfinementBreach { compartment: String, cause: String },

  /// The compartment was revoked by an earlier confinement breach.
  #[error("compartment {0} has been revoked")]
  CompartmentRevoked(String),
}

impl VmError {
  /// Whether evaluated code may observe this error with `try`/`catch`.
  pub fn is_catchable(&self) -> bool {
    matches!(
      self,
      VmError::Throw(_)
        | VmError::TypeError(_)
        | VmError::RangeError(_)
        | VmError::ReferenceError(_)
        | VmError::ReadOnlyViolation { .. }
        | VmError::RejectedSource { .. }
        | VmError::NotCallable
        | VmError::NotConstructable
        | VmError::Syntax(_)
    )
  }

  pub(crate) fn type_error(message: impl Into<String>) -> Self {
    VmError::TypeError(message.into())
  }
}
