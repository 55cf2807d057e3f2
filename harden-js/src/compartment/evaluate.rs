//! The confined evaluator.
//!
//! Source runs in an environment chain whose outermost record is a scope handler over the
//! compartment's lexicals and global object, and whose `this` is the compartment global. Entry
//! goes through the one sanctioned direct `eval`: the handler hands out the host evaluator for
//! the first lookup of `eval` only. If that hand-out was never consumed, or yielded something
//! else, the evaluator can no longer vouch for the compartment, which is revoked.

use super::scope;
use super::scope::ScopeHandler;
use super::transforms::apply_transforms;
use super::transforms::mandatory_transforms;
use super::transforms::source_url;
use super::transforms::Transform;
use super::CompartmentState;
use crate::heap::CompartmentId;
use crate::js::env::EnvKind;
use crate::js::interp::direct_eval;
use crate::realm::Realm;
use crate::source::SourceText;
use crate::value::Value;
use crate::VmError;
use std::rc::Rc;
use tracing::debug;
use tracing::error;
use tracing::trace;

/// Evaluates `source` in compartment `id`. `local` transforms run before the compartment's own.
pub(crate) fn perform_eval(
  realm: &mut Realm,
  id: CompartmentId,
  source: String,
  local: &[Transform],
  sloppy_globals_mode: bool,
) -> Result<Value, VmError> {
  let record = super::record(realm, id)?;
  if record.state == CompartmentState::Revoked {
    return Err(VmError::CompartmentRevoked(record.name.to_string()));
  }
  let name = record.name.clone();
  let (global, lexicals) = (record.global, record.lexicals);
  let compartment_transforms = record.transforms.clone();

  let source = apply_transforms(realm, source, local)?;
  let source = apply_transforms(realm, source, &compartment_transforms)?;
  let source = mandatory_transforms(&source)?;
  let url = source_url(&source);
  let source_name: Rc<str> = if url == "<unknown>" {
    name.clone()
  } else {
    Rc::from(url)
  };
  debug!(compartment = %name, bytes = source.len(), "evaluating");

  let handler = scope::alloc(realm, ScopeHandler::new(global, lexicals, sloppy_globals_mode));
  let scope_env = realm.envs.alloc(None, EnvKind::Scope(handler));
  let env = realm.envs.alloc(
    Some(scope_env),
    EnvKind::Program {
      this: Value::Object(global),
    },
  );

  super::record_mut(realm, id)?.enter();
  scope::handler_mut(realm, handler)?.use_unsafe_evaluator = true;
  let feral_eval = Value::Object(realm.intrinsics.feral_eval);
  let mut breach = None;
  let result = match scope::get(realm, handler, "eval") {
    Ok(evaluator) if evaluator.strict_equals(&feral_eval) => {
      direct_eval(realm, env, Rc::new(SourceText::new(source_name, source)))
    }
    Ok(_) => {
      breach = Some("eval did not resolve to the host evaluator");
      Ok(Value::Undefined)
    }
    Err(err) => Err(err),
  };
  super::record_mut(realm, id)?.leave();

  if breach.is_none() && scope::handler_mut(realm, handler)?.use_unsafe_evaluator {
    breach = Some("handler did not revoke useUnsafeEvaluator");
  }
  if breach.is_some() {
    scope::revoke(realm, handler)?;
  }
  // Closures made by this evaluation keep its records, and so the handler, alive.
  if realm.envs.release(env).is_some() && realm.envs.release(scope_env).is_some() {
    scope::release(realm, handler);
  }
  if let Some(cause) = breach {
    super::record_mut(realm, id)?.state = CompartmentState::Revoked;
    error!(compartment = %name, %cause, "confinement breach; compartment revoked");
    return Err(VmError::ConfinementBreach {
      compartment: name.to_string(),
      cause: match result {
        Err(err) => format!("{cause}: {err}"),
        Ok(_) => cause.to_string(),
      },
    });
  }
  trace!(
    compartment = %name,
    ok = result.is_ok(),
    live_envs = realm.envs.len(),
    live_handlers = realm.scope_handlers.len(),
    "evaluated"
  );
  result
}
