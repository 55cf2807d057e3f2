//! The scope handler: the policy hook at the outermost environment of a compartment evaluation.
//!
//! Every free variable reference in evaluated code ends at this hook. Names resolve against the
//! compartment's frozen lexicals first and its global object second. The name `eval` resolves to
//! the host's unrestricted evaluator exactly once per evaluation, for the bootstrap direct eval;
//! every later lookup sees the compartment's own binding.

use crate::property::PropertyKey;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;
#[cfg(test)]
use std::cell::Cell;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeHandlerId(pub(crate) u32);

#[derive(Debug)]
pub struct ScopeHandler {
  pub(crate) global: ObjectId,
  pub(crate) lexicals: ObjectId,
  pub(crate) sloppy_globals: bool,
  /// Set just before the bootstrap lookup of `eval` and cleared by it.
  pub(crate) use_unsafe_evaluator: bool,
  pub(crate) revoked: bool,
}

impl ScopeHandler {
  pub(crate) fn new(global: ObjectId, lexicals: ObjectId, sloppy_globals: bool) -> ScopeHandler {
    ScopeHandler {
      global,
      lexicals,
      sloppy_globals,
      use_unsafe_evaluator: false,
      revoked: false,
    }
  }
}

/// Handlers of the evaluations in flight, plus those a surviving closure still resolves through.
#[derive(Default)]
pub(crate) struct ScopeHandlers {
  slots: Vec<Option<ScopeHandler>>,
  free: Vec<u32>,
}

impl ScopeHandlers {
  pub(crate) fn len(&self) -> usize {
    self.slots.len() - self.free.len()
  }
}

#[cfg(test)]
thread_local! {
  /// Makes every handler on this thread ignore the clearing of `use_unsafe_evaluator`, as a
  /// compromised handler would.
  pub(crate) static STICKY_UNSAFE_EVALUATOR: Cell<bool> = const { Cell::new(false) };
}

#[cfg(test)]
fn unsafe_evaluator_is_sticky() -> bool {
  STICKY_UNSAFE_EVALUATOR.with(Cell::get)
}

#[cfg(not(test))]
fn unsafe_evaluator_is_sticky() -> bool {
  false
}

pub(crate) fn alloc(realm: &mut Realm, handler: ScopeHandler) -> ScopeHandlerId {
  let handlers = &mut realm.scope_handlers;
  if let Some(index) = handlers.free.pop() {
    handlers.slots[index as usize] = Some(handler);
    return ScopeHandlerId(index);
  }
  handlers.slots.push(Some(handler));
  ScopeHandlerId(handlers.slots.len() as u32 - 1)
}

/// Frees a handler once no environment record refers to it.
pub(crate) fn release(realm: &mut Realm, id: ScopeHandlerId) {
  let handlers = &mut realm.scope_handlers;
  if let Some(slot) = handlers.slots.get_mut(id.0 as usize) {
    if slot.take().is_some() {
      handlers.free.push(id.0);
    }
  }
}

pub(crate) fn handler(realm: &Realm, id: ScopeHandlerId) -> Result<&ScopeHandler, VmError> {
  let handler = realm
    .scope_handlers
    .slots
    .get(id.0 as usize)
    .and_then(Option::as_ref)
    .ok_or(VmError::InvalidHandle)?;
  if handler.revoked {
    return Err(VmError::type_error(
      "Cannot perform operation on a revoked scope handler",
    ));
  }
  Ok(handler)
}

pub(crate) fn handler_mut(realm: &mut Realm, id: ScopeHandlerId) -> Result<&mut ScopeHandler, VmError> {
  realm
    .scope_handlers
    .slots
    .get_mut(id.0 as usize)
    .and_then(Option::as_mut)
    .ok_or(VmError::InvalidHandle)
}

pub(crate) fn has(realm: &mut Realm, id: ScopeHandlerId, name: &str) -> Result<bool, VmError> {
  let h = handler(realm, id)?;
  if h.sloppy_globals || name == "eval" {
    return Ok(true);
  }
  let (global, lexicals) = (h.global, h.lexicals);
  let key = PropertyKey::from(name);
  Ok(
    realm.heap.has_property(lexicals, &key)?
      || realm.heap.has_property(global, &key)?
      || realm.heap.has_property(realm.global, &key)?,
  )
}

pub(crate) fn get(realm: &mut Realm, id: ScopeHandlerId, name: &str) -> Result<Value, VmError> {
  let h = handler(realm, id)?;
  let (global, lexicals, unsafe_eval) = (h.global, h.lexicals, h.use_unsafe_evaluator);
  if name == "eval" && unsafe_eval {
    if !unsafe_evaluator_is_sticky() {
      handler_mut(realm, id)?.use_unsafe_evaluator = false;
    }
    return Ok(Value::Object(realm.intrinsics.feral_eval));
  }
  let key = PropertyKey::from(name);
  if realm.heap.has_property(lexicals, &key)? {
    return realm.get_with_receiver(lexicals, &key, Value::Object(global));
  }
  realm.get(global, &key)
}

pub(crate) fn set(realm: &mut Realm, id: ScopeHandlerId, name: &str, value: Value) -> Result<(), VmError> {
  let h = handler(realm, id)?;
  let (global, lexicals) = (h.global, h.lexicals);
  let key = PropertyKey::from(name);
  if realm.heap.has_own_property(lexicals, &key)? {
    realm.put(&Value::Object(lexicals), key, value)
  } else {
    realm.put(&Value::Object(global), key, value)
  }
}

/// Marks the handler revoked; every later operation through it fails.
pub(crate) fn revoke(realm: &mut Realm, id: ScopeHandlerId) -> Result<(), VmError> {
  handler_mut(realm, id)?.revoked = true;
  Ok(())
}
