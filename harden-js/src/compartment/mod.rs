//! Compartments: isolated global objects over the shared, hardened intrinsics.
//!
//! A compartment owns a global object, a frozen object of global lexicals and a list of source
//! transforms. Each `evaluate` runs source through the confined evaluator in [`evaluate`] with
//! the compartment's global as `this` and as the backing store for free variables.

pub mod evaluate;
pub mod global;
pub mod options;
pub mod scope;
pub mod transforms;

use crate::builtins::native_data;
use crate::builtins::HostIntrinsics;
use crate::builtins::Installer;
use crate::heap::CompartmentId;
use crate::heap::FunctionKind;
use crate::heap::JsObject;
use crate::heap::NativeData;
use crate::heap::ObjectKind;
use crate::heap::RegistryId;
use crate::intrinsics::host_snapshot;
use crate::intrinsics::SHARED_GLOBAL_PROPERTY_NAMES;
use crate::property::PropertyKey;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;
use evaluate::perform_eval;
use options::CompartmentOptions;
use options::EvaluateOptions;
use std::rc::Rc;
use transforms::Transform;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompartmentState {
  Constructed,
  Evaluating,
  Idle,
  /// Terminal. Set after a confinement breach.
  Revoked,
}

#[derive(Debug)]
pub struct CompartmentRecord {
  pub(crate) name: Rc<str>,
  pub(crate) global: ObjectId,
  pub(crate) lexicals: ObjectId,
  pub(crate) transforms: Vec<Transform>,
  pub(crate) state: CompartmentState,
  /// Nesting depth of in-flight `evaluate` calls.
  pub(crate) active: u32,
  pub(crate) registry: RegistryId,
}

impl CompartmentRecord {
  pub(crate) fn enter(&mut self) {
    self.active += 1;
    if self.state != CompartmentState::Revoked {
      self.state = CompartmentState::Evaluating;
    }
  }

  pub(crate) fn leave(&mut self) {
    self.active = self.active.saturating_sub(1);
    if self.active == 0 && self.state == CompartmentState::Evaluating {
      self.state = CompartmentState::Idle;
    }
  }
}

pub(crate) fn record(realm: &Realm, id: CompartmentId) -> Result<&CompartmentRecord, VmError> {
  realm
    .compartments
    .get(id.0 as usize)
    .ok_or(VmError::InvalidHandle)
}

pub(crate) fn record_mut(realm: &mut Realm, id: CompartmentId) -> Result<&mut CompartmentRecord, VmError> {
  realm
    .compartments
    .get_mut(id.0 as usize)
    .ok_or(VmError::InvalidHandle)
}

fn frozen_lexicals(realm: &mut Realm, lexicals: Vec<(PropertyKey, Value)>) -> Result<ObjectId, VmError> {
  let obj = realm.heap.alloc_ordinary(None);
  for (key, value) in lexicals {
    realm.heap.create_data_property_or_throw(obj, key, value)?;
  }
  realm.heap.freeze(obj)?;
  Ok(obj)
}

/// Registers the realm's start compartment: the host global object, governed by the host
/// snapshot registry until lockdown installs its own.
pub(crate) fn install_start_compartment(realm: &mut Realm) -> Result<(), VmError> {
  let snapshot = host_snapshot(realm)?;
  let registry = RegistryId(realm.registries.len() as u32);
  realm.registries.push(snapshot);
  let lexicals = frozen_lexicals(realm, Vec::new())?;
  realm.compartments.push(CompartmentRecord {
    name: Rc::from("start"),
    global: realm.global,
    lexicals,
    transforms: Vec::new(),
    state: CompartmentState::Constructed,
    active: 0,
    registry,
  });
  let ctor = realm.intrinsics.compartment;
  if let ObjectKind::Function(FunctionKind::Native(native)) = &mut realm.heap.get_mut(ctor)?.kind {
    native.data = NativeData::Registry(registry);
  }
  Ok(())
}

/// Builds a compartment record and its global object. `endowments` are copied onto the global
/// after the standard bindings, so they may shadow them.
fn create(
  realm: &mut Realm,
  registry: RegistryId,
  endowments: Vec<(PropertyKey, Value)>,
  options: CompartmentOptions,
) -> Result<CompartmentId, VmError> {
  options.check_global_lexicals()?;
  let id = CompartmentId(realm.compartments.len() as u32);
  let name: Rc<str> = Rc::from(options.name.as_deref().unwrap_or("<unknown>"));
  let global = realm.new_object();
  let lexicals = frozen_lexicals(realm, options.global_lexicals)?;
  realm.compartments.push(CompartmentRecord {
    name: name.clone(),
    global,
    lexicals,
    transforms: options.transforms,
    state: CompartmentState::Constructed,
    active: 0,
    registry,
  });
  global::init_global_object(realm, global, id, registry, &SHARED_GLOBAL_PROPERTY_NAMES)?;
  for (key, value) in endowments {
    realm.put(&Value::Object(global), key, value)?;
  }
  tracing::debug!(compartment = %name, id = id.0, "constructed compartment");
  Ok(id)
}

/// Own enumerable properties of `source`, read in `Object.assign` order.
fn assignable_entries(realm: &mut Realm, source: &Value) -> Result<Vec<(PropertyKey, Value)>, VmError> {
  let Value::Object(obj) = source else {
    return Ok(Vec::new());
  };
  let mut entries = Vec::new();
  for key in realm.heap.own_property_keys(*obj)? {
    match realm.heap.get_own_property(*obj, &key)? {
      Some(desc) if desc.enumerable => {
        let value = realm.get(*obj, &key)?;
        entries.push((key, value));
      }
      _ => {}
    }
  }
  Ok(entries)
}

/// `new Compartment(endowments, moduleMap, options)`. The module map is accepted and ignored.
pub(crate) fn compartment_constructor(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let Some(new_target) = inv.new_target else {
    return Err(VmError::type_error(
      "Class constructor Compartment cannot be invoked without 'new'",
    ));
  };
  let registry = match native_data(realm, inv.callee)? {
    NativeData::Registry(registry) => registry,
    _ => return Err(VmError::InvalidHandle),
  };
  let options = CompartmentOptions::from_js(realm, &inv.arg(2))?;
  let endowments = assignable_entries(realm, &inv.arg(0))?;
  let prototype =
    realm.prototype_from_constructor(new_target, realm.intrinsics.compartment_prototype)?;
  let id = create(realm, registry, endowments, options)?;
  let instance = realm
    .heap
    .alloc(JsObject::new(Some(prototype), ObjectKind::Compartment(id)));
  Ok(Value::Object(instance))
}

fn this_compartment(realm: &Realm, this: &Value, method: &str) -> Result<CompartmentId, VmError> {
  if let Value::Object(obj) = this {
    if let ObjectKind::Compartment(id) = realm.heap.kind(*obj)? {
      return Ok(*id);
    }
  }
  Err(VmError::type_error(format!(
    "Compartment.prototype.{method} called on incompatible receiver {}",
    realm.display(this)
  )))
}

fn compartment_evaluate(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let id = this_compartment(realm, inv.this, "evaluate")?;
  let Value::String(source) = inv.arg(0) else {
    return Err(VmError::type_error("first argument of evaluate() must be a string"));
  };
  let options = EvaluateOptions::from_js(realm, &inv.arg(1))?;
  perform_eval(
    realm,
    id,
    source.to_string(),
    &options.local_transforms(),
    options.sloppy_globals_mode,
  )
}

fn compartment_global_this(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let id = this_compartment(realm, inv.this, "globalThis")?;
  Ok(Value::Object(record(realm, id)?.global))
}

fn compartment_name(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let id = this_compartment(realm, inv.this, "name")?;
  Ok(Value::String(record(realm, id)?.name.clone()))
}

fn compartment_to_string(_realm: &mut Realm, _inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::from("[object Compartment]"))
}

fn inert_compartment(_realm: &mut Realm, _inv: Invocation<'_>) -> Result<Value, VmError> {
  Err(VmError::type_error(
    "Compartment.prototype.constructor is not a valid constructor.",
  ))
}

fn inert_compartment_to_string(_realm: &mut Realm, _inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::from("function Compartment() { [native code] }"))
}

/// Populates `%CompartmentPrototype%`. Its `constructor` is an inert stand-in so that reaching
/// the prototype never yields a working constructor bound to some compartment's registry.
pub(crate) fn install_prototype(ins: &mut Installer<'_>, i: &HostIntrinsics) -> Result<(), VmError> {
  let prototype = i.compartment_prototype;
  let inert = ins.constructable("Compartment", 0, inert_compartment)?;
  ins.constant(inert, "prototype", prototype)?;
  ins.method(inert, "toString", 0, inert_compartment_to_string)?;
  ins.value(prototype, "constructor", inert)?;
  ins.method(prototype, "evaluate", 1, compartment_evaluate)?;
  ins.method(prototype, "toString", 0, compartment_to_string)?;
  ins.getter(prototype, "globalThis", compartment_global_this)?;
  ins.getter(prototype, "name", compartment_name)?;
  Ok(())
}

impl Realm {
  /// Creates a compartment whose global receives the powerless shared intrinsics, then the own
  /// enumerable properties of `endowments`.
  pub fn new_compartment(
    &mut self,
    endowments: Option<ObjectId>,
    options: CompartmentOptions,
  ) -> Result<CompartmentId, VmError> {
    let registry = self.lockdown.registry.unwrap_or(RegistryId(0));
    let endowments = match endowments {
      Some(obj) => assignable_entries(self, &Value::Object(obj))?,
      None => Vec::new(),
    };
    create(self, registry, endowments, options)
  }

  /// Evaluates `source` in compartment `id` and returns its completion value.
  pub fn evaluate_in(
    &mut self,
    id: CompartmentId,
    source: &str,
    options: EvaluateOptions,
  ) -> Result<Value, VmError> {
    perform_eval(
      self,
      id,
      source.to_string(),
      &options.local_transforms(),
      options.sloppy_globals_mode,
    )
  }

  pub fn compartment_global(&self, id: CompartmentId) -> Result<ObjectId, VmError> {
    Ok(record(self, id)?.global)
  }

  pub fn compartment_name(&self, id: CompartmentId) -> Result<Rc<str>, VmError> {
    Ok(record(self, id)?.name.clone())
  }

  pub fn compartment_state(&self, id: CompartmentId) -> Result<CompartmentState, VmError> {
    Ok(record(self, id)?.state)
  }
}

#[cfg(test)]
mod tests {
  use super::options::CompartmentOptions;
  use super::options::EvaluateOptions;
  use super::record_mut;
  use super::scope::STICKY_UNSAFE_EVALUATOR;
  use super::CompartmentState;
  use crate::heap::CompartmentId;
  use crate::property::PropertyKey;
  use crate::Realm;
  use crate::Value;
  use crate::VmError;

  #[test]
  fn state_moves_from_constructed_to_idle() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let id = realm.new_compartment(None, CompartmentOptions::new().name("c"))?;
    assert_eq!(realm.compartment_state(id)?, CompartmentState::Constructed);
    let v = realm.evaluate_in(id, "1 + 1", EvaluateOptions::new())?;
    assert!(v.same_value(&Value::Number(2.0)));
    assert_eq!(realm.compartment_state(id)?, CompartmentState::Idle);
    assert_eq!(&*realm.compartment_name(id)?, "c");
    Ok(())
  }

  #[test]
  fn revoked_compartments_refuse_evaluation() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let id = realm.new_compartment(None, CompartmentOptions::new().name("gone"))?;
    record_mut(&mut realm, id)?.state = CompartmentState::Revoked;
    assert!(matches!(
      realm.evaluate_in(id, "1", EvaluateOptions::new()),
      Err(VmError::CompartmentRevoked(name)) if name == "gone"
    ));
    Ok(())
  }

  #[test]
  fn breached_handlers_revoke_the_compartment() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let id = realm.new_compartment(None, CompartmentOptions::new().name("leaky"))?;
    STICKY_UNSAFE_EVALUATOR.with(|sticky| sticky.set(true));
    let result = realm.evaluate_in(id, "globalThis.leak = () => Math; 1", EvaluateOptions::new());
    STICKY_UNSAFE_EVALUATOR.with(|sticky| sticky.set(false));
    match result {
      Err(VmError::ConfinementBreach { compartment, cause }) => {
        assert_eq!(compartment, "leaky");
        assert!(cause.contains("useUnsafeEvaluator"), "{cause}");
      }
      other => panic!("unexpected {other:?}"),
    }
    assert_eq!(realm.compartment_state(id)?, CompartmentState::Revoked);
    assert!(matches!(
      realm.evaluate_in(id, "1", EvaluateOptions::new()),
      Err(VmError::CompartmentRevoked(name)) if name == "leaky"
    ));

    // Code left behind by the breached evaluation resolves names through the revoked handler.
    let global = realm.compartment_global(id)?;
    let leak = realm.get(global, &PropertyKey::from("leak"))?;
    assert!(matches!(
      realm.call(&leak, Value::Undefined, &[]),
      Err(VmError::TypeError(message)) if message.contains("revoked")
    ));
    Ok(())
  }

  #[test]
  fn finished_evaluations_release_their_records() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let id = realm.new_compartment(None, CompartmentOptions::new().name("c"))?;
    realm.evaluate_in(id, "0", EvaluateOptions::new())?;
    let live = |realm: &Realm| (realm.envs.len(), realm.scope_handlers.len());
    let before = live(&realm);
    let v = realm.evaluate_in(
      id,
      r#"
        let t = 0;
        for (let i = 0; i < 200; i++) {
          const j = i;
          try { if (j % 2) throw j; } catch (e) { t += e; }
        }
        for (const k of [1, 2, 3]) { t += k; }
        t
      "#,
      EvaluateOptions::new(),
    )?;
    assert!(v.same_value(&Value::Number(10006.0)));
    assert_eq!(live(&realm), before);

    // Records a closure holds survive, however long the evaluation ran.
    let retained = |realm: &mut Realm, n: usize| -> Result<usize, VmError> {
      let before = realm.envs.len();
      let source = format!(
        "function id(k) {{ return k; }} let t = 0; for (let i = 0; i < {n}; i++) {{ t += id(i); }} t"
      );
      realm.evaluate_in(id, &source, EvaluateOptions::new())?;
      Ok(realm.envs.len() - before)
    };
    assert_eq!(retained(&mut realm, 10)?, retained(&mut realm, 500)?);

    realm.evaluate_in(
      id,
      "globalThis.counter = (() => { let n = 0; return () => ++n; })(); 0",
      EvaluateOptions::new(),
    )?;
    let v = realm.evaluate_in(id, "counter() + counter()", EvaluateOptions::new())?;
    assert!(v.same_value(&Value::Number(3.0)));
    Ok(())
  }

  #[test]
  fn start_compartment_wraps_the_host_global() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    assert_eq!(realm.compartment_global(CompartmentId::START)?, realm.global());
    let v = realm.evaluate_in(CompartmentId::START, "typeof Compartment", EvaluateOptions::new())?;
    assert_eq!(v.as_str(), Some("function"));
    Ok(())
  }

  #[test]
  fn calling_without_new_fails() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let v = realm.evaluate_script(
      "t",
      "try { Compartment(); 'called' } catch (e) { e.message }",
    )?;
    assert_eq!(
      v.as_str(),
      Some("Class constructor Compartment cannot be invoked without 'new'")
    );
    Ok(())
  }
}
