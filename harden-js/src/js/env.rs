use crate::compartment::scope::ScopeHandlerId;
use crate::js::error::SyntaxError;
use crate::js::error::SyntaxErrorType;
use crate::js::loc::Loc;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;
use ahash::AHashMap;
use std::rc::Rc;

/// Handle to an environment record in a realm's [`Envs`] arena. A handle outliving its record
/// resolves to [`VmError::InvalidHandle`], even after the slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EnvId {
  index: u32,
  generation: u32,
}

#[derive(Clone, Debug)]
pub enum EnvKind {
  /// Block, catch, loop iteration and direct-eval scopes. Resolves `this` lexically.
  Declarative,
  /// Activation of a non-arrow function.
  Function { this: Value },
  /// Top level of an evaluated script.
  Program { this: Value },
  /// Object environment over a global object. Host scripts resolve free names here.
  Global(ObjectId),
  /// The interception hook at the outermost frame of a compartment evaluation.
  Scope(ScopeHandlerId),
}

#[derive(Clone, Debug)]
struct Binding {
  // `None` while in the temporal dead zone.
  value: Option<Value>,
  mutable: bool,
}

pub struct EnvRecord {
  pub outer: Option<EnvId>,
  pub kind: EnvKind,
  bindings: AHashMap<Rc<str>, Binding>,
  // Reachable from a closure. Implies every outer record is captured too.
  captured: bool,
}

/// Result of looking up a name in a single declarative record.
pub enum BindingLookup {
  Missing,
  Uninitialized,
  Found(Value),
}

struct Slot {
  generation: u32,
  record: Option<EnvRecord>,
}

/// Arena of environment records.
///
/// Records are released when the scope that allocated them exits, unless a closure captured
/// them; released slots are reused by later allocations.
#[derive(Default)]
pub struct Envs {
  slots: Vec<Slot>,
  free: Vec<u32>,
}

impl Envs {
  pub fn alloc(&mut self, outer: Option<EnvId>, kind: EnvKind) -> EnvId {
    let record = EnvRecord {
      outer,
      kind,
      bindings: AHashMap::new(),
      captured: false,
    };
    if let Some(index) = self.free.pop() {
      let slot = &mut self.slots[index as usize];
      slot.record = Some(record);
      return EnvId {
        index,
        generation: slot.generation,
      };
    }
    let index = self.slots.len() as u32;
    self.slots.push(Slot {
      generation: 0,
      record: Some(record),
    });
    EnvId {
      index,
      generation: 0,
    }
  }

  pub fn get(&self, id: EnvId) -> Result<&EnvRecord, VmError> {
    match self.slots.get(id.index as usize) {
      Some(Slot {
        generation,
        record: Some(record),
      }) if *generation == id.generation => Ok(record),
      _ => Err(VmError::InvalidHandle),
    }
  }

  fn get_mut(&mut self, id: EnvId) -> Result<&mut EnvRecord, VmError> {
    match self.slots.get_mut(id.index as usize) {
      Some(Slot {
        generation,
        record: Some(record),
      }) if *generation == id.generation => Ok(record),
      _ => Err(VmError::InvalidHandle),
    }
  }

  /// Records that a closure holds `id`, keeping it and its outer records alive for good.
  pub fn capture(&mut self, id: EnvId) -> Result<(), VmError> {
    let mut next = Some(id);
    while let Some(id) = next {
      let record = self.get_mut(id)?;
      if record.captured {
        break;
      }
      record.captured = true;
      next = record.outer;
    }
    Ok(())
  }

  /// Frees `id` unless it was captured. Returns the kind of a freed record.
  ///
  /// Callers release a record only once the scope that allocated it has exited.
  pub fn release(&mut self, id: EnvId) -> Option<EnvKind> {
    let slot = self.slots.get_mut(id.index as usize)?;
    if slot.generation != id.generation || slot.record.as_ref()?.captured {
      return None;
    }
    let record = slot.record.take()?;
    slot.generation = slot.generation.wrapping_add(1);
    self.free.push(id.index);
    Some(record.kind)
  }

  /// Number of live records.
  pub fn len(&self) -> usize {
    self.slots.len() - self.free.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn outer(&self, id: EnvId) -> Result<Option<EnvId>, VmError> {
    Ok(self.get(id)?.outer)
  }

  pub fn kind(&self, id: EnvId) -> Result<&EnvKind, VmError> {
    Ok(&self.get(id)?.kind)
  }

  pub fn has_binding(&self, id: EnvId, name: &str) -> Result<bool, VmError> {
    Ok(self.get(id)?.bindings.contains_key(name))
  }

  /// Creates a lexical binding. Duplicate declarations in one record are rejected.
  pub fn declare(
    &mut self,
    id: EnvId,
    name: Rc<str>,
    mutable: bool,
    value: Option<Value>,
  ) -> Result<(), VmError> {
    let record = self.get_mut(id)?;
    if record.bindings.contains_key(&name) {
      return Err(VmError::Syntax(SyntaxError::new(
        SyntaxErrorType::DuplicateDeclaration,
        Loc::default(),
        None,
      )));
    }
    record.bindings.insert(name, Binding { value, mutable });
    Ok(())
  }

  /// Creates a `var` binding initialized to `undefined`, unless one already exists.
  pub fn declare_var(&mut self, id: EnvId, name: Rc<str>) -> Result<(), VmError> {
    let record = self.get_mut(id)?;
    record.bindings.entry(name).or_insert(Binding {
      value: Some(Value::Undefined),
      mutable: true,
    });
    Ok(())
  }

  /// Creates or overwrites a mutable, initialized binding. Used for hoisted functions and
  /// parameters.
  pub fn put(&mut self, id: EnvId, name: Rc<str>, value: Value) -> Result<(), VmError> {
    self.get_mut(id)?.bindings.insert(name, Binding {
      value: Some(value),
      mutable: true,
    });
    Ok(())
  }

  pub fn initialize(&mut self, id: EnvId, name: &str, value: Value) -> Result<(), VmError> {
    let record = self.get_mut(id)?;
    match record.bindings.get_mut(name) {
      Some(binding) => {
        binding.value = Some(value);
        Ok(())
      }
      None => Err(VmError::Unimplemented("initializing an undeclared binding")),
    }
  }

  pub fn lookup(&self, id: EnvId, name: &str) -> Result<BindingLookup, VmError> {
    Ok(match self.get(id)?.bindings.get(name) {
      None => BindingLookup::Missing,
      Some(Binding { value: None, .. }) => BindingLookup::Uninitialized,
      Some(Binding {
        value: Some(value), ..
      }) => BindingLookup::Found(value.clone()),
    })
  }

  /// Assigns an existing binding. Returns `Ok(false)` if this record has no such binding.
  pub fn assign(&mut self, id: EnvId, name: &str, value: Value) -> Result<bool, VmError> {
    let record = self.get_mut(id)?;
    let Some(binding) = record.bindings.get_mut(name) else {
      return Ok(false);
    };
    if binding.value.is_none() {
      return Err(VmError::ReferenceError(format!(
        "Cannot access '{name}' before initialization"
      )));
    }
    if !binding.mutable {
      return Err(VmError::type_error("Assignment to constant variable."));
    }
    binding.value = Some(value);
    Ok(true)
  }

  /// Copies every binding of `from` into a fresh record with the same outer environment. Gives
  /// each `for (let ...)` iteration its own bindings.
  pub fn copy_for_iteration(&mut self, from: EnvId) -> Result<EnvId, VmError> {
    let record = self.get(from)?;
    let outer = record.outer;
    let kind = record.kind.clone();
    let bindings = record.bindings.clone();
    let id = self.alloc(outer, kind);
    self.get_mut(id)?.bindings = bindings;
    Ok(id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn temporal_dead_zone_and_constants() {
    let mut envs = Envs::default();
    let env = envs.alloc(None, EnvKind::Declarative);
    envs.declare(env, Rc::from("x"), false, None).unwrap();
    assert!(matches!(envs.lookup(env, "x").unwrap(), BindingLookup::Uninitialized));
    assert!(matches!(
      envs.assign(env, "x", Value::Number(1.0)),
      Err(VmError::ReferenceError(_))
    ));
    envs.initialize(env, "x", Value::Number(1.0)).unwrap();
    assert!(matches!(
      envs.assign(env, "x", Value::Number(2.0)),
      Err(VmError::TypeError(_))
    ));
    assert!(matches!(envs.lookup(env, "y").unwrap(), BindingLookup::Missing));
    assert!(envs.declare(env, Rc::from("x"), true, None).is_err());
  }

  #[test]
  fn released_records_are_reused_unless_captured() {
    let mut envs = Envs::default();
    let outer = envs.alloc(None, EnvKind::Declarative);
    let inner = envs.alloc(Some(outer), EnvKind::Declarative);
    assert!(envs.release(inner).is_some());
    assert!(envs.release(inner).is_none());
    assert!(matches!(envs.lookup(inner, "x"), Err(VmError::InvalidHandle)));
    let reused = envs.alloc(Some(outer), EnvKind::Declarative);
    assert_ne!(reused, inner);
    assert!(matches!(envs.lookup(inner, "x"), Err(VmError::InvalidHandle)));
    assert_eq!(envs.len(), 2);

    envs.capture(reused).unwrap();
    assert!(envs.release(reused).is_none());
    assert!(envs.release(outer).is_none());
    assert_eq!(envs.len(), 2);
  }

  #[test]
  fn iteration_copies_are_independent() {
    let mut envs = Envs::default();
    let env = envs.alloc(None, EnvKind::Declarative);
    envs.declare(env, Rc::from("i"), true, Some(Value::Number(0.0))).unwrap();
    let next = envs.copy_for_iteration(env).unwrap();
    assert!(envs.assign(next, "i", Value::Number(1.0)).unwrap());
    let BindingLookup::Found(Value::Number(n)) = envs.lookup(env, "i").unwrap() else {
      panic!("expected binding");
    };
    assert_eq!(n, 0.0);
  }
}
