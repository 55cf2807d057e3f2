//! The intrinsics collector.
//!
//! Lockdown gathers every builtin it is about to validate and harden into one
//! [`IntrinsicRegistry`], keyed by canonical name (`Array`, `%ArrayPrototype%`, ...). Entries are
//! merged from several sources (host builtins, tamers, anonymous intrinsics); two sources that
//! disagree about a name are a configuration fault. Once [`IntrinsicRegistry::finalize`] has run
//! the registry is read-only.

use crate::builtins::HostIntrinsics;
use crate::permits::Permit;
use crate::permits::PERMITS;
use crate::property::PropertyKey;
use crate::realm::ErrorKind;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;
use ahash::AHashSet;
use std::collections::BTreeMap;

/// Global value properties, defined non-writable and non-configurable on every global object.
pub const CONSTANT_PROPERTIES: [(&str, f64); 2] = [("Infinity", f64::INFINITY), ("NaN", f64::NAN)];

/// Global name → intrinsic name for bindings every global object receives.
pub const UNIVERSAL_PROPERTY_NAMES: [(&str, &str); 21] = [
  ("isFinite", "isFinite"),
  ("isNaN", "isNaN"),
  ("parseFloat", "parseFloat"),
  ("parseInt", "parseInt"),
  ("Array", "Array"),
  ("Boolean", "Boolean"),
  ("EvalError", "EvalError"),
  ("Number", "Number"),
  ("Object", "Object"),
  ("Promise", "Promise"),
  ("RangeError", "RangeError"),
  ("ReferenceError", "ReferenceError"),
  ("String", "String"),
  ("Symbol", "Symbol"),
  ("SyntaxError", "SyntaxError"),
  ("TypeError", "TypeError"),
  ("URIError", "URIError"),
  ("JSON", "JSON"),
  ("Reflect", "Reflect"),
  ("lockdown", "lockdown"),
  ("harden", "harden"),
];

/// Bindings of the start compartment's global: the full-power variants.
pub const INITIAL_GLOBAL_PROPERTY_NAMES: [(&str, &str); 5] = [
  ("Date", "%InitialDate%"),
  ("Error", "%InitialError%"),
  ("RegExp", "%InitialRegExp%"),
  ("Math", "%InitialMath%"),
  ("getStackString", "%InitialGetStackString%"),
];

/// Bindings of every other compartment's global: the powerless variants.
pub const SHARED_GLOBAL_PROPERTY_NAMES: [(&str, &str); 4] = [
  ("Date", "%SharedDate%"),
  ("Error", "%SharedError%"),
  ("RegExp", "%SharedRegExp%"),
  ("Math", "%SharedMath%"),
];

/// Canonical name → intrinsic value.
#[derive(Debug, Default, Clone)]
pub struct IntrinsicRegistry {
  entries: BTreeMap<String, Value>,
  finalized: bool,
  pseudo_natives: AHashSet<ObjectId>,
}

impl IntrinsicRegistry {
  pub fn new() -> IntrinsicRegistry {
    IntrinsicRegistry::default()
  }

  fn check_open(&self, operation: &'static str) -> Result<(), VmError> {
    if self.finalized {
      Err(VmError::RegistryFinalized(operation))
    } else {
      Ok(())
    }
  }

  /// Merges `entries`. A name may be added again only with the identical value.
  pub fn add_intrinsics<N: Into<String>>(
    &mut self,
    entries: impl IntoIterator<Item = (N, Value)>,
  ) -> Result<(), VmError> {
    self.check_open("addIntrinsics")?;
    for (name, value) in entries {
      let name = name.into();
      match self.entries.get(&name) {
        Some(existing) if !existing.same_value(&value) => {
          return Err(VmError::ConflictingDefinition { name });
        }
        Some(_) => {}
        None => {
          self.entries.insert(name, value);
        }
      }
    }
    Ok(())
  }

  /// Registers the `prototype` of every constructor entry under the name its permit declares.
  pub fn complete_prototypes(&mut self, realm: &Realm) -> Result<(), VmError> {
    self.check_open("completePrototypes")?;
    let prototype_key = PropertyKey::from("prototype");
    let mut found = Vec::new();
    for (name, value) in &self.entries {
      let Value::Object(id) = value else {
        continue;
      };
      let Some(prototype) = realm.heap.get_own_data_value(*id, &prototype_key)? else {
        continue;
      };
      let Some(permit) = PERMITS.get(name).and_then(Permit::as_tree) else {
        return Err(VmError::UnexpectedPermit {
          path: name.clone(),
          permit: "missing".to_string(),
        });
      };
      let prototype_name = match permit.get("prototype") {
        Some(Permit::Intrinsic(prototype_name)) => *prototype_name,
        other => {
          return Err(VmError::UnexpectedPermit {
            path: format!("{name}.prototype"),
            permit: other.map(Permit::describe).unwrap_or_else(|| "missing".to_string()),
          });
        }
      };
      found.push((prototype_name, prototype));
    }
    for (prototype_name, prototype) in found {
      match self.entries.get(prototype_name) {
        Some(existing) if !existing.same_value(&prototype) => {
          return Err(VmError::ConflictingBinding {
            name: prototype_name.to_string(),
          });
        }
        Some(_) => {}
        None => {
          self.entries.insert(prototype_name.to_string(), prototype);
        }
      }
    }
    Ok(())
  }

  /// Freezes the registry and records which entries are callable.
  pub fn finalize(&mut self, realm: &Realm) -> Result<(), VmError> {
    self.check_open("finalize")?;
    self.pseudo_natives = self
      .entries
      .values()
      .filter(|v| realm.heap.is_callable(v))
      .filter_map(Value::as_object)
      .collect();
    self.finalized = true;
    Ok(())
  }

  pub fn is_finalized(&self) -> bool {
    self.finalized
  }

  /// Whether `id` is one of the registry's functions. Only answered once finalized.
  pub fn is_pseudo_native(&self, id: ObjectId) -> Result<bool, VmError> {
    if !self.finalized {
      return Err(VmError::Unimplemented("isPseudoNative before finalize"));
    }
    Ok(self.pseudo_natives.contains(&id))
  }

  pub fn pseudo_natives(&self) -> impl Iterator<Item = ObjectId> + '_ {
    self.pseudo_natives.iter().copied()
  }

  pub fn get(&self, name: &str) -> Option<&Value> {
    self.entries.get(name)
  }

  pub fn object(&self, name: &str) -> Option<ObjectId> {
    self.get(name).and_then(Value::as_object)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.entries.contains_key(name)
  }

  /// Entries in name order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
    self.entries.iter().map(|(k, v)| (k.as_str(), v))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// The host builtins that need no taming: constants, universal bindings and the anonymous
/// intrinsics reachable only through other objects.
pub(crate) fn host_entries(i: &HostIntrinsics) -> Vec<(&'static str, Value)> {
  let mut entries: Vec<(&'static str, Value)> = CONSTANT_PROPERTIES
    .iter()
    .map(|(name, n)| (*name, Value::Number(*n)))
    .collect();
  entries.push(("undefined", Value::Undefined));
  let universal = [
    ("isFinite", i.is_finite),
    ("isNaN", i.is_nan),
    ("parseFloat", i.parse_float),
    ("parseInt", i.parse_int),
    ("Array", i.array),
    ("Boolean", i.boolean),
    ("Number", i.number),
    ("Object", i.object),
    ("Promise", i.promise),
    ("String", i.string),
    ("Symbol", i.symbol),
    ("JSON", i.json),
    ("Reflect", i.reflect),
    ("lockdown", i.lockdown),
    ("harden", i.harden),
  ];
  entries.extend(universal.into_iter().map(|(n, id)| (n, Value::Object(id))));
  for kind in ErrorKind::NATIVE {
    entries.push((kind.name(), Value::Object(i.error_constructor_for(kind))));
  }
  entries.extend([
    ("%ThrowTypeError%", Value::Object(i.throw_type_error)),
    ("%IteratorPrototype%", Value::Object(i.iterator_prototype)),
    ("%ArrayIteratorPrototype%", Value::Object(i.array_iterator_prototype)),
    ("%FunctionPrototype%", Value::Object(i.function_prototype)),
  ]);
  entries
}

/// The registry compartments constructed before lockdown draw their globals from: the host
/// builtins with the untamed originals standing in for both the initial and shared variants.
pub(crate) fn host_snapshot(realm: &Realm) -> Result<IntrinsicRegistry, VmError> {
  let i = &realm.intrinsics;
  let mut registry = IntrinsicRegistry::new();
  registry.add_intrinsics(host_entries(i))?;
  let originals = [
    (i.date, "%InitialDate%", "%SharedDate%"),
    (i.error, "%InitialError%", "%SharedError%"),
    (i.regexp, "%InitialRegExp%", "%SharedRegExp%"),
    (i.math, "%InitialMath%", "%SharedMath%"),
  ];
  for (id, initial, shared) in originals {
    registry.add_intrinsics([(initial, Value::Object(id)), (shared, Value::Object(id))])?;
  }
  registry.add_intrinsics([("%InitialGetStackString%", Value::Object(i.get_stack_string))])?;
  registry.finalize(realm)?;
  Ok(registry)
}

#[cfg(test)]
mod tests {
  use super::IntrinsicRegistry;
  use crate::Realm;
  use crate::Value;
  use crate::VmError;

  #[test]
  fn re_adding_the_same_value_is_allowed() -> Result<(), VmError> {
    let mut registry = IntrinsicRegistry::new();
    registry.add_intrinsics([("NaN", Value::Number(f64::NAN))])?;
    registry.add_intrinsics([("NaN", Value::Number(f64::NAN))])?;
    let err = registry.add_intrinsics([("NaN", Value::Number(1.0))]);
    assert!(matches!(err, Err(VmError::ConflictingDefinition { name }) if name == "NaN"));
    Ok(())
  }

  #[test]
  fn prototypes_are_completed_from_permits() -> Result<(), VmError> {
    let realm = Realm::new()?;
    let mut registry = IntrinsicRegistry::new();
    registry.add_intrinsics([("Array", Value::Object(realm.intrinsics.array))])?;
    registry.complete_prototypes(&realm)?;
    assert_eq!(
      registry.object("%ArrayPrototype%"),
      Some(realm.intrinsics.array_prototype)
    );
    Ok(())
  }

  #[test]
  fn mismatched_prototype_binding_conflicts() -> Result<(), VmError> {
    let realm = Realm::new()?;
    let mut registry = IntrinsicRegistry::new();
    registry.add_intrinsics([
      ("Array", Value::Object(realm.intrinsics.array)),
      ("%ArrayPrototype%", Value::Object(realm.intrinsics.object_prototype)),
    ])?;
    let err = registry.complete_prototypes(&realm);
    assert!(matches!(err, Err(VmError::ConflictingBinding { name }) if name == "%ArrayPrototype%"));
    Ok(())
  }

  #[test]
  fn finalized_registry_rejects_changes() -> Result<(), VmError> {
    let realm = Realm::new()?;
    let mut registry = IntrinsicRegistry::new();
    registry.add_intrinsics([("isNaN", Value::Object(realm.intrinsics.is_nan))])?;
    assert!(registry.is_pseudo_native(realm.intrinsics.is_nan).is_err());
    registry.finalize(&realm)?;
    assert!(registry.is_pseudo_native(realm.intrinsics.is_nan)?);
    assert!(matches!(
      registry.add_intrinsics([("x", Value::Null)]),
      Err(VmError::RegistryFinalized(_))
    ));
    assert!(matches!(registry.finalize(&realm), Err(VmError::RegistryFinalized(_))));
    Ok(())
  }
}
