//! The permit validator.
//!
//! Walks the intrinsic registry against [`PERMITS`] and deletes every own property the tree does
//! not permit. Structural disagreements (a wrong `[[Prototype]]`, a primitive of the wrong type,
//! a data property where an accessor is permitted) are fatal; unpermitted properties are only
//! traced and removed.

use crate::intrinsics::IntrinsicRegistry;
use crate::permits::Permit;
use crate::permits::PermitTree;
use crate::permits::FUNCTION_INSTANCE;
use crate::permits::PERMITS;
use crate::property::PropertyKey;
use crate::property::PropertyKind;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;
use ahash::AHashSet;

const OBJECT_PROTOTYPE: &str = "%ObjectPrototype%";

/// The projection of a property key onto permit names: strings as-is, symbols as `@@name`.
pub fn permit_name(realm: &Realm, key: &PropertyKey) -> String {
  match key {
    PropertyKey::String(s) => s.to_string(),
    PropertyKey::Symbol(sym) => {
      let description = realm.heap.symbol_description(*sym);
      match description.as_deref().and_then(|d| d.strip_prefix("Symbol.")) {
        Some(well_known) => format!("@@{well_known}"),
        None => format!("@@[{}]", description.as_deref().unwrap_or("")),
      }
    }
  }
}

struct Validator<'a> {
  realm: &'a mut Realm,
  registry: &'a IntrinsicRegistry,
  visited: AHashSet<ObjectId>,
  removed: Vec<String>,
}

/// Validates every registry entry, returning the paths of removed properties in visiting order.
/// Validating an already validated graph removes nothing.
pub fn whitelist_intrinsics(
  realm: &mut Realm,
  registry: &IntrinsicRegistry,
) -> Result<Vec<String>, VmError> {
  let mut validator = Validator {
    realm,
    registry,
    visited: AHashSet::new(),
    removed: Vec::new(),
  };
  for (name, value) in registry.iter() {
    let path = format!("intrinsics.{name}");
    let permit = match PERMITS.get(name) {
      Some(Permit::Absent) | None => {
        return Err(VmError::UnexpectedPermit {
          path,
          permit: "missing".to_string(),
        });
      }
      Some(permit) => permit,
    };
    validator.check_value(&path, name, value, permit)?;
  }
  let removed = validator.removed;
  tracing::debug!(removed = removed.len(), "whitelisted intrinsics");
  Ok(removed)
}

impl Validator<'_> {
  fn check_prototype(&self, path: &str, obj: ObjectId, expected: Option<&str>) -> Result<(), VmError> {
    let actual = self.realm.heap.object_prototype(obj)?;
    let ok = match (actual, expected) {
      (None, None) => true,
      (Some(actual), Some(name)) => self.registry.object(name) == Some(actual),
      // A missing name on a non-null prototype means `%ObjectPrototype%`.
      (Some(actual), None) => self.registry.object(OBJECT_PROTOTYPE) == Some(actual),
      (None, Some(_)) => false,
    };
    if ok {
      Ok(())
    } else {
      Err(VmError::UnexpectedPrototype {
        path: path.to_string(),
        expected: expected.unwrap_or("null").to_string(),
      })
    }
  }

  fn visit_properties(&mut self, path: &str, value: &Value, tree: &PermitTree) -> Result<(), VmError> {
    let obj = match value {
      Value::Undefined => return Ok(()),
      Value::Object(obj) => *obj,
      other => {
        return Err(VmError::PermitMismatch {
          path: path.to_string(),
          expected: "object".to_string(),
          actual: self.realm.typeof_value(other).to_string(),
        });
      }
    };
    if !self.visited.insert(obj) {
      return Ok(());
    }
    self.check_prototype(path, obj, tree.prototype)?;
    let callable = self.realm.heap.is_callable(value);
    if callable {
      self.realm.native_brands.insert(obj);
    }
    for key in self.realm.heap.own_property_keys(obj)? {
      let name = permit_name(self.realm, &key);
      let sub_path = format!("{path}.{name}");
      let permit = tree.get(&name).or_else(|| {
        if callable {
          FUNCTION_INSTANCE.get(&name)
        } else {
          None
        }
      });
      if let Some(permit) = permit {
        if self.check_property(&sub_path, obj, &key, &name, permit)? {
          continue;
        }
      }
      if !matches!(permit, Some(Permit::Absent)) {
        tracing::info!(target: "harden_js::validate", path = %sub_path, "Removing {sub_path}");
        self.removed.push(sub_path.clone());
      }
      if !self.realm.heap.delete_own_property(obj, &key)? {
        return Err(VmError::UndeletableProperty { path: sub_path });
      }
    }
    Ok(())
  }

  fn check_property(
    &mut self,
    path: &str,
    obj: ObjectId,
    key: &PropertyKey,
    name: &str,
    permit: &Permit,
  ) -> Result<bool, VmError> {
    let Some(desc) = self.realm.heap.get_own_property(obj, key)? else {
      return Ok(true);
    };
    if matches!(permit, Permit::Absent) {
      return Ok(false);
    }
    match (desc.kind, permit) {
      (PropertyKind::Data { .. }, Permit::Accessor { .. }) => Err(VmError::AccessorExpected {
        path: path.to_string(),
      }),
      (PropertyKind::Data { value, .. }, permit) => self.check_value(path, name, &value, permit),
      (PropertyKind::Accessor { get, set }, Permit::Accessor { get: get_permit, set: set_permit }) => {
        Ok(
          self.check_value(&format!("{path}<get>"), name, &get, get_permit)?
            && self.check_value(&format!("{path}<set>"), name, &set, set_permit)?,
        )
      }
      (PropertyKind::Accessor { .. }, _) => Err(VmError::AccessorNotExpected {
        path: path.to_string(),
      }),
    }
  }

  /// Checks one value against its permit. `Ok(false)` means the property must go.
  fn check_value(&mut self, path: &str, name: &str, value: &Value, permit: &Permit) -> Result<bool, VmError> {
    match permit {
      Permit::Nested(tree) => {
        self.visit_properties(path, value, tree)?;
        Ok(true)
      }
      Permit::Absent => Ok(false),
      Permit::Intrinsic(intrinsic) if name == "prototype" || name == "constructor" => {
        match self.registry.get(intrinsic) {
          Some(expected) if expected.same_value(value) => Ok(true),
          Some(_) => Err(VmError::IntrinsicMismatch {
            path: path.to_string(),
          }),
          None => Err(VmError::UnexpectedPermit {
            path: path.to_string(),
            permit: intrinsic.to_string(),
          }),
        }
      }
      Permit::Primitive(kind) => {
        let actual = self.realm.typeof_value(value);
        if actual == kind.type_name() {
          Ok(true)
        } else {
          Err(VmError::PermitMismatch {
            path: path.to_string(),
            expected: kind.type_name().to_string(),
            actual: actual.to_string(),
          })
        }
      }
      other => Err(VmError::UnexpectedPermit {
        path: path.to_string(),
        permit: other.describe(),
      }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::permit_name;
  use super::Validator;
  use crate::intrinsics::IntrinsicRegistry;
  use crate::permits::Permit;
  use crate::permits::PermitTree;
  use crate::permits::PrimitiveKind;
  use crate::property::PropertyDescriptor;
  use crate::property::PropertyKey;
  use crate::value::Value;
  use crate::Realm;
  use crate::VmError;
  use ahash::AHashSet;

  #[test]
  fn absent_accessors_are_deleted_silently() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let obj = realm.heap.alloc_ordinary(None);
    realm.heap.define_property(
      obj,
      "stack",
      PropertyDescriptor::accessor(Value::Undefined, Value::Undefined, false, true),
    )?;
    realm.heap.define_property(obj, "kept", PropertyDescriptor::plain(1.0))?;
    realm.heap.define_property(obj, "stray", PropertyDescriptor::plain(2.0))?;
    let tree = PermitTree {
      prototype: None,
      properties: vec![
        ("stack", Permit::Absent),
        ("kept", Permit::Primitive(PrimitiveKind::Number)),
      ],
    };
    let registry = IntrinsicRegistry::new();
    let mut validator = Validator {
      realm: &mut realm,
      registry: &registry,
      visited: AHashSet::new(),
      removed: Vec::new(),
    };
    validator.visit_properties("root", &Value::Object(obj), &tree)?;
    assert_eq!(validator.removed, vec!["root.stray".to_string()]);
    assert!(!realm.heap.has_own_property(obj, &PropertyKey::from("stack"))?);
    assert!(realm.heap.has_own_property(obj, &PropertyKey::from("kept"))?);
    Ok(())
  }

  #[test]
  fn symbols_project_to_at_at_names() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let iterator = realm.well_known_symbols().iterator;
    assert_eq!(permit_name(&realm, &PropertyKey::Symbol(iterator)), "@@iterator");
    let own = realm.heap_mut().new_symbol(Some("mine"));
    assert_eq!(permit_name(&realm, &PropertyKey::Symbol(own)), "@@[mine]");
    assert_eq!(permit_name(&realm, &PropertyKey::from("x")), "x");
    Ok(())
  }
}
