//! Override repair.
//!
//! Freezing a prototype makes its data properties non-writable, and an inherited non-writable
//! property blocks plain assignment on every object that inherits it (`obj.toString = f` throws
//! once `Object.prototype` is frozen). Before hardening, the properties named by the chosen plan
//! are turned into accessor pairs: the getter returns the original value, the setter rejects
//! writes to the prototype itself and otherwise creates an own property on the receiver.

use crate::builtins::slot;
use crate::heap::NativeData;
use crate::intrinsics::IntrinsicRegistry;
use crate::property::PropertyDescriptor;
use crate::property::PropertyKey;
use crate::property::PropertyKind;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;
use serde::Deserialize;
use serde::Serialize;

/// How much of the shared prototypes is repaired.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideTaming {
  Min,
  #[default]
  Moderate,
  Severe,
}

impl OverrideTaming {
  pub fn plan(self) -> &'static [(&'static str, Enablement)] {
    match self {
      OverrideTaming::Min => MIN_ENABLEMENTS,
      OverrideTaming::Moderate => MODERATE_ENABLEMENTS,
      OverrideTaming::Severe => SEVERE_ENABLEMENTS,
    }
  }
}

/// One node of an enablement plan.
#[derive(Clone, Copy, Debug)]
pub enum Enablement {
  /// Repair this one property.
  Property,
  /// Repair every own data property of the value held here.
  All,
  /// Descend into the value held here.
  Nested(&'static [(&'static str, Enablement)]),
}

use Enablement::All;
use Enablement::Nested;
use Enablement::Property;

pub const MIN_ENABLEMENTS: &[(&str, Enablement)] = &[
  ("%ObjectPrototype%", Nested(&[("toString", Property)])),
  ("%FunctionPrototype%", Nested(&[("toString", Property)])),
  ("%ErrorPrototype%", Nested(&[("name", Property)])),
];

const MODERATE_COMMON: [(&str, Enablement); 11] = [
  ("%ArrayPrototype%", Nested(&[("toString", Property), ("push", Property)])),
  (
    "%FunctionPrototype%",
    Nested(&[("constructor", Property), ("bind", Property), ("toString", Property)]),
  ),
  (
    "%ErrorPrototype%",
    Nested(&[
      ("constructor", Property),
      ("message", Property),
      ("name", Property),
      ("toString", Property),
    ]),
  ),
  (
    "%TypeErrorPrototype%",
    Nested(&[("constructor", Property), ("message", Property), ("name", Property)]),
  ),
  ("%SyntaxErrorPrototype%", Nested(&[("message", Property)])),
  ("%RangeErrorPrototype%", Nested(&[("message", Property)])),
  ("%URIErrorPrototype%", Nested(&[("message", Property)])),
  ("%EvalErrorPrototype%", Nested(&[("message", Property)])),
  ("%ReferenceErrorPrototype%", Nested(&[("message", Property)])),
  ("%PromisePrototype%", Nested(&[("constructor", Property)])),
  ("%IteratorPrototype%", Nested(&[("toString", Property)])),
];

const fn moderate_with(
  object_prototype: (&'static str, Enablement),
) -> [(&'static str, Enablement); 12] {
  let mut plan = [object_prototype; 12];
  let mut i = 0;
  while i < MODERATE_COMMON.len() {
    plan[i + 1] = MODERATE_COMMON[i];
    i += 1;
  }
  plan
}

pub const MODERATE_ENABLEMENTS: &[(&str, Enablement)] = &moderate_with((
  "%ObjectPrototype%",
  Nested(&[("toString", Property), ("valueOf", Property)]),
));

pub const SEVERE_ENABLEMENTS: &[(&str, Enablement)] = &moderate_with(("%ObjectPrototype%", All));

/// Applies `taming`'s plan to the registry's objects. Returns how many properties were turned
/// into accessors.
pub fn enable_property_overrides(
  realm: &mut Realm,
  registry: &IntrinsicRegistry,
  taming: OverrideTaming,
) -> Result<usize, VmError> {
  let mut count = 0;
  for (name, plan) in taming.plan() {
    let Some(value) = registry.get(name) else {
      continue;
    };
    let path = format!("root.{}", name.trim_matches('%'));
    count += apply(realm, &path, value.clone(), *plan)?;
  }
  tracing::debug!(?taming, count, "enabled property overrides");
  Ok(count)
}

fn apply(realm: &mut Realm, path: &str, value: Value, plan: Enablement) -> Result<usize, VmError> {
  let Value::Object(obj) = value else {
    return Ok(0);
  };
  match plan {
    Property => Ok(0),
    All => {
      let mut count = 0;
      for key in realm.heap.own_property_keys(obj)? {
        count += enable(realm, path, obj, key)? as usize;
      }
      Ok(count)
    }
    Nested(props) => {
      let mut count = 0;
      for (prop, sub_plan) in props {
        let key = PropertyKey::from(*prop);
        let Some(desc) = realm.heap.get_own_property(obj, &key)? else {
          continue;
        };
        let PropertyKind::Data { value, .. } = desc.kind else {
          continue;
        };
        let sub_path = format!("{path}.{prop}");
        count += match sub_plan {
          Property => enable(realm, &sub_path, obj, key)? as usize,
          other => apply(realm, &sub_path, value, *other)?,
        };
      }
      Ok(count)
    }
  }
}

/// Replaces the configurable data property `key` of `obj` with an override accessor pair.
fn enable(realm: &mut Realm, path: &str, obj: ObjectId, key: PropertyKey) -> Result<bool, VmError> {
  let Some(desc) = realm.heap.get_own_property(obj, &key)? else {
    return Ok(false);
  };
  let PropertyKind::Data { value, .. } = desc.kind else {
    return Ok(false);
  };
  if !desc.configurable {
    return Ok(false);
  }

  let getter = realm.new_native("getter", 0, override_getter, false, vec![value.clone()], NativeData::None)?;
  realm
    .heap
    .define_property(getter, "originalValue", PropertyDescriptor::constant(value))?;
  let setter = realm.new_native(
    "setter",
    1,
    override_setter,
    false,
    vec![Value::Object(obj), key.to_value(), Value::from(path)],
    NativeData::None,
  )?;
  realm.heap.define_property(
    obj,
    key,
    PropertyDescriptor::accessor(
      Value::Object(getter),
      Value::Object(setter),
      desc.enumerable,
      desc.configurable,
    ),
  )?;
  Ok(true)
}

fn override_getter(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  slot(realm, &inv, 0)
}

fn override_setter(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let home = slot(realm, &inv, 0)?;
  let key = slot(realm, &inv, 1)?;
  if home.same_value(inv.this) {
    let path = slot(realm, &inv, 2)?;
    return Err(VmError::ReadOnlyViolation {
      property: realm.display(&key),
      path: path.as_str().unwrap_or_default().to_string(),
    });
  }
  let key = realm.to_property_key(&key)?;
  let receiver = match inv.this {
    Value::Object(receiver) => *receiver,
    other => {
      return Err(VmError::type_error(format!(
        "Cannot create property '{key}' on {}",
        realm.display(other)
      )));
    }
  };
  if realm.heap.has_own_property(receiver, &key)? {
    realm.put(inv.this, key, inv.arg(0))?;
  } else {
    realm
      .heap
      .define_own_property_or_throw(receiver, key, PropertyDescriptor::plain(inv.arg(0)).to_patch())?;
  }
  Ok(Value::Undefined)
}

#[cfg(test)]
mod tests {
  use super::Enablement;
  use super::OverrideTaming;

  fn names(taming: OverrideTaming) -> Vec<&'static str> {
    taming.plan().iter().map(|(name, _)| *name).collect()
  }

  #[test]
  fn plans_grow_with_severity() {
    assert_eq!(names(OverrideTaming::Min).len(), 3);
    assert!(names(OverrideTaming::Moderate).contains(&"%PromisePrototype%"));
    assert_eq!(names(OverrideTaming::Moderate), names(OverrideTaming::Severe));
    let object_prototype = |taming: OverrideTaming| {
      taming
        .plan()
        .iter()
        .find(|(name, _)| *name == "%ObjectPrototype%")
        .map(|(_, plan)| *plan)
    };
    assert!(matches!(object_prototype(OverrideTaming::Severe), Some(Enablement::All)));
    assert!(matches!(
      object_prototype(OverrideTaming::Moderate),
      Some(Enablement::Nested(props)) if props.len() == 2
    ));
  }
}
