//! Transitive hardening.
//!
//! `harden(root)` freezes `root` and everything reachable from it through `[[Prototype]]`
//! links and own property values, getters and setters. The walk runs in two passes: every
//! queued object is frozen before its links are read, and only once the queue drains are the
//! objects added to the realm's hardened set. Objects already in that set are never walked
//! again, which keeps repeated calls and cyclic graphs cheap.

use crate::property::PropertyKind;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;
use ahash::AHashSet;

/// The realm's set of fully hardened objects.
#[derive(Debug, Default)]
pub struct Hardener {
  hardened: AHashSet<ObjectId>,
}

impl Hardener {
  pub fn is_hardened(&self, id: ObjectId) -> bool {
    self.hardened.contains(&id)
  }

  pub fn len(&self) -> usize {
    self.hardened.len()
  }

  pub fn is_empty(&self) -> bool {
    self.hardened.is_empty()
  }
}

/// Hardens `root` and returns it. Fails with [`VmError::HardenBeforeLockdown`] until lockdown has
/// completed.
pub fn harden(realm: &mut Realm, root: Value) -> Result<Value, VmError> {
  if !realm.lockdown.locked_down {
    return Err(VmError::HardenBeforeLockdown);
  }
  harden_all(realm, std::iter::once(root.clone()))?;
  Ok(root)
}

struct Work {
  to_freeze: Vec<ObjectId>,
  queued: AHashSet<ObjectId>,
}

impl Work {
  fn enqueue(&mut self, hardener: &Hardener, value: &Value) {
    let Value::Object(id) = value else {
      return;
    };
    if hardener.is_hardened(*id) || !self.queued.insert(*id) {
      return;
    }
    self.to_freeze.push(*id);
  }
}

/// Hardens every value in `roots` without checking the lockdown gate. Returns how many objects
/// were newly hardened.
pub(crate) fn harden_all(
  realm: &mut Realm,
  roots: impl IntoIterator<Item = Value>,
) -> Result<usize, VmError> {
  let mut work = Work {
    to_freeze: Vec::new(),
    queued: AHashSet::new(),
  };
  for root in roots {
    work.enqueue(&realm.hardener, &root);
  }

  let mut next = 0;
  while let Some(&obj) = work.to_freeze.get(next) {
    next += 1;
    realm.heap.freeze(obj)?;
    if let Some(proto) = realm.heap.object_prototype(obj)? {
      work.enqueue(&realm.hardener, &Value::Object(proto));
    }
    for key in realm.heap.own_property_keys(obj)? {
      let Some(desc) = realm.heap.get_own_property(obj, &key)? else {
        continue;
      };
      match desc.kind {
        PropertyKind::Data { value, .. } => work.enqueue(&realm.hardener, &value),
        PropertyKind::Accessor { get, set } => {
          work.enqueue(&realm.hardener, &get);
          work.enqueue(&realm.hardener, &set);
        }
      }
    }
  }

  let count = work.to_freeze.len();
  realm.hardener.hardened.extend(work.to_freeze);
  tracing::trace!(count, "hardened objects");
  Ok(count)
}

/// The JavaScript `harden` global.
pub(crate) fn harden_native(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  harden(realm, inv.arg(0))
}

#[cfg(test)]
mod tests {
  use super::harden;
  use super::harden_all;
  use crate::Realm;
  use crate::Value;
  use crate::VmError;

  #[test]
  fn harden_requires_lockdown() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let obj = realm.new_object();
    assert!(matches!(
      harden(&mut realm, Value::Object(obj)),
      Err(VmError::HardenBeforeLockdown)
    ));
    Ok(())
  }

  #[test]
  fn cycles_terminate_and_everything_is_frozen() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    let a = realm.new_object();
    let b = realm.new_object();
    realm.heap_mut().create_data_property_or_throw(a, "b", Value::Object(b))?;
    realm.heap_mut().create_data_property_or_throw(b, "a", Value::Object(a))?;
    realm.heap_mut().create_data_property_or_throw(a, "self", Value::Object(a))?;
    let first = harden_all(&mut realm, [Value::Object(a)])?;
    assert!(first >= 2);
    assert!(realm.heap().is_frozen(a)?);
    assert!(realm.heap().is_frozen(b)?);
    assert!(realm.hardener.is_hardened(b));
    assert_eq!(harden_all(&mut realm, [Value::Object(a)])?, 0);
    Ok(())
  }

  #[test]
  fn primitives_pass_through() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    assert_eq!(harden_all(&mut realm, [Value::Number(1.0), Value::Null])?, 0);
    Ok(())
  }
}
