use super::untamed;
use super::Tamed;
use super::Taming;
use crate::property::PropertyKey;
use crate::realm::Realm;
use crate::value::Value;
use crate::VmError;

/// `%SharedMath%` is a copy of `Math` without `random`.
pub(crate) fn tame_math(realm: &mut Realm, taming: Taming) -> Result<Tamed, VmError> {
  let original = realm.intrinsics.math;
  if taming == Taming::Unsafe {
    return Ok(untamed("%InitialMath%", "%SharedMath%", Value::Object(original)));
  }
  let shared = realm.new_object();
  let random = PropertyKey::from("random");
  for key in realm.heap.own_property_keys(original)? {
    if key == random {
      continue;
    }
    if let Some(desc) = realm.heap.get_own_property(original, &key)? {
      realm.heap.define_property(shared, key, desc)?;
    }
  }
  Ok(vec![
    ("%InitialMath%", Value::Object(original)),
    ("%SharedMath%", Value::Object(shared)),
  ])
}
