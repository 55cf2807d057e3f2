use super::installer;
use super::untamed;
use super::Tamed;
use super::Taming;
use crate::builtins::regexp::regexp_constructor;
use crate::property::PropertyDescriptor;
use crate::property::PropertyKey;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;

/// Splits `RegExp` into `%InitialRegExp%` and `%SharedRegExp%` and drops `compile`.
pub(crate) fn tame_regexp(realm: &mut Realm, taming: Taming) -> Result<Tamed, VmError> {
  let original = realm.intrinsics.regexp;
  if taming == Taming::Unsafe {
    return Ok(untamed("%InitialRegExp%", "%SharedRegExp%", Value::Object(original)));
  }
  let prototype = realm.intrinsics.regexp_prototype;
  let initial = regexp_constructor_for(realm, prototype)?;
  let shared = regexp_constructor_for(realm, prototype)?;
  realm
    .heap
    .delete_own_property(prototype, &PropertyKey::from("compile"))?;
  realm
    .heap
    .define_property(prototype, "constructor", PropertyDescriptor::hidden(shared))?;
  Ok(vec![
    ("%InitialRegExp%", Value::Object(initial)),
    ("%SharedRegExp%", Value::Object(shared)),
  ])
}

fn regexp_constructor_for(realm: &mut Realm, prototype: ObjectId) -> Result<ObjectId, VmError> {
  let mut ins = installer(realm);
  let ctor = ins.constructable("RegExp", 2, regexp_constructor)?;
  ins.constant(ctor, "prototype", prototype)?;
  Ok(ctor)
}
