use super::Tamed;
use crate::property::PropertyDescriptor;
use crate::property::PropertyKey;
use crate::realm::Realm;
use crate::value::Value;
use crate::VmError;

/// Points `Function.prototype.constructor` at `%InertFunction%`, which only throws, and collects
/// the inert constructors reachable from the shared prototypes.
pub(crate) fn repair_function_constructors(realm: &mut Realm) -> Result<Tamed, VmError> {
  let i = &realm.intrinsics;
  let (function_prototype, inert_function, compartment_prototype) =
    (i.function_prototype, i.inert_function, i.compartment_prototype);
  realm.heap.define_property(
    function_prototype,
    "constructor",
    PropertyDescriptor::hidden(inert_function),
  )?;
  let inert_compartment = realm
    .heap
    .get_own_data_value(compartment_prototype, &PropertyKey::from("constructor"))?
    .unwrap_or(Value::Undefined);
  Ok(vec![
    ("%InertFunction%", Value::Object(inert_function)),
    ("%InertCompartment%", inert_compartment),
  ])
}
