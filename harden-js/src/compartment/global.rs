//! Populating a compartment's global object.

use super::evaluate::perform_eval;
use crate::builtins::function::function_source_from_args;
use crate::builtins::native_data;
use crate::heap::CompartmentId;
use crate::heap::NativeData;
use crate::heap::RegistryId;
use crate::intrinsics::CONSTANT_PROPERTIES;
use crate::intrinsics::UNIVERSAL_PROPERTY_NAMES;
use crate::property::PropertyDescriptor;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;

/// Defines the universal bindings, the given `names` (global name → intrinsic name) and
/// compartment-specific `globalThis`, `eval`, `Function` and `Compartment` on `global`.
pub(crate) fn init_global_object(
  realm: &mut Realm,
  global: ObjectId,
  compartment: CompartmentId,
  registry: RegistryId,
  names: &[(&str, &str)],
) -> Result<(), VmError> {
  for (name, value) in CONSTANT_PROPERTIES {
    realm.heap.define_property(global, name, PropertyDescriptor::constant(value))?;
  }
  realm
    .heap
    .define_property(global, "undefined", PropertyDescriptor::constant(Value::Undefined))?;

  let bindings: Vec<(&str, Value)> = {
    let entries = realm
      .registries
      .get(registry.0 as usize)
      .ok_or(VmError::InvalidHandle)?;
    UNIVERSAL_PROPERTY_NAMES
      .iter()
      .chain(names)
      .filter_map(|(global_name, intrinsic)| {
        entries.get(intrinsic).map(|v| (*global_name, v.clone()))
      })
      .collect()
  };
  for (name, value) in bindings {
    realm.heap.define_property(global, name, PropertyDescriptor::hidden(value))?;
  }
  realm
    .heap
    .define_property(global, "globalThis", PropertyDescriptor::hidden(global))?;

  let function_prototype = realm.intrinsics.function_prototype;
  let compartment_prototype = realm.intrinsics.compartment_prototype;
  let data = NativeData::Compartment(compartment);
  let eval = realm.new_native("eval", 1, compartment_eval, false, Vec::new(), data.clone())?;
  let function = realm.new_native("Function", 1, compartment_function, true, Vec::new(), data)?;
  realm
    .heap
    .define_property(function, "prototype", PropertyDescriptor::constant(function_prototype))?;
  let compartment_ctor = realm.new_native(
    "Compartment",
    0,
    super::compartment_constructor,
    true,
    Vec::new(),
    NativeData::Registry(registry),
  )?;
  realm.heap.define_property(
    compartment_ctor,
    "prototype",
    PropertyDescriptor::constant(compartment_prototype),
  )?;
  for (name, value) in [("eval", eval), ("Function", function), ("Compartment", compartment_ctor)] {
    realm.native_brands.insert(value);
    realm.heap.define_property(global, name, PropertyDescriptor::hidden(value))?;
  }
  Ok(())
}

fn owning_compartment(realm: &Realm, callee: ObjectId) -> Result<CompartmentId, VmError> {
  match native_data(realm, callee)? {
    NativeData::Compartment(id) => Ok(id),
    _ => Err(VmError::InvalidHandle),
  }
}

/// A compartment's `eval`: indirect evaluation against that compartment's global.
fn compartment_eval(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let Value::String(source) = inv.arg(0) else {
    return Ok(inv.arg(0));
  };
  let id = owning_compartment(realm, inv.callee)?;
  perform_eval(realm, id, source.to_string(), &[], false)
}

fn compartment_function(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let id = owning_compartment(realm, inv.callee)?;
  let source = function_source_from_args(realm, inv.args)?;
  perform_eval(realm, id, source, &[], false)
}
