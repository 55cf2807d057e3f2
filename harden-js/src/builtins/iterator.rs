use super::HostIntrinsics;
use super::Installer;
use crate::heap::ArrayIterationKind;
use crate::heap::ObjectKind;
use crate::property::PropertyKey;
use crate::realm::to_length;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;

pub(crate) fn install(ins: &mut Installer<'_>, i: &HostIntrinsics) -> Result<(), VmError> {
  let iterator = ins.symbols.iterator;
  ins.symbol_method(i.iterator_prototype, iterator, "[Symbol.iterator]", 0, iterator_prototype_iterator)?;
  ins.method(i.array_iterator_prototype, "next", 0, array_iterator_prototype_next)?;
  ins.to_string_tag(i.array_iterator_prototype, "Array Iterator")?;
  Ok(())
}

fn iterator_prototype_iterator(_realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(inv.this.clone())
}

pub(crate) fn iter_result(realm: &mut Realm, value: Value, done: bool) -> Result<Value, VmError> {
  let result = realm.new_object();
  realm.heap.create_data_property_or_throw(result, "value", value)?;
  realm
    .heap
    .create_data_property_or_throw(result, "done", Value::Bool(done))?;
  Ok(Value::Object(result))
}

fn advance(realm: &mut Realm, id: ObjectId) -> Result<Option<(ObjectId, u32, ArrayIterationKind)>, VmError> {
  let ObjectKind::ArrayIterator {
    target,
    next_index,
    kind,
    done,
  } = realm.heap.kind(id)?.clone()
  else {
    return Err(VmError::type_error("next method called on incompatible receiver"));
  };
  if done {
    return Ok(None);
  }
  let len = realm.get(target, &PropertyKey::from("length"))?;
  let len = to_length(realm.to_number(&len)?);
  let obj = realm.heap.get_mut(id)?;
  if next_index as usize >= len {
    obj.kind = ObjectKind::ArrayIterator {
      target,
      next_index,
      kind,
      done: true,
    };
    return Ok(None);
  }
  obj.kind = ObjectKind::ArrayIterator {
    target,
    next_index: next_index + 1,
    kind,
    done: false,
  };
  Ok(Some((target, next_index, kind)))
}

fn array_iterator_prototype_next(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let Value::Object(id) = inv.this else {
    return Err(VmError::type_error("next method called on incompatible receiver"));
  };
  let Some((target, index, kind)) = advance(realm, *id)? else {
    return iter_result(realm, Value::Undefined, true);
  };
  let value = match kind {
    ArrayIterationKind::Keys => Value::Number(index as f64),
    ArrayIterationKind::Values => realm.get(target, &PropertyKey::from(index.to_string()))?,
    ArrayIterationKind::Entries => {
      let element = realm.get(target, &PropertyKey::from(index.to_string()))?;
      Value::Object(realm.new_array(vec![Value::Number(index as f64), element])?)
    }
  };
  iter_result(realm, value, false)
}
