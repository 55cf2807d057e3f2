use super::require_callable;
use super::HostIntrinsics;
use super::Installer;
use crate::heap::ArrayIterationKind;
use crate::heap::JsObject;
use crate::heap::ObjectKind;
use crate::property::PropertyKey;
use crate::realm::relative_index;
use crate::realm::to_integer;
use crate::realm::to_length;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;
use std::cmp::Ordering;

pub(crate) fn install(ins: &mut Installer<'_>, i: &HostIntrinsics) -> Result<(), VmError> {
  let ctor = i.array;
  ins.method(ctor, "from", 1, array_from)?;
  ins.method(ctor, "isArray", 1, array_is_array)?;
  ins.method(ctor, "of", 0, array_of)?;

  let proto = i.array_prototype;
  ins.method(proto, "concat", 1, array_prototype_concat)?;
  ins.method(proto, "entries", 0, array_prototype_entries)?;
  ins.method(proto, "every", 1, array_prototype_every)?;
  ins.method(proto, "filter", 1, array_prototype_filter)?;
  ins.method(proto, "find", 1, array_prototype_find)?;
  ins.method(proto, "findIndex", 1, array_prototype_find_index)?;
  ins.method(proto, "forEach", 1, array_prototype_for_each)?;
  ins.method(proto, "includes", 1, array_prototype_includes)?;
  ins.method(proto, "indexOf", 1, array_prototype_index_of)?;
  ins.method(proto, "join", 1, array_prototype_join)?;
  ins.method(proto, "keys", 0, array_prototype_keys)?;
  ins.method(proto, "lastIndexOf", 1, array_prototype_last_index_of)?;
  ins.method(proto, "map", 1, array_prototype_map)?;
  ins.method(proto, "pop", 0, array_prototype_pop)?;
  ins.method(proto, "push", 1, array_prototype_push)?;
  ins.method(proto, "reduce", 1, array_prototype_reduce)?;
  ins.method(proto, "reverse", 0, array_prototype_reverse)?;
  ins.method(proto, "shift", 0, array_prototype_shift)?;
  ins.method(proto, "slice", 2, array_prototype_slice)?;
  ins.method(proto, "some", 1, array_prototype_some)?;
  ins.method(proto, "sort", 1, array_prototype_sort)?;
  ins.method(proto, "splice", 2, array_prototype_splice)?;
  ins.method(proto, "toLocaleString", 0, array_prototype_to_locale_string)?;
  ins.method(proto, "toString", 0, array_prototype_to_string)?;
  ins.method(proto, "unshift", 1, array_prototype_unshift)?;
  ins.value(proto, "values", i.array_values)?;
  ins.value(proto, ins.symbols.iterator, i.array_values)?;
  Ok(())
}

fn key(i: usize) -> PropertyKey {
  PropertyKey::from(i.to_string())
}

/// `ToObject(this)` and its `LengthOfArrayLike`.
fn this_array_like(realm: &mut Realm, inv: &Invocation<'_>) -> Result<(ObjectId, usize), VmError> {
  let obj = realm.to_object(inv.this)?;
  let len = realm.get(obj, &PropertyKey::from("length"))?;
  let len = to_length(realm.to_number(&len)?);
  Ok((obj, len))
}

fn set_length(realm: &mut Realm, obj: ObjectId, len: usize) -> Result<(), VmError> {
  realm.put(&Value::Object(obj), PropertyKey::from("length"), Value::Number(len as f64))
}

fn has_index(realm: &Realm, obj: ObjectId, i: usize) -> Result<bool, VmError> {
  realm.heap.has_property(obj, &key(i))
}

pub(crate) fn array_constructor(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let prototype = match inv.new_target {
    Some(nt) => realm.prototype_from_constructor(nt, realm.intrinsics.array_prototype)?,
    None => realm.intrinsics.array_prototype,
  };
  let arr = realm.new_array(Vec::new())?;
  realm.heap.object_set_prototype(arr, Some(prototype))?;
  match inv.args {
    [Value::Number(n)] => {
      let len = *n;
      if len < 0.0 || len.fract() != 0.0 || len > u32::MAX as f64 {
        return Err(VmError::RangeError("Invalid array length".to_string()));
      }
      set_length(realm, arr, len as usize)?;
    }
    items => {
      for (i, item) in items.iter().enumerate() {
        realm.heap.create_data_property_or_throw(arr, key(i), item.clone())?;
      }
    }
  }
  Ok(Value::Object(arr))
}

fn array_from(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let source = inv.arg(0);
  let map_fn = inv.arg(1);
  if !map_fn.is_undefined() {
    require_callable(realm, &map_fn)?;
  }
  let iterator_key = PropertyKey::Symbol(realm.symbols.iterator);
  let items = if source.is_nullish() {
    return Err(VmError::type_error(format!(
      "{} is not iterable",
      realm.display(&source)
    )));
  } else if realm.get_method(&source, &iterator_key)?.is_some() {
    realm.iterate_to_vec(&source)?
  } else {
    let obj = realm.to_object(&source)?;
    realm.array_like_to_vec(obj)?
  };
  let items = if map_fn.is_undefined() {
    items
  } else {
    let mut mapped = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
      mapped.push(realm.call(&map_fn, inv.arg(2), &[item, Value::Number(i as f64)])?);
    }
    mapped
  };
  Ok(Value::Object(realm.new_array(items)?))
}

fn array_is_array(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Bool(match inv.arg(0) {
    Value::Object(id) => realm.heap.is_array(id),
    _ => false,
  }))
}

fn array_of(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Object(realm.new_array(inv.args.to_vec())?))
}

fn array_prototype_concat(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let this = realm.to_object(inv.this)?;
  let mut out = Vec::new();
  let mut parts = vec![Value::Object(this)];
  parts.extend_from_slice(inv.args);
  for part in parts {
    match part {
      Value::Object(id) if realm.heap.is_array(id) => out.extend(realm.array_like_to_vec(id)?),
      other => out.push(other),
    }
  }
  Ok(Value::Object(realm.new_array(out)?))
}

pub(crate) fn create_array_iterator(
  realm: &mut Realm,
  target: ObjectId,
  kind: ArrayIterationKind,
) -> Result<Value, VmError> {
  let id = realm.heap.alloc(JsObject::new(
    Some(realm.intrinsics.array_iterator_prototype),
    ObjectKind::ArrayIterator {
      target,
      next_index: 0,
      kind,
      done: false,
    },
  ));
  Ok(Value::Object(id))
}

fn array_prototype_entries(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = realm.to_object(inv.this)?;
  create_array_iterator(realm, obj, ArrayIterationKind::Entries)
}

fn array_prototype_keys(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = realm.to_object(inv.this)?;
  create_array_iterator(realm, obj, ArrayIterationKind::Keys)
}

pub(crate) fn array_prototype_values(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = realm.to_object(inv.this)?;
  create_array_iterator(realm, obj, ArrayIterationKind::Values)
}

/// Calls `callback(element, index, obj)` for each present element until `visit` says stop.
fn for_each_present(
  realm: &mut Realm,
  inv: &Invocation<'_>,
  mut visit: impl FnMut(usize, &Value, &Value) -> bool,
) -> Result<(), VmError> {
  let (obj, len) = this_array_like(realm, inv)?;
  let callback = inv.arg(0);
  require_callable(realm, &callback)?;
  for i in 0..len {
    if !has_index(realm, obj, i)? {
      continue;
    }
    let element = realm.get(obj, &key(i))?;
    let result = realm.call(&callback, inv.arg(1), &[
      element.clone(),
      Value::Number(i as f64),
      Value::Object(obj),
    ])?;
    if !visit(i, &element, &result) {
      break;
    }
  }
  Ok(())
}

fn array_prototype_every(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let mut all = true;
  for_each_present(realm, &inv, |_, _, r| {
    all = r.truthy();
    all
  })?;
  Ok(Value::Bool(all))
}

fn array_prototype_some(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let mut any = false;
  for_each_present(realm, &inv, |_, _, r| {
    any = r.truthy();
    !any
  })?;
  Ok(Value::Bool(any))
}

fn array_prototype_filter(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let mut kept = Vec::new();
  for_each_present(realm, &inv, |_, e, r| {
    if r.truthy() {
      kept.push(e.clone());
    }
    true
  })?;
  Ok(Value::Object(realm.new_array(kept)?))
}

fn array_prototype_for_each(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  for_each_present(realm, &inv, |_, _, _| true)?;
  Ok(Value::Undefined)
}

fn array_prototype_map(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let (_, len) = this_array_like(realm, &inv)?;
  let mut mapped = Vec::new();
  for_each_present(realm, &inv, |i, _, r| {
    mapped.push((i, r.clone()));
    true
  })?;
  let out = realm.new_array(Vec::new())?;
  set_length(realm, out, len)?;
  for (i, value) in mapped {
    realm.heap.create_data_property_or_throw(out, key(i), value)?;
  }
  Ok(Value::Object(out))
}

fn find(realm: &mut Realm, inv: &Invocation<'_>) -> Result<Option<(usize, Value)>, VmError> {
  let (obj, len) = this_array_like(realm, inv)?;
  let predicate = inv.arg(0);
  require_callable(realm, &predicate)?;
  for i in 0..len {
    let element = realm.get(obj, &key(i))?;
    let hit = realm.call(&predicate, inv.arg(1), &[
      element.clone(),
      Value::Number(i as f64),
      Value::Object(obj),
    ])?;
    if hit.truthy() {
      return Ok(Some((i, element)));
    }
  }
  Ok(None)
}

fn array_prototype_find(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(find(realm, &inv)?.map(|(_, v)| v).unwrap_or(Value::Undefined))
}

fn array_prototype_find_index(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Number(
    find(realm, &inv)?.map(|(i, _)| i as f64).unwrap_or(-1.0),
  ))
}

fn array_prototype_includes(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let (obj, len) = this_array_like(realm, &inv)?;
  let start = relative_index(realm.to_number(&inv.arg(1))?, len);
  let target = inv.arg(0);
  for i in start..len {
    let element = realm.get(obj, &key(i))?;
    let same = match (&element, &target) {
      (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
      _ => element.strict_equals(&target),
    };
    if same {
      return Ok(Value::Bool(true));
    }
  }
  Ok(Value::Bool(false))
}

fn array_prototype_index_of(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let (obj, len) = this_array_like(realm, &inv)?;
  let start = relative_index(realm.to_number(&inv.arg(1))?, len);
  let target = inv.arg(0);
  for i in start..len {
    if has_index(realm, obj, i)? && realm.get(obj, &key(i))?.strict_equals(&target) {
      return Ok(Value::Number(i as f64));
    }
  }
  Ok(Value::Number(-1.0))
}

fn array_prototype_last_index_of(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let (obj, len) = this_array_like(realm, &inv)?;
  if len == 0 {
    return Ok(Value::Number(-1.0));
  }
  let from = if inv.args.len() > 1 {
    let n = to_integer(realm.to_number(&inv.arg(1))?);
    if n < 0.0 {
      len as f64 + n
    } else {
      n.min(len as f64 - 1.0)
    }
  } else {
    len as f64 - 1.0
  };
  if from < 0.0 {
    return Ok(Value::Number(-1.0));
  }
  let target = inv.arg(0);
  for i in (0..=from as usize).rev() {
    if has_index(realm, obj, i)? && realm.get(obj, &key(i))?.strict_equals(&target) {
      return Ok(Value::Number(i as f64));
    }
  }
  Ok(Value::Number(-1.0))
}

pub(crate) fn join(realm: &mut Realm, obj: ObjectId, sep: &str) -> Result<String, VmError> {
  let len = realm.get(obj, &PropertyKey::from("length"))?;
  let len = to_length(realm.to_number(&len)?);
  let mut out = String::new();
  for i in 0..len {
    if i > 0 {
      out.push_str(sep);
    }
    let element = realm.get(obj, &key(i))?;
    if !element.is_nullish() {
      out.push_str(&realm.to_string(&element)?);
    }
  }
  Ok(out)
}

fn array_prototype_join(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = realm.to_object(inv.this)?;
  let sep = match inv.arg(0) {
    Value::Undefined => ",".into(),
    other => realm.to_string(&other)?,
  };
  Ok(Value::from(join(realm, obj, &sep)?))
}

fn array_prototype_pop(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let (obj, len) = this_array_like(realm, &inv)?;
  if len == 0 {
    set_length(realm, obj, 0)?;
    return Ok(Value::Undefined);
  }
  let last = key(len - 1);
  let value = realm.get(obj, &last)?;
  realm.delete(obj, &last)?;
  set_length(realm, obj, len - 1)?;
  Ok(value)
}

fn array_prototype_push(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let (obj, len) = this_array_like(realm, &inv)?;
  let receiver = Value::Object(obj);
  for (i, item) in inv.args.iter().enumerate() {
    realm.put(&receiver, key(len + i), item.clone())?;
  }
  let len = len + inv.args.len();
  set_length(realm, obj, len)?;
  Ok(Value::Number(len as f64))
}

fn array_prototype_reduce(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let (obj, len) = this_array_like(realm, &inv)?;
  let callback = inv.arg(0);
  require_callable(realm, &callback)?;
  let mut i = 0;
  let mut acc = if inv.args.len() > 1 {
    inv.arg(1)
  } else {
    loop {
      if i >= len {
        return Err(VmError::type_error("Reduce of empty array with no initial value"));
      }
      i += 1;
      if has_index(realm, obj, i - 1)? {
        break realm.get(obj, &key(i - 1))?;
      }
    }
  };
  while i < len {
    if has_index(realm, obj, i)? {
      let element = realm.get(obj, &key(i))?;
      acc = realm.call(&callback, Value::Undefined, &[
        acc,
        element,
        Value::Number(i as f64),
        Value::Object(obj),
      ])?;
    }
    i += 1;
  }
  Ok(acc)
}

/// Rewrites `obj[0..len]` from `items`, deleting holes.
fn write_back(realm: &mut Realm, obj: ObjectId, items: Vec<Option<Value>>) -> Result<(), VmError> {
  let receiver = Value::Object(obj);
  for (i, item) in items.into_iter().enumerate() {
    match item {
      Some(value) => realm.put(&receiver, key(i), value)?,
      None => {
        realm.delete(obj, &key(i))?;
      }
    }
  }
  Ok(())
}

fn read_all(realm: &mut Realm, obj: ObjectId, len: usize) -> Result<Vec<Option<Value>>, VmError> {
  let mut items = Vec::with_capacity(len.min(1 << 16));
  for i in 0..len {
    items.push(if has_index(realm, obj, i)? {
      Some(realm.get(obj, &key(i))?)
    } else {
      None
    });
  }
  Ok(items)
}

fn array_prototype_reverse(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let (obj, len) = this_array_like(realm, &inv)?;
  let mut items = read_all(realm, obj, len)?;
  items.reverse();
  write_back(realm, obj, items)?;
  Ok(Value::Object(obj))
}

fn array_prototype_shift(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let (obj, len) = this_array_like(realm, &inv)?;
  if len == 0 {
    set_length(realm, obj, 0)?;
    return Ok(Value::Undefined);
  }
  let mut items = read_all(realm, obj, len)?;
  let first = items.remove(0).unwrap_or(Value::Undefined);
  write_back(realm, obj, items)?;
  realm.delete(obj, &key(len - 1))?;
  set_length(realm, obj, len - 1)?;
  Ok(first)
}

fn array_prototype_unshift(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let (obj, len) = this_array_like(realm, &inv)?;
  let rest = read_all(realm, obj, len)?;
  let mut items: Vec<Option<Value>> = inv.args.iter().cloned().map(Some).collect();
  items.extend(rest);
  let len = items.len();
  write_back(realm, obj, items)?;
  set_length(realm, obj, len)?;
  Ok(Value::Number(len as f64))
}

fn array_prototype_slice(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let (obj, len) = this_array_like(realm, &inv)?;
  let start = relative_index(realm.to_number(&inv.arg(0))?, len);
  let end = match inv.arg(1) {
    Value::Undefined => len,
    other => relative_index(realm.to_number(&other)?, len),
  };
  let mut out = Vec::new();
  for i in start..end.max(start) {
    out.push(realm.get(obj, &key(i))?);
  }
  Ok(Value::Object(realm.new_array(out)?))
}

fn array_prototype_splice(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let (obj, len) = this_array_like(realm, &inv)?;
  let start = relative_index(realm.to_number(&inv.arg(0))?, len);
  let delete_count = match inv.args.len() {
    0 => 0,
    1 => len - start,
    _ => {
      let n = to_integer(realm.to_number(&inv.arg(1))?);
      n.clamp(0.0, (len - start) as f64) as usize
    }
  };
  let mut items = read_all(realm, obj, len)?;
  let inserted = inv.args.get(2..).unwrap_or(&[]).iter().cloned().map(Some);
  let removed: Vec<Value> = items
    .splice(start..start + delete_count, inserted)
    .map(|v| v.unwrap_or(Value::Undefined))
    .collect();
  let new_len = items.len();
  write_back(realm, obj, items)?;
  for i in new_len..len {
    realm.delete(obj, &key(i))?;
  }
  set_length(realm, obj, new_len)?;
  Ok(Value::Object(realm.new_array(removed)?))
}

fn sort_compare(realm: &mut Realm, comparator: &Value, a: &Value, b: &Value) -> Result<Ordering, VmError> {
  match (a, b) {
    (Value::Undefined, Value::Undefined) => return Ok(Ordering::Equal),
    (Value::Undefined, _) => return Ok(Ordering::Greater),
    (_, Value::Undefined) => return Ok(Ordering::Less),
    _ => {}
  }
  if comparator.is_undefined() {
    let a = realm.to_string(a)?;
    let b = realm.to_string(b)?;
    return Ok(a.encode_utf16().cmp(b.encode_utf16()));
  }
  let result = realm.call(comparator, Value::Undefined, &[a.clone(), b.clone()])?;
  let n = realm.to_number(&result)?;
  Ok(if n < 0.0 {
    Ordering::Less
  } else if n > 0.0 {
    Ordering::Greater
  } else {
    Ordering::Equal
  })
}

/// Stable merge sort whose comparisons may call into JavaScript.
fn merge_sort(realm: &mut Realm, comparator: &Value, items: Vec<Value>) -> Result<Vec<Value>, VmError> {
  if items.len() <= 1 {
    return Ok(items);
  }
  let mut left = items;
  let right = left.split_off(left.len() / 2);
  let left = merge_sort(realm, comparator, left)?;
  let right = merge_sort(realm, comparator, right)?;
  let mut out = Vec::with_capacity(left.len() + right.len());
  let mut left = left.into_iter().peekable();
  let mut right = right.into_iter().peekable();
  while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
    if sort_compare(realm, comparator, a, b)? == Ordering::Greater {
      out.extend(right.next());
    } else {
      out.extend(left.next());
    }
  }
  out.extend(left);
  out.extend(right);
  Ok(out)
}

fn array_prototype_sort(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let comparator = inv.arg(0);
  if !comparator.is_undefined() {
    require_callable(realm, &comparator)?;
  }
  let (obj, len) = this_array_like(realm, &inv)?;
  let items = read_all(realm, obj, len)?;
  let present: Vec<Value> = items.into_iter().flatten().collect();
  let sorted = merge_sort(realm, &comparator, present)?;
  let mut items: Vec<Option<Value>> = sorted.into_iter().map(Some).collect();
  items.resize(len, None);
  write_back(realm, obj, items)?;
  Ok(Value::Object(obj))
}

fn array_prototype_to_locale_string(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let (obj, len) = this_array_like(realm, &inv)?;
  let mut parts = Vec::with_capacity(len);
  for i in 0..len {
    let element = realm.get(obj, &key(i))?;
    if element.is_nullish() {
      parts.push(String::new());
      continue;
    }
    let method = realm.get_value(&element, &PropertyKey::from("toLocaleString"))?;
    require_callable(realm, &method)?;
    let s = realm.call(&method, element, &[])?;
    parts.push(realm.to_string(&s)?.to_string());
  }
  Ok(Value::from(parts.join(",")))
}

fn array_prototype_to_string(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let obj = realm.to_object(inv.this)?;
  let join = realm.get(obj, &PropertyKey::from("join"))?;
  if realm.heap.is_callable(&join) {
    realm.call(&join, Value::Object(obj), &[])
  } else {
    super::object::object_prototype_to_string(realm, inv)
  }
}

#[cfg(test)]
mod tests {
  use crate::Realm;
  use crate::Value;
  use crate::VmError;

  fn eval(src: &str) -> Result<Value, VmError> {
    let mut realm = Realm::new()?;
    realm.evaluate_script("test", src)
  }

  #[test]
  fn splice_and_join() -> Result<(), VmError> {
    let v = eval("const a = [1, 2, 3, 4]; const r = a.splice(1, 2, 'x'); a.join('-') + '|' + r.join()")?;
    assert_eq!(v.as_str(), Some("1-x-4|2,3"));
    Ok(())
  }

  #[test]
  fn sort_is_stable_and_puts_undefined_last() -> Result<(), VmError> {
    let v = eval("[3, undefined, 1, 2].sort().join()")?;
    assert_eq!(v.as_str(), Some("1,2,3,"));
    let v = eval("[[1,'a'],[0,'b'],[1,'c']].sort((x, y) => x[0] - y[0]).map(p => p[1]).join('')")?;
    assert_eq!(v.as_str(), Some("bac"));
    Ok(())
  }

  #[test]
  fn reduce_without_initial_value_on_empty_array_throws() -> Result<(), VmError> {
    let v = eval("try { [].reduce((a, b) => a + b); 'no' } catch (e) { e instanceof TypeError }")?;
    assert!(v.truthy());
    Ok(())
  }
}
