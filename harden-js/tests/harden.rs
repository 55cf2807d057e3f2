use harden_js::harden;
use harden_js::lockdown;
use harden_js::LockdownOptions;
use harden_js::Realm;
use harden_js::Value;
use harden_js::VmError;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn locked_down() -> Result<Realm, VmError> {
  let mut realm = Realm::new()?;
  lockdown(&mut realm, LockdownOptions::default())?;
  Ok(realm)
}

#[test]
fn harden_reaches_through_accessors_and_prototypes() -> Result<(), VmError> {
  let mut realm = locked_down()?;
  let v = realm.evaluate_script(
    "t",
    r#"
      const proto = { shared: [] };
      const obj = Object.create(proto);
      const hidden = { deep: {} };
      Object.defineProperty(obj, 'secret', { get: function () { return hidden; }, configurable: true });
      harden(obj);
      [
        Object.isFrozen(obj),
        Object.isFrozen(proto),
        Object.isFrozen(proto.shared),
        Object.isFrozen(Object.getOwnPropertyDescriptor(obj, 'secret').get),
        Object.isFrozen(hidden),
      ].join()
    "#,
  )?;
  // The getter's closure scope is not part of the object graph.
  assert_eq!(v.as_str(), Some("true,true,true,true,false"));
  Ok(())
}

#[test]
fn harden_returns_its_argument() -> Result<(), VmError> {
  let mut realm = locked_down()?;
  let v = realm.evaluate_script("t", "const o = {}; [harden(o) === o, harden(3), harden(null)].join()")?;
  assert_eq!(v.as_str(), Some("true,3,"));
  Ok(())
}

#[test]
fn hardened_objects_reject_writes_in_strict_code() -> Result<(), VmError> {
  let mut realm = locked_down()?;
  let v = realm.evaluate_script(
    "t",
    "const o = harden({ a: 1 }); try { o.a = 2; 'wrote' } catch (e) { e instanceof TypeError }",
  )?;
  assert!(v.same_value(&Value::Bool(true)));
  Ok(())
}

/// Edges of a random object graph as `(from, to)` pairs over `n` nodes.
fn graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
  (1usize..10).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..20)))
}

fn reachable(n: usize, edges: &[(usize, usize)]) -> BTreeSet<usize> {
  let mut seen = BTreeSet::from([0]);
  let mut stack = vec![0];
  while let Some(node) = stack.pop() {
    for &(from, to) in edges {
      if from == node && to < n && seen.insert(to) {
        stack.push(to);
      }
    }
  }
  seen
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(32))]

  #[test]
  fn harden_freezes_exactly_the_reachable_graph((n, edges) in graph()) {
    let mut realm = locked_down().unwrap();
    let nodes: Vec<_> = (0..n).map(|_| realm.new_object()).collect();
    for (i, &(from, to)) in edges.iter().enumerate() {
      realm
        .heap_mut()
        .create_data_property_or_throw(nodes[from], format!("e{i}"), Value::Object(nodes[to]))
        .unwrap();
    }
    harden(&mut realm, Value::Object(nodes[0])).unwrap();
    let expected = reachable(n, &edges);
    for (i, &node) in nodes.iter().enumerate() {
      prop_assert_eq!(realm.heap().is_frozen(node).unwrap(), expected.contains(&i));
    }
    // Hardening again changes nothing and terminates on cycles.
    harden(&mut realm, Value::Object(nodes[0])).unwrap();
    for (i, &node) in nodes.iter().enumerate() {
      prop_assert_eq!(realm.heap().is_frozen(node).unwrap(), expected.contains(&i));
    }
  }
}
