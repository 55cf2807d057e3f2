use super::HostIntrinsics;
use super::Installer;
use crate::heap::ObjectKind;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::value::SymbolId;
use crate::value::Value;
use crate::VmError;

pub(crate) fn install(ins: &mut Installer<'_>, i: &HostIntrinsics) -> Result<(), VmError> {
  let ctor = i.symbol;
  let symbols = ins.symbols;
  ins.constant(ctor, "hasInstance", symbols.has_instance)?;
  ins.constant(ctor, "iterator", symbols.iterator)?;
  ins.constant(ctor, "toPrimitive", symbols.to_primitive)?;
  ins.constant(ctor, "toStringTag", symbols.to_string_tag)?;

  let proto = i.symbol_prototype;
  ins.getter(proto, "description", symbol_prototype_description)?;
  ins.method(proto, "toString", 0, symbol_prototype_to_string)?;
  ins.method(proto, "valueOf", 0, symbol_prototype_value_of)?;
  ins.to_string_tag(proto, "Symbol")?;
  Ok(())
}

pub(crate) fn symbol_function(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  if inv.new_target.is_some() {
    return Err(VmError::type_error("Symbol is not a constructor"));
  }
  let description = match inv.arg(0) {
    Value::Undefined => None,
    other => Some(realm.to_string(&other)?),
  };
  Ok(Value::Symbol(realm.heap.new_symbol(description.as_deref())))
}

fn this_symbol(realm: &Realm, this: &Value) -> Result<SymbolId, VmError> {
  match this {
    Value::Symbol(s) => return Ok(*s),
    Value::Object(id) => {
      if let ObjectKind::Symbol(s) = realm.heap.kind(*id)? {
        return Ok(*s);
      }
    }
    _ => {}
  }
  Err(VmError::type_error("Symbol.prototype method called on incompatible receiver"))
}

fn symbol_prototype_description(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let sym = this_symbol(realm, inv.this)?;
  Ok(match realm.heap.symbol_description(sym) {
    Some(d) => Value::String(d),
    None => Value::Undefined,
  })
}

fn symbol_prototype_to_string(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let sym = this_symbol(realm, inv.this)?;
  Ok(Value::from(realm.display(&Value::Symbol(sym))))
}

fn symbol_prototype_value_of(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  Ok(Value::Symbol(this_symbol(realm, inv.this)?))
}
