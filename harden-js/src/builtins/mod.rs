//! Native implementations of the host primordials and construction of the pre-lockdown host
//! environment.

pub(crate) mod array;
pub(crate) mod console;
pub(crate) mod date;
pub(crate) mod error;
pub(crate) mod function;
pub(crate) mod global;
pub(crate) mod iterator;
pub(crate) mod json;
pub(crate) mod math;
pub(crate) mod number;
pub(crate) mod object;
pub(crate) mod promise;
pub(crate) mod reflect;
pub(crate) mod regexp;
pub(crate) mod string;
pub(crate) mod symbol;

use crate::heap::FunctionKind;
use crate::heap::Heap;
use crate::heap::JsObject;
use crate::heap::NativeData;
use crate::heap::NativeFunction;
use crate::heap::ObjectKind;
use crate::property::PropertyDescriptor;
use crate::property::PropertyKey;
use crate::realm::ErrorKind;
use crate::realm::Invocation;
use crate::realm::NativeFn;
use crate::realm::Realm;
use crate::realm::WellKnownSymbols;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;

/// The host's builtin objects, independent of what the global object currently holds.
///
/// Deleting or replacing a global binding never changes these; the intrinsic registry is collected
/// from here at lockdown.
#[derive(Debug, Clone)]
pub struct HostIntrinsics {
  pub object_prototype: ObjectId,
  pub function_prototype: ObjectId,
  pub array_prototype: ObjectId,
  pub string_prototype: ObjectId,
  pub number_prototype: ObjectId,
  pub boolean_prototype: ObjectId,
  pub symbol_prototype: ObjectId,
  pub error_prototype: ObjectId,
  pub eval_error_prototype: ObjectId,
  pub range_error_prototype: ObjectId,
  pub reference_error_prototype: ObjectId,
  pub syntax_error_prototype: ObjectId,
  pub type_error_prototype: ObjectId,
  pub uri_error_prototype: ObjectId,
  pub date_prototype: ObjectId,
  pub regexp_prototype: ObjectId,
  pub promise_prototype: ObjectId,
  pub iterator_prototype: ObjectId,
  pub array_iterator_prototype: ObjectId,
  pub compartment_prototype: ObjectId,

  pub object: ObjectId,
  pub function: ObjectId,
  pub array: ObjectId,
  pub string: ObjectId,
  pub number: ObjectId,
  pub boolean: ObjectId,
  pub symbol: ObjectId,
  pub error: ObjectId,
  pub eval_error: ObjectId,
  pub range_error: ObjectId,
  pub reference_error: ObjectId,
  pub syntax_error: ObjectId,
  pub type_error: ObjectId,
  pub uri_error: ObjectId,
  pub date: ObjectId,
  pub regexp: ObjectId,
  pub promise: ObjectId,
  pub math: ObjectId,
  pub reflect: ObjectId,
  pub json: ObjectId,
  pub console: ObjectId,

  pub is_finite: ObjectId,
  pub is_nan: ObjectId,
  pub parse_float: ObjectId,
  pub parse_int: ObjectId,
  pub array_values: ObjectId,
  pub throw_type_error: ObjectId,
  pub inert_function: ObjectId,
  pub get_stack_string: ObjectId,
  /// The host's unrestricted `eval`. Only a scope handler hands it out, to the one direct eval
  /// that bootstraps a compartment evaluation.
  pub feral_eval: ObjectId,
  pub harden: ObjectId,
  pub lockdown: ObjectId,
  pub compartment: ObjectId,
}

impl HostIntrinsics {
  pub(crate) fn error_prototype_for(&self, kind: ErrorKind) -> ObjectId {
    match kind {
      ErrorKind::Error => self.error_prototype,
      ErrorKind::Eval => self.eval_error_prototype,
      ErrorKind::Range => self.range_error_prototype,
      ErrorKind::Reference => self.reference_error_prototype,
      ErrorKind::Syntax => self.syntax_error_prototype,
      ErrorKind::Type => self.type_error_prototype,
      ErrorKind::Uri => self.uri_error_prototype,
    }
  }

  pub(crate) fn error_constructor_for(&self, kind: ErrorKind) -> ObjectId {
    match kind {
      ErrorKind::Error => self.error,
      ErrorKind::Eval => self.eval_error,
      ErrorKind::Range => self.range_error,
      ErrorKind::Reference => self.reference_error,
      ErrorKind::Syntax => self.syntax_error,
      ErrorKind::Type => self.type_error,
      ErrorKind::Uri => self.uri_error,
    }
  }

  /// Builds the mutable host environment and its global object.
  pub(crate) fn init(
    heap: &mut Heap,
    symbols: &WellKnownSymbols,
  ) -> Result<(HostIntrinsics, ObjectId), VmError> {
    // --- Base prototypes ---
    let object_prototype = heap.alloc_ordinary(None);
    let function_prototype = heap.alloc(JsObject::new(
      Some(object_prototype),
      ObjectKind::Function(FunctionKind::Native(NativeFunction {
        call: function::function_prototype_call,
        constructable: false,
        slots: Vec::new(),
        data: NativeData::None,
      })),
    ));
    heap.define_property(
      function_prototype,
      "length",
      PropertyDescriptor::data(0.0, false, false, true),
    )?;
    heap.define_property(
      function_prototype,
      "name",
      PropertyDescriptor::data("", false, false, true),
    )?;

    let mut ins = Installer {
      heap,
      function_prototype,
      symbols: *symbols,
    };

    let array_prototype = ins
      .heap
      .alloc(JsObject::new(Some(object_prototype), ObjectKind::Array));
    ins.heap.define_property(
      array_prototype,
      "length",
      PropertyDescriptor::data(0.0, true, false, false),
    )?;
    let string_prototype = ins.heap.alloc_ordinary(Some(object_prototype));
    let number_prototype = ins.heap.alloc_ordinary(Some(object_prototype));
    let boolean_prototype = ins.heap.alloc_ordinary(Some(object_prototype));
    let symbol_prototype = ins.heap.alloc_ordinary(Some(object_prototype));
    let error_prototype = ins.heap.alloc_ordinary(Some(object_prototype));
    let mut native_error_prototypes = Vec::new();
    for _ in ErrorKind::NATIVE {
      native_error_prototypes.push(ins.heap.alloc_ordinary(Some(error_prototype)));
    }
    let date_prototype = ins.heap.alloc_ordinary(Some(object_prototype));
    let regexp_prototype = ins.heap.alloc_ordinary(Some(object_prototype));
    let promise_prototype = ins.heap.alloc_ordinary(Some(object_prototype));
    let iterator_prototype = ins.heap.alloc_ordinary(Some(object_prototype));
    let array_iterator_prototype = ins.heap.alloc_ordinary(Some(iterator_prototype));
    let compartment_prototype = ins.heap.alloc_ordinary(Some(object_prototype));

    // --- Constructors ---
    let object = ins.constructor("Object", 1, object::object_constructor, object_prototype)?;
    let function = ins.constructor(
      "Function",
      1,
      function::function_constructor,
      function_prototype,
    )?;
    let array = ins.constructor("Array", 1, array::array_constructor, array_prototype)?;
    let string = ins.constructor("String", 1, string::string_constructor, string_prototype)?;
    let number = ins.constructor("Number", 1, number::number_constructor, number_prototype)?;
    let boolean = ins.constructor("Boolean", 1, number::boolean_constructor, boolean_prototype)?;
    let symbol = ins.constructor("Symbol", 0, symbol::symbol_function, symbol_prototype)?;
    let error = ins.constructor("Error", 1, error::error_constructor, error_prototype)?;
    let mut native_errors = Vec::new();
    for (kind, prototype) in ErrorKind::NATIVE.iter().zip(&native_error_prototypes) {
      let ctor = ins.constructor(kind.name(), 1, error::error_constructor, *prototype)?;
      ins.heap.object_set_prototype(ctor, Some(error))?;
      native_errors.push(ctor);
    }
    let date = ins.constructor("Date", 7, date::date_constructor, date_prototype)?;
    let regexp = ins.constructor("RegExp", 2, regexp::regexp_constructor, regexp_prototype)?;
    let promise = ins.constructor("Promise", 1, promise::promise_constructor, promise_prototype)?;
    let compartment = ins.constructor(
      "Compartment",
      0,
      crate::compartment::compartment_constructor,
      compartment_prototype,
    )?;

    // --- Namespaces and functions ---
    let math = ins.heap.alloc_ordinary(Some(object_prototype));
    let reflect = ins.heap.alloc_ordinary(Some(object_prototype));
    let json = ins.heap.alloc_ordinary(Some(object_prototype));
    let console = ins.heap.alloc_ordinary(Some(object_prototype));

    let is_finite = ins.function("isFinite", 1, number::global_is_finite)?;
    let is_nan = ins.function("isNaN", 1, number::global_is_nan)?;
    let parse_float = ins.function("parseFloat", 1, number::global_parse_float)?;
    let parse_int = ins.function("parseInt", 2, number::global_parse_int)?;
    let array_values = ins.function("values", 0, array::array_prototype_values)?;
    let throw_type_error = ins.function("", 0, function::throw_type_error)?;
    ins.heap.object_prevent_extensions(throw_type_error)?;
    ins.heap.freeze(throw_type_error)?;
    let inert_function = ins.constructable("Function", 0, function::inert_function)?;
    ins.heap.define_property(
      inert_function,
      "prototype",
      PropertyDescriptor::constant(function_prototype),
    )?;
    let get_stack_string = ins.function("getStackString", 1, error::get_stack_string)?;
    let feral_eval = ins.function("eval", 1, global::feral_eval)?;
    let harden = ins.function("harden", 1, crate::harden::harden_native)?;
    let lockdown = ins.function("lockdown", 1, crate::lockdown::lockdown_native)?;

    let intrinsics = HostIntrinsics {
      object_prototype,
      function_prototype,
      array_prototype,
      string_prototype,
      number_prototype,
      boolean_prototype,
      symbol_prototype,
      error_prototype,
      eval_error_prototype: native_error_prototypes[0],
      range_error_prototype: native_error_prototypes[1],
      reference_error_prototype: native_error_prototypes[2],
      syntax_error_prototype: native_error_prototypes[3],
      type_error_prototype: native_error_prototypes[4],
      uri_error_prototype: native_error_prototypes[5],
      date_prototype,
      regexp_prototype,
      promise_prototype,
      iterator_prototype,
      array_iterator_prototype,
      compartment_prototype,
      object,
      function,
      array,
      string,
      number,
      boolean,
      symbol,
      error,
      eval_error: native_errors[0],
      range_error: native_errors[1],
      reference_error: native_errors[2],
      syntax_error: native_errors[3],
      type_error: native_errors[4],
      uri_error: native_errors[5],
      date,
      regexp,
      promise,
      math,
      reflect,
      json,
      console,
      is_finite,
      is_nan,
      parse_float,
      parse_int,
      array_values,
      throw_type_error,
      inert_function,
      get_stack_string,
      feral_eval,
      harden,
      lockdown,
      compartment,
    };

    object::install(&mut ins, &intrinsics)?;
    function::install(&mut ins, &intrinsics)?;
    array::install(&mut ins, &intrinsics)?;
    string::install(&mut ins, &intrinsics)?;
    number::install(&mut ins, &intrinsics)?;
    symbol::install(&mut ins, &intrinsics)?;
    error::install(&mut ins, &intrinsics)?;
    date::install(&mut ins, &intrinsics)?;
    regexp::install(&mut ins, &intrinsics)?;
    promise::install(&mut ins, &intrinsics)?;
    iterator::install(&mut ins, &intrinsics)?;
    math::install(&mut ins, &intrinsics)?;
    reflect::install(&mut ins, &intrinsics)?;
    json::install(&mut ins, &intrinsics)?;
    console::install(&mut ins, &intrinsics)?;
    crate::compartment::install_prototype(&mut ins, &intrinsics)?;

    let global = global::create_host_global(&mut ins, &intrinsics)?;
    Ok((intrinsics, global))
  }
}

pub(crate) fn alloc_native(
  heap: &mut Heap,
  function_prototype: ObjectId,
  name: &str,
  length: u32,
  native: NativeFunction,
) -> Result<ObjectId, VmError> {
  let id = heap.alloc(JsObject::new(
    Some(function_prototype),
    ObjectKind::Function(FunctionKind::Native(native)),
  ));
  heap.define_property(
    id,
    "length",
    PropertyDescriptor::data(length as f64, false, false, true),
  )?;
  heap.define_property(id, "name", PropertyDescriptor::data(name, false, false, true))?;
  Ok(id)
}

/// Installs native functions into the host object graph during realm construction.
pub(crate) struct Installer<'h> {
  pub heap: &'h mut Heap,
  pub function_prototype: ObjectId,
  pub symbols: WellKnownSymbols,
}

impl<'h> Installer<'h> {
  fn native(&mut self, name: &str, length: u32, call: NativeFn, constructable: bool) -> Result<ObjectId, VmError> {
    alloc_native(self.heap, self.function_prototype, name, length, NativeFunction {
      call,
      constructable,
      slots: Vec::new(),
      data: NativeData::None,
    })
  }

  pub fn function(&mut self, name: &str, length: u32, call: NativeFn) -> Result<ObjectId, VmError> {
    self.native(name, length, call, false)
  }

  pub fn constructable(&mut self, name: &str, length: u32, call: NativeFn) -> Result<ObjectId, VmError> {
    self.native(name, length, call, true)
  }

  /// A constructor linked both ways with `prototype`.
  pub fn constructor(
    &mut self,
    name: &str,
    length: u32,
    call: NativeFn,
    prototype: ObjectId,
  ) -> Result<ObjectId, VmError> {
    let ctor = self.constructable(name, length, call)?;
    self
      .heap
      .define_property(ctor, "prototype", PropertyDescriptor::constant(prototype))?;
    self
      .heap
      .define_property(prototype, "constructor", PropertyDescriptor::hidden(ctor))?;
    Ok(ctor)
  }

  /// Installs a method as a writable, non-enumerable, configurable property.
  pub fn method(
    &mut self,
    target: ObjectId,
    name: &str,
    length: u32,
    call: NativeFn,
  ) -> Result<ObjectId, VmError> {
    let func = self.function(name, length, call)?;
    self
      .heap
      .define_property(target, name, PropertyDescriptor::hidden(func))?;
    Ok(func)
  }

  pub fn symbol_method(
    &mut self,
    target: ObjectId,
    key: crate::value::SymbolId,
    name: &str,
    length: u32,
    call: NativeFn,
  ) -> Result<ObjectId, VmError> {
    let func = self.function(name, length, call)?;
    self
      .heap
      .define_property(target, key, PropertyDescriptor::hidden(func))?;
    Ok(func)
  }

  pub fn getter(&mut self, target: ObjectId, name: &str, call: NativeFn) -> Result<ObjectId, VmError> {
    let func = self.function(&format!("get {name}"), 0, call)?;
    self.heap.define_property(
      target,
      name,
      PropertyDescriptor::accessor(Value::Object(func), Value::Undefined, false, true),
    )?;
    Ok(func)
  }

  pub fn accessor(
    &mut self,
    target: ObjectId,
    name: &str,
    get: NativeFn,
    set: NativeFn,
  ) -> Result<(), VmError> {
    let getter = self.function(&format!("get {name}"), 0, get)?;
    let setter = self.function(&format!("set {name}"), 1, set)?;
    self.heap.define_property(
      target,
      name,
      PropertyDescriptor::accessor(Value::Object(getter), Value::Object(setter), false, true),
    )
  }

  pub fn value(&mut self, target: ObjectId, key: impl Into<PropertyKey>, value: impl Into<Value>) -> Result<(), VmError> {
    self
      .heap
      .define_property(target, key, PropertyDescriptor::hidden(value))
  }

  pub fn constant(&mut self, target: ObjectId, key: impl Into<PropertyKey>, value: impl Into<Value>) -> Result<(), VmError> {
    self
      .heap
      .define_property(target, key, PropertyDescriptor::constant(value))
  }

  pub fn to_string_tag(&mut self, target: ObjectId, tag: &str) -> Result<(), VmError> {
    let key = self.symbols.to_string_tag;
    self.heap.define_property(
      target,
      key,
      PropertyDescriptor::data(tag, false, false, true),
    )
  }
}

// Shared argument helpers for native functions.

pub(crate) fn require_object(realm: &Realm, value: &Value, what: &str) -> Result<ObjectId, VmError> {
  match value {
    Value::Object(id) => Ok(*id),
    other => Err(VmError::type_error(format!(
      "{what} called on non-object {}",
      realm.display(other)
    ))),
  }
}

pub(crate) fn require_callable(realm: &Realm, value: &Value) -> Result<(), VmError> {
  if realm.heap.is_callable(value) {
    Ok(())
  } else {
    Err(VmError::type_error(format!(
      "{} is not a function",
      realm.display(value)
    )))
  }
}

/// Reads the native slot `i` of the called function.
pub(crate) fn slot(realm: &Realm, inv: &Invocation<'_>, i: usize) -> Result<Value, VmError> {
  match realm.heap.kind(inv.callee)? {
    ObjectKind::Function(FunctionKind::Native(native)) => {
      Ok(native.slots.get(i).cloned().unwrap_or(Value::Undefined))
    }
    _ => Err(VmError::InvalidHandle),
  }
}

pub(crate) fn native_data(realm: &Realm, callee: ObjectId) -> Result<NativeData, VmError> {
  match realm.heap.kind(callee)? {
    ObjectKind::Function(FunctionKind::Native(native)) => Ok(native.data.clone()),
    _ => Err(VmError::InvalidHandle),
  }
}
