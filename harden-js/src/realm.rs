use crate::builtins::HostIntrinsics;
use crate::compartment::scope::ScopeHandlers;
use crate::compartment::CompartmentRecord;
use crate::diagnostics::annotations::Annotations;
use crate::diagnostics::console::ConsoleSink;
use crate::diagnostics::console::TracingConsole;
use crate::diagnostics::stack::StackFiltering;
use crate::harden::Hardener;
use crate::heap::Closure;
use crate::heap::FunctionKind;
use crate::heap::Heap;
use crate::heap::JsObject;
use crate::heap::NativeData;
use crate::heap::NativeFunction;
use crate::heap::ObjectKind;
use crate::intrinsics::IntrinsicRegistry;
use crate::js::ast::Func;
use crate::js::ast::FuncKind;
use crate::js::env::EnvId;
use crate::js::env::EnvKind;
use crate::js::env::Envs;
use crate::js::interp;
use crate::js::parse::parse_program;
use crate::lockdown::LockdownState;
use crate::property::PropertyDescriptor;
use crate::property::PropertyKey;
use crate::property::PropertyKind;
use crate::source::SourceText;
use crate::source::StackFrame;
use crate::value::number_to_string;
use crate::value::string_to_number;
use crate::value::ObjectId;
use crate::value::SymbolId;
use crate::value::Value;
use crate::VmError;
use ahash::AHashSet;
use std::rc::Rc;

/// A native `[[Call]]`/`[[Construct]]` entrypoint implemented in Rust.
///
/// Constructable natives receive `new_target: Some(..)` when invoked through `new` and must create
/// their own result object.
pub type NativeFn = fn(&mut Realm, Invocation<'_>) -> Result<Value, VmError>;

#[derive(Clone, Copy)]
pub struct Invocation<'a> {
  pub callee: ObjectId,
  pub this: &'a Value,
  pub args: &'a [Value],
  pub new_target: Option<ObjectId>,
}

impl<'a> Invocation<'a> {
  pub fn arg(&self, i: usize) -> Value {
    self.args.get(i).cloned().unwrap_or(Value::Undefined)
  }
}

/// Nesting limit for calls into closures and natives.
pub(crate) const MAX_CALL_DEPTH: usize = 100;

/// Nesting limit for statements and expressions being evaluated, summed over every active call.
pub(crate) const MAX_EVAL_DEPTH: usize = 512;

fn stack_exhausted() -> VmError {
  VmError::RangeError("Maximum call stack size exceeded".to_string())
}

/// One entry of the realm's call stack, used to capture error stacks.
pub(crate) struct Activation {
  pub function: Option<Rc<str>>,
  pub source: Rc<SourceText>,
  pub offset: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  Error,
  Eval,
  Range,
  Reference,
  Syntax,
  Type,
  Uri,
}

impl ErrorKind {
  pub const NATIVE: [ErrorKind; 6] = [
    ErrorKind::Eval,
    ErrorKind::Range,
    ErrorKind::Reference,
    ErrorKind::Syntax,
    ErrorKind::Type,
    ErrorKind::Uri,
  ];

  pub fn name(self) -> &'static str {
    match self {
      ErrorKind::Error => "Error",
      ErrorKind::Eval => "EvalError",
      ErrorKind::Range => "RangeError",
      ErrorKind::Reference => "ReferenceError",
      ErrorKind::Syntax => "SyntaxError",
      ErrorKind::Type => "TypeError",
      ErrorKind::Uri => "URIError",
    }
  }
}

#[derive(Clone, Copy, Debug)]
pub struct WellKnownSymbols {
  pub has_instance: SymbolId,
  pub iterator: SymbolId,
  pub to_primitive: SymbolId,
  pub to_string_tag: SymbolId,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveHint {
  Default,
  Number,
  String,
}

/// One JavaScript realm: the host object graph, its intrinsic registry, the lockdown gate and
/// every compartment created in it.
pub struct Realm {
  pub(crate) heap: Heap,
  pub(crate) envs: Envs,
  pub(crate) intrinsics: HostIntrinsics,
  pub(crate) symbols: WellKnownSymbols,
  pub(crate) global: ObjectId,
  pub(crate) call_stack: Vec<Activation>,
  pub(crate) depth: usize,
  pub(crate) eval_depth: usize,
  pub(crate) compartments: Vec<CompartmentRecord>,
  pub(crate) scope_handlers: ScopeHandlers,
  pub(crate) registries: Vec<IntrinsicRegistry>,
  pub(crate) lockdown: LockdownState,
  pub(crate) hardener: Hardener,
  pub(crate) annotations: Annotations,
  pub(crate) console: Box<dyn ConsoleSink>,
  pub(crate) stack_filtering: StackFiltering,
  pub(crate) native_brands: AHashSet<ObjectId>,
}

impl Realm {
  /// Creates a realm with a mutable host environment and the `lockdown`, `harden` and
  /// `Compartment` globals installed.
  pub fn new() -> Result<Realm, VmError> {
    let mut heap = Heap::new();
    let symbols = WellKnownSymbols {
      has_instance: heap.new_symbol(Some("Symbol.hasInstance")),
      iterator: heap.new_symbol(Some("Symbol.iterator")),
      to_primitive: heap.new_symbol(Some("Symbol.toPrimitive")),
      to_string_tag: heap.new_symbol(Some("Symbol.toStringTag")),
    };
    let (intrinsics, global) = HostIntrinsics::init(&mut heap, &symbols)?;
    let mut realm = Realm {
      heap,
      envs: Envs::default(),
      intrinsics,
      symbols,
      global,
      call_stack: Vec::new(),
      depth: 0,
      eval_depth: 0,
      compartments: Vec::new(),
      scope_handlers: ScopeHandlers::default(),
      registries: Vec::new(),
      lockdown: LockdownState::default(),
      hardener: Hardener::default(),
      annotations: Annotations::default(),
      console: Box::new(TracingConsole),
      stack_filtering: StackFiltering::Concise,
      native_brands: AHashSet::new(),
    };
    crate::compartment::install_start_compartment(&mut realm)?;
    Ok(realm)
  }

  pub fn heap(&self) -> &Heap {
    &self.heap
  }

  pub fn heap_mut(&mut self) -> &mut Heap {
    &mut self.heap
  }

  /// The host global object, which is also the start compartment's global.
  pub fn global(&self) -> ObjectId {
    self.global
  }

  pub fn well_known_symbols(&self) -> &WellKnownSymbols {
    &self.symbols
  }

  pub fn is_locked_down(&self) -> bool {
    self.lockdown.locked_down
  }

  /// The hardened registry lockdown built, once lockdown has run.
  pub fn lockdown_intrinsics(&self) -> Option<&IntrinsicRegistry> {
    let id = self.lockdown.registry?;
    self.registries.get(id.0 as usize)
  }

  /// Replaces the sink behind the realm's raw console.
  pub fn set_console_sink(&mut self, sink: Box<dyn ConsoleSink>) {
    self.console = sink;
  }

  /// Runs trusted host code against the host global object.
  ///
  /// Top-level declarations are local to the script; assignments to undeclared names fail as in
  /// strict mode code.
  pub fn evaluate_script(&mut self, name: &str, text: &str) -> Result<Value, VmError> {
    let source = Rc::new(SourceText::new(name, text));
    let program = parse_program(text).map_err(VmError::Syntax)?;
    let global_env = self.envs.alloc(None, EnvKind::Global(self.global));
    let env = self.envs.alloc(
      Some(global_env),
      EnvKind::Program {
        this: Value::Object(self.global),
      },
    );
    let result = interp::run_program(self, source, &program, env);
    self.envs.release(env);
    self.envs.release(global_env);
    result
  }

  // Allocation.

  pub fn new_object(&mut self) -> ObjectId {
    self.heap.alloc_ordinary(Some(self.intrinsics.object_prototype))
  }

  pub fn new_array(&mut self, items: Vec<Value>) -> Result<ObjectId, VmError> {
    let id = self.heap.alloc(JsObject::new(
      Some(self.intrinsics.array_prototype),
      ObjectKind::Array,
    ));
    self.heap.define_property(
      id,
      "length",
      PropertyDescriptor::data(0.0, true, false, false),
    )?;
    for (i, item) in items.into_iter().enumerate() {
      self.heap.create_data_property_or_throw(id, i.to_string(), item)?;
    }
    Ok(id)
  }

  /// Builds plain data from parsed JSON.
  pub fn value_from_json(&mut self, json: &serde_json::Value) -> Result<Value, VmError> {
    crate::builtins::json::from_json(self, json)
  }

  /// `JSON.stringify(value)`, or `None` when the value has no JSON form.
  pub fn to_json(&mut self, value: Value) -> Result<Option<String>, VmError> {
    crate::builtins::json::stringify(self, value)
  }

  /// Allocates a native function with `name` and `length` properties and `%FunctionPrototype%`
  /// as its prototype.
  pub fn new_native_function(
    &mut self,
    name: &str,
    length: u32,
    call: NativeFn,
  ) -> Result<ObjectId, VmError> {
    self.new_native(name, length, call, false, Vec::new(), NativeData::None)
  }

  pub(crate) fn new_native(
    &mut self,
    name: &str,
    length: u32,
    call: NativeFn,
    constructable: bool,
    slots: Vec<Value>,
    data: NativeData,
  ) -> Result<ObjectId, VmError> {
    crate::builtins::alloc_native(
      &mut self.heap,
      self.intrinsics.function_prototype,
      name,
      length,
      NativeFunction {
        call,
        constructable,
        slots,
        data,
      },
    )
  }

  pub(crate) fn create_closure(
    &mut self,
    func: Rc<Func>,
    env: EnvId,
    source: Rc<SourceText>,
    inferred_name: Option<Rc<str>>,
  ) -> Result<ObjectId, VmError> {
    let name = func
      .name
      .clone()
      .or(inferred_name)
      .unwrap_or_else(|| Rc::from(""));
    let length = func.expected_argument_count() as f64;
    let kind = func.kind;
    self.envs.capture(env)?;
    let id = self.heap.alloc(JsObject::new(
      Some(self.intrinsics.function_prototype),
      ObjectKind::Function(FunctionKind::Closure(Closure { func, env, source })),
    ));
    self.heap.define_property(id, "length", PropertyDescriptor::data(length, false, false, true))?;
    self.heap.define_property(id, "name", PropertyDescriptor::data(name, false, false, true))?;
    if kind == FuncKind::Normal {
      let prototype = self.new_object();
      self.heap.define_property(prototype, "constructor", PropertyDescriptor::hidden(id))?;
      self.heap.define_property(
        id,
        "prototype",
        PropertyDescriptor::data(prototype, true, false, false),
      )?;
    }
    Ok(id)
  }

  /// Creates an error object with captured stack frames.
  pub fn new_error(&mut self, kind: ErrorKind, message: &str) -> Result<ObjectId, VmError> {
    let prototype = self.intrinsics.error_prototype_for(kind);
    self.new_error_with_prototype(prototype, Some(message))
  }

  pub(crate) fn new_error_with_prototype(
    &mut self,
    prototype: ObjectId,
    message: Option<&str>,
  ) -> Result<ObjectId, VmError> {
    let frames = self.capture_frames();
    let id = self
      .heap
      .alloc(JsObject::new(Some(prototype), ObjectKind::Error { frames }));
    if let Some(message) = message {
      self.heap.define_property(id, "message", PropertyDescriptor::hidden(message))?;
    }
    Ok(id)
  }

  pub(crate) fn capture_frames(&self) -> Vec<StackFrame> {
    self
      .call_stack
      .iter()
      .rev()
      .map(|a| a.source.frame(a.function.clone(), a.offset))
      .collect()
  }

  /// Converts a catchable engine error into the JavaScript value `catch` observes. Uncatchable
  /// errors are returned unchanged.
  pub(crate) fn materialize_error(&mut self, err: VmError) -> Result<Value, VmError> {
    let (kind, message) = match err {
      VmError::Throw(value) => return Ok(value),
      VmError::TypeError(msg) => (ErrorKind::Type, msg),
      VmError::RangeError(msg) => (ErrorKind::Range, msg),
      VmError::ReferenceError(msg) => (ErrorKind::Reference, msg),
      VmError::Syntax(err) => (ErrorKind::Syntax, err.message()),
      err @ (VmError::ReadOnlyViolation { .. } | VmError::NotCallable | VmError::NotConstructable) => {
        (ErrorKind::Type, err.to_string())
      }
      err @ VmError::RejectedSource { .. } => (ErrorKind::Syntax, err.to_string()),
      other => return Err(other),
    };
    Ok(Value::Object(self.new_error(kind, &message)?))
  }

  // Property access.

  pub fn get(&mut self, obj: ObjectId, key: &PropertyKey) -> Result<Value, VmError> {
    self.get_with_receiver(obj, key, Value::Object(obj))
  }

  pub fn get_with_receiver(
    &mut self,
    obj: ObjectId,
    key: &PropertyKey,
    receiver: Value,
  ) -> Result<Value, VmError> {
    match self.heap.get_property(obj, key)? {
      None => Ok(Value::Undefined),
      Some(PropertyDescriptor {
        kind: PropertyKind::Data { value, .. },
        ..
      }) => Ok(value),
      Some(PropertyDescriptor {
        kind: PropertyKind::Accessor { get, .. },
        ..
      }) => {
        if get.is_undefined() {
          Ok(Value::Undefined)
        } else {
          self.call(&get, receiver, &[])
        }
      }
    }
  }

  /// `GetV`: property lookup on any value, boxing primitives through their prototype.
  pub fn get_value(&mut self, base: &Value, key: &PropertyKey) -> Result<Value, VmError> {
    let holder = match base {
      Value::Object(id) => return self.get(*id, key),
      Value::Undefined | Value::Null => {
        return Err(VmError::type_error(format!(
          "Cannot read properties of {} (reading '{}')",
          self.display(base),
          key
        )));
      }
      Value::String(s) => {
        if key.as_str() == Some("length") {
          return Ok(Value::Number(s.encode_utf16().count() as f64));
        }
        if let Some(idx) = key.array_index() {
          return Ok(
            s.encode_utf16()
              .nth(idx as usize)
              .map(|u| Value::from(String::from_utf16_lossy(&[u])))
              .unwrap_or(Value::Undefined),
          );
        }
        self.intrinsics.string_prototype
      }
      Value::Number(_) => self.intrinsics.number_prototype,
      Value::Bool(_) => self.intrinsics.boolean_prototype,
      Value::Symbol(_) => self.intrinsics.symbol_prototype,
    };
    self.get_with_receiver(holder, key, base.clone())
  }

  /// `GetMethod`: `undefined`/`null` become `None`; other non-callables are a `TypeError`.
  pub fn get_method(&mut self, base: &Value, key: &PropertyKey) -> Result<Option<Value>, VmError> {
    let func = self.get_value(base, key)?;
    if func.is_nullish() {
      return Ok(None);
    }
    if !self.heap.is_callable(&func) {
      return Err(VmError::type_error(format!("{} is not a function", key)));
    }
    Ok(Some(func))
  }

  /// `OrdinarySet`.
  pub fn set(
    &mut self,
    obj: ObjectId,
    key: PropertyKey,
    value: Value,
    receiver: Value,
  ) -> Result<bool, VmError> {
    let own = self.heap.get_property(obj, &key)?;
    match own.map(|d| d.kind) {
      Some(PropertyKind::Accessor { set, .. }) => {
        if set.is_undefined() {
          return Ok(false);
        }
        self.call(&set, receiver, &[value])?;
        Ok(true)
      }
      Some(PropertyKind::Data { writable: false, .. }) => Ok(false),
      _ => {
        let Value::Object(receiver) = receiver else {
          return Ok(false);
        };
        match self.heap.get_own_property(receiver, &key)? {
          Some(existing) => {
            if existing.is_accessor() {
              return Ok(false);
            }
            if matches!(existing.kind, PropertyKind::Data { writable: false, .. }) {
              return Ok(false);
            }
            self.heap.define_own_property(receiver, key, crate::property::PropertyDescriptorPatch {
              value: Some(value),
              ..Default::default()
            })
          }
          None => self.heap.create_data_property(receiver, key, value),
        }
      }
    }
  }

  /// Strict-mode assignment `base[key] = value`.
  pub fn put(&mut self, base: &Value, key: PropertyKey, value: Value) -> Result<(), VmError> {
    let obj = match base {
      Value::Object(id) => *id,
      Value::Undefined | Value::Null => {
        return Err(VmError::type_error(format!(
          "Cannot set properties of {} (setting '{}')",
          self.display(base),
          key
        )));
      }
      _ => {
        return Err(VmError::type_error(format!(
          "Cannot create property '{}' on {} '{}'",
          key,
          self.typeof_value(base),
          self.display(base)
        )));
      }
    };
    if self.set(obj, key.clone(), value, base.clone())? {
      return Ok(());
    }
    if self.heap.get_property(obj, &key)?.is_some() {
      Err(VmError::type_error(format!(
        "Cannot assign to read only property '{}' of object '{}'",
        key,
        self.display(base)
      )))
    } else {
      Err(VmError::type_error(format!(
        "Cannot add property {}, object is not extensible",
        key
      )))
    }
  }

  /// Strict-mode `delete obj[key]`.
  pub fn delete(&mut self, obj: ObjectId, key: &PropertyKey) -> Result<bool, VmError> {
    if self.heap.delete_own_property(obj, key)? {
      Ok(true)
    } else {
      Err(VmError::type_error(format!(
        "Cannot delete property '{}' of {}",
        key,
        self.display(&Value::Object(obj))
      )))
    }
  }

  // Conversions.

  pub fn typeof_value(&self, value: &Value) -> &'static str {
    match value.primitive_type_name() {
      Some(name) => name,
      None if self.heap.is_callable(value) => "function",
      None => "object",
    }
  }

  pub fn to_primitive(&mut self, value: &Value, hint: PrimitiveHint) -> Result<Value, VmError> {
    let Value::Object(obj) = value else {
      return Ok(value.clone());
    };
    let exotic = self.get_method(value, &PropertyKey::Symbol(self.symbols.to_primitive))?;
    if let Some(exotic) = exotic {
      let hint = match hint {
        PrimitiveHint::Default => "default",
        PrimitiveHint::Number => "number",
        PrimitiveHint::String => "string",
      };
      let result = self.call(&exotic, value.clone(), &[Value::from(hint)])?;
      if result.is_object() {
        return Err(VmError::type_error("Cannot convert object to primitive value"));
      }
      return Ok(result);
    }
    let order = if hint == PrimitiveHint::String {
      ["toString", "valueOf"]
    } else {
      ["valueOf", "toString"]
    };
    for name in order {
      let method = self.get(*obj, &PropertyKey::from(name))?;
      if self.heap.is_callable(&method) {
        let result = self.call(&method, value.clone(), &[])?;
        if !result.is_object() {
          return Ok(result);
        }
      }
    }
    Err(VmError::type_error("Cannot convert object to primitive value"))
  }

  pub fn to_number(&mut self, value: &Value) -> Result<f64, VmError> {
    Ok(match value {
      Value::Undefined => f64::NAN,
      Value::Null => 0.0,
      Value::Bool(b) => *b as u8 as f64,
      Value::Number(n) => *n,
      Value::String(s) => string_to_number(s),
      Value::Symbol(_) => {
        return Err(VmError::type_error("Cannot convert a Symbol value to a number"))
      }
      Value::Object(_) => {
        let prim = self.to_primitive(value, PrimitiveHint::Number)?;
        return self.to_number(&prim);
      }
    })
  }

  pub fn to_string(&mut self, value: &Value) -> Result<Rc<str>, VmError> {
    Ok(match value {
      Value::Undefined => Rc::from("undefined"),
      Value::Null => Rc::from("null"),
      Value::Bool(b) => Rc::from(if *b { "true" } else { "false" }),
      Value::Number(n) => Rc::from(number_to_string(*n)),
      Value::String(s) => s.clone(),
      Value::Symbol(_) => {
        return Err(VmError::type_error("Cannot convert a Symbol value to a string"))
      }
      Value::Object(_) => {
        let prim = self.to_primitive(value, PrimitiveHint::String)?;
        return self.to_string(&prim);
      }
    })
  }

  pub fn to_property_key(&mut self, value: &Value) -> Result<PropertyKey, VmError> {
    let prim = self.to_primitive(value, PrimitiveHint::String)?;
    match prim {
      Value::Symbol(s) => Ok(PropertyKey::Symbol(s)),
      other => Ok(PropertyKey::String(self.to_string(&other)?)),
    }
  }

  pub fn to_object(&mut self, value: &Value) -> Result<ObjectId, VmError> {
    let (prototype, kind) = match value {
      Value::Object(id) => return Ok(*id),
      Value::Undefined | Value::Null => {
        return Err(VmError::type_error("Cannot convert undefined or null to object"))
      }
      Value::Bool(b) => (self.intrinsics.boolean_prototype, ObjectKind::Boolean(*b)),
      Value::Number(n) => (self.intrinsics.number_prototype, ObjectKind::Number(*n)),
      Value::String(s) => (self.intrinsics.string_prototype, ObjectKind::String(s.clone())),
      Value::Symbol(s) => (self.intrinsics.symbol_prototype, ObjectKind::Symbol(*s)),
    };
    let id = self.heap.alloc(JsObject::new(Some(prototype), kind));
    if let Value::String(s) = value {
      self.heap.define_property(
        id,
        "length",
        PropertyDescriptor::data(s.encode_utf16().count() as f64, false, false, false),
      )?;
    }
    Ok(id)
  }

  /// A best-effort rendering of a value for messages. Never calls into JavaScript.
  pub fn display(&self, value: &Value) -> String {
    match value {
      Value::String(s) => s.to_string(),
      Value::Symbol(s) => format!(
        "Symbol({})",
        self.heap.symbol_description(*s).as_deref().unwrap_or("")
      ),
      Value::Object(id) => {
        let name = self
          .heap
          .get_own_data_value(*id, &PropertyKey::from("name"))
          .ok()
          .flatten();
        match (self.heap.kind(*id), name) {
          (Ok(ObjectKind::Function(_)), Some(Value::String(name))) if !name.is_empty() => {
            format!("function {name}")
          }
          (Ok(ObjectKind::Function(_)), _) => "function".to_string(),
          (Ok(ObjectKind::Array), _) => "[object Array]".to_string(),
          (Ok(ObjectKind::Error { .. }), _) => {
            let message = self
              .inert_value(*id, &PropertyKey::from("message"))
              .and_then(|v| v.as_str().map(str::to_string))
              .unwrap_or_default();
            format!("{}: {}", self.error_name(*id), message)
          }
          _ => "[object Object]".to_string(),
        }
      }
      other => number_or_keyword(other),
    }
  }

  /// The value `key` resolves to through `id`'s prototype chain, without running JavaScript. An
  /// override accessor installed by lockdown resolves to the value its getter returns.
  pub(crate) fn inert_value(&self, id: ObjectId, key: &PropertyKey) -> Option<Value> {
    let desc = self.heap.get_property(id, key).ok().flatten()?;
    match desc.kind {
      PropertyKind::Data { value, .. } => Some(value),
      PropertyKind::Accessor {
        get: Value::Object(getter),
        ..
      } => self
        .heap
        .get_own_data_value(getter, &PropertyKey::from("originalValue"))
        .ok()
        .flatten(),
      PropertyKind::Accessor { .. } => None,
    }
  }

  /// The `name` visible through an error's prototype chain, without running accessors.
  pub(crate) fn error_name(&self, id: ObjectId) -> String {
    self
      .inert_value(id, &PropertyKey::from("name"))
      .and_then(|v| v.as_str().map(str::to_string))
      .unwrap_or_else(|| "Error".to_string())
  }

  pub fn loose_equals(&mut self, a: &Value, b: &Value) -> Result<bool, VmError> {
    Ok(match (a, b) {
      (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
      (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
      (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
        self.to_number(a)? == self.to_number(b)?
      }
      (Value::Bool(_), _) => {
        let n = Value::Number(self.to_number(a)?);
        self.loose_equals(&n, b)?
      }
      (_, Value::Bool(_)) => {
        let n = Value::Number(self.to_number(b)?);
        self.loose_equals(a, &n)?
      }
      (Value::Object(_), Value::Object(_)) => a.strict_equals(b),
      (Value::Object(_), _) => {
        let prim = self.to_primitive(a, PrimitiveHint::Default)?;
        self.loose_equals(&prim, b)?
      }
      (_, Value::Object(_)) => {
        let prim = self.to_primitive(b, PrimitiveHint::Default)?;
        self.loose_equals(a, &prim)?
      }
      _ => a.strict_equals(b),
    })
  }

  /// `InstanceofOperator`.
  pub fn instance_of(&mut self, value: &Value, target: &Value) -> Result<bool, VmError> {
    if !target.is_object() {
      return Err(VmError::type_error(
        "Right-hand side of 'instanceof' is not an object",
      ));
    }
    let key = PropertyKey::Symbol(self.symbols.has_instance);
    if let Some(handler) = self.get_method(target, &key)? {
      let result = self.call(&handler, target.clone(), &[value.clone()])?;
      return Ok(result.truthy());
    }
    if !self.heap.is_callable(target) {
      return Err(VmError::type_error(
        "Right-hand side of 'instanceof' is not callable",
      ));
    }
    self.ordinary_has_instance(target, value)
  }

  pub fn ordinary_has_instance(&mut self, ctor: &Value, value: &Value) -> Result<bool, VmError> {
    let Value::Object(ctor_id) = ctor else {
      return Ok(false);
    };
    if let ObjectKind::Function(FunctionKind::Bound { target, .. }) = self.heap.kind(*ctor_id)? {
      let target = Value::Object(*target);
      return self.instance_of(value, &target);
    }
    let Value::Object(mut obj) = value.clone() else {
      return Ok(false);
    };
    let Value::Object(proto) = self.get(*ctor_id, &PropertyKey::from("prototype"))? else {
      return Err(VmError::type_error(
        "Function has non-object prototype in instanceof check",
      ));
    };
    let mut steps = 0usize;
    while let Some(next) = self.heap.object_prototype(obj)? {
      if next == proto {
        return Ok(true);
      }
      obj = next;
      steps += 1;
      if steps > self.heap.len() {
        break;
      }
    }
    Ok(false)
  }

  // Calls.

  pub fn is_constructor(&self, value: &Value) -> bool {
    let Value::Object(id) = value else {
      return false;
    };
    match self.heap.kind(*id) {
      Ok(ObjectKind::Function(FunctionKind::Native(n))) => n.constructable,
      Ok(ObjectKind::Function(FunctionKind::Closure(c))) => c.func.kind == FuncKind::Normal,
      Ok(ObjectKind::Function(FunctionKind::Bound { target, .. })) => {
        self.is_constructor(&Value::Object(*target))
      }
      _ => false,
    }
  }

  fn enter(&mut self) -> Result<(), VmError> {
    if self.depth >= MAX_CALL_DEPTH {
      return Err(stack_exhausted());
    }
    self.depth += 1;
    Ok(())
  }

  /// Opens one level of statement or expression evaluation. Pair with `leave_eval`.
  pub(crate) fn enter_eval(&mut self) -> Result<(), VmError> {
    if self.eval_depth >= MAX_EVAL_DEPTH {
      return Err(stack_exhausted());
    }
    self.eval_depth += 1;
    Ok(())
  }

  pub(crate) fn leave_eval(&mut self) {
    self.eval_depth -= 1;
  }

  pub fn call(&mut self, callee: &Value, this: Value, args: &[Value]) -> Result<Value, VmError> {
    let Value::Object(id) = callee else {
      return Err(VmError::NotCallable);
    };
    let ObjectKind::Function(kind) = self.heap.kind(*id)? else {
      return Err(VmError::NotCallable);
    };
    let kind = kind.clone();
    self.enter()?;
    let result = match kind {
      FunctionKind::Native(native) => (native.call)(self, Invocation {
        callee: *id,
        this: &this,
        args,
        new_target: None,
      }),
      FunctionKind::Closure(closure) => interp::call_closure(self, *id, &closure, this, args, None),
      FunctionKind::Bound {
        target,
        this: bound_this,
        args: bound_args,
      } => {
        let mut all = bound_args;
        all.extend_from_slice(args);
        self.call(&Value::Object(target), bound_this, &all)
      }
    };
    self.depth -= 1;
    result
  }

  pub fn construct(
    &mut self,
    callee: &Value,
    args: &[Value],
    new_target: Option<ObjectId>,
  ) -> Result<Value, VmError> {
    let Value::Object(id) = callee else {
      return Err(VmError::NotConstructable);
    };
    let ObjectKind::Function(kind) = self.heap.kind(*id)? else {
      return Err(VmError::NotConstructable);
    };
    let kind = kind.clone();
    let new_target = new_target.unwrap_or(*id);
    self.enter()?;
    let result = match kind {
      FunctionKind::Native(native) if native.constructable => (native.call)(self, Invocation {
        callee: *id,
        this: &Value::Undefined,
        args,
        new_target: Some(new_target),
      }),
      FunctionKind::Closure(closure) if closure.func.kind == FuncKind::Normal => {
        (|| {
          let prototype =
            self.prototype_from_constructor(new_target, self.intrinsics.object_prototype)?;
          let obj = self.heap.alloc_ordinary(Some(prototype));
          let result =
            interp::call_closure(self, *id, &closure, Value::Object(obj), args, Some(new_target))?;
          Ok(if result.is_object() {
            result
          } else {
            Value::Object(obj)
          })
        })()
      }
      FunctionKind::Bound {
        target,
        args: bound_args,
        ..
      } => {
        let mut all = bound_args;
        all.extend_from_slice(args);
        let new_target = if new_target == *id { target } else { new_target };
        self.construct(&Value::Object(target), &all, Some(new_target))
      }
      _ => Err(VmError::NotConstructable),
    };
    self.depth -= 1;
    result
  }

  /// `GetPrototypeFromConstructor`.
  pub(crate) fn prototype_from_constructor(
    &mut self,
    new_target: ObjectId,
    fallback: ObjectId,
  ) -> Result<ObjectId, VmError> {
    match self.get(new_target, &PropertyKey::from("prototype"))? {
      Value::Object(proto) => Ok(proto),
      _ => Ok(fallback),
    }
  }

  // Iteration.

  /// Drains an iterable into a list. Arrays with the builtin iterator are read directly.
  pub(crate) fn iterate_to_vec(&mut self, iterable: &Value) -> Result<Vec<Value>, VmError> {
    let key = PropertyKey::Symbol(self.symbols.iterator);
    let Some(method) = self.get_method(iterable, &key)? else {
      return Err(VmError::type_error(format!(
        "{} is not iterable",
        self.display(iterable)
      )));
    };
    if let Value::Object(id) = iterable {
      if self.heap.is_array(*id) && method.strict_equals(&Value::Object(self.intrinsics.array_values)) {
        return self.array_like_to_vec(*id);
      }
    }
    let iterator = self.call(&method, iterable.clone(), &[])?;
    if !iterator.is_object() {
      return Err(VmError::type_error("Result of the Symbol.iterator method is not an object"));
    }
    let next = self.get_value(&iterator, &PropertyKey::from("next"))?;
    let mut out = Vec::new();
    loop {
      let step = self.call(&next, iterator.clone(), &[])?;
      if !step.is_object() {
        return Err(VmError::type_error(format!(
          "Iterator result {} is not an object",
          self.display(&step)
        )));
      }
      if self.get_value(&step, &PropertyKey::from("done"))?.truthy() {
        return Ok(out);
      }
      out.push(self.get_value(&step, &PropertyKey::from("value"))?);
    }
  }

  /// `CreateListFromArrayLike`.
  pub(crate) fn array_like_to_vec(&mut self, obj: ObjectId) -> Result<Vec<Value>, VmError> {
    let length = self.get(obj, &PropertyKey::from("length"))?;
    let length = to_length(self.to_number(&length)?);
    let mut out = Vec::with_capacity(length.min(1 << 16));
    for i in 0..length {
      out.push(self.get(obj, &PropertyKey::from(i.to_string()))?);
    }
    Ok(out)
  }

  /// Own enumerable string keys along the prototype chain, as `for-in` visits them.
  pub(crate) fn for_in_keys(&mut self, obj: ObjectId) -> Result<Vec<Rc<str>>, VmError> {
    let mut seen = AHashSet::new();
    let mut out = Vec::new();
    let mut cur = Some(obj);
    while let Some(id) = cur {
      for key in self.heap.own_property_keys(id)? {
        let PropertyKey::String(name) = &key else {
          continue;
        };
        if !seen.insert(name.clone()) {
          continue;
        }
        if let Some(desc) = self.heap.get_own_property(id, &key)? {
          if desc.enumerable {
            out.push(name.clone());
          }
        }
      }
      cur = self.heap.object_prototype(id)?;
      if seen.len() > self.heap.len() * 64 {
        break;
      }
    }
    Ok(out)
  }
}

fn number_or_keyword(value: &Value) -> String {
  match value {
    Value::Undefined => "undefined".to_string(),
    Value::Null => "null".to_string(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => number_to_string(*n),
    _ => String::new(),
  }
}

/// `ToLength`, clamped to `usize`.
pub(crate) fn to_length(n: f64) -> usize {
  if n.is_nan() || n <= 0.0 {
    0
  } else if n >= usize::MAX as f64 {
    usize::MAX
  } else {
    n.floor() as usize
  }
}

/// `ToIntegerOrInfinity`.
pub(crate) fn to_integer(n: f64) -> f64 {
  if n.is_nan() {
    0.0
  } else if n.is_infinite() {
    n
  } else {
    n.trunc()
  }
}

/// Resolves a relative index argument (`slice`, `splice`, ...) against `len`.
pub(crate) fn relative_index(n: f64, len: usize) -> usize {
  let n = to_integer(n);
  if n < 0.0 {
    (len as f64 + n).max(0.0) as usize
  } else {
    n.min(len as f64) as usize
  }
}
