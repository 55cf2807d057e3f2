//! The permit tree: what may exist in the hardened object graph.
//!
//! Every intrinsic the collector registers has an entry at the root, keyed by its canonical
//! name. Each entry describes the intrinsic's `[[Prototype]]` and the permit of each own
//! property; anything not described is removed by the validator. Symbol-keyed properties are
//! described under `@@name`, so `Symbol.iterator` is `@@iterator`.

use once_cell::sync::Lazy;
use std::sync::Arc;

/// The `typeof` a primitive-valued property must have.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveKind {
  Undefined,
  Boolean,
  Number,
  String,
  Symbol,
}

impl PrimitiveKind {
  pub fn type_name(self) -> &'static str {
    match self {
      PrimitiveKind::Undefined => "undefined",
      PrimitiveKind::Boolean => "boolean",
      PrimitiveKind::Number => "number",
      PrimitiveKind::String => "string",
      PrimitiveKind::Symbol => "symbol",
    }
  }
}

#[derive(Clone, Debug)]
pub enum Permit {
  /// An object whose own properties are described by a nested tree.
  Nested(Arc<PermitTree>),
  Primitive(PrimitiveKind),
  /// The property must hold exactly the registered intrinsic of this name. Only meaningful for
  /// `prototype` and `constructor`.
  Intrinsic(&'static str),
  /// An accessor property; `get` and `set` describe the getter and setter values.
  Accessor { get: Arc<Permit>, set: Arc<Permit> },
  /// Explicitly not permitted. Removed without a trace entry.
  Absent,
}

#[derive(Debug, Default)]
pub struct PermitTree {
  /// The permitted `[[Prototype]]` by intrinsic name; `None` requires `null`.
  pub prototype: Option<&'static str>,
  pub properties: Vec<(&'static str, Permit)>,
}

impl PermitTree {
  pub fn get(&self, name: &str) -> Option<&Permit> {
    self
      .properties
      .iter()
      .find(|(key, _)| *key == name)
      .map(|(_, permit)| permit)
  }
}

impl Permit {
  pub fn as_tree(&self) -> Option<&PermitTree> {
    match self {
      Permit::Nested(tree) => Some(tree),
      _ => None,
    }
  }

  /// Short label for error messages.
  pub fn describe(&self) -> String {
    match self {
      Permit::Nested(_) => "object".to_string(),
      Permit::Primitive(kind) => kind.type_name().to_string(),
      Permit::Intrinsic(name) => (*name).to_string(),
      Permit::Accessor { .. } => "accessor".to_string(),
      Permit::Absent => "false".to_string(),
    }
  }
}

const OBJECT_PROTOTYPE: &str = "%ObjectPrototype%";
const FUNCTION_PROTOTYPE: &str = "%FunctionPrototype%";

type Props = Vec<(&'static str, Permit)>;

fn tree(prototype: Option<&'static str>, properties: Props) -> Permit {
  Permit::Nested(Arc::new(PermitTree {
    prototype,
    properties,
  }))
}

/// An ordinary object inheriting from `%ObjectPrototype%`.
fn object(properties: Props) -> Permit {
  tree(Some(OBJECT_PROTOTYPE), properties)
}

/// A function or constructor inheriting from `%FunctionPrototype%`.
fn ctor(properties: Props) -> Permit {
  tree(Some(FUNCTION_PROTOTYPE), properties)
}

fn inherits(prototype: &'static str, properties: Props) -> Permit {
  tree(Some(prototype), properties)
}

fn func() -> Permit {
  Permit::Nested(FUNCTION_INSTANCE.clone())
}

fn getter() -> Permit {
  Permit::Accessor {
    get: Arc::new(func()),
    set: Arc::new(Permit::Primitive(PrimitiveKind::Undefined)),
  }
}

fn accessor() -> Permit {
  Permit::Accessor {
    get: Arc::new(func()),
    set: Arc::new(func()),
  }
}

fn number() -> Permit {
  Permit::Primitive(PrimitiveKind::Number)
}

fn string() -> Permit {
  Permit::Primitive(PrimitiveKind::String)
}

fn symbol() -> Permit {
  Permit::Primitive(PrimitiveKind::Symbol)
}

fn undefined() -> Permit {
  Permit::Primitive(PrimitiveKind::Undefined)
}

fn intrinsic(name: &'static str) -> Permit {
  Permit::Intrinsic(name)
}

fn functions(names: &[&'static str]) -> Props {
  names.iter().map(|name| (*name, func())).collect()
}

fn with(mut base: Props, more: Props) -> Props {
  base.extend(more);
  base
}

/// The shape every function instance is checked against when its own tree is silent:
/// `[[Prototype]]` is `%FunctionPrototype%`, `length` is a number and `name` a string.
pub static FUNCTION_INSTANCE: Lazy<Arc<PermitTree>> = Lazy::new(|| {
  Arc::new(PermitTree {
    prototype: Some(FUNCTION_PROTOTYPE),
    properties: vec![("length", number()), ("name", string())],
  })
});

fn native_error(prototype: &'static str) -> Permit {
  inherits("%SharedError%", vec![("prototype", intrinsic(prototype))])
}

fn native_error_prototype(constructor: &'static str) -> Permit {
  inherits("%ErrorPrototype%", vec![
    ("constructor", intrinsic(constructor)),
    ("message", string()),
    ("name", string()),
    ("toString", Permit::Absent),
  ])
}

fn error_constructor() -> Permit {
  ctor(vec![
    ("prototype", intrinsic("%ErrorPrototype%")),
    ("captureStackTrace", func()),
    ("stackTraceLimit", accessor()),
    ("prepareStackTrace", accessor()),
  ])
}

fn date_constructor() -> Permit {
  ctor(with(functions(&["now", "parse", "UTC"]), vec![(
    "prototype",
    intrinsic("%DatePrototype%"),
  )]))
}

fn regexp_constructor(initial: bool) -> Permit {
  let mut props = vec![
    ("prototype", intrinsic("%RegExpPrototype%")),
    ("@@species", getter()),
  ];
  if initial {
    for legacy in [
      "input", "$_", "lastMatch", "$&", "lastParen", "$+", "leftContext", "$`", "rightContext",
      "$'", "$1", "$2", "$3", "$4", "$5", "$6", "$7", "$8", "$9",
    ] {
      props.push((legacy, Permit::Absent));
    }
  }
  ctor(props)
}

fn shared_math() -> Props {
  let mut props: Props = ["E", "LN10", "LN2", "LOG10E", "LOG2E", "PI", "SQRT1_2", "SQRT2"]
    .into_iter()
    .map(|name| (name, number()))
    .collect();
  props.push(("@@toStringTag", string()));
  props.extend(functions(&[
    "abs", "acos", "acosh", "asin", "asinh", "atan", "atanh", "atan2", "cbrt", "ceil", "clz32",
    "cos", "cosh", "exp", "expm1", "floor", "fround", "hypot", "imul", "log", "log1p", "log10",
    "log2", "max", "min", "pow", "round", "sign", "sin", "sinh", "sqrt", "tan", "tanh", "trunc",
    "idiv", "idivmod", "imod", "imuldiv", "irem", "mod",
  ]));
  props
}

/// The root of the permit tree, keyed by canonical intrinsic name.
pub static PERMITS: Lazy<PermitTree> = Lazy::new(|| PermitTree {
  prototype: None,
  properties: vec![
    ("%ThrowTypeError%", func()),
    ("Infinity", number()),
    ("NaN", number()),
    ("undefined", undefined()),
    ("isFinite", func()),
    ("isNaN", func()),
    ("parseFloat", func()),
    ("parseInt", func()),
    ("decodeURI", func()),
    ("decodeURIComponent", func()),
    ("encodeURI", func()),
    ("encodeURIComponent", func()),
    (
      "Object",
      ctor(with(
        vec![("prototype", intrinsic("%ObjectPrototype%"))],
        functions(&[
          "assign",
          "create",
          "defineProperties",
          "defineProperty",
          "entries",
          "freeze",
          "fromEntries",
          "getOwnPropertyDescriptor",
          "getOwnPropertyDescriptors",
          "getOwnPropertyNames",
          "getOwnPropertySymbols",
          "getPrototypeOf",
          "hasOwn",
          "is",
          "isExtensible",
          "isFrozen",
          "isSealed",
          "keys",
          "preventExtensions",
          "seal",
          "setPrototypeOf",
          "values",
        ]),
      )),
    ),
    (
      "%ObjectPrototype%",
      tree(None, with(
        vec![
          ("constructor", intrinsic("Object")),
          ("__proto__", accessor()),
        ],
        functions(&[
          "hasOwnProperty",
          "isPrototypeOf",
          "propertyIsEnumerable",
          "toLocaleString",
          "toString",
          "valueOf",
          "__defineGetter__",
          "__defineSetter__",
          "__lookupGetter__",
          "__lookupSetter__",
        ]),
      )),
    ),
    (
      "%InertFunction%",
      ctor(vec![("prototype", intrinsic("%FunctionPrototype%"))]),
    ),
    (
      "%FunctionPrototype%",
      object(with(functions(&["apply", "bind", "call", "toString", "@@hasInstance"]), vec![
        ("constructor", intrinsic("%InertFunction%")),
        ("caller", Permit::Absent),
        ("arguments", Permit::Absent),
      ])),
    ),
    (
      "Boolean",
      ctor(vec![("prototype", intrinsic("%BooleanPrototype%"))]),
    ),
    (
      "%BooleanPrototype%",
      object(with(functions(&["toString", "valueOf"]), vec![(
        "constructor",
        intrinsic("Boolean"),
      )])),
    ),
    (
      "Symbol",
      ctor(with(
        [
          "asyncIterator",
          "hasInstance",
          "isConcatSpreadable",
          "iterator",
          "match",
          "matchAll",
          "replace",
          "search",
          "species",
          "split",
          "toPrimitive",
          "toStringTag",
          "unscopables",
        ]
        .into_iter()
        .map(|name| (name, symbol()))
        .collect(),
        with(functions(&["for", "keyFor"]), vec![(
          "prototype",
          intrinsic("%SymbolPrototype%"),
        )]),
      )),
    ),
    (
      "%SymbolPrototype%",
      object(with(functions(&["toString", "valueOf", "@@toPrimitive"]), vec![
        ("constructor", intrinsic("Symbol")),
        ("description", getter()),
        ("@@toStringTag", string()),
      ])),
    ),
    ("%InitialError%", error_constructor()),
    ("%SharedError%", error_constructor()),
    (
      "%ErrorPrototype%",
      object(vec![
        ("constructor", intrinsic("%SharedError%")),
        ("message", string()),
        ("name", string()),
        ("toString", func()),
        ("at", Permit::Absent),
        ("stack", Permit::Absent),
      ]),
    ),
    ("EvalError", native_error("%EvalErrorPrototype%")),
    ("RangeError", native_error("%RangeErrorPrototype%")),
    ("ReferenceError", native_error("%ReferenceErrorPrototype%")),
    ("SyntaxError", native_error("%SyntaxErrorPrototype%")),
    ("TypeError", native_error("%TypeErrorPrototype%")),
    ("URIError", native_error("%URIErrorPrototype%")),
    ("%EvalErrorPrototype%", native_error_prototype("EvalError")),
    ("%RangeErrorPrototype%", native_error_prototype("RangeError")),
    ("%ReferenceErrorPrototype%", native_error_prototype("ReferenceError")),
    ("%SyntaxErrorPrototype%", native_error_prototype("SyntaxError")),
    ("%TypeErrorPrototype%", native_error_prototype("TypeError")),
    ("%URIErrorPrototype%", native_error_prototype("URIError")),
    (
      "Number",
      ctor(with(
        [
          "EPSILON",
          "MAX_SAFE_INTEGER",
          "MAX_VALUE",
          "MIN_SAFE_INTEGER",
          "MIN_VALUE",
          "NaN",
          "NEGATIVE_INFINITY",
          "POSITIVE_INFINITY",
        ]
        .into_iter()
        .map(|name| (name, number()))
        .collect(),
        with(
          functions(&["isFinite", "isInteger", "isNaN", "isSafeInteger", "parseFloat", "parseInt"]),
          vec![("prototype", intrinsic("%NumberPrototype%"))],
        ),
      )),
    ),
    (
      "%NumberPrototype%",
      object(with(
        functions(&[
          "toExponential",
          "toFixed",
          "toLocaleString",
          "toPrecision",
          "toString",
          "valueOf",
        ]),
        vec![("constructor", intrinsic("Number"))],
      )),
    ),
    ("%InitialMath%", object(with(shared_math(), functions(&["random"])))),
    ("%SharedMath%", object(shared_math())),
    ("%InitialDate%", date_constructor()),
    ("%SharedDate%", date_constructor()),
    (
      "%DatePrototype%",
      object(with(
        functions(&[
          "getDate",
          "getDay",
          "getFullYear",
          "getHours",
          "getMilliseconds",
          "getMinutes",
          "getMonth",
          "getSeconds",
          "getTime",
          "getTimezoneOffset",
          "getUTCDate",
          "getUTCDay",
          "getUTCFullYear",
          "getUTCHours",
          "getUTCMilliseconds",
          "getUTCMinutes",
          "getUTCMonth",
          "getUTCSeconds",
          "setDate",
          "setFullYear",
          "setHours",
          "setMilliseconds",
          "setMinutes",
          "setMonth",
          "setSeconds",
          "setTime",
          "setUTCDate",
          "setUTCFullYear",
          "setUTCHours",
          "setUTCMilliseconds",
          "setUTCMinutes",
          "setUTCMonth",
          "setUTCSeconds",
          "toDateString",
          "toISOString",
          "toJSON",
          "toLocaleDateString",
          "toLocaleString",
          "toLocaleTimeString",
          "toString",
          "toTimeString",
          "toUTCString",
          "valueOf",
          "@@toPrimitive",
          "getYear",
          "setYear",
          "toGMTString",
        ]),
        vec![("constructor", intrinsic("%SharedDate%"))],
      )),
    ),
    (
      "String",
      ctor(with(functions(&["fromCharCode", "fromCodePoint", "raw"]), vec![(
        "prototype",
        intrinsic("%StringPrototype%"),
      )])),
    ),
    (
      "%StringPrototype%",
      object(with(
        functions(&[
          "at",
          "charAt",
          "charCodeAt",
          "codePointAt",
          "concat",
          "endsWith",
          "includes",
          "indexOf",
          "lastIndexOf",
          "localeCompare",
          "match",
          "matchAll",
          "normalize",
          "padEnd",
          "padStart",
          "repeat",
          "replace",
          "replaceAll",
          "search",
          "slice",
          "split",
          "startsWith",
          "substring",
          "toLocaleLowerCase",
          "toLocaleUpperCase",
          "toLowerCase",
          "toString",
          "toUpperCase",
          "trim",
          "trimEnd",
          "trimStart",
          "valueOf",
          "@@iterator",
          "substr",
          "anchor",
          "big",
          "blink",
          "bold",
          "fixed",
          "fontcolor",
          "fontsize",
          "italics",
          "link",
          "small",
          "strike",
          "sub",
          "sup",
          "trimLeft",
          "trimRight",
        ]),
        vec![("length", number()), ("constructor", intrinsic("String"))],
      )),
    ),
    ("%InitialRegExp%", regexp_constructor(true)),
    ("%SharedRegExp%", regexp_constructor(false)),
    (
      "%RegExpPrototype%",
      object(with(
        ["dotAll", "flags", "global", "ignoreCase", "multiline", "source", "sticky", "unicode"]
          .into_iter()
          .map(|name| (name, getter()))
          .collect(),
        with(
          functions(&["exec", "toString", "test", "@@match", "@@matchAll", "@@replace", "@@search", "@@split"]),
          vec![
            ("constructor", intrinsic("%SharedRegExp%")),
            ("compile", Permit::Absent),
            ("hasIndices", Permit::Absent),
          ],
        ),
      )),
    ),
    (
      "Array",
      ctor(with(functions(&["from", "isArray", "of"]), vec![
        ("prototype", intrinsic("%ArrayPrototype%")),
        ("@@species", getter()),
      ])),
    ),
    (
      "%ArrayPrototype%",
      object(with(
        functions(&[
          "at",
          "concat",
          "copyWithin",
          "entries",
          "every",
          "fill",
          "filter",
          "find",
          "findIndex",
          "flat",
          "flatMap",
          "forEach",
          "includes",
          "indexOf",
          "join",
          "keys",
          "lastIndexOf",
          "map",
          "pop",
          "push",
          "reduce",
          "reduceRight",
          "reverse",
          "shift",
          "slice",
          "some",
          "sort",
          "splice",
          "toLocaleString",
          "toString",
          "unshift",
          "values",
          "@@iterator",
        ]),
        vec![
          ("length", number()),
          ("constructor", intrinsic("Array")),
          (
            "@@unscopables",
            tree(None, [
              "copyWithin",
              "entries",
              "fill",
              "find",
              "findIndex",
              "flat",
              "flatMap",
              "includes",
              "keys",
              "values",
            ]
            .into_iter()
            .map(|name| (name, Permit::Primitive(PrimitiveKind::Boolean)))
            .collect()),
          ),
        ],
      )),
    ),
    (
      "%ArrayIteratorPrototype%",
      inherits("%IteratorPrototype%", with(functions(&["next"]), vec![(
        "@@toStringTag",
        string(),
      )])),
    ),
    ("%IteratorPrototype%", object(functions(&["@@iterator"]))),
    (
      "JSON",
      object(with(functions(&["parse", "stringify"]), vec![(
        "@@toStringTag",
        string(),
      )])),
    ),
    (
      "Reflect",
      object(with(
        functions(&[
          "apply",
          "construct",
          "defineProperty",
          "deleteProperty",
          "get",
          "getOwnPropertyDescriptor",
          "getPrototypeOf",
          "has",
          "isExtensible",
          "ownKeys",
          "preventExtensions",
          "set",
          "setPrototypeOf",
        ]),
        vec![("@@toStringTag", string())],
      )),
    ),
    (
      "Promise",
      ctor(with(functions(&["all", "allSettled", "any", "race", "reject", "resolve"]), vec![
        ("prototype", intrinsic("%PromisePrototype%")),
        ("@@species", getter()),
      ])),
    ),
    (
      "%PromisePrototype%",
      object(with(functions(&["catch", "finally", "then"]), vec![
        ("constructor", intrinsic("Promise")),
        ("@@toStringTag", string()),
      ])),
    ),
    (
      "%InertCompartment%",
      ctor(with(functions(&["toString"]), vec![(
        "prototype",
        intrinsic("%CompartmentPrototype%"),
      )])),
    ),
    (
      "%CompartmentPrototype%",
      object(with(functions(&["evaluate", "toString"]), vec![
        ("constructor", intrinsic("%InertCompartment%")),
        ("globalThis", getter()),
        ("name", getter()),
      ])),
    ),
    ("lockdown", func()),
    ("harden", func()),
    ("%InitialGetStackString%", func()),
  ],
});

#[cfg(test)]
mod tests {
  use super::Permit;
  use super::PrimitiveKind;
  use super::PERMITS;

  #[test]
  fn root_has_a_null_prototype() {
    assert_eq!(PERMITS.prototype, None);
    let object_prototype = PERMITS.get("%ObjectPrototype%").and_then(Permit::as_tree);
    assert_eq!(object_prototype.map(|tree| tree.prototype), Some(None));
  }

  #[test]
  fn constructors_name_their_prototypes() {
    for name in ["Object", "Array", "%InitialDate%", "%SharedError%", "%InertCompartment%"] {
      let Some(tree) = PERMITS.get(name).and_then(Permit::as_tree) else {
        panic!("{name} has no nested permit");
      };
      let prototype = tree.get("prototype");
      assert!(
        matches!(prototype, Some(Permit::Intrinsic(p)) if PERMITS.get(p).is_some()),
        "{name}.prototype"
      );
    }
  }

  #[test]
  fn shared_math_has_no_entropy() {
    let shared = PERMITS.get("%SharedMath%").and_then(Permit::as_tree);
    let initial = PERMITS.get("%InitialMath%").and_then(Permit::as_tree);
    assert!(shared.is_some_and(|t| t.get("random").is_none()));
    assert!(initial.is_some_and(|t| t.get("random").is_some()));
  }

  #[test]
  fn getters_have_undefined_setters() {
    let symbol_prototype = PERMITS.get("%SymbolPrototype%").and_then(Permit::as_tree);
    match symbol_prototype.and_then(|t| t.get("description")) {
      Some(Permit::Accessor { set, .. }) => {
        assert!(matches!(**set, Permit::Primitive(PrimitiveKind::Undefined)));
      }
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn root_names_are_unique() {
    let mut names: Vec<_> = PERMITS.properties.iter().map(|(name, _)| *name).collect();
    let total = names.len();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), total);
  }
}
