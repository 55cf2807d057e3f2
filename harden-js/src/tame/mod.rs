//! Primordial tamers.
//!
//! Each tamer either leaves a family of builtins alone (`unsafe`) or replaces it with an
//! initial variant, which keeps its ambient authority and is bound only in the start
//! compartment, and a shared variant stripped of that authority for every other compartment.
//! The results are merged into the intrinsic registry under `%Initial...%` and `%Shared...%`.

pub(crate) mod console;
pub(crate) mod date;
pub(crate) mod error;
pub(crate) mod function;
pub(crate) mod locale;
pub(crate) mod math;
pub(crate) mod regexp;

use crate::builtins::Installer;
use crate::realm::Realm;
use crate::value::Value;
use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Taming {
  #[default]
  Safe,
  Unsafe,
}

/// Registry entries produced by a tamer.
pub(crate) type Tamed = Vec<(&'static str, Value)>;

/// An installer writing into the realm's heap, for tamers that build new natives.
pub(crate) fn installer(realm: &mut Realm) -> Installer<'_> {
  Installer {
    heap: &mut realm.heap,
    function_prototype: realm.intrinsics.function_prototype,
    symbols: realm.symbols,
  }
}

/// Both names bound to the untouched original.
pub(crate) fn untamed(initial: &'static str, shared: &'static str, original: Value) -> Tamed {
  vec![(initial, original.clone()), (shared, original)]
}
