//! `lockdown()`: the one-way transition from a mutable host environment to a hardened one.
//!
//! The sequence gathers and tames the primordials into one registry, strips everything the
//! permit tree does not name, rebuilds the start compartment's global from the registry, repairs
//! override-by-assignment on the common prototypes and finally hardens the whole registry. Only
//! then does the `harden` gate open. The work before the override repair is
//! [`repair_intrinsics`]; the rest runs when the host commits the returned [`HardenIntrinsics`].

use crate::compartment::global::init_global_object;
use crate::diagnostics::stack::StackFiltering;
use crate::enablements::enable_property_overrides;
use crate::enablements::OverrideTaming;
use crate::harden::harden_all;
use crate::heap::CompartmentId;
use crate::heap::RegistryId;
use crate::intrinsics::host_entries;
use crate::intrinsics::IntrinsicRegistry;
use crate::intrinsics::INITIAL_GLOBAL_PROPERTY_NAMES;
use crate::property::PropertyKey;
use crate::realm::Invocation;
use crate::realm::Realm;
use crate::tame::console::tame_console;
use crate::tame::date::tame_date;
use crate::tame::error::tame_error;
use crate::tame::function::repair_function_constructors;
use crate::tame::locale::tame_locale_methods;
use crate::tame::math::tame_math;
use crate::tame::regexp::tame_regexp;
use crate::tame::Taming;
use crate::validate::whitelist_intrinsics;
use crate::value::Value;
use crate::VmError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

/// Options accepted by [`lockdown`]. Absent options take the first call's value, or the default
/// on the first call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LockdownOptions {
  pub date_taming: Option<Taming>,
  pub error_taming: Option<Taming>,
  pub math_taming: Option<Taming>,
  pub reg_exp_taming: Option<Taming>,
  pub locale_taming: Option<Taming>,
  pub console_taming: Option<Taming>,
  pub override_taming: Option<OverrideTaming>,
  pub stack_filtering: Option<StackFiltering>,
}

const OPTION_NAMES: [&str; 8] = [
  "dateTaming",
  "errorTaming",
  "mathTaming",
  "regExpTaming",
  "localeTaming",
  "consoleTaming",
  "overrideTaming",
  "stackFiltering",
];

fn parse_option<T: DeserializeOwned>(option: &str, value: &serde_json::Value) -> Result<T, VmError> {
  serde_json::from_value(value.clone()).map_err(|_| VmError::UnrecognizedOptionValue {
    option: option.to_string(),
    value: match value {
      serde_json::Value::String(s) => s.clone(),
      other => other.to_string(),
    },
  })
}

impl LockdownOptions {
  /// Parses a JSON object of options. Unknown option names and unrecognized values are
  /// reported with the option that caused them.
  pub fn from_json(json: &str) -> Result<LockdownOptions, VmError> {
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)
      .map_err(|err| VmError::type_error(format!("lockdown options must be a JSON object: {err}")))?;
    LockdownOptions::from_map(&map)
  }

  fn from_map(map: &serde_json::Map<String, serde_json::Value>) -> Result<LockdownOptions, VmError> {
    let unknown: Vec<&str> = map
      .keys()
      .map(String::as_str)
      .filter(|k| !OPTION_NAMES.contains(k))
      .collect();
    if !unknown.is_empty() {
      return Err(VmError::UnsupportedOption {
        names: unknown.join(", "),
      });
    }
    let mut options = LockdownOptions::default();
    for (name, value) in map {
      match name.as_str() {
        "dateTaming" => options.date_taming = Some(parse_option(name, value)?),
        "errorTaming" => options.error_taming = Some(parse_option(name, value)?),
        "mathTaming" => options.math_taming = Some(parse_option(name, value)?),
        "regExpTaming" => options.reg_exp_taming = Some(parse_option(name, value)?),
        "localeTaming" => options.locale_taming = Some(parse_option(name, value)?),
        "consoleTaming" => options.console_taming = Some(parse_option(name, value)?),
        "overrideTaming" => options.override_taming = Some(parse_option(name, value)?),
        "stackFiltering" => options.stack_filtering = Some(parse_option(name, value)?),
        _ => {}
      }
    }
    Ok(options)
  }

  /// Fills absent options from `base`, then from the defaults.
  fn resolve(self, base: Option<ResolvedOptions>) -> ResolvedOptions {
    let base = base.unwrap_or_default();
    ResolvedOptions {
      date_taming: self.date_taming.unwrap_or(base.date_taming),
      error_taming: self.error_taming.unwrap_or(base.error_taming),
      math_taming: self.math_taming.unwrap_or(base.math_taming),
      reg_exp_taming: self.reg_exp_taming.unwrap_or(base.reg_exp_taming),
      locale_taming: self.locale_taming.unwrap_or(base.locale_taming),
      console_taming: self.console_taming.unwrap_or(base.console_taming),
      override_taming: self.override_taming.unwrap_or(base.override_taming),
      stack_filtering: self.stack_filtering.unwrap_or(base.stack_filtering),
    }
  }
}

/// Every option with its value decided.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolvedOptions {
  pub date_taming: Taming,
  pub error_taming: Taming,
  pub math_taming: Taming,
  pub reg_exp_taming: Taming,
  pub locale_taming: Taming,
  pub console_taming: Taming,
  pub override_taming: OverrideTaming,
  pub stack_filtering: StackFiltering,
}

impl ResolvedOptions {
  /// The name of the first option on which `self` and `other` disagree.
  fn first_difference(&self, other: &ResolvedOptions) -> Option<&'static str> {
    let same = [
      self.date_taming == other.date_taming,
      self.error_taming == other.error_taming,
      self.math_taming == other.math_taming,
      self.reg_exp_taming == other.reg_exp_taming,
      self.locale_taming == other.locale_taming,
      self.console_taming == other.console_taming,
      self.override_taming == other.override_taming,
      self.stack_filtering == other.stack_filtering,
    ];
    OPTION_NAMES
      .iter()
      .zip(same)
      .find(|(_, same)| !same)
      .map(|(name, _)| *name)
  }
}

/// The realm's lockdown gate.
#[derive(Debug, Default)]
pub struct LockdownState {
  /// Recorded before the first lockdown does any work.
  pub(crate) first_options: Option<ResolvedOptions>,
  /// Raised only once the registry is hardened. Never lowered.
  pub(crate) locked_down: bool,
  pub(crate) causal_console: bool,
  /// The registry lockdown built, once it exists.
  pub(crate) registry: Option<RegistryId>,
}

impl LockdownState {
  pub fn options(&self) -> Option<ResolvedOptions> {
    self.first_options
  }
}

/// What a completed lockdown call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lockdown {
  /// This call hardened the realm.
  Hardened,
  /// An earlier call with the same options already prepared the realm.
  AlreadyHardened,
}

/// The commit half of a lockdown, returned by [`repair_intrinsics`]. Until [`commit`] runs, the
/// intrinsics are tamed and validated but not yet repaired for overrides or frozen, and `harden`
/// stays unavailable. Dropping it leaves the realm in that state for good.
///
/// [`commit`]: HardenIntrinsics::commit
#[must_use = "harden() only becomes available once the lockdown is committed"]
#[derive(Debug)]
pub struct HardenIntrinsics {
  pending: Option<(RegistryId, OverrideTaming)>,
}

impl HardenIntrinsics {
  /// Whether committing will change the realm.
  pub fn is_pending(&self) -> bool {
    self.pending.is_some()
  }

  /// Repairs override-by-assignment, hardens the registry and raises the `harden` gate.
  pub fn commit(self, realm: &mut Realm) -> Result<Lockdown, VmError> {
    let Some((id, override_taming)) = self.pending else {
      return Ok(Lockdown::AlreadyHardened);
    };
    if realm.lockdown.locked_down || realm.lockdown.registry != Some(id) {
      return Err(VmError::InvalidHandle);
    }
    let span = tracing::info_span!("harden_js.harden_intrinsics");
    let _guard = span.enter();
    let registry = realm
      .registries
      .get(id.0 as usize)
      .cloned()
      .ok_or(VmError::InvalidHandle)?;

    let enabled = enable_property_overrides(realm, &registry, override_taming)?;
    debug!(enabled, "enabled property overrides");

    let roots: Vec<Value> = registry.iter().map(|(_, v)| v.clone()).collect();
    let hardened = harden_all(realm, roots)?;
    debug!(hardened, "hardened intrinsics");

    realm.lockdown.locked_down = true;
    Ok(Lockdown::Hardened)
  }
}

/// Tames, collects and validates the intrinsics and rebuilds the start compartment's global.
/// Nothing is frozen yet; the returned handle commits the transition. A call after an earlier
/// one with the same options returns a handle with nothing left to do, and differing options fail
/// with [`VmError::LockdownOptionConflict`].
pub fn repair_intrinsics(realm: &mut Realm, options: LockdownOptions) -> Result<HardenIntrinsics, VmError> {
  let span = tracing::info_span!("harden_js.repair_intrinsics");
  let _guard = span.enter();

  let resolved = options.resolve(realm.lockdown.first_options);
  if let Some(first) = realm.lockdown.first_options {
    if let Some(name) = first.first_difference(&resolved) {
      return Err(VmError::LockdownOptionConflict {
        name: name.to_string(),
      });
    }
    debug!("already locked down");
    return Ok(HardenIntrinsics { pending: None });
  }
  realm.lockdown.first_options = Some(resolved);
  debug!(?resolved, "resolved options");

  let registry = collect_intrinsics(realm, &resolved)?;

  tame_console(realm, resolved.console_taming, resolved.stack_filtering);
  let replaced = tame_locale_methods(realm, &registry, resolved.locale_taming)?;
  debug!(replaced, "tamed locale methods");

  let removed = whitelist_intrinsics(realm, &registry)?;
  debug!(removed = removed.len(), "whitelisted intrinsics");

  let id = RegistryId(realm.registries.len() as u32);
  realm.registries.push(registry);
  realm.lockdown.registry = Some(id);
  let global = realm.global;
  init_global_object(realm, global, CompartmentId::START, id, &INITIAL_GLOBAL_PROPERTY_NAMES)?;
  crate::compartment::record_mut(realm, CompartmentId::START)?.registry = id;

  Ok(HardenIntrinsics {
    pending: Some((id, resolved.override_taming)),
  })
}

/// Locks the realm down: [`repair_intrinsics`] followed by [`HardenIntrinsics::commit`].
pub fn lockdown(realm: &mut Realm, options: LockdownOptions) -> Result<Lockdown, VmError> {
  let span = tracing::info_span!("harden_js.lockdown");
  let _guard = span.enter();
  repair_intrinsics(realm, options)?.commit(realm)
}

/// Gathers the host primordials and the tamers' replacements into one finalized registry.
pub(crate) fn collect_intrinsics(
  realm: &mut Realm,
  resolved: &ResolvedOptions,
) -> Result<IntrinsicRegistry, VmError> {
  let mut registry = IntrinsicRegistry::new();
  registry.add_intrinsics(host_entries(&realm.intrinsics))?;
  registry.add_intrinsics(repair_function_constructors(realm)?)?;
  registry.add_intrinsics(tame_date(realm, resolved.date_taming)?)?;
  registry.add_intrinsics(tame_error(realm, resolved.error_taming)?)?;
  registry.add_intrinsics(tame_math(realm, resolved.math_taming)?)?;
  registry.add_intrinsics(tame_regexp(realm, resolved.reg_exp_taming)?)?;
  debug!(entries = registry.len(), "collected and tamed intrinsics");

  registry.complete_prototypes(realm)?;
  registry.finalize(realm)?;
  debug!(entries = registry.len(), "completed prototypes");
  Ok(registry)
}

/// What the JavaScript `lockdown` returns on a repeated call.
pub const ALREADY_HARDENED: &str = "already hardened";

/// The JavaScript `lockdown` global. Option values are read as strings.
pub(crate) fn lockdown_native(realm: &mut Realm, inv: Invocation<'_>) -> Result<Value, VmError> {
  let mut map = serde_json::Map::new();
  if let Value::Object(obj) = inv.arg(0) {
    for key in realm.heap.own_property_keys(obj)? {
      let name = match &key {
        PropertyKey::String(name) => name.to_string(),
        PropertyKey::Symbol(_) => crate::validate::permit_name(realm, &key),
      };
      let value = match realm.get(obj, &key)? {
        Value::Undefined => continue,
        Value::String(s) => serde_json::Value::String(s.to_string()),
        other => serde_json::Value::String(realm.display(&other)),
      };
      map.insert(name, value);
    }
  }
  let options = LockdownOptions::from_map(&map)?;
  Ok(match lockdown(realm, options)? {
    Lockdown::Hardened => Value::Bool(true),
    Lockdown::AlreadyHardened => Value::from(ALREADY_HARDENED),
  })
}

#[cfg(test)]
mod tests {
  use super::collect_intrinsics;
  use super::LockdownOptions;
  use super::ResolvedOptions;
  use crate::enablements::OverrideTaming;
  use crate::tame::Taming;
  use crate::validate::whitelist_intrinsics;
  use crate::Realm;
  use crate::Value;
  use crate::VmError;

  #[test]
  fn options_parse_from_json() -> Result<(), VmError> {
    let options = LockdownOptions::from_json(r#"{"dateTaming":"unsafe","overrideTaming":"min"}"#)?;
    assert_eq!(options.date_taming, Some(Taming::Unsafe));
    assert_eq!(options.override_taming, Some(OverrideTaming::Min));
    assert_eq!(options.error_taming, None);
    Ok(())
  }

  #[test]
  fn unknown_options_and_values_are_named() {
    match LockdownOptions::from_json(r#"{"fooTaming":"safe","barTaming":1}"#) {
      Err(VmError::UnsupportedOption { names }) => assert_eq!(names, "fooTaming, barTaming"),
      other => panic!("unexpected {other:?}"),
    }
    match LockdownOptions::from_json(r#"{"mathTaming":"sorta"}"#) {
      Err(err @ VmError::UnrecognizedOptionValue { .. }) => {
        assert_eq!(err.to_string(), "unrecognized mathTaming sorta")
      }
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn absent_options_inherit_from_the_base() {
    let first = LockdownOptions {
      override_taming: Some(OverrideTaming::Severe),
      ..Default::default()
    }
    .resolve(None);
    let again = LockdownOptions::default().resolve(Some(first));
    assert_eq!(again, first);
    let different = LockdownOptions {
      override_taming: Some(OverrideTaming::Min),
      ..Default::default()
    }
    .resolve(Some(first));
    assert_eq!(first.first_difference(&different), Some("overrideTaming"));
  }

  #[test]
  fn validating_twice_removes_nothing_new() -> Result<(), VmError> {
    let mut realm = Realm::new()?;
    realm.evaluate_script("inject.js", "Array.prototype.extra = 1; Math.extra = 2;")?;
    let registry = collect_intrinsics(&mut realm, &ResolvedOptions::default())?;
    let removed = whitelist_intrinsics(&mut realm, &registry)?;
    assert!(removed.iter().any(|p| p == "intrinsics.%ArrayPrototype%.extra"));
    assert!(removed.iter().any(|p| p == "intrinsics.%InitialMath%.extra"));
    assert!(removed.iter().any(|p| p == "intrinsics.%SharedMath%.extra"));
    assert!(whitelist_intrinsics(&mut realm, &registry)?.is_empty());
    let v = realm.evaluate_script("check.js", "'extra' in Array.prototype")?;
    assert!(v.same_value(&Value::Bool(false)));
    Ok(())
  }
}
