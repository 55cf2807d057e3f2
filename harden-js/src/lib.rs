//! Realm hardening and confined evaluation for an embedded JavaScript object graph.
//!
//! A [`Realm`] starts out as an ordinary, mutable JavaScript environment. [`lockdown`] turns it
//! into a hardened one:
//! - the primordials are tamed, so that ambient authority (clock, entropy, stack inspection) is
//!   only reachable from the start compartment;
//! - every builtin property the permit tree does not name is removed;
//! - the common prototypes get override-by-assignment repairs;
//! - everything reachable from the intrinsics is transitively frozen.
//!
//! After lockdown, [`harden`] freezes arbitrary object graphs, and compartments
//! ([`Realm::new_compartment`]) evaluate untrusted code against their own global object while
//! sharing the frozen intrinsics.
//!
//! ```
//! use harden_js::CompartmentOptions;
//! use harden_js::EvaluateOptions;
//! use harden_js::LockdownOptions;
//! use harden_js::Realm;
//!
//! # fn main() -> Result<(), harden_js::VmError> {
//! let mut realm = Realm::new()?;
//! harden_js::lockdown(&mut realm, LockdownOptions::default())?;
//! let c = realm.new_compartment(None, CompartmentOptions::new().name("guest"))?;
//! let v = realm.evaluate_in(c, "[1, 2, 3].map(x => x * 2).join()", EvaluateOptions::new())?;
//! assert_eq!(v.as_str(), Some("2,4,6"));
//! # Ok(())
//! # }
//! ```

pub(crate) mod builtins;
pub mod compartment;
pub mod diagnostics;
pub mod enablements;
mod error;
pub mod harden;
pub mod heap;
pub mod intrinsics;
pub mod js;
pub mod lockdown;
pub mod permits;
pub mod property;
pub mod realm;
pub mod source;
pub mod tame;
pub mod validate;
pub mod value;

pub use crate::compartment::options::CompartmentOptions;
pub use crate::compartment::options::EvaluateOptions;
pub use crate::compartment::transforms::Transform;
pub use crate::compartment::CompartmentState;
pub use crate::diagnostics::console::ConsoleSink;
pub use crate::diagnostics::stack::StackFiltering;
pub use crate::enablements::OverrideTaming;
pub use crate::error::VmError;
pub use crate::harden::harden;
pub use crate::heap::CompartmentId;
pub use crate::lockdown::lockdown;
pub use crate::lockdown::repair_intrinsics;
pub use crate::lockdown::HardenIntrinsics;
pub use crate::lockdown::Lockdown;
pub use crate::lockdown::LockdownOptions;
pub use crate::realm::ErrorKind;
pub use crate::realm::Realm;
pub use crate::tame::Taming;
pub use crate::value::ObjectId;
pub use crate::value::Value;
