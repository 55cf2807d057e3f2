use super::Taming;
use crate::diagnostics::stack::StackFiltering;
use crate::realm::Realm;

/// Routes the realm's console through the causal console in safe mode and sets how error
/// stacks are filtered.
pub(crate) fn tame_console(realm: &mut Realm, taming: Taming, filtering: StackFiltering) {
  realm.lockdown.causal_console = taming == Taming::Safe;
  realm.stack_filtering = filtering;
}
