//! Folding a committed child scope into its parent.
//!
//! 1. Lineages the child overwrote (its retired names) are removed from the
//!    parent. When the parent is itself nested, their origins are retired
//!    there in turn.
//! 2. For every child entry carrying an `old_name` that the parent tracks,
//!    the parent entry is an earlier name of the same lineage: the child
//!    inherits that entry's origin as its `old_name` and the parent entry
//!    is removed.
//! 3. Each child entry replaces any parent entry of the same name. When
//!    the child recorded no history for the name, the parent's history for
//!    it is kept. When the child brings a different history, the parent's
//!    lineage is overwritten and retired like in step 1.
//!
//! Step 2 runs for all entries against the parent as it stood before any
//! insertion, so the result does not depend on iteration order. Committing
//! a sub-transaction is equivalent to having recorded its events directly
//! in the parent.

use crate::scope::Scope;
use relay_core::{DbEntry, Op, RoleEntry};
use std::collections::{BTreeMap, BTreeSet};

/// Common view over database and role entries.
pub trait Tracked: Clone {
    /// Create a fresh `Set` entry.
    fn blank(name: &str) -> Self;

    fn name(&self) -> &str;

    fn old_name(&self) -> Option<&str>;

    fn set_old_name(&mut self, old_name: Option<String>);

    fn op(&self) -> Op;

    /// A `Set` entry named `new_name` carrying this entry's payload
    /// (owner or staged password), without history.
    fn renamed(&self, new_name: &str) -> Self;

    /// Name of the lineage at transaction start.
    fn origin(&self) -> &str {
        self.old_name().unwrap_or_else(|| self.name())
    }

    /// Record `old_name` as history, dropping it when it equals the current
    /// name: a lineage that ends where it started has nothing to rename.
    fn with_history(mut self, old_name: Option<String>) -> Self {
        let old_name = old_name.filter(|old| old != self.name());
        self.set_old_name(old_name);
        self
    }
}

impl Tracked for DbEntry {
    fn blank(name: &str) -> Self {
        DbEntry::new(name, Op::Set)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn old_name(&self) -> Option<&str> {
        self.old_name.as_deref()
    }

    fn set_old_name(&mut self, old_name: Option<String>) {
        self.old_name = old_name;
    }

    fn op(&self) -> Op {
        self.op
    }

    fn renamed(&self, new_name: &str) -> Self {
        DbEntry {
            owner: self.owner,
            ..DbEntry::new(new_name, Op::Set)
        }
    }
}

impl Tracked for RoleEntry {
    fn blank(name: &str) -> Self {
        RoleEntry::new(name, Op::Set)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn old_name(&self) -> Option<&str> {
        self.old_name.as_deref()
    }

    fn set_old_name(&mut self, old_name: Option<String>) {
        self.old_name = old_name;
    }

    fn op(&self) -> Op {
        self.op
    }

    fn renamed(&self, new_name: &str) -> Self {
        RoleEntry {
            password: self.password.clone(),
            ..RoleEntry::new(new_name, Op::Set)
        }
    }
}

/// Fold `child` into `parent`, consuming the child.
pub fn merge_scope(child: Scope, parent: &mut Scope) {
    // The root has no enclosing scope to retire anything from.
    let nested = parent.level() > 0;
    merge_map(
        child.dbs,
        child.retired_dbs,
        &mut parent.dbs,
        nested.then_some(&mut parent.retired_dbs),
    );
    merge_map(
        child.roles,
        child.retired_roles,
        &mut parent.roles,
        nested.then_some(&mut parent.retired_roles),
    );
}

fn merge_map<E: Tracked>(
    child: BTreeMap<String, E>,
    retired: BTreeSet<String>,
    parent: &mut BTreeMap<String, E>,
    mut parent_retired: Option<&mut BTreeSet<String>>,
) {
    for name in retired {
        let origin = match parent.remove(&name) {
            Some(stale) => stale.origin().to_string(),
            None => name,
        };
        if let Some(parent_retired) = parent_retired.as_deref_mut() {
            parent_retired.insert(origin);
        }
    }

    let mut resolved = Vec::with_capacity(child.len());
    for (_, entry) in child {
        let history = match entry.old_name() {
            Some(old) => match parent.remove(old) {
                Some(ancestor) => Some(ancestor.origin().to_string()),
                None => Some(old.to_string()),
            },
            None => None,
        };
        resolved.push((entry, history));
    }

    for (entry, history) in resolved {
        let existing = parent
            .get(entry.name())
            .and_then(|existing| existing.old_name().map(str::to_string));
        let history = match (history, existing) {
            (Some(history), Some(lost)) => {
                if lost != history {
                    if let Some(parent_retired) = parent_retired.as_deref_mut() {
                        parent_retired.insert(lost);
                    }
                }
                Some(history)
            }
            (history, existing) => history.or(existing),
        };
        let entry = entry.with_history(history);
        parent.insert(entry.name().to_string(), entry);
    }
}
