//! Scope stack for nested sub-transactions.
//!
//! The store maintains:
//! - A nesting depth, bumped on every sub-transaction start
//! - A stack of scopes, one per depth that has recorded something
//!
//! Scopes are created lazily: entering a sub-transaction only bumps the
//! depth, and the scope for that depth is allocated by the first mutation
//! recorded there. The root scope (level 0) always exists.
//!
//! ```text
//! depth:   0        1 (no writes)     2
//! scopes: [root] ─────────────────── [level 2]
//!
//! commit at depth 2 → depth 1, level-2 scope folds into a fresh level-1 scope
//! abort  at depth 2 → depth 1, level-2 scope is dropped
//! ```

use crate::merge::merge_scope;
use relay_core::{DbEntry, RoleEntry};
use std::collections::{BTreeMap, BTreeSet};

/// Nesting level of a scope (0 = top-level transaction).
pub type Level = usize;

/// Changes recorded at one nesting level.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scope {
    level: Level,
    pub(crate) dbs: BTreeMap<String, DbEntry>,
    pub(crate) roles: BTreeMap<String, RoleEntry>,
    /// Names, as the enclosing scope knows them, of lineages this scope
    /// overwrote. The merge removes them from the parent.
    pub(crate) retired_dbs: BTreeSet<String>,
    pub(crate) retired_roles: BTreeSet<String>,
}

impl Scope {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            dbs: BTreeMap::new(),
            roles: BTreeMap::new(),
            retired_dbs: BTreeSet::new(),
            retired_roles: BTreeSet::new(),
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// Database entries keyed by current name.
    pub fn dbs(&self) -> &BTreeMap<String, DbEntry> {
        &self.dbs
    }

    /// Role entries keyed by current name.
    pub fn roles(&self) -> &BTreeMap<String, RoleEntry> {
        &self.roles
    }

    pub fn db(&self, name: &str) -> Option<&DbEntry> {
        self.dbs.get(name)
    }

    pub fn role(&self, name: &str) -> Option<&RoleEntry> {
        self.roles.get(name)
    }

    /// Database lineages this scope overwrote.
    pub fn retired_dbs(&self) -> &BTreeSet<String> {
        &self.retired_dbs
    }

    /// Role lineages this scope overwrote.
    pub fn retired_roles(&self) -> &BTreeSet<String> {
        &self.retired_roles
    }

    /// True when neither map holds an entry.
    pub fn is_empty(&self) -> bool {
        self.dbs.is_empty() && self.roles.is_empty()
    }
}

/// Stack of scopes for one top-level transaction.
#[derive(Clone, Debug)]
pub struct DeltaStore {
    depth: Level,
    /// Never empty; `scopes[0]` is the root. Levels strictly increase.
    scopes: Vec<Scope>,
}

impl DeltaStore {
    pub fn new() -> Self {
        Self {
            depth: 0,
            scopes: vec![Scope::new(0)],
        }
    }

    /// Current sub-transaction nesting depth.
    pub fn depth(&self) -> Level {
        self.depth
    }

    /// Number of allocated scopes, root included.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Enter a sub-transaction. Does not allocate.
    pub fn enter_scope(&mut self) {
        self.depth += 1;
    }

    /// The scope at the current depth, allocated on first use.
    pub fn current_scope(&mut self) -> &mut Scope {
        if self.depth > self.top().level {
            self.scopes.push(Scope::new(self.depth));
        }
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    /// Leave a committed sub-transaction, folding its scope (if any) into
    /// the scope of the enclosing level.
    ///
    /// Returns `true` when a scope was merged. Calling this at depth 0 is a
    /// no-op.
    pub fn commit_scope(&mut self) -> bool {
        match self.leave() {
            Some(child) => {
                let parent = self.current_scope();
                merge_scope(child, parent);
                true
            }
            None => false,
        }
    }

    /// Leave an aborted sub-transaction, dropping its scope (if any).
    ///
    /// Returns `true` when a scope was discarded.
    pub fn discard_scope(&mut self) -> bool {
        self.leave().is_some()
    }

    /// The top-level scope.
    pub fn root(&self) -> &Scope {
        &self.scopes[0]
    }

    /// Reset to an empty root at depth 0.
    pub fn clear(&mut self) {
        self.scopes.truncate(1);
        self.scopes[0] = Scope::new(0);
        self.depth = 0;
    }

    /// Nearest database entry named `name` in a scope strictly below the
    /// current depth.
    pub fn inherited_db(&self, name: &str) -> Option<&DbEntry> {
        self.enclosing().find_map(|scope| scope.dbs.get(name))
    }

    /// Nearest role entry named `name` in a scope strictly below the
    /// current depth.
    pub fn inherited_role(&self, name: &str) -> Option<&RoleEntry> {
        self.enclosing().find_map(|scope| scope.roles.get(name))
    }

    fn enclosing(&self) -> impl Iterator<Item = &Scope> {
        let depth = self.depth;
        self.scopes.iter().rev().filter(move |s| s.level < depth)
    }

    fn top(&self) -> &Scope {
        &self.scopes[self.scopes.len() - 1]
    }

    /// Decrement the depth and pop the scope that belonged to the vacated
    /// level, if it was ever allocated.
    fn leave(&mut self) -> Option<Scope> {
        if self.depth == 0 {
            return None;
        }
        self.depth -= 1;
        if self.top().level > self.depth {
            self.scopes.pop()
        } else {
            None
        }
    }
}

impl Default for DeltaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::Op;

    fn touch_db(store: &mut DeltaStore, name: &str) {
        store
            .current_scope()
            .dbs
            .insert(name.to_string(), DbEntry::new(name, Op::Set));
    }

    #[test]
    fn test_enter_scope_is_lazy() {
        let mut store = DeltaStore::new();
        store.enter_scope();
        store.enter_scope();

        assert_eq!(store.depth(), 2);
        assert_eq!(store.scope_count(), 1);

        touch_db(&mut store, "a");
        assert_eq!(store.scope_count(), 2);
        assert_eq!(store.current_scope().level(), 2);
    }

    #[test]
    fn test_commit_folds_into_lazily_created_parent() {
        let mut store = DeltaStore::new();
        store.enter_scope();
        store.enter_scope();
        touch_db(&mut store, "a");

        assert!(store.commit_scope());
        assert_eq!(store.depth(), 1);
        assert_eq!(store.scope_count(), 2);
        assert!(store.current_scope().db("a").is_some());

        assert!(store.commit_scope());
        assert_eq!(store.depth(), 0);
        assert!(store.root().db("a").is_some());
    }

    #[test]
    fn test_commit_without_writes_does_not_allocate() {
        let mut store = DeltaStore::new();
        store.enter_scope();
        assert!(!store.commit_scope());
        assert_eq!(store.scope_count(), 1);
        assert!(store.root().is_empty());
    }

    #[test]
    fn test_discard_drops_scope() {
        let mut store = DeltaStore::new();
        touch_db(&mut store, "kept");
        store.enter_scope();
        touch_db(&mut store, "dropped");

        assert!(store.discard_scope());
        assert_eq!(store.depth(), 0);
        assert!(store.root().db("kept").is_some());
        assert!(store.root().db("dropped").is_none());
    }

    #[test]
    fn test_discard_skips_unallocated_level() {
        let mut store = DeltaStore::new();
        store.enter_scope();
        touch_db(&mut store, "outer");
        store.enter_scope();

        // Inner level never wrote anything: the outer scope must survive.
        assert!(!store.discard_scope());
        assert_eq!(store.depth(), 1);
        assert!(store.current_scope().db("outer").is_some());
    }

    #[test]
    fn test_leave_at_top_level_is_noop() {
        let mut store = DeltaStore::new();
        touch_db(&mut store, "a");
        assert!(!store.commit_scope());
        assert!(!store.discard_scope());
        assert_eq!(store.depth(), 0);
        assert!(store.root().db("a").is_some());
    }

    #[test]
    fn test_inherited_lookup_skips_current_level() {
        let mut store = DeltaStore::new();
        touch_db(&mut store, "a");
        store.enter_scope();
        touch_db(&mut store, "b");

        assert!(store.inherited_db("a").is_some());
        assert!(store.inherited_db("b").is_none());
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut store = DeltaStore::new();
        touch_db(&mut store, "a");
        store.enter_scope();
        touch_db(&mut store, "b");

        store.clear();
        assert_eq!(store.depth(), 0);
        assert_eq!(store.scope_count(), 1);
        assert!(store.root().is_empty());
    }
}
