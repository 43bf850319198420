//! Mutation recorder: applies administrative events to the current scope.
//!
//! Every operation validates first and only then touches the store, so a
//! rejected statement leaves no trace (not even an allocated scope).

use crate::merge::Tracked;
use crate::scope::DeltaStore;
use relay_core::{Catalog, Op, RelayError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Records events into a [`DeltaStore`].
///
/// `protected_role` names the administrative role ordinary callers may
/// neither hand databases to nor alter.
pub struct MutationRecorder<'a, C: Catalog + ?Sized> {
    store: &'a mut DeltaStore,
    catalog: &'a C,
    protected_role: &'a str,
}

impl<'a, C: Catalog + ?Sized> MutationRecorder<'a, C> {
    pub fn new(store: &'a mut DeltaStore, catalog: &'a C, protected_role: &'a str) -> Self {
        Self {
            store,
            catalog,
            protected_role,
        }
    }

    /// `CREATE DATABASE name [OWNER owner]`.
    ///
    /// Without an explicit owner the database belongs to the current user.
    pub fn create_database(&mut self, name: &str, owner: Option<&str>) -> Result<()> {
        let owner = match owner {
            Some(owner) => {
                if owner == self.protected_role {
                    return Err(RelayError::Privilege(format!(
                        "could not create a database with owner {}",
                        self.protected_role
                    )));
                }
                self.catalog.role_id(owner)?
            }
            None => self.catalog.current_user(),
        };

        let entry = upsert(&mut self.store.current_scope().dbs, name);
        entry.op = Op::Set;
        entry.owner = Some(owner);
        Ok(())
    }

    /// `ALTER DATABASE name OWNER TO new_owner`.
    pub fn alter_database_owner(&mut self, name: &str, new_owner: &str) -> Result<()> {
        if new_owner == self.protected_role {
            return Err(RelayError::Privilege(format!(
                "could not alter owner to {}",
                self.protected_role
            )));
        }
        let owner = self.catalog.role_id(new_owner)?;

        let entry = upsert(&mut self.store.current_scope().dbs, name);
        entry.op = Op::Set;
        entry.owner = Some(owner);
        Ok(())
    }

    /// `ALTER DATABASE old_name RENAME TO new_name`.
    pub fn rename_database(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let inherited = self.store.inherited_db(old_name).cloned();
        let nested = self.store.depth() > 0;
        let scope = self.store.current_scope();
        rename(
            &mut scope.dbs,
            nested.then_some(&mut scope.retired_dbs),
            inherited.as_ref(),
            old_name,
            new_name,
        );
        Ok(())
    }

    /// `DROP DATABASE name`.
    pub fn drop_database(&mut self, name: &str) -> Result<()> {
        let entry = upsert(&mut self.store.current_scope().dbs, name);
        entry.op = Op::Delete;
        entry.owner = None;
        Ok(())
    }

    /// `CREATE ROLE name [PASSWORD password]`.
    pub fn create_role(&mut self, name: &str, password: Option<&str>) -> Result<()> {
        self.stage_password(name, password);
        Ok(())
    }

    /// `ALTER ROLE name PASSWORD password`. `None` is `PASSWORD NULL`.
    pub fn alter_role_password(&mut self, name: &str, password: Option<&str>) -> Result<()> {
        self.check_alter_role(name)?;
        self.catalog.role_id(name)?;
        self.stage_password(name, password);
        Ok(())
    }

    /// `ALTER ROLE name ...` without a password clause.
    ///
    /// Nothing is recorded, but the protected role is still guarded.
    pub fn alter_role(&mut self, name: &str) -> Result<()> {
        self.check_alter_role(name)
    }

    /// `ALTER ROLE old_name RENAME TO new_name`.
    pub fn rename_role(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let inherited = self.store.inherited_role(old_name).cloned();
        let nested = self.store.depth() > 0;
        let scope = self.store.current_scope();
        rename(
            &mut scope.roles,
            nested.then_some(&mut scope.retired_roles),
            inherited.as_ref(),
            old_name,
            new_name,
        );
        Ok(())
    }

    /// `DROP ROLE name`.
    pub fn drop_role(&mut self, name: &str) -> Result<()> {
        let entry = upsert(&mut self.store.current_scope().roles, name);
        entry.op = Op::Delete;
        entry.password = None;
        Ok(())
    }

    fn check_alter_role(&self, name: &str) -> Result<()> {
        if name == self.protected_role && !self.catalog.is_superuser() {
            return Err(RelayError::Privilege(format!(
                "could not ALTER {}",
                self.protected_role
            )));
        }
        Ok(())
    }

    fn stage_password(&mut self, name: &str, password: Option<&str>) {
        let entry = upsert(&mut self.store.current_scope().roles, name);
        entry.op = Op::Set;
        entry.password = password.map(str::to_string);
    }
}

/// Entry for `name`, inserted blank (no history) when absent. An existing
/// entry keeps its history.
fn upsert<'m, E: Tracked>(map: &'m mut BTreeMap<String, E>, name: &str) -> &'m mut E {
    map.entry(name.to_string()).or_insert_with(|| E::blank(name))
}

/// Move the lineage at `old_name` to `new_name`.
///
/// When this scope does not track `old_name`, the payload is taken from the
/// nearest enclosing scope that does (`inherited`) and the history is
/// `old_name` itself; the merge resolves it further on commit.
///
/// An entry already at `new_name` is overwritten. Inside a sub-transaction
/// its history is added to `retired`, since the parent may still hold that
/// lineage under its earlier name.
fn rename<E: Tracked>(
    map: &mut BTreeMap<String, E>,
    retired: Option<&mut BTreeSet<String>>,
    inherited: Option<&E>,
    old_name: &str,
    new_name: &str,
) {
    let entry = match map.remove(old_name) {
        Some(previous) => {
            let history = previous.origin().to_string();
            previous.renamed(new_name).with_history(Some(history))
        }
        None => {
            let moved = match inherited {
                Some(source) => source.renamed(new_name),
                None => E::blank(new_name),
            };
            moved.with_history(Some(old_name.to_string()))
        }
    };
    let overwritten = map.insert(new_name.to_string(), entry);
    if let (Some(overwritten), Some(retired)) = (overwritten, retired) {
        if let Some(history) = overwritten.old_name() {
            retired.insert(history.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{DbEntry, MemoryCatalog, RoleId};

    const PROTECTED: &str = "neon_superuser";

    fn catalog() -> MemoryCatalog {
        let mut catalog = MemoryCatalog::new("alice");
        catalog.create_role("bob", None).unwrap();
        catalog.create_role(PROTECTED, None).unwrap();
        catalog
    }

    #[test]
    fn test_create_database_defaults_owner_to_current_user() {
        let catalog = catalog();
        let mut store = DeltaStore::new();
        MutationRecorder::new(&mut store, &catalog, PROTECTED)
            .create_database("shop", None)
            .unwrap();

        let entry = store.root().db("shop").unwrap();
        assert_eq!(entry.op, Op::Set);
        assert_eq!(entry.owner, Some(catalog.current_user()));
        assert_eq!(entry.old_name, None);
    }

    #[test]
    fn test_create_database_with_protected_owner_is_rejected() {
        let catalog = catalog();
        let mut store = DeltaStore::new();
        store.enter_scope();

        let result = MutationRecorder::new(&mut store, &catalog, PROTECTED)
            .create_database("shop", Some(PROTECTED));

        assert!(matches!(result, Err(RelayError::Privilege(_))));
        // Rejected before the lazily created scope was allocated.
        assert_eq!(store.scope_count(), 1);
    }

    #[test]
    fn test_create_database_with_unknown_owner_is_lookup_failure() {
        let catalog = catalog();
        let mut store = DeltaStore::new();

        let result = MutationRecorder::new(&mut store, &catalog, PROTECTED)
            .create_database("shop", Some("ghost"));

        assert_eq!(result, Err(RelayError::missing_role("ghost")));
        assert!(store.root().is_empty());
    }

    #[test]
    fn test_alter_owner_updates_entry() {
        let catalog = catalog();
        let bob = catalog.role_id("bob").unwrap();
        let mut store = DeltaStore::new();
        let mut recorder = MutationRecorder::new(&mut store, &catalog, PROTECTED);

        recorder.create_database("shop", None).unwrap();
        recorder.alter_database_owner("shop", "bob").unwrap();
        assert!(matches!(
            recorder.alter_database_owner("shop", PROTECTED),
            Err(RelayError::Privilege(_))
        ));

        assert_eq!(store.root().db("shop").unwrap().owner, Some(bob));
    }

    #[test]
    fn test_rename_unknown_database_records_old_name() {
        let catalog = catalog();
        let mut store = DeltaStore::new();
        MutationRecorder::new(&mut store, &catalog, PROTECTED)
            .rename_database("legacy", "current")
            .unwrap();

        let entry = store.root().db("current").unwrap();
        assert_eq!(entry.old_name.as_deref(), Some("legacy"));
        assert_eq!(entry.owner, None);
        assert_eq!(entry.op, Op::Set);
    }

    #[test]
    fn test_rename_chain_keeps_first_name() {
        let catalog = catalog();
        let mut store = DeltaStore::new();
        let mut recorder = MutationRecorder::new(&mut store, &catalog, PROTECTED);

        recorder.rename_database("a", "b").unwrap();
        recorder.rename_database("b", "c").unwrap();
        recorder.rename_database("c", "d").unwrap();

        let root = store.root();
        assert_eq!(root.dbs().len(), 1);
        assert_eq!(root.db("d").unwrap().old_name.as_deref(), Some("a"));
    }

    #[test]
    fn test_create_rename_rename_back_is_plain_create() {
        let catalog = catalog();
        let mut store = DeltaStore::new();
        let mut recorder = MutationRecorder::new(&mut store, &catalog, PROTECTED);

        recorder.create_database("d1", None).unwrap();
        recorder.rename_database("d1", "d2").unwrap();
        recorder.rename_database("d2", "d1").unwrap();

        let root = store.root();
        assert_eq!(root.dbs().len(), 1);
        let entry = root.db("d1").unwrap();
        assert_eq!(entry.op, Op::Set);
        assert_eq!(entry.old_name, None);
        assert_eq!(entry.owner, Some(catalog.current_user()));
    }

    #[test]
    fn test_create_then_drop_is_delete_without_owner() {
        let catalog = catalog();
        let mut store = DeltaStore::new();
        let mut recorder = MutationRecorder::new(&mut store, &catalog, PROTECTED);

        recorder.create_database("d", Some("bob")).unwrap();
        recorder.drop_database("d").unwrap();

        assert_eq!(store.root().db("d"), Some(&DbEntry::new("d", Op::Delete)));
    }

    #[test]
    fn test_drop_preserves_history() {
        let catalog = catalog();
        let mut store = DeltaStore::new();
        let mut recorder = MutationRecorder::new(&mut store, &catalog, PROTECTED);

        recorder.rename_database("old", "new").unwrap();
        recorder.drop_database("new").unwrap();

        let entry = store.root().db("new").unwrap();
        assert_eq!(entry.op, Op::Delete);
        assert_eq!(entry.old_name.as_deref(), Some("old"));
    }

    #[test]
    fn test_rename_over_tracked_name_retires_its_history() {
        let catalog = catalog();
        let mut store = DeltaStore::new();
        store.enter_scope();
        let mut recorder = MutationRecorder::new(&mut store, &catalog, PROTECTED);

        recorder.rename_database("a", "b").unwrap();
        recorder.drop_database("b").unwrap();
        recorder.rename_database("c", "b").unwrap();

        let scope = store.current_scope();
        assert_eq!(scope.db("b").unwrap().old_name.as_deref(), Some("c"));
        assert!(scope.retired_dbs().contains("a"));
    }

    #[test]
    fn test_top_level_overwrite_retires_nothing() {
        let catalog = catalog();
        let mut store = DeltaStore::new();
        let mut recorder = MutationRecorder::new(&mut store, &catalog, PROTECTED);

        recorder.rename_database("a", "b").unwrap();
        recorder.drop_database("b").unwrap();
        recorder.rename_database("c", "b").unwrap();

        assert!(store.root().retired_dbs().is_empty());
        assert_eq!(store.root().dbs().len(), 1);
    }

    #[test]
    fn test_rename_in_child_inherits_parent_owner() {
        let catalog = catalog();
        let bob = catalog.role_id("bob").unwrap();
        let mut store = DeltaStore::new();

        MutationRecorder::new(&mut store, &catalog, PROTECTED)
            .create_database("a", Some("bob"))
            .unwrap();
        store.enter_scope();
        MutationRecorder::new(&mut store, &catalog, PROTECTED)
            .rename_database("a", "b")
            .unwrap();

        let child = store.current_scope();
        assert_eq!(child.db("b").unwrap().owner, Some(bob));
        assert_eq!(child.db("b").unwrap().old_name.as_deref(), Some("a"));
        // The parent entry is untouched until commit.
        assert!(store.root().db("a").is_some());
    }

    #[test]
    fn test_alter_password_keeps_latest_value() {
        let catalog = catalog();
        let mut store = DeltaStore::new();
        let mut recorder = MutationRecorder::new(&mut store, &catalog, PROTECTED);

        recorder.alter_role_password("bob", Some("first")).unwrap();
        recorder.alter_role_password("bob", Some("second")).unwrap();

        let entry = store.root().role("bob").unwrap();
        assert_eq!(entry.password.as_deref(), Some("second"));
        assert_eq!(store.root().roles().len(), 1);
    }

    #[test]
    fn test_alter_protected_role_requires_superuser() {
        let mut catalog = catalog();
        let mut store = DeltaStore::new();

        let denied = MutationRecorder::new(&mut store, &catalog, PROTECTED)
            .alter_role_password(PROTECTED, Some("pw"));
        assert!(matches!(denied, Err(RelayError::Privilege(_))));
        assert!(matches!(
            MutationRecorder::new(&mut store, &catalog, PROTECTED).alter_role(PROTECTED),
            Err(RelayError::Privilege(_))
        ));
        assert!(store.root().is_empty());

        catalog.set_superuser(true);
        MutationRecorder::new(&mut store, &catalog, PROTECTED)
            .alter_role_password(PROTECTED, Some("pw"))
            .unwrap();
        assert!(store.root().role(PROTECTED).is_some());
    }

    #[test]
    fn test_alter_role_without_password_records_nothing() {
        let catalog = catalog();
        let mut store = DeltaStore::new();
        MutationRecorder::new(&mut store, &catalog, PROTECTED)
            .alter_role("bob")
            .unwrap();

        assert!(store.root().is_empty());
    }

    #[test]
    fn test_alter_password_of_unknown_role_fails() {
        let catalog = catalog();
        let mut store = DeltaStore::new();
        let result = MutationRecorder::new(&mut store, &catalog, PROTECTED)
            .alter_role_password("ghost", Some("pw"));

        assert_eq!(result, Err(RelayError::missing_role("ghost")));
    }

    #[test]
    fn test_role_rename_carries_password_and_drop_clears_it() {
        let catalog = catalog();
        let mut store = DeltaStore::new();
        let mut recorder = MutationRecorder::new(&mut store, &catalog, PROTECTED);

        recorder.create_role("app", Some("pw")).unwrap();
        recorder.rename_role("app", "svc").unwrap();
        {
            let entry = store.root().role("svc").unwrap();
            assert_eq!(entry.password.as_deref(), Some("pw"));
            assert_eq!(entry.old_name.as_deref(), Some("app"));
        }

        MutationRecorder::new(&mut store, &catalog, PROTECTED)
            .drop_role("svc")
            .unwrap();
        let entry = store.root().role("svc").unwrap();
        assert_eq!(entry.op, Op::Delete);
        assert_eq!(entry.password, None);
        assert_eq!(entry.old_name.as_deref(), Some("app"));
    }

    #[test]
    fn test_owner_is_tracked_by_id() {
        let mut catalog = catalog();
        let mut store = DeltaStore::new();
        MutationRecorder::new(&mut store, &catalog, PROTECTED)
            .create_database("shop", Some("bob"))
            .unwrap();
        let owner = store.root().db("shop").unwrap().owner.unwrap();

        catalog.rename_role("bob", "robert").unwrap();
        assert_ne!(owner, RoleId(0));
        assert_eq!(catalog.role_name(owner).unwrap(), "robert");
    }
}
