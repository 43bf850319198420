//! Transaction lifecycle coordinator.
//!
//! The host calls into the coordinator at five kinds of points:
//!
//! - when the top-level transaction starts: [`Coordinator::begin_transaction`]
//! - after each tracked statement: [`Coordinator::handle_event`]
//! - at sub-transaction boundaries: begin / commit / abort
//! - right before the top-level commit: [`Coordinator::pre_commit`]
//! - once the top-level transaction is over: [`Coordinator::transaction_end`]
//!
//! A failure from `handle_event` or `pre_commit` must abort the host
//! transaction.
//!
//! The settings snapshot is taken when the context opens. A host that skips
//! `begin_transaction` gets a context at its first lifecycle call instead,
//! so a settings change made before that call still reaches the running
//! transaction.

use crate::config::SharedSettings;
use crate::context::TransactionContext;
use relay_core::{Catalog, DdlEvent, RelayError, Result};
use relay_delta::Level;
use relay_forward::{
    render, DeliveryClient, DeliveryOutcome, DeltaMessage, HttpTransport, SkipReason, UreqTransport,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// One coordinator per connection.
pub struct Coordinator<T: HttpTransport = UreqTransport> {
    settings: SharedSettings,
    client: Arc<DeliveryClient<T>>,
    context: Option<TransactionContext>,
}

impl<T: HttpTransport> Coordinator<T> {
    pub fn new(settings: SharedSettings, client: Arc<DeliveryClient<T>>) -> Self {
        Self {
            settings,
            client,
            context: None,
        }
    }

    pub fn client(&self) -> &Arc<DeliveryClient<T>> {
        &self.client
    }

    /// The running transaction's context, if any lifecycle call created one.
    pub fn context(&self) -> Option<&TransactionContext> {
        self.context.as_ref()
    }

    pub fn in_transaction(&self) -> bool {
        self.context.is_some()
    }

    /// Current sub-transaction depth (0 at top level).
    pub fn depth(&self) -> Level {
        self.context.as_ref().map_or(0, |ctx| ctx.store().depth())
    }

    /// Open the transaction's context and take its settings snapshot.
    ///
    /// Does nothing when a context is already open.
    pub fn begin_transaction(&mut self) {
        if self.context.is_some() {
            debug!("transaction context already open");
            return;
        }
        let context = self.context_mut();
        debug!(
            forward_ddl = context.settings().forward_ddl,
            "opened transaction context"
        );
    }

    fn context_mut(&mut self) -> &mut TransactionContext {
        let settings = &self.settings;
        self.context
            .get_or_insert_with(|| TransactionContext::new(settings.snapshot()))
    }

    /// Record one classified statement.
    pub fn handle_event<C: Catalog + ?Sized>(&mut self, event: &DdlEvent, catalog: &C) -> Result<()> {
        if matches!(event, DdlEvent::Other) {
            return Ok(());
        }

        let context = self.context_mut();
        debug!(
            statement = event.tag(),
            depth = context.store().depth(),
            "recording ddl statement"
        );

        if let DdlEvent::CreateTablespace { .. } = event {
            if context.settings().regress_test_mode {
                return Ok(());
            }
            return Err(RelayError::Unsupported("CREATE TABLESPACE".to_string()));
        }

        let mut recorder = context.recorder(catalog);
        match event {
            DdlEvent::CreateDatabase { name, owner } => recorder.create_database(name, owner.as_deref()),
            DdlEvent::AlterDatabaseOwner { name, new_owner } => {
                recorder.alter_database_owner(name, new_owner)
            }
            DdlEvent::RenameDatabase { old_name, new_name } => {
                recorder.rename_database(old_name, new_name)
            }
            DdlEvent::DropDatabase { name } => recorder.drop_database(name),
            DdlEvent::CreateRole { name, password } => recorder.create_role(name, password.as_deref()),
            DdlEvent::AlterRolePassword { name, password } => {
                recorder.alter_role_password(name, password.as_deref())
            }
            DdlEvent::AlterRole { name } => recorder.alter_role(name),
            DdlEvent::RenameRole { old_name, new_name } => recorder.rename_role(old_name, new_name),
            DdlEvent::DropRole { name } => recorder.drop_role(name),
            DdlEvent::CreateTablespace { .. } | DdlEvent::Other => Ok(()),
        }
    }

    pub fn begin_subtransaction(&mut self) {
        self.context_mut().store_mut().enter_scope();
    }

    pub fn commit_subtransaction(&mut self) {
        let store = self.context_mut().store_mut();
        if store.depth() == 0 {
            warn!("sub-transaction commit outside of a sub-transaction");
            return;
        }
        if store.commit_scope() {
            debug!(depth = store.depth(), "merged sub-transaction changes");
        }
    }

    pub fn abort_subtransaction(&mut self) {
        let store = self.context_mut().store_mut();
        if store.depth() == 0 {
            warn!("sub-transaction abort outside of a sub-transaction");
            return;
        }
        if store.discard_scope() {
            debug!(depth = store.depth(), "discarded sub-transaction changes");
        }
    }

    /// Render and deliver the transaction's changes.
    ///
    /// An error here must prevent the host transaction from committing.
    pub fn pre_commit<C: Catalog + ?Sized>(&mut self, catalog: &C) -> Result<DeliveryOutcome> {
        let context = match &self.context {
            Some(context) => context,
            None => return Ok(DeliveryOutcome::Skipped(SkipReason::NothingToSend)),
        };
        if context.store().depth() != 0 {
            warn!(
                depth = context.store().depth(),
                "pre-commit with open sub-transactions, sending top-level changes only"
            );
        }

        let target = context.settings().forward_target();
        self.client.forward(&target, context.store().root(), catalog)
    }

    /// The message `pre_commit` would send, rendered against `catalog`.
    ///
    /// `None` when nothing was recorded.
    pub fn pending_message<C: Catalog + ?Sized>(&self, catalog: &C) -> Result<Option<DeltaMessage>> {
        match &self.context {
            Some(context) => render(context.store().root(), catalog),
            None => Ok(None),
        }
    }

    /// Forget everything the transaction accumulated, on commit or abort.
    pub fn transaction_end(&mut self) {
        if let Some(context) = self.context.take() {
            debug!(
                dbs = context.store().root().dbs().len(),
                roles = context.store().root().roles().len(),
                "transaction finished, dropping ddl delta"
            );
        }
    }
}
