//! Drives a [`Coordinator`] through a script, playing the host's part.
//!
//! The catalog is snapshotted at every savepoint so rolled back statements
//! disappear from it, as they would from the host's catalog.

use crate::script::{Step, Transaction};
use relay_core::{MemoryCatalog, RelayError};
use relay_forward::{DeliveryOutcome, DeltaMessage, HttpTransport};
use relay_hook::Coordinator;
use tracing::warn;

/// What happened to one scripted transaction.
#[derive(Debug, PartialEq, Eq)]
pub enum TxReport {
    /// `message` is the delta as rendered at commit; forwarding may have
    /// been skipped without rendering, so it can fail on its own.
    Committed {
        outcome: DeliveryOutcome,
        message: Result<Option<DeltaMessage>, RelayError>,
    },
    Aborted,
    /// A statement or the pre-commit hook failed; the transaction rolled back.
    Failed { step: Option<usize>, error: RelayError },
}

pub struct Replayer<T: HttpTransport> {
    coordinator: Coordinator<T>,
    catalog: MemoryCatalog,
}

impl<T: HttpTransport> Replayer<T> {
    pub fn new(coordinator: Coordinator<T>, catalog: MemoryCatalog) -> Self {
        Self {
            coordinator,
            catalog,
        }
    }

    pub fn catalog(&self) -> &MemoryCatalog {
        &self.catalog
    }

    pub fn run(&mut self, transaction: &Transaction) -> TxReport {
        let start = self.catalog.clone();
        let mut savepoints: Vec<MemoryCatalog> = Vec::new();
        self.coordinator.begin_transaction();

        for (index, step) in transaction.steps.iter().enumerate() {
            match step {
                Step::Savepoint => {
                    savepoints.push(self.catalog.clone());
                    self.coordinator.begin_subtransaction();
                }
                Step::Release => {
                    if savepoints.pop().is_some() {
                        self.coordinator.commit_subtransaction();
                    } else {
                        warn!(step = index, "release without an open savepoint");
                    }
                }
                Step::Rollback => match savepoints.pop() {
                    Some(snapshot) => {
                        self.catalog = snapshot;
                        self.coordinator.abort_subtransaction();
                    }
                    None => warn!(step = index, "rollback without an open savepoint"),
                },
                Step::Event(event) => {
                    let result = self
                        .coordinator
                        .handle_event(event, &self.catalog)
                        .and_then(|()| self.catalog.apply(event));
                    if let Err(error) = result {
                        self.rollback(start);
                        return TxReport::Failed {
                            step: Some(index),
                            error,
                        };
                    }
                }
            }
        }

        // COMMIT releases whatever savepoints are still open.
        while savepoints.pop().is_some() {
            self.coordinator.commit_subtransaction();
        }

        if transaction.abort {
            self.rollback(start);
            return TxReport::Aborted;
        }

        let message = self.coordinator.pending_message(&self.catalog);

        let result = self.coordinator.pre_commit(&self.catalog);
        match result {
            Ok(outcome) => {
                self.coordinator.transaction_end();
                TxReport::Committed { outcome, message }
            }
            Err(error) => {
                self.rollback(start);
                TxReport::Failed { step: None, error }
            }
        }
    }

    fn rollback(&mut self, start: MemoryCatalog) {
        self.catalog = start;
        self.coordinator.transaction_end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Script;
    use relay_core::Catalog;
    use relay_forward::{
        DeliveryClient, HttpRequest, HttpResponse, RetryPolicy, SkipReason, TransportError,
    };
    use relay_hook::{RelaySettingsBuilder, SharedSettings};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Accept {
        bodies: Mutex<Vec<String>>,
    }

    impl HttpTransport for Accept {
        fn send(&self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
            self.bodies.lock().unwrap().push(request.body.to_string());
            Ok(HttpResponse {
                status: 200,
                body: Vec::new(),
            })
        }
    }

    fn replayer(script: &Script, url: Option<&str>) -> Replayer<Accept> {
        let mut settings = RelaySettingsBuilder::new();
        if let Some(url) = url {
            settings = settings.console_url(url);
        }
        let client = DeliveryClient::new(Accept::default(), None, RetryPolicy::default());
        let coordinator = Coordinator::new(SharedSettings::new(settings.build()), Arc::new(client));
        Replayer::new(coordinator, script.seed_catalog().unwrap())
    }

    #[test]
    fn test_rolled_back_savepoint_leaves_catalog_and_delta() {
        let script = Script::parse(
            r#"{
                "user": "alice",
                "transactions": [{ "steps": [
                    { "event": { "kind": "create_database", "name": "kept" } },
                    "savepoint",
                    { "event": { "kind": "create_role", "name": "tmp" } },
                    "rollback"
                ] }]
            }"#,
        )
        .unwrap();
        let mut replayer = replayer(&script, Some("http://cp"));

        let report = replayer.run(&script.transactions[0]);

        let message = match report {
            TxReport::Committed {
                outcome: DeliveryOutcome::Delivered { attempts: 1 },
                message: Ok(Some(message)),
            } => message,
            other => panic!("unexpected report {:?}", other),
        };
        assert!(message.db("kept").is_some());
        assert!(message.roles.is_empty());
        assert!(replayer.catalog().has_database("kept"));
        assert!(replayer.catalog().role_id("tmp").is_err());
    }

    #[test]
    fn test_failed_statement_rolls_back_catalog() {
        let script = Script::parse(
            r#"{
                "user": "alice",
                "transactions": [
                    { "steps": [
                        { "event": { "kind": "create_database", "name": "a" } },
                        { "event": { "kind": "create_database", "name": "b", "owner": "neon_superuser" } }
                    ] },
                    { "steps": [ { "event": { "kind": "create_database", "name": "c" } } ] }
                ]
            }"#,
        )
        .unwrap();
        let mut replayer = replayer(&script, None);

        let report = replayer.run(&script.transactions[0]);
        assert!(matches!(
            report,
            TxReport::Failed {
                step: Some(1),
                error: RelayError::Privilege(_)
            }
        ));
        assert!(!replayer.catalog().has_database("a"));

        let report = replayer.run(&script.transactions[1]);
        match report {
            TxReport::Committed { outcome, message } => {
                assert_eq!(outcome, DeliveryOutcome::Skipped(SkipReason::NoEndpoint));
                let message = message.unwrap().unwrap();
                assert_eq!(message.dbs.len(), 1);
                assert!(message.db("c").is_some());
            }
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[test]
    fn test_aborted_transaction_sends_nothing() {
        let script = Script::parse(
            r#"{ "transactions": [ { "steps": [
                { "event": { "kind": "create_role", "name": "r" } }
            ], "abort": true } ] }"#,
        )
        .unwrap();
        let mut replayer = replayer(&script, Some("http://cp"));

        assert_eq!(replayer.run(&script.transactions[0]), TxReport::Aborted);
        assert!(replayer.catalog().role_id("r").is_err());
    }

    #[test]
    fn test_open_savepoints_are_released_on_commit() {
        let script = Script::parse(
            r#"{ "transactions": [ { "steps": [
                "savepoint",
                { "event": { "kind": "create_role", "name": "r" } }
            ] } ] }"#,
        )
        .unwrap();
        let mut replayer = replayer(&script, None);

        match replayer.run(&script.transactions[0]) {
            TxReport::Committed { message, .. } => {
                assert!(message.unwrap().unwrap().role("r").is_some());
            }
            other => panic!("unexpected report {:?}", other),
        }
    }

    const VANISHED_OWNER: &str = r#"{
        "user": "alice",
        "roles": [{ "name": "bob" }],
        "transactions": [{ "steps": [
            { "event": { "kind": "create_database", "name": "shop", "owner": "bob" } },
            { "event": { "kind": "drop_role", "name": "bob" } }
        ] }]
    }"#;

    #[test]
    fn test_unrenderable_delta_is_shown_when_not_forwarded() {
        let script = Script::parse(VANISHED_OWNER).unwrap();
        let mut replayer = replayer(&script, None);

        match replayer.run(&script.transactions[0]) {
            TxReport::Committed { outcome, message } => {
                assert_eq!(outcome, DeliveryOutcome::Skipped(SkipReason::NoEndpoint));
                assert!(matches!(message, Err(RelayError::Lookup { kind: "role", .. })));
            }
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[test]
    fn test_unrenderable_delta_fails_the_commit_when_forwarded() {
        let script = Script::parse(VANISHED_OWNER).unwrap();
        let mut replayer = replayer(&script, Some("http://cp"));

        let report = replayer.run(&script.transactions[0]);

        assert!(matches!(
            report,
            TxReport::Failed {
                step: None,
                error: RelayError::Lookup { kind: "role", .. }
            }
        ));
        assert!(!replayer.catalog().has_database("shop"));
        assert!(replayer.catalog().role_id("bob").is_ok());
    }

    #[test]
    fn test_create_existing_role_fails_the_step() {
        let script = Script::parse(
            r#"{ "user": "alice", "roles": [{ "name": "bob" }], "transactions": [ { "steps": [
                { "event": { "kind": "create_role", "name": "fresh" } },
                { "event": { "kind": "create_role", "name": "bob" } }
            ] } ] }"#,
        )
        .unwrap();
        let mut replayer = replayer(&script, None);

        let report = replayer.run(&script.transactions[0]);

        assert!(matches!(
            report,
            TxReport::Failed {
                step: Some(1),
                error: RelayError::Unsupported(_)
            }
        ));
        assert!(replayer.catalog().role_id("fresh").is_err());
    }

    #[test]
    fn test_settings_snapshot_taken_at_transaction_start() {
        let script = Script::parse(
            r#"{ "transactions": [ { "steps": [
                { "event": { "kind": "create_tablespace", "name": "fast" } }
            ] } ] }"#,
        )
        .unwrap();
        let settings = SharedSettings::default();
        let client = DeliveryClient::new(Accept::default(), None, RetryPolicy::default());
        let coordinator = Coordinator::new(settings.clone(), Arc::new(client));
        let mut replayer = Replayer::new(coordinator, script.seed_catalog().unwrap());

        assert!(matches!(
            replayer.run(&script.transactions[0]),
            TxReport::Failed { step: Some(0), .. }
        ));
        settings.update(|s| s.regress_test_mode = true);
        assert!(matches!(
            replayer.run(&script.transactions[0]),
            TxReport::Committed { message: Ok(None), .. }
        ));
    }
}
