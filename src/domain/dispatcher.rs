//! Fleet Dispatcher
//!
//! Drives key lookup, session open, command execution and session close
//! for each host record, and fans records out over a bounded pool of
//! concurrent tasks.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::field::Empty;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::config::{Config, SshConfig};
use crate::domain::{CommandRunner, CoreCountReport, HostRecord};
use crate::error::{FleetError, Result};
use crate::ports::{KeyStore, SshConnector, SshSessionTrait};

/// Everything a host task needs besides its ports
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub ssh: SshConfig,
    pub commands: Vec<String>,
    pub workers: usize,
    pub check_exit_status: bool,
}

impl DispatchSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            ssh: config.ssh.clone(),
            commands: config.dispatch.commands.clone(),
            workers: config.dispatch.effective_workers(),
            check_exit_status: config.dispatch.check_exit_status,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A record that did not produce a report
#[derive(Debug)]
pub struct HostFailure {
    pub record: String,
    pub error: FleetError,
}

/// Outcome of a whole fleet run
#[derive(Debug, Default)]
pub struct DispatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<HostFailure>,
}

impl DispatchSummary {
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty() && self.succeeded == self.total
    }
}

/// Runs the configured commands on every host of a fleet.
pub struct FleetDispatcher<K, C> {
    key_store: Arc<K>,
    connector: Arc<C>,
    settings: Arc<DispatchSettings>,
}

impl<K, C> Clone for FleetDispatcher<K, C> {
    fn clone(&self) -> Self {
        Self {
            key_store: Arc::clone(&self.key_store),
            connector: Arc::clone(&self.connector),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<K, C> FleetDispatcher<K, C>
where
    K: KeyStore + 'static,
    C: SshConnector + 'static,
    C::Session: 'static,
{
    #[must_use]
    pub fn new(key_store: Arc<K>, connector: Arc<C>, settings: DispatchSettings) -> Self {
        Self {
            key_store,
            connector,
            settings: Arc::new(settings),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Process one raw `host,user` record
    ///
    /// The record is validated before any I/O. Once a session is open it
    /// is closed on every path; a failed close is logged and does not
    /// replace the command outcome.
    ///
    /// # Errors
    ///
    /// Returns the first failure among record parsing, key lookup,
    /// session open and command execution.
    pub async fn dispatch_one(&self, line: &str) -> Result<CoreCountReport> {
        let record = HostRecord::parse(line)?;

        let span = Span::current();
        span.record("host", record.hostname());
        span.record("user", record.username());

        let key = self.key_store.fetch_key(record.hostname()).await?;
        debug!(host = %record.hostname(), algorithm = %key.algorithm(), "Key resolved");

        let mut session = self
            .connector
            .open(&record, key, &self.settings.ssh)
            .await?;

        let runner = CommandRunner::new(self.settings.check_exit_status);
        let outcome = runner.run(&session, &self.settings.commands).await;

        if let Err(e) = session.close().await {
            warn!(host = %session.host_name(), error = %e, "Failed to close SSH session cleanly");
        }

        let results = outcome?;
        Ok(CoreCountReport::from_results(record.hostname(), &results))
    }

    /// Process every record with at most `workers` hosts in flight
    ///
    /// Each successful report is written to `out` as soon as its host
    /// finishes, so lines appear in completion order. Failures are logged
    /// and collected in the summary; they never stop other hosts. A host
    /// whose report line cannot be written counts as failed.
    pub async fn dispatch_all<W: Write>(&self, records: Vec<String>, out: &mut W) -> DispatchSummary {
        let workers = self.settings.workers.max(1);
        let permits = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        let mut lines_by_task = HashMap::with_capacity(records.len());

        info!(hosts = records.len(), workers, "Dispatching fleet");

        let total = records.len();
        for line in records {
            let dispatcher = self.clone();
            let permits = Arc::clone(&permits);
            let span = info_span!("host", record = %line.trim(), host = Empty, user = Empty);
            let task_line = line.clone();

            let handle = tasks.spawn(
                async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return Err(FleetError::TaskFailed {
                            reason: "worker pool closed".to_string(),
                        });
                    };
                    let outcome = dispatcher.dispatch_one(&task_line).await;
                    if let Err(e) = &outcome {
                        error!(error = %e, "Host failed");
                    }
                    outcome
                }
                .instrument(span),
            );
            lines_by_task.insert(handle.id(), line);
        }

        let mut summary = DispatchSummary {
            total,
            ..Default::default()
        };

        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(e) => {
                    error!(error = %e, "Host task aborted");
                    let reason = e.to_string();
                    (e.id(), Err(FleetError::TaskFailed { reason }))
                }
            };
            let record = lines_by_task.remove(&id).unwrap_or_default();

            match outcome {
                Ok(report) => match writeln!(out, "{report}").and_then(|()| out.flush()) {
                    Ok(()) => summary.succeeded += 1,
                    Err(e) => {
                        error!(host = %report.hostname, error = %e, "Failed to write report");
                        summary.failures.push(HostFailure {
                            record,
                            error: FleetError::Io(e),
                        });
                    }
                },
                Err(error) => summary.failures.push(HostFailure { record, error }),
            }
        }

        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failures.len(),
            "Fleet dispatch finished"
        );

        summary
    }
}
