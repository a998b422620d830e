//! Periodic refresh of the session registry.

use std::collections::HashSet;

use chrono::Utc;
use muxgeist_core::aggregate::{AggregationPath, PaneAggregator};
use muxgeist_core::error::MultiplexerError;
use muxgeist_core::multiplexer::MultiplexerClient;
use muxgeist_core::registry::{Registration, SessionRecord, SessionRegistry};
use tracing::{debug, info, warn};

/// Counters for one completed tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Sessions reported by discovery.
    pub discovered: usize,
    /// Sessions registered for the first time.
    pub created: usize,
    /// Sessions left untracked because the registry is full.
    pub rejected: usize,
    /// Records whose context buffer was replaced.
    pub refreshed: usize,
    /// Records with at least one failed query this tick.
    pub failed: usize,
}

/// Outcome of refreshing a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    Complete,
    /// Context replaced, metadata kept from an earlier tick.
    StaleMetadata,
    /// Nothing replaced; the record keeps its previous snapshot.
    Failed,
}

/// Drives discovery and per-session refresh against a multiplexer.
pub struct PollLoop<C> {
    client: C,
    aggregator: PaneAggregator,
    discovery_failing: bool,
    /// Ids already reported as rejected, so a full registry warns once per id.
    /// Pruned to the live session list on every successful discovery.
    rejected: HashSet<String>,
}

impl<C: MultiplexerClient> PollLoop<C> {
    pub fn new(client: C, aggregator: PaneAggregator) -> Self {
        Self {
            client,
            aggregator,
            discovery_failing: false,
            rejected: HashSet::new(),
        }
    }

    /// Run one tick: discover, register, then refresh every tracked record.
    ///
    /// A discovery failure leaves the registry untouched and is returned to
    /// the caller. Refresh failures are isolated to their session.
    pub async fn tick(
        &mut self,
        registry: &mut SessionRegistry,
    ) -> Result<TickReport, MultiplexerError> {
        let sessions = match self.client.list_sessions().await {
            Ok(sessions) => {
                if self.discovery_failing {
                    info!("Session discovery recovered");
                    self.discovery_failing = false;
                }
                sessions
            }
            Err(e) => {
                if !self.discovery_failing {
                    warn!("Session discovery failed, skipping refresh: {}", e);
                    self.discovery_failing = true;
                } else {
                    debug!("Session discovery still failing: {}", e);
                }
                return Err(e);
            }
        };

        self.rejected.retain(|id| sessions.contains(id));

        let mut report = TickReport {
            discovered: sessions.len(),
            ..TickReport::default()
        };

        for id in &sessions {
            match registry.find_or_create(id) {
                Registration::Created(_) => {
                    info!("Tracking new session {}", id);
                    report.created += 1;
                }
                Registration::Existing(_) => {}
                Registration::Rejected => {
                    report.rejected += 1;
                    if self.rejected.insert(id.clone()) {
                        warn!(
                            "Session registry full ({} sessions), not tracking {}",
                            registry.capacity(),
                            id
                        );
                    }
                }
            }
        }

        for record in registry.iter_mut() {
            match self.refresh(record).await {
                Refresh::Complete => report.refreshed += 1,
                Refresh::StaleMetadata => {
                    report.refreshed += 1;
                    report.failed += 1;
                }
                Refresh::Failed => report.failed += 1,
            }
        }

        Ok(report)
    }

    async fn refresh(&self, record: &mut SessionRecord) -> Refresh {
        let session = record.id().to_string();

        let metadata_ok = match self.client.active_pane(&session).await {
            Ok(active) => {
                record.working_directory = active.working_directory;
                record.active_pane_id = active.pane_id;
                true
            }
            Err(e) => {
                debug!(session = %session, error = %e, "metadata refresh failed");
                false
            }
        };

        match self.aggregator.aggregate(&self.client, &session).await {
            Ok(aggregation) => {
                if aggregation.path == AggregationPath::Fallback {
                    debug!(session = %session, "context from active pane only");
                }
                record.replace_context(aggregation.buffer);
                record.touch(Utc::now());
                if metadata_ok {
                    Refresh::Complete
                } else {
                    Refresh::StaleMetadata
                }
            }
            Err(e) => {
                debug!(session = %session, error = %e, "context refresh failed, keeping previous snapshot");
                Refresh::Failed
            }
        }
    }
}
