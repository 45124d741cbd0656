//! The worker pool: one primary identity plus optional secondaries, with
//! least-loaded selection per stream request.

use super::error::StreamError;
use super::transport::HubTransport;
use super::worker::Worker;
use futures::future::join_all;
use std::sync::Arc;

pub struct HubPool {
    /// Started workers in configured order: primary first, then
    /// secondaries. Selection ties resolve to the earliest entry.
    workers: Vec<Arc<Worker>>,
}

impl HubPool {
    /// Start every identity concurrently. The first transport is the
    /// primary: its failure is fatal. Secondary failures are logged and the
    /// identity is skipped.
    pub async fn start(transports: Vec<Arc<dyn HubTransport>>) -> Result<HubPool, StreamError> {
        let mut transports = transports.into_iter().enumerate();
        let (_, primary) = transports
            .next()
            .ok_or(StreamError::CapacityUnavailable)?;

        let primary = Worker::start(0, primary);
        let secondaries = join_all(
            transports.map(|(index, transport)| Worker::start(index, transport)),
        );
        let (primary, secondaries) = tokio::join!(primary, secondaries);

        let mut workers = vec![primary?];
        for started in secondaries {
            match started {
                Ok(worker) => workers.push(worker),
                Err(err) => {
                    tracing::error!(error = %err, "secondary worker failed to start, skipping");
                }
            }
        }

        tracing::info!(workers = workers.len(), "hub worker pool started");
        Ok(HubPool { workers })
    }

    /// The least-loaded started worker; ties favor the earliest-configured
    /// identity, so the primary wins under equal load. `None` means no
    /// capacity and callers must answer service-unavailable.
    pub fn get_available_worker(&self) -> Option<Arc<Worker>> {
        self.workers
            .iter()
            .min_by_key(|worker| worker.workload())
            .cloned()
    }

    /// The primary identity, whose update feed drives ingestion.
    pub fn primary(&self) -> Option<&Arc<Worker>> {
        self.workers.first()
    }

    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    pub async fn shutdown(&self) {
        for worker in &self.workers {
            worker.shutdown().await;
        }
    }
}
