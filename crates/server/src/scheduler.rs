//! Delayed price updates.
//!
//! A single background worker owns every armed job. Callers talk to it through
//! [`PriceUpdateScheduler`], a cloneable handle over a bounded command channel,
//! so scheduling never waits for the delay and never shares a store connection
//! with the request that asked for it.
//!
//! Job lifecycle: `armed` → one of `applied`, `product_missing`, `superseded`,
//! `failed` when the deadline passes, or `cancelled`/`abandoned` before it.
//! Every transition is logged and appended to the audit repository. Nothing is
//! reported back to the original caller.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use stockinfo_core::domain::price_update::{
    OverlapPolicy, PriceUpdateEvent, PriceUpdateJob, PriceUpdateJobId, PriceUpdateOutcome,
};
use stockinfo_core::domain::product::ProductId;
use stockinfo_db::repositories::{PriceUpdateEventRepository, ProductRepository};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("price update worker is not running")]
    WorkerStopped,
    #[error("price update delay {0:?} is out of range")]
    DelayOutOfRange(Duration),
}

enum SchedulerCommand {
    Arm {
        job: PriceUpdateJob,
        deadline: Instant,
    },
    Cancel {
        product_id: ProductId,
        job_id: PriceUpdateJobId,
        response: oneshot::Sender<Option<PriceUpdateJob>>,
    },
    Pending {
        product_id: Option<ProductId>,
        response: oneshot::Sender<Vec<PriceUpdateJob>>,
    },
    Shutdown {
        response: oneshot::Sender<usize>,
    },
}

#[derive(Clone)]
pub struct PriceUpdateScheduler {
    command_tx: mpsc::Sender<SchedulerCommand>,
    sequence: Arc<AtomicU64>,
}

impl PriceUpdateScheduler {
    /// Starts the worker on the current tokio runtime.
    pub fn spawn(
        products: Arc<dyn ProductRepository>,
        events: Arc<dyn PriceUpdateEventRepository>,
        policy: OverlapPolicy,
        queue_capacity: usize,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(queue_capacity.max(1));
        let worker = Worker {
            products,
            events,
            policy,
            armed: BTreeMap::new(),
            last_applied: HashMap::new(),
            shutdown_requests: Vec::new(),
        };
        tokio::spawn(worker.run(command_rx));

        Self { command_tx, sequence: Arc::new(AtomicU64::new(0)) }
    }

    /// Arms a job that writes `new_price` once `delay` has elapsed. Returns as
    /// soon as the worker has the job queued.
    pub async fn schedule(
        &self,
        product_id: ProductId,
        new_price: Decimal,
        delay: Duration,
    ) -> Result<PriceUpdateJob, SchedulerError> {
        let deadline =
            Instant::now().checked_add(delay).ok_or(SchedulerError::DelayOutOfRange(delay))?;
        let offset =
            chrono::Duration::from_std(delay).map_err(|_| SchedulerError::DelayOutOfRange(delay))?;
        let scheduled_at = Utc::now();

        let job = PriceUpdateJob {
            id: PriceUpdateJobId::generate(),
            product_id,
            new_price,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            scheduled_at,
            fires_at: scheduled_at + offset,
        };

        self.command_tx
            .send(SchedulerCommand::Arm { job: job.clone(), deadline })
            .await
            .map_err(|_| SchedulerError::WorkerStopped)?;

        Ok(job)
    }

    /// Withdraws an armed job. `None` when the job already fired, was cancelled,
    /// or belongs to another product.
    pub async fn cancel(
        &self,
        product_id: ProductId,
        job_id: &PriceUpdateJobId,
    ) -> Result<Option<PriceUpdateJob>, SchedulerError> {
        let job_id = job_id.clone();
        self.request(|response| SchedulerCommand::Cancel { product_id, job_id, response }).await
    }

    /// Armed jobs in firing order, optionally restricted to one product.
    pub async fn pending(
        &self,
        product_id: Option<ProductId>,
    ) -> Result<Vec<PriceUpdateJob>, SchedulerError> {
        self.request(|response| SchedulerCommand::Pending { product_id, response }).await
    }

    pub async fn pending_count(&self) -> Result<usize, SchedulerError> {
        Ok(self.pending(None).await?.len())
    }

    /// Stops the worker and returns how many armed jobs were abandoned.
    pub async fn shutdown(&self) -> Result<usize, SchedulerError> {
        self.request(|response| SchedulerCommand::Shutdown { response }).await
    }

    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }

    async fn request<T>(
        &self,
        build_command: impl FnOnce(oneshot::Sender<T>) -> SchedulerCommand,
    ) -> Result<T, SchedulerError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build_command(response_tx))
            .await
            .map_err(|_| SchedulerError::WorkerStopped)?;
        response_rx.await.map_err(|_| SchedulerError::WorkerStopped)
    }
}

struct Worker {
    products: Arc<dyn ProductRepository>,
    events: Arc<dyn PriceUpdateEventRepository>,
    policy: OverlapPolicy,
    /// Keyed by deadline then sequence, so iteration order is firing order.
    armed: BTreeMap<(Instant, u64), PriceUpdateJob>,
    /// Sequence of the last job written per product, kept only while that
    /// product still has armed jobs.
    last_applied: HashMap<ProductId, u64>,
    /// Callers waiting for the worker to stop.
    shutdown_requests: Vec<oneshot::Sender<usize>>,
}

impl Worker {
    async fn run(mut self, mut command_rx: mpsc::Receiver<SchedulerCommand>) {
        info!(
            event_name = "price_update.worker.started",
            correlation_id = "bootstrap",
            overlap_policy = self.policy.as_str(),
            "price update worker started"
        );

        loop {
            let next_deadline = self.armed.keys().next().map(|(deadline, _)| *deadline);

            tokio::select! {
                biased;

                _ = wait_until(next_deadline) => self.fire_due().await,
                command = command_rx.recv() => match command {
                    Some(command) => {
                        self.handle(command).await;
                        if !self.shutdown_requests.is_empty() {
                            self.stop(&mut command_rx).await;
                            break;
                        }
                    }
                    None => {
                        self.abandon_all().await;
                        break;
                    }
                },
            }
        }

        info!(
            event_name = "price_update.worker.stopped",
            correlation_id = "shutdown",
            "price update worker stopped"
        );
    }

    async fn handle(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::Arm { job, deadline } => {
                debug!(
                    event_name = "price_update.armed",
                    job_id = %job.id,
                    product_id = %job.product_id,
                    sequence = job.sequence,
                    fires_at = %job.fires_at.to_rfc3339(),
                    "price update armed"
                );
                self.record(&job, PriceUpdateOutcome::Armed, None).await;
                self.armed.insert((deadline, job.sequence), job);
            }
            SchedulerCommand::Cancel { product_id, job_id, response } => {
                let key = self
                    .armed
                    .iter()
                    .find(|(_, job)| job.id == job_id && job.product_id == product_id)
                    .map(|(key, _)| *key);
                let cancelled = key.and_then(|key| self.armed.remove(&key));

                if let Some(job) = &cancelled {
                    info!(
                        event_name = "price_update.cancelled",
                        job_id = %job.id,
                        product_id = %job.product_id,
                        "price update cancelled before firing"
                    );
                    self.record(job, PriceUpdateOutcome::Cancelled, None).await;
                    self.forget_if_idle(job.product_id);
                }
                let _ = response.send(cancelled);
            }
            SchedulerCommand::Pending { product_id, response } => {
                let jobs = self
                    .armed
                    .values()
                    .filter(|job| product_id.map_or(true, |id| job.product_id == id))
                    .cloned()
                    .collect();
                let _ = response.send(jobs);
            }
            SchedulerCommand::Shutdown { response } => self.shutdown_requests.push(response),
        }
    }

    /// Jobs queued behind the shutdown were already acknowledged to their
    /// callers, so they are armed and then abandoned like the rest.
    async fn stop(&mut self, command_rx: &mut mpsc::Receiver<SchedulerCommand>) {
        command_rx.close();
        let mut drained = 0_usize;
        while let Ok(command) = command_rx.try_recv() {
            drained += 1;
            self.handle(command).await;
        }
        if drained > 0 {
            debug!(
                event_name = "price_update.worker.drained",
                correlation_id = "shutdown",
                count = drained,
                "handled commands queued behind shutdown"
            );
        }

        let abandoned = self.abandon_all().await;
        for response in self.shutdown_requests.drain(..) {
            let _ = response.send(abandoned);
        }
    }

    async fn fire_due(&mut self) {
        let now = Instant::now();
        while let Some(entry) = self.armed.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let job = entry.remove();
            self.fire(job).await;
        }
    }

    async fn fire(&mut self, job: PriceUpdateJob) {
        let last_applied = self.last_applied.get(&job.product_id).copied();

        if !self.policy.should_apply(job.sequence, last_applied) {
            info!(
                event_name = "price_update.superseded",
                job_id = %job.id,
                product_id = %job.product_id,
                sequence = job.sequence,
                last_applied_sequence = last_applied,
                "price update skipped; a later schedule was already applied"
            );
            let detail = last_applied.map(|sequence| format!("sequence {sequence} already applied"));
            self.record(&job, PriceUpdateOutcome::Superseded, detail).await;
        } else {
            match self.products.update_price(job.product_id, job.new_price).await {
                Ok(true) => {
                    self.last_applied.insert(job.product_id, job.sequence);
                    info!(
                        event_name = "price_update.applied",
                        job_id = %job.id,
                        product_id = %job.product_id,
                        new_price = %job.new_price,
                        "scheduled price applied"
                    );
                    self.record(&job, PriceUpdateOutcome::Applied, None).await;
                }
                Ok(false) => {
                    info!(
                        event_name = "price_update.product_missing",
                        job_id = %job.id,
                        product_id = %job.product_id,
                        "product deleted before scheduled price update fired"
                    );
                    self.record(&job, PriceUpdateOutcome::ProductMissing, None).await;
                }
                Err(store_error) => {
                    error!(
                        event_name = "price_update.failed",
                        job_id = %job.id,
                        product_id = %job.product_id,
                        error = %store_error,
                        "scheduled price update could not be written"
                    );
                    self.record(&job, PriceUpdateOutcome::Failed, Some(store_error.to_string()))
                        .await;
                }
            }
        }

        self.forget_if_idle(job.product_id);
    }

    async fn abandon_all(&mut self) -> usize {
        let abandoned = std::mem::take(&mut self.armed);
        if !abandoned.is_empty() {
            warn!(
                event_name = "price_update.abandoned",
                correlation_id = "shutdown",
                count = abandoned.len(),
                "price update worker stopping with armed jobs"
            );
        }
        for job in abandoned.values() {
            self.record(job, PriceUpdateOutcome::Abandoned, None).await;
        }
        self.last_applied.clear();
        abandoned.len()
    }

    fn forget_if_idle(&mut self, product_id: ProductId) {
        if !self.armed.values().any(|job| job.product_id == product_id) {
            self.last_applied.remove(&product_id);
        }
    }

    async fn record(
        &self,
        job: &PriceUpdateJob,
        outcome: PriceUpdateOutcome,
        detail: Option<String>,
    ) {
        let event = PriceUpdateEvent::for_job(job, outcome, detail);
        if let Err(audit_error) = self.events.append(event).await {
            warn!(
                event_name = "price_update.audit_failed",
                job_id = %job.id,
                product_id = %job.product_id,
                outcome = outcome.as_str(),
                error = %audit_error,
                "could not record price update event"
            );
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
