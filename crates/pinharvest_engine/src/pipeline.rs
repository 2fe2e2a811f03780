//! Producer/consumer coordinator shared by the parsing and download stages.
//!
//! One producer task runs per group and enqueues exactly one item holding the
//! group's whole batch. A fixed number of interchangeable consumers drain the
//! queue and run per-unit work on each batch. The run ends once every producer
//! has finished, every enqueued item has been settled, and every task has been
//! joined.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use engine_logging::{sink_debug, sink_error, sink_info, sink_warn, LogSink};
use futures_util::future::join_all;
use pinharvest_core::{GroupKey, StageCounts, WorkGroups};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::{DroppedUnit, PipelineError, StageError, UnitFailure};

/// What a consumer does when per-unit work fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitFailurePolicy {
    /// Record the failure in the group report and carry on with the batch.
    Skip,
    /// Stop processing and fail the run once all tasks have wound down.
    Abort,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub consumer_count: usize,
    pub connection_limit: usize,
    /// Longest a consumer waits on an empty queue before re-checking whether
    /// the run is over.
    pub drain_timeout: Duration,
    pub queue_capacity: usize,
    pub unit_failures: UnitFailurePolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            consumer_count: 3,
            connection_limit: 3,
            drain_timeout: Duration::from_secs(5),
            queue_capacity: 16,
            unit_failures: UnitFailurePolicy::Skip,
        }
    }
}

/// A producer's full result for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
    pub units: Vec<T>,
    pub dropped: Vec<DroppedUnit>,
}

impl<T> Batch<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            units: Vec::with_capacity(capacity),
            dropped: Vec::new(),
        }
    }

    pub fn from_units(units: Vec<T>) -> Self {
        Self {
            units,
            dropped: Vec::new(),
        }
    }
}

/// Derives one group's batch. Called once per group.
#[async_trait::async_trait]
pub trait Producer: Send + Sync + 'static {
    type Unit: Send + 'static;
    type Output: Send + 'static;

    async fn produce(&self, group: &GroupKey, units: Vec<Self::Unit>) -> Batch<Self::Output>;
}

/// Per-unit work run by consumers. `position` is the unit's index in the
/// batch the consumer received.
#[async_trait::async_trait]
pub trait UnitWorker: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    async fn process(
        &self,
        group: &GroupKey,
        position: usize,
        unit: Self::Input,
    ) -> Result<Self::Output, StageError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReport {
    pub group: GroupKey,
    /// Units handed to the producer.
    pub requested: usize,
    /// Units the producer put on the queue.
    pub produced: usize,
    /// Units that made it through the consumer.
    pub delivered: usize,
    pub dropped: Vec<DroppedUnit>,
    pub failures: Vec<UnitFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub groups: Vec<GroupReport>,
}

impl RunReport {
    pub fn group(&self, key: &str) -> Option<&GroupReport> {
        self.groups.iter().find(|report| report.group.as_str() == key)
    }

    pub fn counts(&self) -> StageCounts {
        self.groups.iter().fold(StageCounts::default(), |mut acc, report| {
            acc.requested += report.requested;
            acc.delivered += report.delivered;
            acc.dropped += report.dropped.len();
            acc.failed += report.failures.len();
            acc
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput<T> {
    pub groups: WorkGroups<T>,
    pub report: RunReport,
}

/// Rejects input the pipeline cannot run, before any task is spawned.
pub fn validate_input<T>(
    input: &WorkGroups<T>,
    settings: &PipelineSettings,
) -> Result<(), PipelineError> {
    if input.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    if settings.consumer_count == 0 {
        return Err(PipelineError::InvalidSettings(
            "consumer_count must be at least 1".into(),
        ));
    }
    if settings.connection_limit == 0 {
        return Err(PipelineError::InvalidSettings(
            "connection_limit must be at least 1".into(),
        ));
    }
    if settings.queue_capacity == 0 {
        return Err(PipelineError::InvalidSettings(
            "queue_capacity must be at least 1".into(),
        ));
    }
    if settings.drain_timeout.is_zero() {
        return Err(PipelineError::InvalidSettings(
            "drain_timeout must be longer than zero".into(),
        ));
    }
    Ok(())
}

struct PipelineItem<T> {
    group: GroupKey,
    requested: usize,
    batch: Batch<T>,
}

/// Count of producers still running. Reaches zero exactly once.
struct ProducerRegistry {
    outstanding: Mutex<usize>,
}

impl ProducerRegistry {
    fn new(count: usize) -> Self {
        Self {
            outstanding: Mutex::new(count),
        }
    }

    /// True only for the call that takes the count to zero.
    fn finish_one(&self) -> bool {
        let mut outstanding = self
            .outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *outstanding == 0 {
            return false;
        }
        *outstanding -= 1;
        *outstanding == 0
    }
}

/// One-way flag raised when the last producer finishes.
#[derive(Default)]
struct CompletionSignal {
    raised: AtomicBool,
}

impl CompletionSignal {
    fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

struct Collected<T> {
    groups: WorkGroups<T>,
    reports: Vec<GroupReport>,
}

struct Shared<I, O> {
    tx: flume::Sender<PipelineItem<I>>,
    rx: flume::Receiver<PipelineItem<I>>,
    registry: ProducerRegistry,
    signal: CompletionSignal,
    /// Items enqueued but not yet settled by a consumer.
    unfinished: AtomicUsize,
    live_consumers: AtomicUsize,
    /// Woken whenever the signal, `unfinished` or `live_consumers` changes.
    changed: Notify,
    aborted: AtomicBool,
    first_error: Mutex<Option<PipelineError>>,
    collected: Mutex<Collected<O>>,
}

impl<I, O> Shared<I, O> {
    fn new(producers: usize, settings: &PipelineSettings) -> Self {
        let (tx, rx) = flume::bounded(settings.queue_capacity);
        Self {
            tx,
            rx,
            registry: ProducerRegistry::new(producers),
            signal: CompletionSignal::default(),
            unfinished: AtomicUsize::new(0),
            live_consumers: AtomicUsize::new(settings.consumer_count),
            changed: Notify::new(),
            aborted: AtomicBool::new(false),
            first_error: Mutex::new(None),
            collected: Mutex::new(Collected {
                groups: WorkGroups::new(),
                reports: Vec::new(),
            }),
        }
    }

    async fn put(&self, item: PipelineItem<I>) -> bool {
        self.unfinished.fetch_add(1, Ordering::SeqCst);
        if self.tx.send_async(item).await.is_err() {
            self.settle();
            return false;
        }
        true
    }

    fn settle(&self) {
        self.unfinished.fetch_sub(1, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    fn producer_finished(&self) -> bool {
        let last = self.registry.finish_one();
        if last {
            self.signal.raise();
            self.changed.notify_waiters();
        }
        last
    }

    fn is_finished(&self) -> bool {
        self.rx.is_empty() && self.signal.is_raised()
    }

    /// Waits until every item has been enqueued and settled, or until no
    /// consumer is left to settle them.
    async fn drained(&self) {
        loop {
            let changed = self.changed.notified();
            if self.live_consumers.load(Ordering::SeqCst) == 0 {
                return;
            }
            if self.signal.is_raised() && self.unfinished.load(Ordering::SeqCst) == 0 {
                return;
            }
            changed.await;
        }
    }

    fn abort(&self, error: PipelineError) {
        self.aborted.store(true, Ordering::SeqCst);
        let mut slot = self
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    fn deliver(&self, report: GroupReport, outputs: Vec<O>) {
        let mut collected = self
            .collected
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        collected.groups.insert(report.group.clone(), outputs);
        collected.reports.push(report);
    }
}

/// Settles the in-flight item even if the consumer unwinds.
struct SettleGuard<'a, I, O>(&'a Shared<I, O>);

impl<I, O> Drop for SettleGuard<'_, I, O> {
    fn drop(&mut self) {
        self.0.settle();
    }
}

struct ConsumerGuard<'a, I, O>(&'a Shared<I, O>);

impl<I, O> Drop for ConsumerGuard<'_, I, O> {
    fn drop(&mut self) {
        self.0.live_consumers.fetch_sub(1, Ordering::SeqCst);
        self.0.changed.notify_waiters();
    }
}

/// Counts the producer down even if it unwinds.
struct ProducerGuard<'a, I, O> {
    shared: &'a Shared<I, O>,
    id: usize,
    log: &'a dyn LogSink,
}

impl<I, O> Drop for ProducerGuard<'_, I, O> {
    fn drop(&mut self) {
        if self.shared.producer_finished() {
            sink_debug!(
                self.log,
                "[producer {}] last producer finished; raising completion signal",
                self.id
            );
        }
    }
}

/// Runs one producer per group and `consumer_count` consumers to completion.
///
/// Returns once every group's item has been settled and every task has been
/// joined. Groups in the output follow input order; units within a group keep
/// the order their producer emitted them in.
pub async fn run_pipeline<P, W>(
    input: WorkGroups<P::Unit>,
    producer: Arc<P>,
    worker: Arc<W>,
    settings: &PipelineSettings,
    log: Arc<dyn LogSink>,
) -> Result<PipelineOutput<W::Output>, PipelineError>
where
    P: Producer,
    W: UnitWorker<Input = P::Output>,
{
    validate_input(&input, settings)?;

    let order: Vec<GroupKey> = input.keys().cloned().collect();
    let shared = Arc::new(Shared::<P::Output, W::Output>::new(order.len(), settings));
    sink_debug!(
        log,
        "Starting pipeline: {} producer(s), {} consumer(s)",
        order.len(),
        settings.consumer_count
    );

    let producers: Vec<JoinHandle<()>> = input
        .into_iter()
        .enumerate()
        .map(|(index, (group, units))| {
            tokio::spawn(produce_task(
                index + 1,
                group,
                units,
                producer.clone(),
                shared.clone(),
                log.clone(),
            ))
        })
        .collect();

    let consumers: Vec<JoinHandle<()>> = (1..=settings.consumer_count)
        .map(|id| {
            tokio::spawn(consume_task(
                id,
                worker.clone(),
                shared.clone(),
                settings.clone(),
                log.clone(),
            ))
        })
        .collect();

    shared.drained().await;

    if shared.live_consumers.load(Ordering::SeqCst) == 0 && !shared.signal.is_raised() {
        // Nobody is left to drain the queue; producers blocked on a full
        // queue would never return.
        for handle in &producers {
            handle.abort();
        }
    }

    let task_failures: Vec<String> = join_all(producers.into_iter().chain(consumers))
        .await
        .into_iter()
        .filter_map(|result| result.err().map(|err| err.to_string()))
        .collect();

    if let Some(error) = shared
        .first_error
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
    {
        return Err(error);
    }
    if !task_failures.is_empty() {
        sink_error!(log, "Pipeline task failure: {}", task_failures.join("; "));
        return Err(PipelineError::Join(task_failures.join("; ")));
    }

    let Collected {
        mut groups,
        mut reports,
    } = {
        let mut collected = shared
            .collected
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(
            &mut *collected,
            Collected {
                groups: WorkGroups::new(),
                reports: Vec::new(),
            },
        )
    };
    groups.sort_by_key_order(&order);
    reports.sort_by_key(|report| {
        order
            .iter()
            .position(|key| *key == report.group)
            .unwrap_or(usize::MAX)
    });

    sink_debug!(log, "Pipeline finished with {} group(s)", groups.len());
    Ok(PipelineOutput {
        groups,
        report: RunReport { groups: reports },
    })
}

async fn produce_task<P, O>(
    id: usize,
    group: GroupKey,
    units: Vec<P::Unit>,
    producer: Arc<P>,
    shared: Arc<Shared<P::Output, O>>,
    log: Arc<dyn LogSink>,
) where
    P: Producer,
{
    let _registered = ProducerGuard {
        shared: &shared,
        id,
        log: &*log,
    };
    sink_debug!(log, "[producer {}] started for '{}'", id, group);

    let requested = units.len();
    let batch = producer.produce(&group, units).await;
    sink_debug!(
        log,
        "[producer {}] enqueueing {} unit(s) for '{}'",
        id,
        batch.units.len(),
        group
    );
    if !shared
        .put(PipelineItem {
            group: group.clone(),
            requested,
            batch,
        })
        .await
    {
        sink_warn!(log, "[producer {}] queue closed; batch for '{}' lost", id, group);
    }
}

async fn consume_task<W, I>(
    id: usize,
    worker: Arc<W>,
    shared: Arc<Shared<I, W::Output>>,
    settings: PipelineSettings,
    log: Arc<dyn LogSink>,
) where
    W: UnitWorker<Input = I>,
    I: Send + 'static,
{
    let _alive = ConsumerGuard(&shared);
    sink_debug!(log, "[consumer {}] started", id);

    loop {
        let changed = shared.changed.notified();
        if shared.is_finished() {
            sink_debug!(log, "[consumer {}] queue empty and producers done; exiting", id);
            break;
        }

        let item = tokio::select! {
            received = shared.rx.recv_async() => match received {
                Ok(item) => item,
                Err(_) => break,
            },
            _ = changed => continue,
            _ = tokio::time::sleep(settings.drain_timeout) => {
                sink_debug!(log, "[consumer {}] nothing to take yet; re-checking", id);
                continue;
            }
        };

        let _settle = SettleGuard(&shared);
        if shared.aborted.load(Ordering::SeqCst) {
            sink_debug!(log, "[consumer {}] run aborted; discarding '{}'", id, item.group);
            continue;
        }
        consume_item(id, item, &*worker, &shared, settings.unit_failures, &*log).await;
    }
}

async fn consume_item<W, I>(
    id: usize,
    item: PipelineItem<I>,
    worker: &W,
    shared: &Shared<I, W::Output>,
    policy: UnitFailurePolicy,
    log: &dyn LogSink,
) where
    W: UnitWorker<Input = I>,
{
    let PipelineItem {
        group,
        requested,
        batch,
    } = item;
    let Batch { units, dropped } = batch;
    let produced = units.len();
    sink_debug!(log, "[consumer {}] took '{}' with {} unit(s)", id, group, produced);

    let mut outputs = Vec::with_capacity(produced);
    let mut failures = Vec::new();
    for (position, unit) in units.into_iter().enumerate() {
        match worker.process(&group, position, unit).await {
            Ok(output) => outputs.push(output),
            Err(source) => match policy {
                UnitFailurePolicy::Skip => {
                    sink_warn!(
                        log,
                        "Skipping unit {} of '{}': {}",
                        position + 1,
                        group,
                        source
                    );
                    failures.push(UnitFailure {
                        position,
                        message: source.to_string(),
                    });
                }
                UnitFailurePolicy::Abort => {
                    sink_error!(
                        log,
                        "Unit {} of '{}' failed; aborting run: {}",
                        position + 1,
                        group,
                        source
                    );
                    shared.abort(PipelineError::Stage {
                        group,
                        position,
                        source,
                    });
                    return;
                }
            },
        }
    }

    sink_info!(log, "Finished '{}': {} item(s) done", group, outputs.len());
    shared.deliver(
        GroupReport {
            group,
            requested,
            produced,
            delivered: outputs.len(),
            dropped,
            failures,
        },
        outputs,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_reports_zero_exactly_once() {
        let registry = ProducerRegistry::new(3);
        let hits: Vec<bool> = (0..5).map(|_| registry.finish_one()).collect();
        assert_eq!(hits, vec![false, false, true, false, false]);
    }

    #[test]
    fn validation_rejects_empty_input_and_zero_consumers() {
        let empty: WorkGroups<u8> = WorkGroups::new();
        assert!(matches!(
            validate_input(&empty, &PipelineSettings::default()),
            Err(PipelineError::EmptyInput)
        ));

        let mut groups = WorkGroups::new();
        groups.insert(GroupKey::new("a").unwrap(), vec![1u8]);
        let settings = PipelineSettings {
            consumer_count: 0,
            ..PipelineSettings::default()
        };
        assert!(matches!(
            validate_input(&groups, &settings),
            Err(PipelineError::InvalidSettings(_))
        ));
    }

    #[test]
    fn validation_rejects_a_zero_drain_timeout() {
        let mut groups = WorkGroups::new();
        groups.insert(GroupKey::new("a").unwrap(), vec![1u8]);
        let settings = PipelineSettings {
            drain_timeout: Duration::ZERO,
            ..PipelineSettings::default()
        };
        match validate_input(&groups, &settings) {
            Err(PipelineError::InvalidSettings(message)) => {
                assert!(message.contains("drain_timeout"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
