//! Mutation runner.
//!
//! Wraps a write, tracks its lifecycle and, on success, invalidates the cached
//! queries declared for its [`MutationKind`] before returning to the caller.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::cache::{InvalidationRegistry, InvalidationTarget, MutationKind, QueryCache, mutex_lock};

const SOURCE: &str = "mutation";
const METRIC_MUTATION_TOTAL: &str = "fequery_mutation_total";

type MutateFn<I, O, E> = Box<dyn Fn(I) -> BoxFuture<'static, Result<O, E>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error,
}

/// State of the most recently started invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationState<O, E> {
    pub status: MutationStatus,
    pub data: Option<O>,
    pub error: Option<E>,
}

impl<O, E> MutationState<O, E> {
    fn with_status(status: MutationStatus) -> Self {
        Self {
            status,
            data: None,
            error: None,
        }
    }
}

impl<O, E> Default for MutationState<O, E> {
    fn default() -> Self {
        Self::with_status(MutationStatus::Idle)
    }
}

struct Tracked<O, E> {
    invocation: u64,
    state: MutationState<O, E>,
}

/// Runs one kind of write and refreshes what it makes stale.
///
/// Invocations are independent; [`state`](Self::state) follows the one that
/// started last, so an earlier invocation finishing late never overwrites it.
pub struct MutationRunner<I, O, E> {
    kind: MutationKind,
    cache: QueryCache,
    registry: Arc<InvalidationRegistry>,
    extra_targets: Vec<InvalidationTarget>,
    mutate: MutateFn<I, O, E>,
    invocations: AtomicU64,
    tracked: Mutex<Tracked<O, E>>,
}

impl<I, O, E> MutationRunner<I, O, E>
where
    I: Send + 'static,
    O: Clone + Send + 'static,
    E: Clone + fmt::Display + Send + 'static,
{
    pub fn new<F, Fut>(
        kind: impl Into<MutationKind>,
        cache: QueryCache,
        registry: Arc<InvalidationRegistry>,
        mutate: F,
    ) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
    {
        Self {
            kind: kind.into(),
            cache,
            registry,
            extra_targets: Vec::new(),
            mutate: Box::new(move |input| mutate(input).boxed()),
            invocations: AtomicU64::new(0),
            tracked: Mutex::new(Tracked {
                invocation: 0,
                state: MutationState::default(),
            }),
        }
    }

    /// Also invalidate `target` on success, beyond what the registry declares.
    #[must_use]
    pub fn invalidates(mut self, target: InvalidationTarget) -> Self {
        self.extra_targets.push(target);
        self
    }

    pub fn kind(&self) -> &MutationKind {
        &self.kind
    }

    pub fn state(&self) -> MutationState<O, E> {
        mutex_lock(&self.tracked, SOURCE, "state").state.clone()
    }

    /// Every target invalidated after a successful run.
    pub fn targets(&self) -> Vec<InvalidationTarget> {
        let mut targets: Vec<_> = self.registry.targets_for(&self.kind).into_iter().collect();
        for target in &self.extra_targets {
            if !targets.contains(target) {
                targets.push(target.clone());
            }
        }
        targets
    }

    /// Execute the write.
    ///
    /// On success the declared targets are invalidated before this returns.
    /// On failure nothing is invalidated and the error goes back to the
    /// caller.
    pub async fn run(&self, input: I) -> Result<O, E> {
        let invocation = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(invocation, MutationState::with_status(MutationStatus::Pending));
        debug!(kind = %self.kind, invocation, "Mutation started");

        let result = (self.mutate)(input).await;
        match &result {
            Ok(output) => {
                let invalidated: usize = self
                    .targets()
                    .iter()
                    .map(|target| self.cache.invalidate_matching(target))
                    .sum();
                counter!(
                    METRIC_MUTATION_TOTAL,
                    "kind" => self.kind.to_string(),
                    "outcome" => "success"
                )
                .increment(1);
                info!(kind = %self.kind, invocation, invalidated, "Mutation succeeded");
                self.record(
                    invocation,
                    MutationState {
                        status: MutationStatus::Success,
                        data: Some(output.clone()),
                        error: None,
                    },
                );
            }
            Err(err) => {
                counter!(
                    METRIC_MUTATION_TOTAL,
                    "kind" => self.kind.to_string(),
                    "outcome" => "error"
                )
                .increment(1);
                warn!(kind = %self.kind, invocation, error = %err, "Mutation failed");
                self.record(
                    invocation,
                    MutationState {
                        status: MutationStatus::Error,
                        data: None,
                        error: Some(err.clone()),
                    },
                );
            }
        }
        result
    }

    fn record(&self, invocation: u64, state: MutationState<O, E>) {
        let mut tracked = mutex_lock(&self.tracked, SOURCE, "record");
        if invocation >= tracked.invocation {
            tracked.invocation = invocation;
            tracked.state = state;
        }
    }
}

impl<I, O, E> fmt::Debug for MutationRunner<I, O, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationRunner")
            .field("kind", &self.kind)
            .field("extra_targets", &self.extra_targets)
            .finish_non_exhaustive()
    }
}
