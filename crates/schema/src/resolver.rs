//! Schema resolver: freshness, retry, and fetch coalescing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use graphref_registry::{FetchError, RegistryClient, SchemaSnapshot};
use graphref_types::GraphRef;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::{Freshness, SchemaCache};

/// What the resolver can tell a caller about a schema right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaStatus {
    /// A usable snapshot. May be stale; a refresh runs in the background.
    Ready(SchemaSnapshot),
    /// Nothing cached yet; a fetch is in flight or scheduled.
    Pending,
    /// Nothing cached and fetching has failed terminally (bad credentials,
    /// unknown graph ref) or exhausted its retries.
    Unavailable(FetchError),
}

impl SchemaStatus {
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Completion message delivered from a fetch task back to the main loop.
#[derive(Debug)]
pub enum ResolverEvent {
    FetchCompleted {
        graph_ref: GraphRef,
        result: Result<SchemaSnapshot, FetchError>,
    },
}

/// Tunables for refresh and retry behavior.
#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    /// How long a snapshot counts as fresh.
    pub ttl: Duration,
    /// First retry delay; later retries double it.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Consecutive failures tolerated before giving up until `retry_now`.
    pub max_attempts: u32,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

impl RefreshPolicy {
    /// Delay before retry number `attempt` (1-based): 1s, 2s, 4s, ... capped.
    fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.initial_backoff.saturating_mul(1_u32 << exp);
        delay.min(self.max_backoff)
    }
}

#[derive(Debug, Default)]
struct FetchState {
    in_flight: bool,
    attempts: u32,
    last_error: Option<FetchError>,
    /// Terminal: no more automatic retries until config changes or
    /// `retry_now` is called.
    gave_up: bool,
}

/// Keeps schema snapshots synchronized with the registry.
///
/// Owned by the server's main loop. Fetches run as tasks on the provided
/// runtime handle; each completion comes back over `events` and must be fed
/// to [`complete`](Self::complete).
pub struct SchemaResolver<C: RegistryClient> {
    client: Arc<C>,
    cache: SchemaCache,
    policy: RefreshPolicy,
    states: HashMap<GraphRef, FetchState>,
    tasks: HashMap<GraphRef, JoinHandle<()>>,
    runtime: tokio::runtime::Handle,
    events: Sender<ResolverEvent>,
}

impl<C: RegistryClient> SchemaResolver<C> {
    pub fn new(
        client: C,
        cache: SchemaCache,
        policy: RefreshPolicy,
        runtime: tokio::runtime::Handle,
        events: Sender<ResolverEvent>,
    ) -> Self {
        Self {
            client: Arc::new(client),
            cache,
            policy,
            states: HashMap::new(),
            tasks: HashMap::new(),
            runtime,
            events,
        }
    }

    /// Current status for `graph_ref`.
    ///
    /// Never blocks: a cached snapshot (fresh or stale) is returned
    /// immediately, and any needed fetch is started in the background. At
    /// most one fetch per graph ref is ever in flight.
    #[instrument(skip(self))]
    pub fn resolve(&mut self, graph_ref: &GraphRef) -> SchemaStatus {
        let ttl = self.effective_ttl(graph_ref);

        if let Some(hit) = self.cache.get(graph_ref, ttl) {
            if hit.freshness == Freshness::Stale && !self.gave_up(graph_ref) {
                self.spawn_fetch(graph_ref, None);
            }
            return SchemaStatus::Ready(hit.snapshot);
        }

        let state = self.states.entry(graph_ref.clone()).or_default();
        if state.gave_up {
            let error = state
                .last_error
                .clone()
                .unwrap_or_else(|| FetchError::Network("fetch gave up".to_string()));
            return SchemaStatus::Unavailable(error);
        }

        self.spawn_fetch(graph_ref, None);
        SchemaStatus::Pending
    }

    /// Feed a fetch completion back into the resolver.
    ///
    /// On success the snapshot is installed (monotonically) in the cache;
    /// on retryable failure the next attempt is scheduled with backoff.
    /// Returns `true` when a new snapshot was installed, so the caller
    /// knows to re-analyze affected documents.
    pub fn complete(
        &mut self,
        graph_ref: &GraphRef,
        result: Result<SchemaSnapshot, FetchError>,
    ) -> bool {
        self.tasks.remove(graph_ref);
        let state = self.states.entry(graph_ref.clone()).or_default();
        state.in_flight = false;

        match result {
            Ok(snapshot) => {
                state.attempts = 0;
                state.last_error = None;
                state.gave_up = false;
                let installed = self.cache.put(snapshot);
                if installed {
                    info!(graph_ref = %graph_ref, "installed schema snapshot");
                }
                installed
            }
            Err(error) => {
                state.attempts += 1;
                state.last_error = Some(error.clone());

                if !error.is_retryable() {
                    warn!(graph_ref = %graph_ref, error = %error, "fetch failed terminally");
                    state.gave_up = true;
                } else if state.attempts >= self.policy.max_attempts {
                    warn!(
                        graph_ref = %graph_ref,
                        attempts = state.attempts,
                        "fetch retries exhausted"
                    );
                    state.gave_up = true;
                } else {
                    let delay = self.policy.backoff_for(state.attempts);
                    debug!(
                        graph_ref = %graph_ref,
                        attempt = state.attempts,
                        delay_ms = delay.as_millis() as u64,
                        "scheduling fetch retry"
                    );
                    self.spawn_fetch(graph_ref, Some(delay));
                }
                false
            }
        }
    }

    /// Forget failure state and fetch immediately. Used when the project
    /// config changes (new credentials, new variant) and on explicit user
    /// action.
    pub fn retry_now(&mut self, graph_ref: &GraphRef) {
        if let Some(state) = self.states.get_mut(graph_ref) {
            state.attempts = 0;
            state.gave_up = false;
        }
        self.spawn_fetch(graph_ref, None);
    }

    /// Mark the cached snapshot stale; the next `resolve` refreshes it.
    pub fn invalidate(&mut self, graph_ref: &GraphRef) {
        self.cache.invalidate(graph_ref);
    }

    /// Drop all state for a graph ref (project closed or re-pointed).
    pub fn forget(&mut self, graph_ref: &GraphRef) {
        if let Some(task) = self.tasks.remove(graph_ref) {
            task.abort();
        }
        self.states.remove(graph_ref);
        self.cache.remove(graph_ref);
    }

    /// Abort all in-flight fetches.
    pub fn shutdown(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
        self.states.clear();
    }

    /// Direct cache access (tests, status commands).
    #[must_use]
    pub fn cache(&mut self) -> &mut SchemaCache {
        &mut self.cache
    }

    /// The registry client fetches go through.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    fn gave_up(&self, graph_ref: &GraphRef) -> bool {
        self.states.get(graph_ref).is_some_and(|s| s.gave_up)
    }

    /// TTL with the registry's poll-interval hint applied as a floor.
    fn effective_ttl(&mut self, graph_ref: &GraphRef) -> Duration {
        let hint = self
            .cache
            .get(graph_ref, Duration::MAX)
            .and_then(|hit| hit.snapshot.min_poll_interval());
        match hint {
            Some(min) => self.policy.ttl.max(min),
            None => self.policy.ttl,
        }
    }

    fn spawn_fetch(&mut self, graph_ref: &GraphRef, delay: Option<Duration>) {
        let state = self.states.entry(graph_ref.clone()).or_default();
        if state.in_flight {
            // Coalesced: someone is already fetching this graph ref.
            return;
        }
        state.in_flight = true;

        let client = Arc::clone(&self.client);
        let events = self.events.clone();
        let graph_ref_task = graph_ref.clone();
        let task = self.runtime.spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let result = client.fetch_schema(&graph_ref_task).await;
            // The receiver disappearing means the server is shutting down.
            let _ = events.send(ResolverEvent::FetchCompleted {
                graph_ref: graph_ref_task,
                result,
            });
        });
        self.tasks.insert(graph_ref.clone(), task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::SystemTime;

    use crossbeam_channel::Receiver;

    /// Scripted registry used to drive the resolver without a network.
    struct ScriptedRegistry {
        fetches: Arc<AtomicU32>,
        response: Result<String, FetchError>,
    }

    impl RegistryClient for ScriptedRegistry {
        fn fetch_schema(
            &self,
            graph_ref: &GraphRef,
        ) -> impl std::future::Future<Output = Result<SchemaSnapshot, FetchError>> + Send {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let graph_ref = graph_ref.clone();
            let response = self.response.clone();
            async move {
                response.map(|sdl| {
                    let hash = graphref_registry::content_hash(&sdl);
                    SchemaSnapshot::new(graph_ref, sdl, hash, SystemTime::now())
                })
            }
        }
    }

    struct Harness {
        resolver: SchemaResolver<ScriptedRegistry>,
        events: Receiver<ResolverEvent>,
        fetches: Arc<AtomicU32>,
        _runtime: tokio::runtime::Runtime,
    }

    fn harness(response: Result<String, FetchError>) -> Harness {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();
        let fetches = Arc::new(AtomicU32::new(0));
        let (tx, rx) = crossbeam_channel::unbounded();
        let client = ScriptedRegistry {
            fetches: Arc::clone(&fetches),
            response,
        };
        let resolver = SchemaResolver::new(
            client,
            SchemaCache::in_memory(),
            RefreshPolicy::default(),
            runtime.handle().clone(),
            tx,
        );
        Harness {
            resolver,
            events: rx,
            fetches,
            _runtime: runtime,
        }
    }

    fn graph_ref() -> GraphRef {
        "my-service@current".parse().unwrap()
    }

    fn recv(events: &Receiver<ResolverEvent>) -> (GraphRef, Result<SchemaSnapshot, FetchError>) {
        match events.recv_timeout(Duration::from_secs(5)).unwrap() {
            ResolverEvent::FetchCompleted { graph_ref, result } => (graph_ref, result),
        }
    }

    #[test]
    fn test_resolve_pending_then_ready() {
        let mut h = harness(Ok("type Query { a: Int }".to_string()));
        assert_eq!(h.resolver.resolve(&graph_ref()), SchemaStatus::Pending);

        let (graph_ref_done, result) = recv(&h.events);
        assert!(h.resolver.complete(&graph_ref_done, result));

        match h.resolver.resolve(&graph_ref()) {
            SchemaStatus::Ready(snapshot) => {
                assert!(snapshot.schema().types.contains_key("Query"));
            }
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn test_concurrent_resolves_share_one_fetch() {
        let mut h = harness(Ok("type Query { a: Int }".to_string()));
        for _ in 0..5 {
            assert_eq!(h.resolver.resolve(&graph_ref()), SchemaStatus::Pending);
        }

        let (graph_ref_done, result) = recv(&h.events);
        h.resolver.complete(&graph_ref_done, result);

        assert_eq!(h.fetches.load(Ordering::SeqCst), 1);
        assert!(h.resolver.resolve(&graph_ref()).is_ready());
        // Still exactly one fetch: the fresh snapshot needs no refresh.
        assert_eq!(h.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unauthorized_is_terminal() {
        let mut h = harness(Err(FetchError::Unauthorized));
        assert_eq!(h.resolver.resolve(&graph_ref()), SchemaStatus::Pending);

        let (graph_ref_done, result) = recv(&h.events);
        assert!(!h.resolver.complete(&graph_ref_done, result));

        assert_eq!(
            h.resolver.resolve(&graph_ref()),
            SchemaStatus::Unavailable(FetchError::Unauthorized)
        );
        // No retry was spawned.
        assert_eq!(h.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_now_clears_terminal_state() {
        let mut h = harness(Err(FetchError::Unauthorized));
        h.resolver.resolve(&graph_ref());
        let (graph_ref_done, result) = recv(&h.events);
        h.resolver.complete(&graph_ref_done, result);
        assert!(matches!(
            h.resolver.resolve(&graph_ref()),
            SchemaStatus::Unavailable(_)
        ));

        h.resolver.retry_now(&graph_ref());
        let (_, result) = recv(&h.events);
        assert!(result.is_err());
        assert_eq!(h.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_retryable_error_schedules_backoff() {
        let mut h = harness(Err(FetchError::Network("connection refused".into())));
        h.resolver.resolve(&graph_ref());
        let (graph_ref_done, result) = recv(&h.events);
        h.resolver.complete(&graph_ref_done, result);

        // A retry is in flight (delayed), so resolve still reports Pending
        // without spawning anything new.
        assert_eq!(h.resolver.resolve(&graph_ref()), SchemaStatus::Pending);

        // First retry fires after ~1s of backoff.
        let (_, result) = recv(&h.events);
        assert!(result.is_err());
        assert_eq!(h.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_retries_exhaust_to_unavailable() {
        let mut h = harness(Err(FetchError::Network("down".into())));
        let policy = RefreshPolicy {
            initial_backoff: Duration::from_millis(1),
            max_attempts: 2,
            ..RefreshPolicy::default()
        };
        h.resolver.policy = policy;

        h.resolver.resolve(&graph_ref());
        for _ in 0..2 {
            let (graph_ref_done, result) = recv(&h.events);
            h.resolver.complete(&graph_ref_done, result);
        }

        assert!(matches!(
            h.resolver.resolve(&graph_ref()),
            SchemaStatus::Unavailable(FetchError::Network(_))
        ));
        assert_eq!(h.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stale_snapshot_serves_while_refreshing() {
        let mut h = harness(Ok("type Query { b: Int }".to_string()));
        let old = SchemaSnapshot::new(
            graph_ref(),
            "type Query { a: Int }",
            "old",
            SystemTime::now() - Duration::from_secs(3600),
        );
        h.resolver.cache().put(old);

        // Stale snapshot is still Ready, and a refresh starts.
        match h.resolver.resolve(&graph_ref()) {
            SchemaStatus::Ready(snapshot) => assert_eq!(snapshot.hash().as_ref(), "old"),
            other => panic!("expected Ready, got {other:?}"),
        }

        let (graph_ref_done, result) = recv(&h.events);
        assert!(h.resolver.complete(&graph_ref_done, result));

        match h.resolver.resolve(&graph_ref()) {
            SchemaStatus::Ready(snapshot) => assert_ne!(snapshot.hash().as_ref(), "old"),
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn test_backoff_progression() {
        let policy = RefreshPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_for(10), Duration::from_secs(60));
    }
}
