use std::collections::{HashMap, VecDeque};
use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::budget::BudgetGuard;
use crate::cache::ResultCache;
use crate::clock::Clock;
use crate::errors::{GatewayError, GatewayResult};
use crate::stats::{GatewayStats, StatsCounters};
use crate::throttle::{Lane, Throttle};

pub trait QueueKey: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static {
    fn lane(&self) -> Lane;
}

type Dispatch<V> = Box<dyn FnOnce() -> BoxFuture<'static, GatewayResult<V>> + Send>;
type Waiter<V> = oneshot::Sender<GatewayResult<V>>;

struct PendingRequest<K, V> {
    key: K,
    dispatch: Dispatch<V>,
}

struct QueueState<K, V> {
    pending: VecDeque<PendingRequest<K, V>>,
    in_flight: HashMap<K, Vec<Waiter<V>>>,
    cache: ResultCache<K, V>,
    throttles: HashMap<Lane, Throttle>,
    counters: StatsCounters,
    draining: bool,
}

struct Shared<K, V> {
    name: &'static str,
    state: Mutex<QueueState<K, V>>,
    budget: BudgetGuard,
    clock: Arc<dyn Clock>,
}

pub struct QueueSettings {
    pub name: &'static str,
    pub lanes: Vec<(Lane, Duration)>,
    pub budget: u32,
    pub cache_ttl: Option<Duration>,
}

/// FIFO coalescer in front of one metered provider.
///
/// Every distinct key costs at most one provider call while it is in flight;
/// later submissions for the same key wait on that call. Successful results
/// are cached, failures are delivered to every waiter and forgotten.
///
/// All lanes share one FIFO, so a request waiting out its lane's throttle
/// also holds back every request queued behind it, whatever their lane.
pub struct RequestQueue<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Clone for RequestQueue<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> RequestQueue<K, V>
where
    K: QueueKey,
    V: Clone + Send + 'static,
{
    pub fn new(settings: QueueSettings, clock: Arc<dyn Clock>) -> Self {
        let throttles = settings
            .lanes
            .into_iter()
            .map(|(lane, interval)| (lane, Throttle::new(interval)))
            .collect();
        Self {
            shared: Arc::new(Shared {
                name: settings.name,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    in_flight: HashMap::new(),
                    cache: ResultCache::new(settings.cache_ttl),
                    throttles,
                    counters: StatsCounters::default(),
                    draining: false,
                }),
                budget: BudgetGuard::new(settings.budget),
                clock,
            }),
        }
    }

    pub async fn submit<F, Fut>(&self, key: K, dispatch: F) -> GatewayResult<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = GatewayResult<V>> + Send + 'static,
    {
        let receiver = match self.admit(key, Box::new(move || dispatch().boxed())) {
            Admission::Ready(result) => return result,
            Admission::Waiting(receiver) => receiver,
        };
        receiver.await.map_err(|_| GatewayError::Closed)?
    }

    pub fn cached(&self, key: &K) -> Option<V> {
        let now = self.shared.clock.now();
        self.shared.state.lock().cache.lookup(key, now)
    }

    pub fn invalidate(&self, key: &K) -> bool {
        let removed = self.shared.state.lock().cache.invalidate(key);
        if removed {
            debug!(gateway = self.shared.name, %key, "cache entry invalidated");
        }
        removed
    }

    pub fn clear_cache(&self) -> usize {
        let removed = self.shared.state.lock().cache.clear();
        debug!(gateway = self.shared.name, removed, "cache cleared");
        removed
    }

    pub fn budget(&self) -> &BudgetGuard {
        &self.shared.budget
    }

    pub fn stats(&self) -> GatewayStats {
        let state = self.shared.state.lock();
        let counters = &state.counters;
        GatewayStats {
            gateway: self.shared.name,
            cache_hits: counters.cache_hits,
            cache_misses: counters.cache_misses,
            coalesced: counters.coalesced,
            dispatched: counters.dispatched,
            provider_failures: counters.provider_failures,
            quota_rejections: counters.quota_rejections,
            cached_entries: state.cache.len(),
            pending: state.pending.len(),
            draining: state.draining,
            budget_used: self.shared.budget.used(),
            budget_cap: self.shared.budget.cap(),
            last_dispatch_at: counters.last_dispatch_at,
        }
    }

    fn admit(&self, key: K, dispatch: Dispatch<V>) -> Admission<V> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        let now = shared.clock.now();

        if let Some(value) = state.cache.lookup(&key, now) {
            state.counters.cache_hits += 1;
            trace!(gateway = shared.name, %key, "cache hit");
            return Admission::Ready(Ok(value));
        }

        let (sender, receiver) = oneshot::channel();
        if let Some(waiters) = state.in_flight.get_mut(&key) {
            waiters.push(sender);
            state.counters.coalesced += 1;
            debug!(gateway = shared.name, %key, "attached to in-flight request");
            return Admission::Waiting(receiver);
        }

        state.counters.cache_misses += 1;
        if shared.budget.is_exhausted() {
            state.counters.quota_rejections += 1;
            return Admission::Ready(Err(GatewayError::QuotaExceeded {
                limit: shared.budget.cap(),
            }));
        }

        state.in_flight.insert(key.clone(), vec![sender]);
        state.pending.push_back(PendingRequest { key, dispatch });
        if !state.draining {
            state.draining = true;
            let drainer = Arc::clone(shared);
            tokio::spawn(drainer.drain());
        }
        Admission::Waiting(receiver)
    }
}

enum Admission<V> {
    Ready(GatewayResult<V>),
    Waiting(oneshot::Receiver<GatewayResult<V>>),
}

impl<K, V> Shared<K, V>
where
    K: QueueKey,
    V: Clone + Send + 'static,
{
    async fn drain(self: Arc<Self>) {
        debug!(gateway = self.name, "drain loop started");
        loop {
            let request = {
                let mut state = self.state.lock();
                match state.pending.pop_front() {
                    Some(request) => request,
                    None => {
                        state.draining = false;
                        debug!(gateway = self.name, "drain loop idle");
                        return;
                    }
                }
            };
            let key = request.key.clone();
            let result = self.dispatch(request).await;
            self.complete(key, result);
        }
    }

    async fn dispatch(&self, request: PendingRequest<K, V>) -> GatewayResult<V> {
        let PendingRequest { key, dispatch } = request;
        let lane = key.lane();

        if !self.budget.try_consume() {
            self.state.lock().counters.quota_rejections += 1;
            return Err(GatewayError::QuotaExceeded {
                limit: self.budget.cap(),
            });
        }

        let delay = self
            .state
            .lock()
            .throttles
            .get(&lane)
            .map(|throttle| throttle.next_allowed_dispatch_delay(self.clock.now()))
            .unwrap_or(Duration::ZERO);
        if !delay.is_zero() {
            trace!(
                gateway = self.name,
                lane = lane.as_str(),
                delay_ms = delay.as_millis() as u64,
                "throttling dispatch"
            );
            self.clock.sleep(delay).await;
        }

        {
            let mut state = self.state.lock();
            let now = self.clock.now();
            if let Some(throttle) = state.throttles.get_mut(&lane) {
                throttle.mark_dispatched(now);
            }
            state.counters.record_dispatch();
        }
        debug!(
            gateway = self.name,
            lane = lane.as_str(),
            %key,
            used = self.budget.used(),
            cap = self.budget.cap(),
            "dispatching provider call"
        );

        AssertUnwindSafe(async move { dispatch().await })
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(GatewayError::provider(lane.as_str(), "provider call panicked")))
    }

    fn complete(&self, key: K, result: GatewayResult<V>) {
        let waiters = {
            let mut state = self.state.lock();
            match &result {
                Ok(value) => {
                    let now = self.clock.now();
                    state.cache.store(key.clone(), value.clone(), now);
                }
                Err(GatewayError::QuotaExceeded { .. }) => {}
                Err(err) => {
                    state.counters.provider_failures += 1;
                    warn!(gateway = self.name, %key, ?err, "provider call failed");
                }
            }
            state.in_flight.remove(&key).unwrap_or_default()
        };

        trace!(gateway = self.name, %key, waiters = waiters.len(), "resolving waiters");
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::future::join_all;

    use super::*;
    use crate::clock::ManualClock;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct TestKey(&'static str);

    impl Display for TestKey {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl QueueKey for TestKey {
        fn lane(&self) -> Lane {
            Lane::Geocode
        }
    }

    fn queue(budget: u32) -> RequestQueue<TestKey, String> {
        RequestQueue::new(
            QueueSettings {
                name: "test",
                lanes: vec![(Lane::Geocode, Duration::from_millis(100))],
                budget,
                cache_ttl: None,
            },
            Arc::new(ManualClock::new()),
        )
    }

    fn recording(
        log: &Arc<Mutex<Vec<&'static str>>>,
        key: &'static str,
    ) -> impl FnOnce() -> BoxFuture<'static, GatewayResult<String>> + Send + 'static {
        let log = Arc::clone(log);
        move || {
            async move {
                log.lock().push(key);
                if key == "fail" {
                    Err(GatewayError::provider("test", "boom"))
                } else {
                    Ok(key.to_uppercase())
                }
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn drains_in_submission_order() {
        let queue = queue(10);
        let log = Arc::new(Mutex::new(Vec::new()));
        let results = join_all(["a", "b", "c"].map(|key| {
            queue.submit(TestKey(key), recording(&log, key))
        }))
        .await;

        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!(results[1], Ok("B".to_string()));
        assert!(!queue.stats().draining);
    }

    #[tokio::test]
    async fn identical_keys_share_one_dispatch() {
        let queue = queue(10);
        let calls = Arc::new(AtomicUsize::new(0));
        let submit = || {
            let calls = Arc::clone(&calls);
            queue.submit(TestKey("same"), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("value".to_string())
            })
        };

        let results = join_all(vec![submit(), submit(), submit()]).await;

        assert!(results.iter().all(|r| r == &Ok("value".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.budget().used(), 1);
        assert_eq!(queue.stats().coalesced, 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached_and_do_not_stall_the_queue() {
        let queue = queue(10);
        let log = Arc::new(Mutex::new(Vec::new()));
        let results = join_all(["ok", "fail", "next"].map(|key| {
            queue.submit(TestKey(key), recording(&log, key))
        }))
        .await;

        assert_eq!(results[0], Ok("OK".to_string()));
        assert!(matches!(results[1], Err(GatewayError::Provider { .. })));
        assert_eq!(results[2], Ok("NEXT".to_string()));
        assert!(queue.cached(&TestKey("fail")).is_none());
        assert_eq!(queue.cached(&TestKey("next")), Some("NEXT".to_string()));
        assert_eq!(queue.stats().provider_failures, 1);
    }

    #[tokio::test]
    async fn panicking_provider_resolves_as_provider_error() {
        let queue = queue(10);
        let result = queue
            .submit(TestKey("panic"), || async {
                if true {
                    panic!("provider blew up");
                }
                Ok(String::new())
            })
            .await;
        assert!(matches!(result, Err(GatewayError::Provider { .. })));

        let log = Arc::new(Mutex::new(Vec::new()));
        let after = queue.submit(TestKey("after"), recording(&log, "after")).await;
        assert_eq!(after, Ok("AFTER".to_string()));
    }

    #[tokio::test]
    async fn exhausted_budget_rejects_without_dispatch() {
        let queue = queue(1);
        let log = Arc::new(Mutex::new(Vec::new()));
        let results = join_all(["a", "b"].map(|key| {
            queue.submit(TestKey(key), recording(&log, key))
        }))
        .await;

        assert_eq!(results[0], Ok("A".to_string()));
        assert_eq!(results[1], Err(GatewayError::QuotaExceeded { limit: 1 }));
        assert_eq!(*log.lock(), vec!["a"]);

        let late = queue.submit(TestKey("c"), recording(&log, "c")).await;
        assert_eq!(late, Err(GatewayError::QuotaExceeded { limit: 1 }));
        assert_eq!(queue.stats().quota_rejections, 2);
        // Cached answers are still served after the budget runs out.
        assert_eq!(queue.submit(TestKey("a"), recording(&log, "a")).await, Ok("A".to_string()));
    }
}
