use std::{
    fmt,
    future::Future,
    mem,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, AtomicU8, Ordering},
        Arc,
    },
    thread::JoinHandle as ThreadJoinHandle,
};

use parking_lot::Mutex;
use tokio::runtime;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::{observer::Observer, FlowError, SharedError};

/// Demand value meaning "deliver everything", as requested by plain lambda
/// subscribers.
pub const UNBOUNDED: u64 = u64::MAX;

/// A trait for types that can be subscribed to, allowing consumers to receive
/// values emitted by a stream.
pub trait Subscribeable {
    /// The type of items emitted by the stream.
    type ObsType;

    /// Subscribes to the stream and specifies how to handle emitted values.
    ///
    /// The returned `Subscription` is the only way to stop delivery, request
    /// more values from a flowable, or await background work started by the
    /// subscription.
    fn subscribe(&mut self, s: Subscriber<Self::ObsType>) -> Subscription;
}

/// A trait for types that can be unsubscribed, allowing the clean release of resources
/// associated with a subscription.
pub trait Unsubscribeable {
    /// Unsubscribes from a subscription and releases associated resources.
    ///
    /// The value is consumed. Clones of a `Subscription` observe the cancellation.
    fn unsubscribe(self);
}

type NextFn<T> = Box<dyn FnMut(T) + Send>;
type CompleteFn = Box<dyn FnMut() + Send>;
type ErrorFn = Box<dyn FnMut(SharedError) + Send>;
type DemandFn = Arc<dyn Fn(u64) + Send + Sync>;

/// A type that acts as an observer, allowing users to handle emitted values, errors,
/// and completion when subscribing to an `Observable` or `Flowable`.
///
/// Users can create a `Subscriber` instance using the `new` method and provide
/// custom functions to handle the `next`, `error`, and `complete` events.
pub struct Subscriber<NextFnType> {
    next_fn: NextFn<NextFnType>,
    complete_fn: Option<CompleteFn>,
    error_fn: Option<ErrorFn>,
    completed: bool,
    errored: bool,
    initial_request: u64,
    core: Option<Arc<SubscriptionCore>>,
}

impl<NextFnType> Subscriber<NextFnType> {
    /// Creates a new `Subscriber` instance with custom handling functions for emitted
    /// values, errors, and completion.
    pub fn new(
        next_fn: impl FnMut(NextFnType) + 'static + Send,
        error_fn: impl FnMut(SharedError) + 'static + Send,
        complete_fn: impl FnMut() + 'static + Send,
    ) -> Self {
        Subscriber {
            next_fn: Box::new(next_fn),
            complete_fn: Some(Box::new(complete_fn)),
            error_fn: Some(Box::new(error_fn)),
            completed: false,
            errored: false,
            initial_request: UNBOUNDED,
            core: None,
        }
    }

    /// Create a new Subscriber with the provided `next` function.
    ///
    /// Errors reaching a subscriber without an error function are logged and
    /// otherwise ignored.
    pub fn on_next(next_fn: impl FnMut(NextFnType) + 'static + Send) -> Self {
        Subscriber {
            next_fn: Box::new(next_fn),
            complete_fn: None,
            error_fn: None,
            completed: false,
            errored: false,
            initial_request: UNBOUNDED,
            core: None,
        }
    }

    /// Set the completion function for the Subscriber.
    pub fn on_complete(&mut self, complete_fn: impl FnMut() + 'static + Send) {
        self.complete_fn = Some(Box::new(complete_fn));
    }

    /// Set the error-handling function for the Subscriber.
    pub fn on_error(&mut self, error_fn: impl FnMut(SharedError) + 'static + Send) {
        self.error_fn = Some(Box::new(error_fn));
    }

    /// Sets how many values a flowable may deliver before the consumer asks for
    /// more with [`Subscription::request`].
    ///
    /// Defaults to [`UNBOUNDED`]. Plain observables ignore demand.
    #[must_use]
    pub fn with_request(mut self, n: u64) -> Self {
        self.initial_request = n;
        self
    }

    /// Returns `true` once the subscription this subscriber belongs to was
    /// cancelled. Producers check it between emissions to stop early.
    ///
    /// ```text
    /// Observable::new(|mut subscriber| {
    ///     for i in 0.. {
    ///         if subscriber.is_cancelled() { break; }
    ///         subscriber.next(i);
    ///     }
    ///     // ...
    /// });
    /// ```
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.core.as_ref().is_some_and(|c| c.is_cancelled())
    }

    pub(crate) fn initial_request(&self) -> u64 {
        self.initial_request
    }

    // Keeps a core attached by an outer stage so cancellation stays shared.
    pub(crate) fn ensure_core(&mut self) -> Arc<SubscriptionCore> {
        Arc::clone(self.core.get_or_insert_with(SubscriptionCore::new))
    }

    pub(crate) fn attach(&mut self, core: Arc<SubscriptionCore>) {
        self.core = Some(core);
    }

    fn is_finished(&self) -> bool {
        self.completed || self.errored || self.is_cancelled()
    }
}

impl<T> Observer for Subscriber<T> {
    type NextFnType = T;

    fn next(&mut self, v: Self::NextFnType) {
        if self.is_finished() {
            return;
        }
        (self.next_fn)(v);
    }

    fn complete(&mut self) {
        if self.is_finished() {
            return;
        }
        self.completed = true;
        if let Some(cfn) = &mut self.complete_fn {
            (cfn)();
        }
        if let Some(core) = &self.core {
            core.terminate();
        }
    }

    fn error(&mut self, observable_error: SharedError) {
        if self.is_finished() {
            return;
        }
        self.errored = true;
        match &mut self.error_fn {
            Some(efn) => (efn)(observable_error),
            None => warn!(error = %observable_error, "stream error reached a subscriber without an error handler"),
        }
        if let Some(core) = &self.core {
            core.terminate();
        }
    }
}

/// Unique subscription identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SubscriptionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Values may still be delivered.
    Active,
    /// The stream completed or errored. Cancelling is a no-op.
    Completed,
    /// The subscription was cancelled. Nothing is delivered anymore.
    Cancelled,
}

const ACTIVE: u8 = 0;
const COMPLETED: u8 = 1;
const CANCELLED: u8 = 2;

/// Shared state behind every clone of a `Subscription` and the `Subscriber`
/// it was created for.
pub(crate) struct SubscriptionCore {
    id: SubscriptionId,
    state: AtomicU8,
    teardown: Mutex<Vec<UnsubscribeLogic>>,
    handles: Mutex<Vec<SubscriptionHandle>>,
    children: Mutex<Vec<Arc<SubscriptionCore>>>,
    demand: Mutex<Option<DemandFn>>,
    runtime_handle: Option<runtime::Handle>,
}

impl SubscriptionCore {
    pub(crate) fn new() -> Arc<Self> {
        let core = Arc::new(SubscriptionCore {
            id: SubscriptionId::next(),
            state: AtomicU8::new(ACTIVE),
            teardown: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
            demand: Mutex::new(None),
            runtime_handle: runtime::Handle::try_current().ok(),
        });
        trace!(subscription = %core.id, "subscription opened");
        core
    }

    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        match self.state.load(Ordering::Acquire) {
            ACTIVE => SubscriptionState::Active,
            COMPLETED => SubscriptionState::Completed,
            _ => SubscriptionState::Cancelled,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) != ACTIVE
    }

    /// Moves `Active` to `Cancelled` and runs the teardown. Returns `false`
    /// when the subscription was already closed.
    pub(crate) fn cancel(&self) -> bool {
        if self
            .state
            .compare_exchange(ACTIVE, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.demand.lock().take();
        let teardown = mem::take(&mut *self.teardown.lock());
        trace!(subscription = %self.id, teardown = teardown.len(), "subscription cancelled");
        for logic in teardown {
            logic.unsubscribe(self.runtime_handle.as_ref());
        }
        true
    }

    /// Moves `Active` to `Completed`. Teardown is released without running.
    pub(crate) fn terminate(&self) {
        if self
            .state
            .compare_exchange(ACTIVE, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.demand.lock().take();
        let released = mem::take(&mut *self.teardown.lock());
        drop(released);
        trace!(subscription = %self.id, "subscription completed");
    }

    pub(crate) fn add_teardown(&self, logic: UnsubscribeLogic) {
        if let UnsubscribeLogic::Nil = logic {
            return;
        }
        let mut teardown = self.teardown.lock();
        match self.state.load(Ordering::Acquire) {
            ACTIVE => teardown.push(logic),
            CANCELLED => {
                drop(teardown);
                logic.unsubscribe(self.runtime_handle.as_ref());
            }
            _ => {}
        }
    }

    pub(crate) fn push_handle(&self, handle: SubscriptionHandle) {
        if let SubscriptionHandle::Nil = handle {
            return;
        }
        self.handles.lock().push(handle);
    }

    // Upstream stages whose background work `join` also waits for.
    pub(crate) fn push_child(&self, child: Arc<SubscriptionCore>) {
        self.children.lock().push(child);
    }

    // Takes the handles of this core and every core upstream of it.
    fn take_handles(self: &Arc<Self>) -> Vec<SubscriptionHandle> {
        let mut handles = Vec::new();
        let mut pending = vec![Arc::clone(self)];
        while let Some(core) = pending.pop() {
            handles.append(&mut core.handles.lock());
            pending.extend(core.children.lock().iter().cloned());
        }
        handles
    }

    pub(crate) fn set_demand(&self, demand: impl Fn(u64) + Send + Sync + 'static) {
        if !self.is_closed() {
            *self.demand.lock() = Some(Arc::new(demand));
        }
    }

    pub(crate) fn request(&self, n: u64) {
        // Cloned out so a request issued from inside delivery can re-enter.
        let demand = self.demand.lock().clone();
        if let Some(demand) = demand {
            demand(n);
        }
    }
}

/// Enumeration representing different types of handles used to await
/// background work started by a subscription.
#[derive(Debug)]
pub enum SubscriptionHandle {
    /// Nothing to await.
    Nil,

    /// Holds a join handle for work running as a Tokio task.
    JoinTask(JoinHandle<()>),

    /// Holds a join handle for work running on an OS thread.
    JoinThread(ThreadJoinHandle<()>),
}

/// Represents a subscription to an observable or a flowable, allowing control over
/// the subscription.
///
/// Clones share one state: cancelling any clone cancels the subscription for all
/// of them. Cancelling is idempotent, and cancelling a subscription whose stream
/// already completed does nothing.
#[derive(Clone)]
pub struct Subscription {
    pub(crate) core: Arc<SubscriptionCore>,
}

impl Subscription {
    /// Creates a new Subscription instance with the specified unsubscribe logic and
    /// subscription handle.
    ///
    /// The `unsubscribe_logic` parameter defines the logic to execute upon
    /// unsubscribing. The `subscription_future` parameter holds a handle for
    /// awaiting asynchronous tasks or threads associated with the subscription.
    #[must_use]
    pub fn new(
        unsubscribe_logic: UnsubscribeLogic,
        subscription_future: SubscriptionHandle,
    ) -> Self {
        let core = SubscriptionCore::new();
        core.add_teardown(unsubscribe_logic);
        core.push_handle(subscription_future);
        Subscription { core }
    }

    /// A subscription with no teardown and nothing to await.
    #[must_use]
    pub fn empty() -> Self {
        Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil)
    }

    pub(crate) fn from_core(core: Arc<SubscriptionCore>) -> Self {
        Subscription { core }
    }

    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.core.id()
    }

    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.core.state()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }

    /// `true` once the subscription was cancelled or its stream terminated.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Stops further delivery and runs the unsubscribe logic.
    ///
    /// Returns `true` only for the call that actually cancelled. Later calls,
    /// and calls after the stream terminated, return `false` and do nothing.
    pub fn cancel(&self) -> bool {
        self.core.cancel()
    }

    /// Asks a flowable for `n` more values. Ignored by plain observables and
    /// by closed subscriptions.
    pub fn request(&self, n: u64) {
        self.core.request(n);
    }

    /// Blocks until every OS thread started for this subscription, or for the
    /// stages upstream of it, has finished.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Join`] if a thread panicked, or if the work runs as
    /// a Tokio task (use [`Subscription::join_concurrent`] instead).
    pub fn join(self) -> Result<(), FlowError> {
        // Joined work may attach more stages, so repeat until nothing is left.
        loop {
            let handles = self.core.take_handles();
            if handles.is_empty() {
                return Ok(());
            }
            for handle in handles {
                match handle {
                    SubscriptionHandle::Nil => (),
                    SubscriptionHandle::JoinThread(thread_handle) => {
                        thread_handle.join().map_err(|_| FlowError::Join {
                            reason: "background thread panicked".to_string(),
                        })?;
                    }
                    SubscriptionHandle::JoinTask(_) => {
                        return Err(FlowError::Join {
                            reason: "work runs as a Tokio task, use `join_concurrent().await`"
                                .to_string(),
                        });
                    }
                }
            }
        }
    }

    /// Awaits every Tokio task and OS thread started for this subscription and
    /// the stages upstream of it.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Join`] if a task or thread failed.
    pub async fn join_concurrent(self) -> Result<(), FlowError> {
        loop {
            let handles = self.core.take_handles();
            if handles.is_empty() {
                return Ok(());
            }
            for handle in handles {
                match handle {
                    SubscriptionHandle::Nil => (),
                    SubscriptionHandle::JoinTask(task_handle) => {
                        task_handle.await.map_err(|e| FlowError::Join {
                            reason: e.to_string(),
                        })?;
                    }
                    SubscriptionHandle::JoinThread(thread_handle) => {
                        tokio::task::spawn_blocking(move || thread_handle.join())
                            .await
                            .map_err(|e| FlowError::Join {
                                reason: e.to_string(),
                            })?
                            .map_err(|_| FlowError::Join {
                                reason: "background thread panicked".to_string(),
                            })?;
                    }
                }
            }
        }
    }
}

impl Unsubscribeable for Subscription {
    fn unsubscribe(self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

/// Enumerates various unsubscribe logic options for a subscription.
pub enum UnsubscribeLogic {
    /// No specific unsubscribe logic.
    Nil,

    /// If one subscription depends on another. Wrapped subscription's cancel
    /// will be called upon unsubscribing.
    Wrapped(Box<Subscription>),

    /// Unsubscribe logic defined by a function.
    Logic(Box<dyn FnOnce() + Send>),

    /// Asynchronous unsubscribe logic represented by a future. Use if you need to
    /// spawn `Tokio` tasks or `.await` as a part of the unsubscribe logic.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

impl UnsubscribeLogic {
    fn unsubscribe(self, runtime_handle: Option<&runtime::Handle>) {
        match self {
            UnsubscribeLogic::Nil => (),
            UnsubscribeLogic::Logic(fnc) => fnc(),
            UnsubscribeLogic::Wrapped(subscription) => {
                subscription.cancel();
            }
            UnsubscribeLogic::Future(future) => {
                let handle = runtime_handle
                    .cloned()
                    .or_else(|| runtime::Handle::try_current().ok());
                if let Some(handle) = handle {
                    handle.spawn(future);
                    return;
                }
                // Not inside any runtime, so blocking here is allowed.
                match runtime::Builder::new_current_thread().enable_time().build() {
                    Ok(rt) => rt.block_on(future),
                    Err(e) => {
                        warn!(error = %e, "no Tokio runtime for asynchronous unsubscribe logic");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_logic(counter: &Arc<AtomicUsize>) -> UnsubscribeLogic {
        let counter = Arc::clone(counter);
        UnsubscribeLogic::Logic(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn cancel_runs_teardown_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let subscription = Subscription::new(counting_logic(&calls), SubscriptionHandle::Nil);
        let clone = subscription.clone();

        assert!(subscription.cancel());
        assert!(!clone.cancel());
        assert!(!subscription.cancel());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(clone.state(), SubscriptionState::Cancelled);
    }

    #[test]
    fn teardown_added_after_cancel_runs_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let subscription = Subscription::empty();
        subscription.cancel();

        subscription.core.add_teardown(counting_logic(&calls));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_after_completion_is_noop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let subscription = Subscription::new(counting_logic(&calls), SubscriptionHandle::Nil);
        subscription.core.terminate();

        assert!(!subscription.cancel());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(subscription.state(), SubscriptionState::Completed);
    }

    #[test]
    fn subscriber_ignores_signals_after_terminal() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_c = Arc::clone(&seen);
        let completes = Arc::new(AtomicUsize::new(0));
        let completes_c = Arc::clone(&completes);

        let mut s = Subscriber::new(
            move |v: i32| seen_c.lock().push(v),
            |_| {},
            move || {
                completes_c.fetch_add(1, Ordering::SeqCst);
            },
        );
        s.next(1);
        s.complete();
        s.next(2);
        s.complete();

        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(completes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscriber_stops_after_cancel() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_c = Arc::clone(&seen);
        let mut s = Subscriber::on_next(move |v: i32| seen_c.lock().push(v));
        let subscription = Subscription::from_core(s.ensure_core());

        s.next(1);
        subscription.cancel();
        s.next(2);

        assert!(s.is_cancelled());
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn request_reaches_demand_hook() {
        let requested = Arc::new(AtomicU64::new(0));
        let requested_c = Arc::clone(&requested);
        let subscription = Subscription::empty();
        subscription.core.set_demand(move |n| {
            requested_c.fetch_add(n, Ordering::SeqCst);
        });

        subscription.request(3);
        subscription.request(4);
        subscription.cancel();
        subscription.request(10);

        assert_eq!(requested.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn join_waits_for_thread() {
        let done = Arc::new(AtomicUsize::new(0));
        let done_c = Arc::clone(&done);
        let jh = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            done_c.store(1, Ordering::SeqCst);
        });
        let subscription = Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::JoinThread(jh));

        assert!(subscription.join().is_ok());
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
