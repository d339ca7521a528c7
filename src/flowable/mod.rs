//! The `flowable` module provides the backpressure-aware stream type.
//!
//! A [`Flowable`] sits between an eager [`Observable`] and a consumer that asks
//! for values with [`Subscription::request`]. Whatever the producer emits
//! without matching demand is handled by a [`BackpressureStrategy`].

pub mod backpressure;

pub use backpressure::{BackpressureStrategy, BufferState, Decision};

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::{
    observable::{Observable, ObservableExt},
    observer::Observer,
    scheduler::Scheduler,
    subscription::subscribe::{
        Subscribeable, Subscriber, Subscription, SubscriptionCore, UnsubscribeLogic,
    },
    FlowConfig, SharedError,
};

/// A cold stream that only delivers what its consumer requested.
///
/// Built from an `Observable` with [`ObservableExt::to_flowable`] or
/// [`Flowable::new`]. Every subscription gets its own buffer.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
///
/// use rxflow::{
///     subscribe::Subscriber, BackpressureStrategy, MainLoop, Observable, ObservableExt,
///     Scheduler, Subscribeable,
/// };
///
/// let main_loop = MainLoop::new();
///
/// let subscription = Observable::just(42)
///     .to_flowable(BackpressureStrategy::Drop)
///     .subscribe_on(Scheduler::io())
///     .observe_on(main_loop.scheduler())
///     .subscribe(Subscriber::on_next(|v| println!("flowable: {}", v)));
///
/// main_loop.run_until(Duration::from_secs(1), || subscription.is_closed());
/// ```
pub struct Flowable<T> {
    source: Observable<T>,
    strategy: BackpressureStrategy,
    subscribe_on: Scheduler,
    observe_on: Scheduler,
    config: FlowConfig,
}

impl<T> Clone for Flowable<T> {
    fn clone(&self) -> Self {
        Flowable {
            source: self.source.clone(),
            strategy: self.strategy,
            subscribe_on: self.subscribe_on.clone(),
            observe_on: self.observe_on.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T: 'static> Flowable<T> {
    /// Wraps `source`, handling values emitted without demand with `strategy`.
    ///
    /// Subscription and delivery both run inline until changed with
    /// [`Flowable::subscribe_on`] and [`Flowable::observe_on`].
    pub fn new(source: Observable<T>, strategy: BackpressureStrategy) -> Self {
        Flowable {
            source,
            strategy,
            subscribe_on: Scheduler::Immediate,
            observe_on: Scheduler::Immediate,
            config: FlowConfig::default(),
        }
    }

    /// Replaces the backpressure strategy.
    #[must_use]
    pub fn on_backpressure(mut self, strategy: BackpressureStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Uses `config` for the delivery prefetch and the lag warning threshold.
    #[must_use]
    pub fn with_config(mut self, config: FlowConfig) -> Self {
        self.config = config;
        self
    }

    /// Subscribes to the upstream producer on `scheduler`.
    #[must_use]
    pub fn subscribe_on(mut self, scheduler: Scheduler) -> Self {
        self.subscribe_on = scheduler;
        self
    }

    /// Delivers values and the terminal signal on `scheduler`, in order.
    #[must_use]
    pub fn observe_on(mut self, scheduler: Scheduler) -> Self {
        self.observe_on = scheduler;
        self
    }

    /// Transforms every value before it reaches the buffer.
    pub fn map<U, F>(self, f: F) -> Flowable<U>
    where
        F: Fn(T) -> U + Send + Sync + 'static,
        U: 'static,
    {
        Flowable {
            source: self.source.map(f),
            strategy: self.strategy,
            subscribe_on: self.subscribe_on,
            observe_on: self.observe_on,
            config: self.config,
        }
    }

    /// Drops values failing `predicate` before they reach the buffer. Filtered
    /// values do not consume demand.
    pub fn filter<P>(self, predicate: P) -> Flowable<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Flowable {
            source: self.source.clone().filter(predicate),
            ..self
        }
    }
}

impl<T: Send + 'static> Subscribeable for Flowable<T> {
    type ObsType = T;

    fn subscribe(&mut self, mut s: Subscriber<Self::ObsType>) -> Subscription {
        let core = s.ensure_core();
        if core.is_closed() {
            return Subscription::from_core(core);
        }
        let initial = s.initial_request();
        let upstream = SubscriptionCore::new();
        core.push_child(Arc::clone(&upstream));

        let bridge = Arc::new(Bridge {
            state: Mutex::new(FlowState {
                buffer: BufferState::new(self.config.buffer_size),
                terminal: None,
                lagging: false,
            }),
            downstream: Mutex::new(s),
            core: Arc::clone(&core),
            upstream: Arc::clone(&upstream),
            strategy: self.strategy,
            scheduler: self.observe_on.clone(),
            lag_threshold: self.config.lag_warning_threshold,
            wip: AtomicUsize::new(0),
        });

        let b_demand = Arc::clone(&bridge);
        core.set_demand(move |n| b_demand.request(n));

        let b_teardown = Arc::clone(&bridge);
        core.add_teardown(UnsubscribeLogic::Logic(Box::new(move || {
            b_teardown.upstream.cancel();
            b_teardown.release();
        })));

        if initial > 0 {
            bridge.request(initial);
        }

        let b_next = Arc::clone(&bridge);
        let b_error = Arc::clone(&bridge);
        let b_complete = Arc::clone(&bridge);
        let mut upstream_subscriber = Subscriber::new(
            move |v| b_next.on_next(v),
            move |e| b_error.on_error(e),
            move || b_complete.on_complete(),
        );
        upstream_subscriber.attach(upstream);

        let mut source = self.source.clone();
        let work = move || {
            if upstream_subscriber.is_cancelled() {
                return;
            }
            let _ = source.subscribe(upstream_subscriber);
        };

        match self.subscribe_on.schedule(work) {
            Ok(handle) => core.push_handle(handle),
            Err(e) => {
                warn!(error = %e, context = %self.subscribe_on.kind(), "cannot subscribe on scheduler");
                bridge.on_error(e.shared());
            }
        }
        Subscription::from_core(core)
    }
}

enum Terminal {
    Complete,
    Error(SharedError),
}

struct FlowState<T> {
    buffer: BufferState<T>,
    terminal: Option<Terminal>,
    lagging: bool,
}

enum Step<T> {
    Next(T),
    Complete,
    Error(SharedError),
    Idle,
}

// Connects one upstream subscription to one downstream subscriber, applying
// the strategy to values that arrive without demand.
struct Bridge<T> {
    state: Mutex<FlowState<T>>,
    downstream: Mutex<Subscriber<T>>,
    core: Arc<SubscriptionCore>,
    upstream: Arc<SubscriptionCore>,
    strategy: BackpressureStrategy,
    scheduler: Scheduler,
    lag_threshold: usize,
    wip: AtomicUsize,
}

impl<T: Send + 'static> Bridge<T> {
    fn on_next(self: &Arc<Self>, v: T) {
        let mut state = self.state.lock();
        if state.terminal.is_some() || self.core.is_closed() {
            return;
        }
        match self.strategy.apply(v, &mut state.buffer) {
            Decision::Deliver(v) => {
                state.buffer.push_ready(v);
                drop(state);
                self.schedule_drain();
            }
            Decision::Hold => self.check_lag(&mut state),
            Decision::Drop(_) => {
                trace!(
                    subscription = %self.core.id(),
                    strategy = self.strategy.as_str(),
                    dropped = state.buffer.dropped(),
                    "value dropped without demand"
                );
            }
            Decision::Error(e) => {
                warn!(subscription = %self.core.id(), error = %e, label = e.as_label(), "backpressure strategy failed");
                state.buffer.discard_held();
                state.terminal = Some(Terminal::Error(e.shared()));
                drop(state);
                self.upstream.cancel();
                self.schedule_drain();
            }
        }
    }

    fn on_error(self: &Arc<Self>, e: SharedError) {
        let mut state = self.state.lock();
        if state.terminal.is_some() {
            return;
        }
        state.buffer.discard_held();
        state.terminal = Some(Terminal::Error(e));
        drop(state);
        self.schedule_drain();
    }

    fn on_complete(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.terminal.is_some() {
            return;
        }
        state.terminal = Some(Terminal::Complete);
        drop(state);
        self.schedule_drain();
    }

    fn request(self: &Arc<Self>, n: u64) {
        if n == 0 {
            warn!(subscription = %self.core.id(), "request(0) ignored");
            return;
        }
        {
            let mut state = self.state.lock();
            state.buffer.grant(n);
            self.check_lag(&mut state);
        }
        self.schedule_drain();
    }

    fn release(&self) {
        self.state.lock().buffer.release();
    }

    fn check_lag(&self, state: &mut FlowState<T>) {
        let held = state.buffer.held_len();
        if held <= self.lag_threshold {
            state.lagging = false;
        } else if !state.lagging {
            state.lagging = true;
            warn!(
                subscription = %self.core.id(),
                held,
                queued = state.buffer.ready_len(),
                threshold = self.lag_threshold,
                "consumer is lagging behind producer"
            );
        }
    }

    fn schedule_drain(self: &Arc<Self>) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let bridge = Arc::clone(self);
        match self.scheduler.schedule(move || bridge.drain()) {
            Ok(handle) => self.core.push_handle(handle),
            Err(e) => {
                warn!(error = %e, context = %self.scheduler.kind(), "cannot deliver on scheduler");
                self.release();
                self.upstream.cancel();
                self.downstream.lock().error(e.shared());
            }
        }
    }

    fn drain(&self) {
        let mut missed = 1;
        loop {
            loop {
                if self.core.is_cancelled() {
                    self.release();
                    return;
                }
                match self.next_step() {
                    Step::Next(v) => self.downstream.lock().next(v),
                    Step::Complete => {
                        self.downstream.lock().complete();
                        return;
                    }
                    Step::Error(e) => {
                        self.downstream.lock().error(e);
                        return;
                    }
                    Step::Idle => break,
                }
            }
            missed = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if missed == 0 {
                break;
            }
        }
    }

    fn next_step(&self) -> Step<T> {
        let mut state = self.state.lock();
        if let Some(v) = state.buffer.pop_ready() {
            return Step::Next(v);
        }
        match &state.terminal {
            Some(Terminal::Error(e)) => Step::Error(Arc::clone(e)),
            Some(Terminal::Complete) if state.buffer.is_drained() => Step::Complete,
            _ => Step::Idle,
        }
    }
}
