//! The `observable` module provides the eager, backpressure-free stream type and
//! the operators that move it between execution contexts.

mod producers;
mod serialize;

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::{
    flowable::{BackpressureStrategy, Flowable},
    observer::Observer,
    scheduler::Scheduler,
    subscription::subscribe::{Subscribeable, Subscriber, Subscription, UnsubscribeLogic},
};

use serialize::{SerialQueue, Signal};

/// The `Observable` struct represents a lazy source of values that can be
/// observed and transformed.
///
/// Observables are cold: nothing is produced until `subscribe` is called, and
/// every subscription runs the producer again. They push values as fast as the
/// producer makes them. When the consumer may be slower, convert the stream with
/// [`ObservableExt::to_flowable`] and pick a [`BackpressureStrategy`].
///
/// Clones share the subscribe function, so they describe the same stream and
/// can be subscribed to from several threads at once.
///
/// # Example: basic synchronous `Observable`
///
/// ```no_run
/// use rxflow::subscribe::{Subscriber, Subscription};
/// use rxflow::{Observable, Observer, Subscribeable};
///
/// let mut emit_10_observable = Observable::new(|mut subscriber| {
///     for i in 1..=10 {
///         if subscriber.is_cancelled() {
///             break;
///         }
///         subscriber.next(i);
///     }
///     subscriber.complete();
///
///     Subscription::empty()
/// });
///
/// let observer = Subscriber::new(
///     |v| println!("Emitted {}", v),
///     |e| eprintln!("Error {}", e),
///     || println!("Completed"),
/// );
///
/// // Blocks until completion since nothing here spawns threads.
/// emit_10_observable.subscribe(observer);
/// ```
///
/// # Example: hopping between contexts
///
/// Work runs on a background worker, delivery on the foreground loop.
///
/// ```no_run
/// use std::time::Duration;
///
/// use rxflow::{subscribe::Subscriber, MainLoop, Observable, ObservableExt, Scheduler, Subscribeable};
///
/// let main_loop = MainLoop::new();
///
/// let subscription = Observable::from_iter(0..5)
///     .subscribe_on(Scheduler::io())
///     .observe_on(main_loop.scheduler())
///     .subscribe(Subscriber::on_next(|v| println!("on main: {}", v)));
///
/// main_loop.run_until(Duration::from_secs(1), || subscription.is_closed());
/// ```
pub struct Observable<T> {
    subscribe_fn: Arc<dyn Fn(Subscriber<T>) -> Subscription + Send + Sync>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Observable {
            subscribe_fn: Arc::clone(&self.subscribe_fn),
        }
    }
}

impl<T> Observable<T> {
    /// Creates a new `Observable` with the provided subscribe function.
    ///
    /// `sf` runs once per subscription, possibly on several workers at the same
    /// time. It should push values into the `Subscriber`, stop when
    /// [`Subscriber::is_cancelled`] turns `true`, and return a `Subscription`
    /// carrying its own unsubscribe logic and any thread or task handle it
    /// started.
    pub fn new(sf: impl Fn(Subscriber<T>) -> Subscription + Send + Sync + 'static) -> Self {
        Observable {
            subscribe_fn: Arc::new(sf),
        }
    }
}

/// The `ObservableExt` trait provides the operators that can be chained on an
/// `Observable`.
pub trait ObservableExt<T: 'static>: Subscribeable<ObsType = T> {
    /// Transforms the items emitted by the observable using a transformation
    /// function.
    fn map<U, F>(self, f: F) -> Observable<U>
    where
        Self: Sized + Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
        U: 'static,
    {
        let f = Arc::new(f);
        Observable::new(move |mut o| {
            let core = o.ensure_core();
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);
            let f = Arc::clone(&f);

            let mut u = Subscriber::new(
                move |v| {
                    let t = f(v);
                    o_shared.lock().next(t);
                },
                move |observable_error| {
                    o_cloned_e.lock().error(observable_error);
                },
                move || {
                    o_cloned_c.lock().complete();
                },
            );
            u.attach(core);
            self.clone().subscribe(u)
        })
    }

    /// Filters the items emitted by the observable based on a predicate function.
    ///
    /// Only items for which the predicate function returns `true` will be emitted
    /// by the resulting observable.
    fn filter<P>(self, predicate: P) -> Observable<T>
    where
        Self: Sized + Clone + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        Observable::new(move |mut o| {
            let core = o.ensure_core();
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);
            let predicate = Arc::clone(&predicate);

            let mut u = Subscriber::new(
                move |v| {
                    if predicate(&v) {
                        o_shared.lock().next(v);
                    }
                },
                move |observable_error| {
                    o_cloned_e.lock().error(observable_error);
                },
                move || {
                    o_cloned_c.lock().complete();
                },
            );
            u.attach(core);
            self.clone().subscribe(u)
        })
    }

    /// Subscribes to the source on `scheduler`.
    ///
    /// The producer, and every operator above this one, runs there. A
    /// subscription cancelled before the worker starts never reaches the
    /// producer.
    fn subscribe_on(self, scheduler: Scheduler) -> Observable<T>
    where
        Self: Sized + Clone + Send + Sync + 'static,
        T: Send,
    {
        Observable::new(move |o| {
            let mut source = self.clone();
            let slot = Arc::new(Mutex::new(Some(o)));
            let slot_c = Arc::clone(&slot);

            let work = move || {
                let Some(o) = slot_c.lock().take() else {
                    return;
                };
                if o.is_cancelled() {
                    return;
                }
                // Shares the core of `o`, so the caller already holds it.
                let _ = source.subscribe(o);
            };

            match scheduler.schedule(work) {
                Ok(handle) => Subscription::new(UnsubscribeLogic::Nil, handle),
                Err(e) => {
                    warn!(error = %e, context = %scheduler.kind(), "cannot subscribe on scheduler");
                    if let Some(mut o) = slot.lock().take() {
                        o.error(e.shared());
                    }
                    Subscription::empty()
                }
            }
        })
    }

    /// Delivers every signal on `scheduler`, one at a time and in order.
    ///
    /// Signals wait in an unbounded queue until the scheduler runs them. A fast
    /// producer can therefore grow the queue without limit; use
    /// [`ObservableExt::to_flowable`] when that matters.
    fn observe_on(self, scheduler: Scheduler) -> Observable<T>
    where
        Self: Sized + Clone + Send + Sync + 'static,
        T: Send,
    {
        Observable::new(move |o| {
            // The upstream gets its own core. The downstream one only closes
            // once the terminal signal was delivered on `scheduler`.
            let queue = SerialQueue::new(o, scheduler.clone());
            let q_next = Arc::clone(&queue);
            let q_error = Arc::clone(&queue);
            let q_complete = queue;

            let u = Subscriber::new(
                move |v| q_next.push(Signal::Next(v)),
                move |observable_error| q_error.push(Signal::Error(observable_error)),
                move || q_complete.push(Signal::Complete),
            );
            self.clone().subscribe(u)
        })
    }

    /// Converts the stream into a [`Flowable`] that only delivers what the
    /// consumer requested, handling the rest with `strategy`.
    fn to_flowable(self, strategy: BackpressureStrategy) -> Flowable<T>
    where
        Self: Sized + Clone + Send + Sync + 'static,
        T: Send,
    {
        Flowable::new(Observable::new(move |o| self.clone().subscribe(o)), strategy)
    }
}

impl<T: 'static> Subscribeable for Observable<T> {
    type ObsType = T;

    fn subscribe(&mut self, mut v: Subscriber<Self::ObsType>) -> Subscription {
        let core = v.ensure_core();
        if core.is_closed() {
            return Subscription::from_core(core);
        }
        let inner = (self.subscribe_fn)(v);
        if !Arc::ptr_eq(&inner.core, &core) {
            core.push_child(Arc::clone(&inner.core));
            core.add_teardown(UnsubscribeLogic::Wrapped(Box::new(inner)));
        }
        Subscription::from_core(core)
    }
}

impl<T: 'static> ObservableExt<T> for Observable<T> {}
