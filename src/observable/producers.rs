use std::{error::Error, fmt::Display, sync::Arc};

use crate::{observer::Observer, subscription::subscribe::Subscription, FlowError};

use super::Observable;

impl<T: Clone + Send + Sync + 'static> Observable<T> {
    /// Emits `value` once, then completes.
    ///
    /// Each subscription receives its own clone of `value`.
    ///
    /// ```no_run
    /// use rxflow::{subscribe::Subscriber, Observable, Subscribeable};
    ///
    /// Observable::just(42).subscribe(Subscriber::on_next(|v| assert_eq!(v, 42)));
    /// ```
    pub fn just(value: T) -> Self {
        Observable::new(move |mut o| {
            o.next(value.clone());
            o.complete();
            Subscription::empty()
        })
    }
}

impl<T: 'static> Observable<T> {
    /// Emits every item of `items` in order, then completes.
    ///
    /// Stops early, without completing, once the subscription is cancelled.
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    {
        Observable::new(move |mut o| {
            for v in items.clone() {
                if o.is_cancelled() {
                    return Subscription::empty();
                }
                o.next(v);
            }
            o.complete();
            Subscription::empty()
        })
    }

    /// Calls `f` once per subscription and emits what it produced. Concurrent
    /// subscriptions call `f` concurrently.
    ///
    /// `Ok(Some(v))` emits `v` and completes, `Ok(None)` completes without a
    /// value. `Err(e)` terminates the stream with [`FlowError::ProducerFailure`].
    pub fn from_fn<F, E>(f: F) -> Self
    where
        F: Fn() -> Result<Option<T>, E> + Send + Sync + 'static,
        E: Display,
    {
        Observable::new(move |mut o| {
            match f() {
                Ok(Some(v)) => {
                    o.next(v);
                    o.complete();
                }
                Ok(None) => o.complete(),
                Err(e) => o.error(FlowError::producer(e).shared()),
            }
            Subscription::empty()
        })
    }

    /// Completes immediately without emitting.
    #[must_use]
    pub fn empty() -> Self {
        Observable::new(|mut o| {
            o.complete();
            Subscription::empty()
        })
    }

    /// Terminates every subscriber with `error` right away.
    pub fn fail(error: impl Error + Send + Sync + 'static) -> Self {
        let error: Arc<dyn Error + Send + Sync> = Arc::new(error);
        Observable::new(move |mut o| {
            o.error(Arc::clone(&error));
            Subscription::empty()
        })
    }
}
