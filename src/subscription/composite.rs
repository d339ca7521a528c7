//! A registry that owns many subscriptions and cancels them together.
//!
//! Components create one [`CompositeSubscription`] when they start, add every
//! subscription they open, and call [`dispose_all`](CompositeSubscription::dispose_all)
//! when they stop.
//!
//! # Rules
//! - Every member is cancelled at most once, no matter how many times or from how
//!   many threads the registry is cleared or disposed.
//! - Membership changes and disposal are serialized by one lock, so an `add`
//!   racing with `dispose_all` is either cancelled by the disposal or rejected.
//! - `add` on a disposed registry fails with [`FlowError::UseAfterDispose`] and
//!   cancels the rejected subscription before returning.

use std::{collections::HashMap, mem, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    subscription::subscribe::{Subscription, SubscriptionId},
    FlowError,
};

// Finished members are swept once the map reaches `prune_at`, which then
// doubles from the surviving count, keeping `add` amortized O(1).
const PRUNE_FLOOR: usize = 16;

#[derive(Default)]
struct Members {
    disposed: bool,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    prune_at: usize,
}

impl Members {
    fn prune(&mut self) {
        if self.subscriptions.len() < self.prune_at {
            return;
        }
        self.subscriptions.retain(|_, s| !s.is_closed());
        self.prune_at = (self.subscriptions.len() * 2).max(PRUNE_FLOOR);
    }
}

/// Collective owner of subscriptions.
///
/// Clones share the same member set.
///
/// ```
/// use rxflow::{
///     subscribe::{Subscriber, Subscription},
///     CompositeSubscription, FlowError, Observable, Subscribeable,
/// };
///
/// let registry = CompositeSubscription::new();
///
/// let subscription = Observable::just(42).subscribe(Subscriber::on_next(|v| println!("{v}")));
/// registry.add(subscription).unwrap();
///
/// registry.dispose_all();
/// assert_eq!(registry.add(Subscription::empty()), Err(FlowError::UseAfterDispose));
/// ```
#[derive(Clone, Default)]
pub struct CompositeSubscription {
    members: Arc<Mutex<Members>>,
}

impl CompositeSubscription {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `subscription`.
    ///
    /// Adding the same subscription twice tracks it once. Members whose streams
    /// already finished are pruned here in batches.
    ///
    /// # Errors
    ///
    /// [`FlowError::UseAfterDispose`] if the registry was disposed. The
    /// subscription is cancelled in that case.
    pub fn add(&self, subscription: Subscription) -> Result<(), FlowError> {
        let mut members = self.members.lock();
        if members.disposed {
            drop(members);
            warn!(subscription = %subscription.id(), "add on a disposed registry");
            subscription.cancel();
            return Err(FlowError::UseAfterDispose);
        }
        members.prune();
        members
            .subscriptions
            .entry(subscription.id())
            .or_insert(subscription);
        Ok(())
    }

    /// Adds every subscription, stopping at the first rejection.
    ///
    /// # Errors
    ///
    /// [`FlowError::UseAfterDispose`] if the registry was disposed. All
    /// subscriptions not yet added are cancelled.
    pub fn add_all(
        &self,
        subscriptions: impl IntoIterator<Item = Subscription>,
    ) -> Result<(), FlowError> {
        let mut subscriptions = subscriptions.into_iter();
        for subscription in subscriptions.by_ref() {
            if let Err(e) = self.add(subscription) {
                for rest in subscriptions {
                    rest.cancel();
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stops tracking `subscription` and cancels it. Returns whether it was tracked.
    pub fn remove(&self, subscription: &Subscription) -> bool {
        match self.take(subscription) {
            Some(removed) => {
                removed.cancel();
                true
            }
            None => false,
        }
    }

    /// Stops tracking `subscription` without cancelling it.
    pub fn delete(&self, subscription: &Subscription) -> bool {
        self.take(subscription).is_some()
    }

    /// Cancels every member but keeps the registry usable.
    ///
    /// Returns how many members this call cancelled.
    pub fn clear(&self) -> usize {
        let drained = mem::take(&mut self.members.lock().subscriptions);
        cancel_members(drained)
    }

    /// Cancels every member and refuses further additions.
    ///
    /// Returns how many members this call cancelled. Disposing an empty or an
    /// already disposed registry does nothing and returns `0`.
    pub fn dispose_all(&self) -> usize {
        let drained = {
            let mut members = self.members.lock();
            if members.disposed {
                return 0;
            }
            members.disposed = true;
            mem::take(&mut members.subscriptions)
        };
        let tracked = drained.len();
        let cancelled = cancel_members(drained);
        debug!(tracked, cancelled, "subscription registry disposed");
        cancelled
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.members.lock().disposed
    }

    /// Number of tracked subscriptions, finished ones included until pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.lock().subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&self, subscription: &Subscription) -> Option<Subscription> {
        self.members
            .lock()
            .subscriptions
            .remove(&subscription.id())
    }
}

// Runs outside the registry lock; teardown may touch the registry again.
fn cancel_members(members: HashMap<SubscriptionId, Subscription>) -> usize {
    members
        .into_values()
        .filter(|subscription| subscription.cancel())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscribe::{SubscriptionHandle, SubscriptionState, UnsubscribeLogic};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted(counter: &Arc<AtomicUsize>) -> Subscription {
        let counter = Arc::clone(counter);
        Subscription::new(
            UnsubscribeLogic::Logic(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            SubscriptionHandle::Nil,
        )
    }

    #[test]
    fn dispose_empty_registry_is_noop() {
        let registry = CompositeSubscription::new();
        assert_eq!(registry.dispose_all(), 0);
        assert!(registry.is_disposed());
        assert_eq!(registry.dispose_all(), 0);
    }

    #[test]
    fn dispose_cancels_each_member_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = CompositeSubscription::new();
        let subs: Vec<_> = (0..5).map(|_| counted(&calls)).collect();
        registry.add_all(subs.clone()).unwrap();

        assert_eq!(registry.dispose_all(), 5);
        assert_eq!(registry.dispose_all(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(subs.iter().all(|s| s.state() == SubscriptionState::Cancelled));
    }

    #[test]
    fn add_after_dispose_fails_and_cancels() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = CompositeSubscription::new();
        registry.dispose_all();

        let late = counted(&calls);
        assert_eq!(registry.add(late.clone()), Err(FlowError::UseAfterDispose));
        assert!(late.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn clear_keeps_registry_open() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = CompositeSubscription::new();
        registry.add(counted(&calls)).unwrap();

        assert_eq!(registry.clear(), 1);
        assert!(!registry.is_disposed());
        assert!(registry.add(counted(&calls)).is_ok());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_cancels_delete_does_not() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = CompositeSubscription::new();
        let a = counted(&calls);
        let b = counted(&calls);
        registry.add(a.clone()).unwrap();
        registry.add(b.clone()).unwrap();

        assert!(registry.remove(&a));
        assert!(registry.delete(&b));
        assert!(!registry.remove(&a));

        assert!(a.is_cancelled());
        assert!(!b.is_closed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_add_tracks_once() {
        let registry = CompositeSubscription::new();
        let s = Subscription::empty();
        registry.add(s.clone()).unwrap();
        registry.add(s).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn finished_members_are_pruned_in_batches() {
        let registry = CompositeSubscription::new();
        for _ in 0..PRUNE_FLOOR {
            let done = Subscription::empty();
            registry.add(done.clone()).unwrap();
            done.cancel();
        }
        assert_eq!(registry.len(), PRUNE_FLOOR);

        registry.add(Subscription::empty()).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn live_members_survive_pruning() {
        let registry = CompositeSubscription::new();
        let live: Vec<_> = (0..100).map(|_| Subscription::empty()).collect();
        registry.add_all(live.clone()).unwrap();
        for _ in 0..100 {
            let done = Subscription::empty();
            registry.add(done.clone()).unwrap();
            done.cancel();
        }
        registry.add(Subscription::empty()).unwrap();

        assert!(live.iter().all(|s| !s.is_closed()));
        assert_eq!(registry.dispose_all(), 101);
    }
}
