use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::warn;

use crate::{
    observer::Observer,
    scheduler::Scheduler,
    subscription::subscribe::{Subscriber, SubscriptionCore, UnsubscribeLogic},
    SharedError,
};

pub(super) enum Signal<T> {
    Next(T),
    Error(SharedError),
    Complete,
}

/// Hands signals from any thread to one subscriber, running the delivery on
/// `scheduler`. At most one drain is scheduled at a time.
pub(super) struct SerialQueue<T> {
    pending: Mutex<VecDeque<Signal<T>>>,
    downstream: Mutex<Subscriber<T>>,
    core: Arc<SubscriptionCore>,
    scheduler: Scheduler,
    wip: AtomicUsize,
}

impl<T: Send + 'static> SerialQueue<T> {
    pub(super) fn new(mut downstream: Subscriber<T>, scheduler: Scheduler) -> Arc<Self> {
        let core = downstream.ensure_core();
        let queue = Arc::new(SerialQueue {
            pending: Mutex::new(VecDeque::new()),
            downstream: Mutex::new(downstream),
            core: Arc::clone(&core),
            scheduler,
            wip: AtomicUsize::new(0),
        });

        let weak = Arc::downgrade(&queue);
        core.add_teardown(UnsubscribeLogic::Logic(Box::new(move || {
            if let Some(queue) = weak.upgrade() {
                queue.pending.lock().clear();
            }
        })));
        queue
    }

    pub(super) fn push(self: &Arc<Self>, signal: Signal<T>) {
        if self.core.is_cancelled() {
            return;
        }
        self.pending.lock().push_back(signal);

        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let queue = Arc::clone(self);
        match self.scheduler.schedule(move || queue.drain()) {
            Ok(handle) => self.core.push_handle(handle),
            Err(e) => {
                warn!(error = %e, context = %self.scheduler.kind(), "cannot deliver on scheduler");
                self.pending.lock().clear();
                self.downstream.lock().error(e.shared());
            }
        }
    }

    fn drain(&self) {
        let mut missed = 1;
        loop {
            while let Some(signal) = self.next_signal() {
                let mut downstream = self.downstream.lock();
                match signal {
                    Signal::Next(v) => downstream.next(v),
                    Signal::Error(e) => downstream.error(e),
                    Signal::Complete => downstream.complete(),
                }
            }
            missed = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if missed == 0 {
                break;
            }
        }
    }

    fn next_signal(&self) -> Option<Signal<T>> {
        let mut pending = self.pending.lock();
        if self.core.is_cancelled() {
            pending.clear();
            return None;
        }
        pending.pop_front()
    }
}
