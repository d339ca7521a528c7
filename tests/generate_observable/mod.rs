use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use rxflow::{
    subscribe::{Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic},
    Observable, Observer,
};

/// Emits `0..=end` from its own OS thread, one value per millisecond, until the
/// subscription is cancelled. `last_emit_assert` receives the last emitted value.
pub fn generate_u32_observable(
    end: u32,
    last_emit_assert: impl FnMut(u32) + Send + Sync + 'static,
) -> Observable<u32> {
    let last_emit_assert = Arc::new(Mutex::new(last_emit_assert));

    Observable::new(move |mut o: Subscriber<_>| {
        let last_emit_assert = Arc::clone(&last_emit_assert);
        let jh = std::thread::spawn(move || {
            let mut last_emit = 0;

            for i in 0..=end {
                if o.is_cancelled() {
                    break;
                }
                last_emit = i;
                o.next(i);
                std::thread::sleep(Duration::from_millis(1));
            }
            o.complete();
            last_emit_assert.lock().unwrap()(last_emit);
        });

        Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::JoinThread(jh))
    })
}

/// Same as `generate_u32_observable` but emits from a Tokio task. `torn_down`
/// is set by asynchronous unsubscribe logic once the subscription is cancelled.
pub fn generate_u32_observable_task(end: u32, torn_down: Arc<AtomicBool>) -> Observable<u32> {
    Observable::new(move |mut o: Subscriber<_>| {
        let torn_down = Arc::clone(&torn_down);
        let jh = tokio::task::spawn(async move {
            for i in 0..=end {
                if o.is_cancelled() {
                    return;
                }
                o.next(i);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            o.complete();
        });

        Subscription::new(
            UnsubscribeLogic::Future(Box::pin(async move {
                torn_down.store(true, Ordering::SeqCst);
            })),
            SubscriptionHandle::JoinTask(jh),
        )
    })
}
