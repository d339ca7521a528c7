//! Backpressure inside a Tokio runtime. Background work runs as blocking tasks
//! and the subscription is awaited with `join_concurrent`.
//!
//! To run this example, execute `cargo run --example flowable_tokio`.

use std::time::Duration;

use rxflow::{
    subscribe::{Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic},
    BackpressureStrategy, FlowError, Flowable, Observable, Observer, Scheduler, Subscribeable,
};

#[tokio::main]
async fn main() -> Result<(), FlowError> {
    tracing_subscriber::fmt::init();

    // Emits from a Tokio task until the subscription is cancelled.
    let observable = Observable::new(|mut o: Subscriber<u32>| {
        let join_handle = tokio::spawn(async move {
            for i in 0..=200 {
                if o.is_cancelled() {
                    return;
                }
                o.next(i);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            o.complete();
        });

        Subscription::new(
            UnsubscribeLogic::Future(Box::pin(async {
                println!("producer task torn down");
            })),
            SubscriptionHandle::JoinTask(join_handle),
        )
    });

    let mut observer = Subscriber::on_next(|v| println!("Emitted {}", v)).with_request(5);
    observer.on_error(|e| eprintln!("Error {}", e));
    observer.on_complete(|| println!("Completed"));

    let subscription = Flowable::new(observable, BackpressureStrategy::Buffer { capacity: 256 })
        .map(|v| v * 10)
        .observe_on(Scheduler::io())
        .subscribe(observer);

    // Pull the rest in small batches.
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        subscription.request(20);
    }
    subscription.clone().join_concurrent().await?;

    println!("final state: {:?}", subscription.state());
    Ok(())
}
