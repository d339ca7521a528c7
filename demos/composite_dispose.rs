//! A component that tracks its subscriptions in a `CompositeSubscription` and
//! disposes all of them when it stops.
//!
//! To run this example, execute `cargo run --example composite_dispose`.

use std::time::Duration;

use rxflow::{
    subscribe::{Subscriber, Subscription},
    BackpressureStrategy, CompositeSubscription, FlowError, MainLoop, Observable, ObservableExt,
    Scheduler, Subscribeable,
};

struct Counter {
    main_loop: MainLoop,
    subscriptions: CompositeSubscription,
}

impl Counter {
    fn start() -> Self {
        Counter {
            main_loop: MainLoop::new(),
            subscriptions: CompositeSubscription::new(),
        }
    }

    fn watch(&self, label: &'static str) -> Result<Subscription, FlowError> {
        // One tick per millisecond until cancelled.
        let subscription = Observable::from_iter(0..u64::MAX)
            .map(|tick| {
                std::thread::sleep(Duration::from_millis(1));
                tick
            })
            .to_flowable(BackpressureStrategy::Drop)
            .subscribe_on(Scheduler::io())
            .observe_on(self.main_loop.scheduler())
            .subscribe(Subscriber::on_next(move |v| println!("{}: {}", label, v)));
        self.subscriptions.add(subscription.clone())?;
        Ok(subscription)
    }

    fn stop(&self) -> usize {
        self.subscriptions.dispose_all()
    }
}

fn main() -> Result<(), FlowError> {
    let counter = Counter::start();
    let first = counter.watch("first")?;
    counter.watch("second")?;

    counter.main_loop.run_for(Duration::from_millis(20));

    println!("cancelled {} subscriptions", counter.stop());
    println!("second stop cancels {}", counter.stop());
    assert!(first.is_cancelled());

    // The registry refuses new work once stopped.
    match counter.watch("late") {
        Err(FlowError::UseAfterDispose) => println!("late subscription rejected"),
        other => println!("unexpected: {:?}", other),
    }
    Ok(())
}
