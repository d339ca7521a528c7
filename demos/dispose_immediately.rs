//! Subscribing and cancelling right away. The worker may or may not have
//! started, but nothing reaches the consumer.
//!
//! To run this example, execute `cargo run --example dispose_immediately`.

use std::time::Duration;

use rxflow::{
    subscribe::{Subscriber, SubscriptionState},
    MainLoop, Observable, ObservableExt, Scheduler, Subscribeable, Unsubscribeable,
};

fn main() {
    let main_loop = MainLoop::new();

    let mut observer = Subscriber::on_next(|v: u32| println!("Emitted {}", v));
    observer.on_complete(|| println!("Completed"));

    let subscription = Observable::just(42)
        .subscribe_on(Scheduler::io())
        .observe_on(main_loop.scheduler())
        .subscribe(observer);

    // `unsubscribe` consumes the handle; the clone keeps the state observable.
    subscription.clone().unsubscribe();

    let ran = main_loop.run_for(Duration::from_millis(100));
    println!("foreground jobs run: {}", ran);

    assert_eq!(subscription.state(), SubscriptionState::Cancelled);
    // Cancelling again does nothing.
    assert!(!subscription.cancel());
    println!("Nothing was delivered");
}
