//! A `Flowable` with the `Drop` strategy. The consumer requests a few values;
//! everything the producer emits past that demand is discarded without an error.
//!
//! To run this example, execute `cargo run --example flowable_drop`.
//! Set `RUST_LOG=rxflow=trace` to see every dropped value.

use std::time::Duration;

use rxflow::{
    subscribe::Subscriber, BackpressureStrategy, MainLoop, Observable, ObservableExt, Scheduler,
    Subscribeable,
};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let main_loop = MainLoop::new();

    // Ask for three values only.
    let mut observer = Subscriber::on_next(|v| println!("Emitted {}", v)).with_request(3);
    observer.on_error(|e| eprintln!("Error {}", e));
    observer.on_complete(|| println!("Completed"));

    let subscription = Observable::from_iter(0..100)
        .to_flowable(BackpressureStrategy::Drop)
        .subscribe_on(Scheduler::io())
        .observe_on(main_loop.scheduler())
        .subscribe(observer);

    main_loop.run_until(Duration::from_secs(2), || subscription.is_closed());

    // The single-value case from a count lookup: one value, then completion.
    let subscription = Observable::just(42)
        .to_flowable(BackpressureStrategy::Drop)
        .subscribe_on(Scheduler::io())
        .observe_on(main_loop.scheduler())
        .subscribe(Subscriber::new(
            |count| println!("Count {}", count),
            |e| eprintln!("Error {}", e),
            || println!("Count completed"),
        ));

    main_loop.run_until(Duration::from_secs(2), || subscription.is_closed());
}
