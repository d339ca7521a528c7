//! An eager `Observable` that loads a count on a background worker and delivers
//! it on the foreground loop.
//!
//! Nothing limits how fast the producer pushes values here. See `flowable_drop`
//! for the backpressure-aware variant.
//!
//! To run this example, execute `cargo run --example eager_observable`.

use std::time::Duration;

use rxflow::{subscribe::Subscriber, MainLoop, Observable, ObservableExt, Scheduler, Subscribeable};

// Stands in for a slow lookup, e.g. reading a counter from disk.
fn get_count() -> Result<Option<u32>, std::io::Error> {
    std::thread::sleep(Duration::from_millis(50));
    Ok(Some(42))
}

fn main() {
    // The harness owns the foreground loop, like a UI thread would.
    let main_loop = MainLoop::new();

    let mut observer = Subscriber::on_next(|count| {
        println!(
            "Count {} received on {:?}",
            count,
            std::thread::current().name()
        )
    });
    observer.on_error(|e| eprintln!("Error {}", e));
    observer.on_complete(|| println!("Completed"));

    let subscription = Observable::from_fn(get_count)
        // Produce on a worker thread named `rxflow-io`.
        .subscribe_on(Scheduler::io())
        // Deliver on whatever thread drives `main_loop`.
        .observe_on(main_loop.scheduler())
        .subscribe(observer);

    // Drive the loop until the stream finishes.
    if !main_loop.run_until(Duration::from_secs(2), || subscription.is_closed()) {
        eprintln!("stream did not finish in time");
    }
}
