//! `rxflow`: eager and backpressure-aware reactive streams with explicit
//! execution-context hops and collective subscription disposal.
//!
//! - [`Observable`] pushes every value as soon as the producer makes it.
//! - [`Flowable`] delivers only what the consumer requested and applies a
//!   [`BackpressureStrategy`] to the rest.
//! - [`Scheduler`] names where work runs: inline, on a background worker, or on
//!   a [`MainLoop`] driven by its owner.
//! - [`subscribe::Subscription`] cancels one delivery;
//!   [`CompositeSubscription`] cancels many at once.
//!
//! # Example
//!
//! Produce on a worker, deliver on the foreground loop, dispose everything when
//! the owning component stops:
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use rxflow::{
//!     subscribe::Subscriber, BackpressureStrategy, CompositeSubscription, MainLoop, Observable,
//!     ObservableExt, Scheduler, Subscribeable,
//! };
//!
//! let main_loop = MainLoop::new();
//! let registry = CompositeSubscription::new();
//!
//! let subscription = Observable::just(42)
//!     .to_flowable(BackpressureStrategy::Drop)
//!     .subscribe_on(Scheduler::io())
//!     .observe_on(main_loop.scheduler())
//!     .subscribe(Subscriber::on_next(|v| println!("received {}", v)));
//! registry.add(subscription.clone()).unwrap();
//!
//! main_loop.run_until(Duration::from_secs(1), || subscription.is_closed());
//! registry.dispose_all();
//! ```

mod config;
mod errors;
pub mod flowable;
pub mod observable;
pub mod observer;
pub mod scheduler;
mod subscription;

pub use config::FlowConfig;
pub use errors::*;
pub use flowable::{BackpressureStrategy, Flowable};
pub use observable::{Observable, ObservableExt};
pub use observer::Observer;
pub use scheduler::{run_on, MainLoop, Scheduler};
pub use subscription::composite::CompositeSubscription;
pub use subscription::subscribe;
pub use subscribe::{Subscribeable, Unsubscribeable};
