//! Provides structures and traits related to subscription management.
//!
//! This module includes types such as `Subscriber` for handling observed values,
//! errors, and completions, `Subscription` for cancelling and requesting from
//! streams, and `CompositeSubscription` for cancelling many subscriptions at once.
pub mod composite;
pub mod subscribe;
