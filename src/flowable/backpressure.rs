//! Backpressure strategies for flowables.
//!
//! A flowable only delivers as many values as its consumer requested. Values
//! arriving without outstanding demand are handled by the configured
//! [`BackpressureStrategy`]:
//!
//! - **`Drop`**: discards the value silently.
//! - **`Buffer`**: holds up to `capacity` values, then fails with
//!   [`FlowError::BufferOverflow`].
//! - **`Latest`**: holds only the newest value, discarding the one it replaces.
//! - **`Error`**: fails with [`FlowError::MissingBackpressure`] immediately.
//!
//! Demand follows the Reactive Streams `request(n)` model. [`UNBOUNDED`] demand
//! never runs out. Requested values still wait in a delivery queue bounded by
//! the prefetch size, so a consumer that requested everything but stopped
//! draining falls back to the strategy too.
//!
//! [`UNBOUNDED`]: crate::subscribe::UNBOUNDED

use std::collections::VecDeque;

use crate::{subscribe::UNBOUNDED, FlowError};

/// Strategy applied to a value that arrives while the consumer has no demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressureStrategy {
    /// Discard the value.
    Drop,
    /// Hold values until requested; overflowing `capacity` is an error.
    Buffer { capacity: usize },
    /// Hold only the most recent value.
    Latest,
    /// Signal [`FlowError::MissingBackpressure`].
    Error,
}

/// What happens to one incoming value.
#[derive(Debug, PartialEq, Eq)]
pub enum Decision<T> {
    /// Demand was available. The value goes to the consumer next.
    Deliver(T),
    /// The value was stored in the buffer until demand arrives.
    Hold,
    /// The value was discarded.
    Drop(T),
    /// The strategy gave up. The stream must terminate with this error.
    Error(FlowError),
}

/// Per-subscription buffer between producer and consumer.
///
/// `ready` values already consumed demand and wait for delivery. At most
/// `prefetch` of them are queued at once, however much the consumer requested.
/// `held` values wait for demand or for room in `ready`. While anything is held,
/// either there is no outstanding credit or `ready` is full.
#[derive(Debug)]
pub struct BufferState<T> {
    ready: VecDeque<T>,
    held: VecDeque<T>,
    prefetch: usize,
    credit: u64,
    dropped: u64,
}

impl<T> BufferState<T> {
    /// An empty buffer queueing at most `prefetch` values for delivery.
    #[must_use]
    pub fn new(prefetch: usize) -> Self {
        BufferState {
            ready: VecDeque::new(),
            held: VecDeque::new(),
            prefetch: prefetch.max(1),
            credit: 0,
            dropped: 0,
        }
    }

    /// Adds `n` to the outstanding demand and promotes held values, oldest
    /// first, while demand and room last.
    pub fn grant(&mut self, n: u64) {
        self.credit = self.credit.saturating_add(n);
        self.refill();
    }

    /// Outstanding demand not yet matched by a value.
    #[must_use]
    pub fn credit(&self) -> u64 {
        self.credit
    }

    /// Values discarded by `Drop` and `Latest`.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    #[must_use]
    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    #[must_use]
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Takes the next value waiting for delivery and moves a held one up into
    /// the freed slot.
    pub fn pop_ready(&mut self) -> Option<T> {
        let v = self.ready.pop_front()?;
        self.refill();
        Some(v)
    }

    pub(crate) fn push_ready(&mut self, v: T) {
        self.ready.push_back(v);
    }

    /// `true` when nothing waits for delivery or demand.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.ready.is_empty() && self.held.is_empty()
    }

    /// Drops held values, keeping what already consumed demand.
    pub(crate) fn discard_held(&mut self) {
        self.held.clear();
    }

    /// Drops everything.
    pub fn release(&mut self) {
        self.ready.clear();
        self.held.clear();
    }

    fn has_room(&self) -> bool {
        self.credit > 0 && self.ready.len() < self.prefetch
    }

    fn refill(&mut self) {
        while self.has_room() {
            let Some(v) = self.held.pop_front() else {
                break;
            };
            self.consume_credit();
            self.ready.push_back(v);
        }
    }

    fn consume_credit(&mut self) {
        if self.credit != UNBOUNDED {
            self.credit -= 1;
        }
    }
}

impl BackpressureStrategy {
    /// Decides the fate of `incoming` given the current buffer.
    ///
    /// A value passes straight through only while there is demand and room in
    /// the delivery queue. Consumes one unit of demand on [`Decision::Deliver`],
    /// stores the value on [`Decision::Hold`]. The caller queues delivered
    /// values for the consumer.
    pub fn apply<T>(&self, incoming: T, state: &mut BufferState<T>) -> Decision<T> {
        if state.has_room() {
            state.consume_credit();
            return Decision::Deliver(incoming);
        }
        match *self {
            BackpressureStrategy::Drop => {
                state.dropped += 1;
                Decision::Drop(incoming)
            }
            BackpressureStrategy::Buffer { capacity } => {
                if state.held.len() < capacity {
                    state.held.push_back(incoming);
                    Decision::Hold
                } else {
                    Decision::Error(FlowError::BufferOverflow { capacity })
                }
            }
            BackpressureStrategy::Latest => {
                if state.held.pop_front().is_some() {
                    state.dropped += 1;
                }
                state.held.push_back(incoming);
                Decision::Hold
            }
            BackpressureStrategy::Error => Decision::Error(FlowError::MissingBackpressure),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackpressureStrategy::Drop => "drop",
            BackpressureStrategy::Buffer { .. } => "buffer",
            BackpressureStrategy::Latest => "latest",
            BackpressureStrategy::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer_all<T>(
        strategy: BackpressureStrategy,
        state: &mut BufferState<T>,
        values: impl IntoIterator<Item = T>,
    ) -> Vec<Decision<T>> {
        values
            .into_iter()
            .map(|v| strategy.apply(v, state))
            .collect()
    }

    #[test]
    fn any_strategy_delivers_with_demand() {
        for strategy in [
            BackpressureStrategy::Drop,
            BackpressureStrategy::Buffer { capacity: 1 },
            BackpressureStrategy::Latest,
            BackpressureStrategy::Error,
        ] {
            let mut state = BufferState::new(16);
            state.grant(1);
            assert_eq!(strategy.apply(7, &mut state), Decision::Deliver(7));
            assert_eq!(state.credit(), 0);
        }
    }

    #[test]
    fn drop_discards_without_demand() {
        let mut state = BufferState::new(16);
        state.grant(2);
        let decisions = offer_all(BackpressureStrategy::Drop, &mut state, 1..=4);

        assert_eq!(
            decisions,
            vec![
                Decision::Deliver(1),
                Decision::Deliver(2),
                Decision::Drop(3),
                Decision::Drop(4)
            ]
        );
        assert_eq!(state.dropped(), 2);
    }

    #[test]
    fn buffer_overflows_past_capacity() {
        let strategy = BackpressureStrategy::Buffer { capacity: 2 };
        let mut state = BufferState::new(16);
        let decisions = offer_all(strategy, &mut state, 1..=3);

        assert_eq!(
            decisions,
            vec![
                Decision::Hold,
                Decision::Hold,
                Decision::Error(FlowError::BufferOverflow { capacity: 2 })
            ]
        );
        assert_eq!(state.held_len(), 2);
    }

    #[test]
    fn grant_promotes_held_in_order() {
        let strategy = BackpressureStrategy::Buffer { capacity: 8 };
        let mut state = BufferState::new(16);
        offer_all(strategy, &mut state, 1..=5);

        state.grant(3);
        let promoted: Vec<_> = std::iter::from_fn(|| state.pop_ready()).collect();
        assert_eq!(promoted, vec![1, 2, 3]);
        assert_eq!(state.held_len(), 2);
        assert_eq!(state.credit(), 0);
    }

    #[test]
    fn latest_keeps_newest() {
        let mut state = BufferState::new(16);
        offer_all(BackpressureStrategy::Latest, &mut state, 1..=4);

        assert_eq!(state.held_len(), 1);
        assert_eq!(state.dropped(), 3);

        state.grant(1);
        assert_eq!(state.pop_ready(), Some(4));
    }

    #[test]
    fn error_strategy_fails_without_demand() {
        let mut state = BufferState::new(16);
        assert_eq!(
            BackpressureStrategy::Error.apply(1, &mut state),
            Decision::Error(FlowError::MissingBackpressure)
        );
    }

    #[test]
    fn unbounded_demand_never_runs_out() {
        let mut state = BufferState::new(16);
        state.grant(UNBOUNDED);
        state.grant(5);
        for i in 0..1000 {
            assert_eq!(
                BackpressureStrategy::Drop.apply(i, &mut state),
                Decision::Deliver(i)
            );
            assert_eq!(state.pop_ready(), Some(i));
        }
        assert_eq!(state.credit(), UNBOUNDED);
    }

    #[test]
    fn full_delivery_queue_falls_back_to_strategy() {
        let mut state = BufferState::new(2);
        state.grant(UNBOUNDED);
        let decisions = offer_all(BackpressureStrategy::Drop, &mut state, 1..=4);

        assert_eq!(
            decisions,
            vec![
                Decision::Deliver(1),
                Decision::Deliver(2),
                Decision::Drop(3),
                Decision::Drop(4)
            ]
        );
        assert_eq!(state.ready_len(), 2);

        assert_eq!(state.pop_ready(), Some(1));
        assert_eq!(BackpressureStrategy::Drop.apply(5, &mut state), Decision::Deliver(5));
    }

    #[test]
    fn popping_promotes_held_values() {
        let strategy = BackpressureStrategy::Buffer { capacity: 4 };
        let mut state = BufferState::new(2);
        state.grant(UNBOUNDED);
        offer_all(strategy, &mut state, 1..=5);
        assert_eq!(state.ready_len(), 2);
        assert_eq!(state.held_len(), 3);

        let delivered: Vec<_> = std::iter::from_fn(|| state.pop_ready()).collect();
        assert_eq!(delivered, vec![1, 2, 3, 4, 5]);
        assert!(state.is_drained());
    }

    #[test]
    fn latest_replaces_while_queue_is_full() {
        let mut state = BufferState::new(1);
        state.grant(UNBOUNDED);
        offer_all(BackpressureStrategy::Latest, &mut state, 1..=10);

        assert_eq!(state.ready_len(), 1);
        assert_eq!(state.held_len(), 1);
        assert_eq!(state.dropped(), 8);
        assert_eq!(state.pop_ready(), Some(1));
        assert_eq!(state.pop_ready(), Some(10));
    }
}
