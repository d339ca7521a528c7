use std::{
    sync::mpsc::{self, RecvTimeoutError},
    time::{Duration, Instant},
};

use tracing::trace;

use super::{Scheduler, Work};
use crate::FlowError;

/// Foreground serializer: a single-consumer job queue driven by its owner.
///
/// Every [`Scheduler`] obtained from [`MainLoop::scheduler`] posts into the
/// same queue. Jobs run in the order they were posted, one at a time, on the
/// thread calling one of the `run_*` methods. Dropping the loop closes it;
/// later posts fail with [`FlowError::SchedulerClosed`].
pub struct MainLoop {
    sender: mpsc::Sender<Work>,
    receiver: mpsc::Receiver<Work>,
}

/// Posting side of a [`MainLoop`].
#[derive(Clone)]
pub struct MainHandle {
    sender: mpsc::Sender<Work>,
}

impl MainHandle {
    pub(crate) fn post(&self, work: Work) -> Result<(), FlowError> {
        self.sender
            .send(work)
            .map_err(|_| FlowError::SchedulerClosed {
                context: "foreground",
            })
    }
}

impl Default for MainLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl MainLoop {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        MainLoop { sender, receiver }
    }

    /// A foreground scheduler posting into this loop.
    #[must_use]
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::Foreground(MainHandle {
            sender: self.sender.clone(),
        })
    }

    /// Runs queued jobs, including jobs they queue, until the queue is empty.
    /// Never blocks. Returns how many jobs ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            ran += 1;
        }
        trace!(ran, "main loop idle");
        ran
    }

    /// Runs jobs as they arrive until `duration` elapses. Returns how many jobs ran.
    pub fn run_for(&self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut ran = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.receiver.recv_timeout(remaining) {
                Ok(job) => {
                    job();
                    ran += 1;
                }
                Err(_) => break,
            }
        }
        ran
    }

    /// Runs jobs as they arrive until `done` returns `true` or `timeout` elapses.
    ///
    /// `done` is checked before waiting and after every job. Returns its last
    /// answer.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if done() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.receiver.recv_timeout(remaining) {
                Ok(job) => job(),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                    return done();
                }
            }
        }
    }
}
