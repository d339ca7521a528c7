//! Execution contexts that stream stages hop between.
//!
//! Producer-side work runs where [`subscribe_on`] puts it, usually a
//! [`Scheduler::Background`] worker that may block. Delivery to the consumer
//! runs where [`observe_on`] puts it, usually the [`MainLoop`] foreground
//! serializer, which runs jobs one at a time in submission order on the thread
//! that drives it.
//!
//! [`subscribe_on`]: crate::ObservableExt::subscribe_on
//! [`observe_on`]: crate::ObservableExt::observe_on

mod background;
mod main_loop;

pub use background::Background;
pub use main_loop::{MainHandle, MainLoop};

use std::fmt;

use crate::{subscribe::SubscriptionHandle, FlowConfig, FlowError};

pub(crate) type Work = Box<dyn FnOnce() + Send + 'static>;

/// Which kind of context a [`Scheduler`] runs work on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// Inline, on the calling thread.
    Immediate,
    /// A dedicated worker that is allowed to block.
    Background,
    /// The single-threaded foreground loop. Must not block.
    Foreground,
}

impl ContextKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextKind::Immediate => "immediate",
            ContextKind::Background => "background",
            ContextKind::Foreground => "foreground",
        }
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A handle to an execution context. Cheap to clone.
#[derive(Clone, Default)]
pub enum Scheduler {
    /// Runs work inline.
    #[default]
    Immediate,
    /// Runs each unit of work on its own background worker.
    Background(Background),
    /// Queues work onto a [`MainLoop`].
    Foreground(MainHandle),
}

impl Scheduler {
    #[must_use]
    pub fn immediate() -> Self {
        Scheduler::Immediate
    }

    /// Background context for blocking I/O with default settings.
    #[must_use]
    pub fn io() -> Self {
        Scheduler::background(&FlowConfig::default())
    }

    #[must_use]
    pub fn background(config: &FlowConfig) -> Self {
        Scheduler::Background(Background::new(config.worker_name.clone()))
    }

    #[must_use]
    pub fn kind(&self) -> ContextKind {
        match self {
            Scheduler::Immediate => ContextKind::Immediate,
            Scheduler::Background(_) => ContextKind::Background,
            Scheduler::Foreground(_) => ContextKind::Foreground,
        }
    }

    /// Runs `work` on this context.
    ///
    /// The returned handle lets callers await background work. Inline and
    /// foreground work return [`SubscriptionHandle::Nil`].
    ///
    /// # Errors
    ///
    /// [`FlowError::SchedulerClosed`] if the foreground loop was dropped,
    /// [`FlowError::Spawn`] if a background thread could not be started.
    pub fn schedule(
        &self,
        work: impl FnOnce() + Send + 'static,
    ) -> Result<SubscriptionHandle, FlowError> {
        match self {
            Scheduler::Immediate => {
                work();
                Ok(SubscriptionHandle::Nil)
            }
            Scheduler::Background(background) => background.spawn(Box::new(work)),
            Scheduler::Foreground(main) => {
                main.post(Box::new(work))?;
                Ok(SubscriptionHandle::Nil)
            }
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scheduler({})", self.kind())
    }
}

/// Runs `work` on `scheduler`. Same as [`Scheduler::schedule`].
///
/// # Errors
///
/// See [`Scheduler::schedule`].
pub fn run_on(
    scheduler: &Scheduler,
    work: impl FnOnce() + Send + 'static,
) -> Result<SubscriptionHandle, FlowError> {
    scheduler.schedule(work)
}
