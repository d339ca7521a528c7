use std::sync::{Arc, Mutex};

use rxflow::{subscribe::Subscriber, FlowError, SharedError};

/// Records every signal a subscriber receives.
#[derive(Clone, Default)]
pub struct Emissions {
    pub nexts: Arc<Mutex<Vec<i32>>>,
    pub errors: Arc<Mutex<Vec<SharedError>>>,
    pub completes: Arc<Mutex<usize>>,
}

impl Emissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// A subscriber feeding this record, requesting everything.
    pub fn subscriber(&self) -> Subscriber<i32> {
        let nexts = Arc::clone(&self.nexts);
        let errors = Arc::clone(&self.errors);
        let completes = Arc::clone(&self.completes);

        Subscriber::new(
            move |n| {
                // Track next() calls.
                nexts.lock().unwrap().push(n);
            },
            move |e| {
                // Track error() calls.
                errors.lock().unwrap().push(e);
            },
            move || {
                // Track complete() calls.
                *completes.lock().unwrap() += 1;
            },
        )
    }

    pub fn nexts(&self) -> Vec<i32> {
        self.nexts.lock().unwrap().clone()
    }

    pub fn completes(&self) -> usize {
        *self.completes.lock().unwrap()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }

    /// The first error, if the crate raised it.
    pub fn flow_error(&self) -> Option<FlowError> {
        self.errors
            .lock()
            .unwrap()
            .first()
            .and_then(|e| e.downcast_ref::<FlowError>().cloned())
    }
}
