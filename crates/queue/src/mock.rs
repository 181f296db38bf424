//! Mock dispatcher for tests
//!
//! Records every envelope instead of publishing; can be told to fail so the
//! admission rollback path is testable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::{Dispatcher, JobEnvelope, QueueError};

#[derive(Default)]
pub struct MockDispatcher {
    dispatched: Arc<Mutex<Vec<JobEnvelope>>>,
    fail_next: AtomicBool,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All envelopes dispatched so far, in order.
    pub fn dispatched(&self) -> Vec<JobEnvelope> {
        self.dispatched.lock().unwrap().clone()
    }

    /// Make the next dispatch fail once (rollback-path testing).
    pub fn fail_next_dispatch(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Dispatcher for MockDispatcher {
    async fn dispatch(&self, envelope: &JobEnvelope) -> Result<(), QueueError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(QueueError::Request("mock dispatch failure".to_string()));
        }
        self.dispatched.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}
