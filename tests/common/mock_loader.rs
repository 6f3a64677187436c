//! Component loader whose loads block until the test releases them
//!
//! Lets a test observe orchestrator state while a load is in flight.

use async_trait::async_trait;
use folio::gateway::{ComponentLoader, GatewayError, GatewayResult};
use folio::Component;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

#[derive(Default)]
pub struct GatedLoader {
    calls: Mutex<HashMap<Component, usize>>,
    completed: Mutex<HashMap<Component, usize>>,
    gate: Notify,
    open: AtomicBool,
    fail_with: Mutex<Option<String>>,
}

impl GatedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// A loader that never blocks
    pub fn open() -> Self {
        let loader = Self::default();
        loader.open.store(true, Ordering::SeqCst);
        loader
    }

    /// Let every pending and future load finish
    pub fn release(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.gate.notify_waiters();
    }

    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    pub fn clear_failure(&self) {
        *self.fail_with.lock().unwrap() = None;
    }

    pub fn calls(&self, component: Component) -> usize {
        self.calls.lock().unwrap().get(&component).copied().unwrap_or(0)
    }

    pub fn completed(&self, component: Component) -> usize {
        self.completed.lock().unwrap().get(&component).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ComponentLoader for GatedLoader {
    async fn load(&self, component: Component) -> GatewayResult<()> {
        *self.calls.lock().unwrap().entry(component).or_insert(0) += 1;
        while !self.open.load(Ordering::SeqCst) {
            let notified = self.gate.notified();
            if self.open.load(Ordering::SeqCst) {
                break;
            }
            notified.await;
        }
        let failure = self.fail_with.lock().unwrap().clone();
        if let Some(message) = failure {
            return Err(GatewayError::Load(message));
        }
        *self.completed.lock().unwrap().entry(component).or_insert(0) += 1;
        Ok(())
    }
}
