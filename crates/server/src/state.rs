//! Application State
//!
//! Shared state across all handlers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use voicebridge_config::Settings;
use voicebridge_persistence::LeadStore;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub settings: Arc<Settings>,
    /// Lead datastore collaborator
    pub lead_store: Arc<dyn LeadStore>,
    /// Active call counter
    active_calls: Arc<AtomicUsize>,
}

impl AppState {
    /// Create new application state
    pub fn new(settings: Settings, lead_store: Arc<dyn LeadStore>) -> Self {
        Self {
            settings: Arc::new(settings),
            lead_store,
            active_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_started(&self) -> usize {
        self.active_calls.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn call_ended(&self) {
        self.active_calls.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn active_calls(&self) -> usize {
        self.active_calls.load(Ordering::Relaxed)
    }
}
