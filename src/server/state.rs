use crate::config::Config;
use crate::notify::ProgressSink;
use crate::proxy::ResilienceProxy;
use crate::retry::RetryOrchestrator;
use std::sync::{Arc, Mutex};

/// Opaque allow/deny gate for admin-only operations. Backed by a bearer
/// token here; callers only ever see allow or deny.
pub struct AdminGate {
    token: Option<String>,
}

impl AdminGate {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }

    /// No configured token means every admin operation is denied.
    pub fn allows(&self, authorization: Option<&str>) -> bool {
        match (&self.token, authorization) {
            (Some(token), Some(header)) => header == format!("Bearer {}", token),
            _ => false,
        }
    }
}

pub struct AppState {
    pub proxy: Arc<ResilienceProxy>,
    pub retry: RetryOrchestrator,
    pub config: Mutex<Config>,
    pub admin: AdminGate,
    pub sink: Arc<dyn ProgressSink>,
}
