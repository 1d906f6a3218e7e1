//! Request analytics
//!
//! Every finished response produces exactly one [`AnalyticsEvent`]. Recorders
//! must never fail the request: persistence errors are logged and dropped.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Details about the requesting client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsEvent {
    pub source: String,
    pub result: i32,
    pub num_rows: u64,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn new(source: &str, result: i32, num_rows: u64, client: &ClientInfo) -> Self {
        Self {
            source: source.to_string(),
            result,
            num_rows,
            ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            timestamp: Utc::now(),
        }
    }
}

pub trait AnalyticsRecorder: Send + Sync {
    fn record(&self, event: AnalyticsEvent);
}

/// Recorder that keeps events in memory
#[derive(Debug, Default)]
pub struct MemoryAnalytics {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl MemoryAnalytics {
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().clone()
    }
}

impl AnalyticsRecorder for MemoryAnalytics {
    fn record(&self, event: AnalyticsEvent) {
        self.events.lock().push(event);
    }
}
