//! Fault injection shared by the in-memory adapters.
//!
//! Lets tests make a store unreachable or slow without a real backend.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};

/// Switchable failure and latency for an in-memory adapter
#[derive(Debug)]
pub struct FaultInjector {
    name: &'static str,
    available: AtomicBool,
    latency_ms: AtomicU64,
}

impl FaultInjector {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Make every subsequent call fail (`false`) or succeed (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Delay every subsequent call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Apply the configured latency, then fail if unavailable.
    pub async fn check(&self, operation: &str) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.is_available() {
            return Err(Error::StoreUnavailable(format!(
                "{} rejected {}",
                self.name, operation
            )));
        }
        Ok(())
    }
}
