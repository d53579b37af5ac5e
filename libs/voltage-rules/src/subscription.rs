//! Subscription set reconciliation

use crate::log_once::LogOnce;
use rustc_hash::FxHashSet;
use tracing::{debug, warn};
use voltage_rtdb::Subscriber;

/// Outcome of one [`SubscriptionSync::sync`] pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub subscribed: Vec<String>,
    pub unsubscribed: Vec<String>,
    pub failed: Vec<String>,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.subscribed.is_empty() && self.unsubscribed.is_empty() && self.failed.is_empty()
    }
}

/// Tracks which ids are currently subscribed
///
/// Failed subscribes stay out of the set and are retried on the next
/// sync; failed unsubscribes stay in it for the same reason.
#[derive(Debug, Default)]
pub struct SubscriptionSync {
    active: FxHashSet<String>,
}

impl SubscriptionSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_subscribed(&self, id: &str) -> bool {
        self.active.contains(id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Bring the subscription set in line with `desired`
    ///
    /// Stale ids are unsubscribed before new ids are subscribed.
    pub async fn sync(
        &mut self,
        desired: &[String],
        subscriber: &dyn Subscriber,
        log_once: &LogOnce,
    ) -> SyncReport {
        let wanted: FxHashSet<&str> = desired.iter().map(String::as_str).collect();
        let mut report = SyncReport::default();

        let mut stale: Vec<String> = self
            .active
            .iter()
            .filter(|id| !wanted.contains(id.as_str()))
            .cloned()
            .collect();
        stale.sort();

        for id in stale {
            match subscriber.unsubscribe(&id).await {
                Ok(()) => {
                    self.active.remove(&id);
                    log_once.forget(&format!("unsubscribe:{}", id));
                    report.unsubscribed.push(id);
                },
                Err(e) => {
                    if log_once.first(&format!("unsubscribe:{}", id)) {
                        warn!("Unsubscribe {} failed: {}", id, e);
                    }
                    report.failed.push(id);
                },
            }
        }

        for id in desired {
            if self.active.contains(id) {
                continue;
            }
            match subscriber.subscribe(id).await {
                Ok(()) => {
                    self.active.insert(id.clone());
                    log_once.forget(&format!("subscribe:{}", id));
                    report.subscribed.push(id.clone());
                },
                Err(e) => {
                    if log_once.first(&format!("subscribe:{}", id)) {
                        warn!("Subscribe {} failed: {}", id, e);
                    }
                    report.failed.push(id.clone());
                },
            }
        }

        if !report.is_noop() {
            debug!(
                "Subscriptions: +{} -{} failed {} (active {})",
                report.subscribed.len(),
                report.unsubscribed.len(),
                report.failed.len(),
                self.active.len()
            );
        }
        report
    }
}
