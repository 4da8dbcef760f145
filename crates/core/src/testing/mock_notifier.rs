//! Mock library notifier for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::notifier::{LibraryKind, LibraryNotifier, NotifyResult};

/// Records every notification and answers with a configurable result.
#[derive(Debug)]
pub struct MockNotifier {
    notifications: Arc<RwLock<Vec<LibraryKind>>>,
    result: Arc<RwLock<NotifyResult>>,
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            notifications: Arc::new(RwLock::new(Vec::new())),
            result: Arc::new(RwLock::new(NotifyResult::Ok)),
        }
    }

    /// Result returned by every following `notify`.
    pub async fn set_result(&self, result: NotifyResult) {
        *self.result.write().await = result;
    }

    /// Libraries notified so far, in order.
    pub async fn notifications(&self) -> Vec<LibraryKind> {
        self.notifications.read().await.clone()
    }
}

#[async_trait]
impl LibraryNotifier for MockNotifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn notify(&self, kind: LibraryKind) -> NotifyResult {
        self.notifications.write().await.push(kind);
        *self.result.read().await
    }
}
