use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per license ref, so mutations of a license run one at a
/// time while different licenses proceed in parallel.
#[derive(Default)]
pub struct LicenseLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LicenseLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, license_ref: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // drop entries nobody holds or waits on
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(license_ref.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
