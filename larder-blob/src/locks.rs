use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::SlotKind;

/// One async mutex per slot.
///
/// Operations on the same slot run one at a time; different slots never
/// contend.
#[derive(Debug, Default)]
pub struct SlotLocks {
    locks: [Arc<Mutex<()>>; SlotKind::COUNT],
}

impl SlotLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `slot`. The guard is owned so it can
    /// move into a spawned task.
    pub async fn acquire(&self, slot: SlotKind) -> OwnedMutexGuard<()> {
        self.locks[slot.index()].clone().lock_owned().await
    }

    /// Every slot, always taken in the same order.
    pub async fn acquire_all(&self) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(SlotKind::COUNT);
        for slot in SlotKind::ALL {
            guards.push(self.acquire(slot).await);
        }
        guards
    }
}
