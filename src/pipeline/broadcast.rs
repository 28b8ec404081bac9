//! Write-once broadcast values shared read-only by every stage worker.
//!
//! A [`BroadcastSlot`] is created either already holding its value (the
//! header) or pending (the recalibration model). Readers call
//! [`BroadcastSlot::get`], which fails with `NotReady` until the value is
//! published, or await [`BroadcastSlot::wait`]. Publication happens exactly
//! once; every reader afterwards sees the same `Arc`.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::pipeline::error::BroadcastError;

pub struct BroadcastSlot<T> {
    name: &'static str,
    tx: watch::Sender<Option<Arc<T>>>,
}

impl<T> BroadcastSlot<T> {
    /// A slot whose value will be published later
    #[must_use]
    pub fn pending(name: &'static str) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { name, tx }
    }

    /// A slot published from the start
    #[must_use]
    pub fn ready(name: &'static str, value: T) -> Self {
        let (tx, _rx) = watch::channel(Some(Arc::new(value)));
        Self { name, tx }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The published value
    ///
    /// # Errors
    ///
    /// Returns `BroadcastError::NotReady` if nothing has been published yet.
    pub fn get(&self) -> Result<Arc<T>, BroadcastError> {
        self.tx
            .borrow()
            .as_ref()
            .map(Arc::clone)
            .ok_or(BroadcastError::NotReady(self.name))
    }

    /// Publish the value. Only the first call succeeds.
    ///
    /// # Errors
    ///
    /// Returns `BroadcastError::AlreadyPublished` if the slot already holds a value.
    pub fn publish(&self, value: T) -> Result<Arc<T>, BroadcastError> {
        let value = Arc::new(value);
        let published = self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(Arc::clone(&value));
            true
        });

        if published {
            Ok(value)
        } else {
            Err(BroadcastError::AlreadyPublished(self.name))
        }
    }

    /// Suspend until the value is published
    ///
    /// # Errors
    ///
    /// Returns `BroadcastError::NotReady` only if the slot is dropped while waiting.
    pub async fn wait(&self) -> Result<Arc<T>, BroadcastError> {
        let mut rx = self.tx.subscribe();
        let published = rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|slot| slot.as_ref().map(Arc::clone));
        published.ok_or(BroadcastError::NotReady(self.name))
    }
}

impl<T> fmt::Debug for BroadcastSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastSlot")
            .field("name", &self.name)
            .field("ready", &self.is_ready())
            .finish()
    }
}
