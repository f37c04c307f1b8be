// ── Reactive catalog subscription ──

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use super::NetworkSnapshot;

/// A subscription to catalog snapshots.
///
/// Provides point-in-time access plus change notification via
/// [`changed()`](Self::changed) or by converting to a `Stream`.
pub struct NetworkStream {
    current: NetworkSnapshot,
    receiver: watch::Receiver<NetworkSnapshot>,
}

impl NetworkStream {
    pub(crate) fn new(receiver: watch::Receiver<NetworkSnapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &NetworkSnapshot {
        &self.current
    }

    /// The latest published snapshot.
    pub fn latest(&self) -> NetworkSnapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next publication. `None` once the catalog is dropped.
    pub async fn changed(&mut self) -> Option<NetworkSnapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    pub fn into_stream(self) -> NetworkWatchStream {
        NetworkWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding a snapshot per catalog publication.
pub struct NetworkWatchStream {
    inner: WatchStream<NetworkSnapshot>,
}

impl Stream for NetworkWatchStream {
    type Item = NetworkSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
