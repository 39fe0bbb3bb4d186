//! Draining the next pipeline stage in async tests.

use std::time::Duration;

use tokio::{sync::mpsc::UnboundedReceiver, time::timeout};

/// Receives exactly `count` forwarded items, waiting at most `within` in total.
///
/// Returns `None` if the channel closes or the deadline passes first.
pub async fn recv_forwarded<T>(
    rx: &mut UnboundedReceiver<T>,
    count: usize,
    within: Duration,
) -> Option<Vec<T>> {
    let drain = async {
        let mut items = Vec::with_capacity(count);
        while items.len() < count {
            items.push(rx.recv().await?);
        }
        Some(items)
    };
    timeout(within, drain).await.ok().flatten()
}
