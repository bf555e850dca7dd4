use crate::models::{SearchPage, SearchPhase};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::warn;

/// Full accumulated result list, emitted on every state transition.
///
/// Failures travel here too: read `phase` for the last error.
#[derive(Debug, Clone, PartialEq)]
pub struct ListUpdate<R> {
    pub records: Vec<R>,
    pub phase: SearchPhase,
}

pub type PageUpdate<R> = SearchPage<R>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataUpdate {
    pub total_hits: u64,
    pub total_pages: u32,
}

/// Three independent broadcast channels. Nothing is replayed to late
/// subscribers; query the coordinator's snapshot on attach.
pub struct NotificationHub<R> {
    list: broadcast::Sender<ListUpdate<R>>,
    page: broadcast::Sender<PageUpdate<R>>,
    metadata: broadcast::Sender<MetadataUpdate>,
}

impl<R> NotificationHub<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (list, _) = broadcast::channel(capacity);
        let (page, _) = broadcast::channel(capacity);
        let (metadata, _) = broadcast::channel(capacity);
        Self {
            list,
            page,
            metadata,
        }
    }

    pub fn list_receiver(&self) -> broadcast::Receiver<ListUpdate<R>> {
        self.list.subscribe()
    }

    pub fn page_receiver(&self) -> broadcast::Receiver<PageUpdate<R>> {
        self.page.subscribe()
    }

    pub fn metadata_receiver(&self) -> broadcast::Receiver<MetadataUpdate> {
        self.metadata.subscribe()
    }

    pub fn subscribe_list<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(ListUpdate<R>) + Send + 'static,
    {
        Subscription::forward("list", self.list.subscribe(), callback)
    }

    pub fn subscribe_page<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(PageUpdate<R>) + Send + 'static,
    {
        Subscription::forward("page", self.page.subscribe(), callback)
    }

    pub fn subscribe_metadata<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(MetadataUpdate) + Send + 'static,
    {
        Subscription::forward("metadata", self.metadata.subscribe(), callback)
    }

    pub fn subscriber_counts(&self) -> (usize, usize, usize) {
        (
            self.list.receiver_count(),
            self.page.receiver_count(),
            self.metadata.receiver_count(),
        )
    }

    // Send errors only mean nobody is listening.
    pub(crate) fn emit_list(&self, update: ListUpdate<R>) {
        let _ = self.list.send(update);
    }

    pub(crate) fn emit_page(&self, update: PageUpdate<R>) {
        let _ = self.page.send(update);
    }

    pub(crate) fn emit_metadata(&self, update: MetadataUpdate) {
        let _ = self.metadata.send(update);
    }
}

/// Handle for a callback subscription. Delivery stops on
/// [`Subscription::unsubscribe`] or when the handle is dropped.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    fn forward<T, F>(
        channel: &'static str,
        mut receiver: broadcast::Receiver<T>,
        mut callback: F,
    ) -> Self
    where
        T: Clone + Send + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(update) => callback(update),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(channel, skipped, "subscriber lagged behind, skipping updates");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Self { task }
    }

    pub fn unsubscribe(self) {
        self.task.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn page(records: Vec<&'static str>, page_index: u32) -> PageUpdate<&'static str> {
        SearchPage::new(records, page_index, 5, 3)
    }

    #[tokio::test]
    async fn late_receivers_see_only_future_updates() {
        let hub = NotificationHub::<&'static str>::new(8);
        hub.emit_metadata(MetadataUpdate {
            total_hits: 1,
            total_pages: 1,
        });

        let mut receiver = hub.metadata_receiver();
        hub.emit_metadata(MetadataUpdate {
            total_hits: 7,
            total_pages: 2,
        });

        let update = receiver.recv().await.expect("update is delivered");
        assert_eq!(update.total_hits, 7);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn channels_are_independent() {
        let hub = NotificationHub::<&'static str>::new(8);
        let mut metadata = hub.metadata_receiver();

        hub.emit_page(page(vec!["a", "b"], 0));
        hub.emit_list(ListUpdate {
            records: vec!["a", "b"],
            phase: SearchPhase::Loaded,
        });

        assert!(metadata.try_recv().is_err());
    }

    #[tokio::test]
    async fn lagging_receiver_does_not_block_sender() {
        let hub = NotificationHub::<&'static str>::new(2);
        let mut slow = hub.page_receiver();

        for index in 0..5 {
            hub.emit_page(page(vec!["x"], index));
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(3))));
        let next = slow.recv().await.expect("newest updates remain");
        assert_eq!(next.page_index, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stuck_callback_does_not_hold_back_other_subscribers() {
        let hub = NotificationHub::<&'static str>::new(8);
        let (release, blocked) = std::sync::mpsc::channel::<()>();
        let _stuck = hub.subscribe_list(move |_| {
            let _ = blocked.recv();
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _healthy = hub.subscribe_list(move |update: ListUpdate<&'static str>| {
            let _ = tx.send(update.records.len());
        });

        for records in [vec!["a"], vec!["a", "b"]] {
            hub.emit_list(ListUpdate {
                records,
                phase: SearchPhase::Loaded,
            });
        }

        for expected in [1, 2] {
            let delivered = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("healthy subscriber keeps receiving");
            assert_eq!(delivered, Some(expected));
        }

        drop(release);
    }

    #[tokio::test]
    async fn callback_subscription_delivers_until_unsubscribed() {
        let hub = NotificationHub::<&'static str>::new(8);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = hub.subscribe_page(move |update| {
            let _ = tx.send(update.page_index);
        });

        hub.emit_page(page(vec!["a"], 1));
        let delivered = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("callback runs in time");
        assert_eq!(delivered, Some(1));

        subscription.unsubscribe();
        let closed = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("sender is dropped with the aborted task");
        assert_eq!(closed, None);
        assert_eq!(hub.subscriber_counts().1, 0);
    }
}
