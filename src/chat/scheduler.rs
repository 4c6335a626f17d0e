//! The poll task: one fetch-parse-merge cycle per tick.

use super::merger::Merger;
use super::source::EntrySource;
use super::{ChatError, FeedTarget, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Everything the poll task owns for the lifetime of a session.
pub(crate) struct Poller {
    pub source: Arc<dyn EntrySource>,
    pub target: FeedTarget,
    pub merger: Merger,
    pub period: Duration,
    pub queue: mpsc::Sender<Message>,
    pub degraded: watch::Sender<bool>,
    pub cancel: CancellationToken,
}

impl Poller {
    /// Runs until cancelled, until the pacer goes away, or until the backend
    /// reports an expired token.
    ///
    /// The first tick fires one full period after start, the prime fetch
    /// having just run. Cycles are awaited inline, so ticks that elapse
    /// while one is outstanding are skipped rather than queued.
    pub async fn run(mut self) -> Result<(), ChatError> {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    tracing::debug!(tag = %self.target.tag, "Poll task cancelled");
                    return Ok(());
                }

                _ = ticker.tick() => {}
            }

            let cursor = self.merger.cursor().cloned();
            let fetched = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Ok(()),
                result = self.source.fetch_since(&self.target, cursor.as_ref()) => result,
            };

            let batch = match fetched {
                Ok(batch) => batch,
                Err(ChatError::TokenExpired) => {
                    tracing::error!(
                        tag = %self.target.tag,
                        backend = self.source.name(),
                        "Access token rejected, stopping session"
                    );
                    return Err(ChatError::TokenExpired);
                }
                Err(e) => {
                    tracing::warn!(
                        tag = %self.target.tag,
                        backend = self.source.name(),
                        error = %e,
                        "Poll cycle failed, retrying on next tick"
                    );
                    self.set_degraded(true);
                    continue;
                }
            };

            let fetched_count = batch.len();
            let accepted = self.merger.merge(batch);
            self.set_degraded(false);
            tracing::debug!(
                tag = %self.target.tag,
                fetched = fetched_count,
                accepted = accepted.len(),
                "Poll cycle complete"
            );

            for message in accepted {
                tokio::select! {
                    biased;

                    _ = self.cancel.cancelled() => return Ok(()),
                    sent = self.queue.send(message) => {
                        if sent.is_err() {
                            tracing::debug!(tag = %self.target.tag, "Pacer gone, stopping poll task");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn set_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::parser::LinkStyle;
    use crate::chat::source::{BatchOrder, Cursor, CursorKind};
    use crate::chat::{FeedKind, RawEntry};
    use crate::http::FetchError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays scripted results and records the cursor of every call.
    struct Scripted {
        results: Mutex<VecDeque<Result<Vec<RawEntry>, ChatError>>>,
        cursors: Mutex<Vec<Option<String>>>,
    }

    impl Scripted {
        fn new(results: Vec<Result<Vec<RawEntry>, ChatError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                cursors: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl EntrySource for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }
        fn batch_order(&self) -> BatchOrder {
            BatchOrder::OldestFirst
        }
        fn cursor_kind(&self) -> CursorKind {
            CursorKind::RemoteId
        }
        fn link_style(&self) -> LinkStyle {
            LinkStyle::Label
        }
        async fn fetch_initial(&self, _: &FeedTarget) -> Result<Vec<RawEntry>, ChatError> {
            Ok(Vec::new())
        }
        async fn fetch_since(
            &self,
            _: &FeedTarget,
            cursor: Option<&Cursor>,
        ) -> Result<Vec<RawEntry>, ChatError> {
            self.cursors.lock().unwrap().push(cursor.map(|c| c.id.clone()));
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// Takes longer than several poll periods to answer; each call yields
    /// one new entry.
    struct Slow {
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        cursors: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl EntrySource for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }
        fn batch_order(&self) -> BatchOrder {
            BatchOrder::OldestFirst
        }
        fn cursor_kind(&self) -> CursorKind {
            CursorKind::RemoteId
        }
        fn link_style(&self) -> LinkStyle {
            LinkStyle::Label
        }
        async fn fetch_initial(&self, _: &FeedTarget) -> Result<Vec<RawEntry>, ChatError> {
            Ok(Vec::new())
        }
        async fn fetch_since(
            &self,
            _: &FeedTarget,
            cursor: Option<&Cursor>,
        ) -> Result<Vec<RawEntry>, ChatError> {
            self.cursors.lock().unwrap().push(cursor.map(|c| c.id.clone()));
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![entry(&(call + 2).to_string(), "late")])
        }
    }

    fn entry(id: &str, text: &str) -> RawEntry {
        RawEntry {
            id: id.into(),
            body: Some(text.into()),
            ..Default::default()
        }
    }

    fn poller(
        source: Arc<dyn EntrySource>,
    ) -> (Poller, mpsc::Receiver<Message>, watch::Receiver<bool>, CancellationToken) {
        let (queue_tx, queue_rx) = mpsc::channel(16);
        let (degraded_tx, degraded_rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        let mut merger = Merger::new(
            BatchOrder::OldestFirst,
            CursorKind::RemoteId,
            LinkStyle::Label,
            NonZeroUsize::new(16).unwrap(),
        );
        merger.prime(vec![entry("1", "hello")]);
        let poller = Poller {
            source,
            target: FeedTarget {
                tag: "mecz".into(),
                kind: FeedKind::All,
            },
            merger,
            period: Duration::from_secs(1),
            queue: queue_tx,
            degraded: degraded_tx,
            cancel: cancel.clone(),
        };
        (poller, queue_rx, degraded_rx, cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_waits_one_period() {
        let source = Scripted::new(vec![Ok(vec![entry("2", "world")])]);
        let (poller, mut queue, _degraded, cancel) = poller(source.clone());
        let handle = tokio::spawn(poller.run());

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(source.cursors.lock().unwrap().is_empty());

        let message = queue.recv().await.unwrap();
        assert_eq!(message.id, "2");
        assert_eq!(*source.cursors.lock().unwrap(), vec![Some("1".to_string())]);

        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_sets_degraded_and_keeps_cursor() {
        let source = Scripted::new(vec![
            Err(ChatError::TransientFetch(FetchError::Timeout)),
            Ok(vec![entry("2", "world")]),
        ]);
        let (poller, mut queue, mut degraded, cancel) = poller(source.clone());
        let handle = tokio::spawn(poller.run());

        degraded.changed().await.unwrap();
        assert!(*degraded.borrow());

        let message = queue.recv().await.unwrap();
        assert_eq!(message.id, "2");
        assert!(!*degraded.borrow());
        assert_eq!(
            *source.cursors.lock().unwrap(),
            vec![Some("1".to_string()), Some("1".to_string())]
        );

        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_during_slow_fetch_are_coalesced() {
        let source = Arc::new(Slow {
            delay: Duration::from_millis(3500),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            cursors: Mutex::new(Vec::new()),
        });
        let (poller, mut queue, _degraded, cancel) = poller(source.clone());
        let handle = tokio::spawn(poller.run());

        assert_eq!(queue.recv().await.unwrap().id, "2");
        assert_eq!(queue.recv().await.unwrap().id, "3");
        tokio::time::sleep(Duration::from_secs(1)).await;

        let calls = source.calls.load(Ordering::SeqCst);
        assert!((2..=3).contains(&calls), "{calls} fetches in ~10s");
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
        let cursors = source.cursors.lock().unwrap().clone();
        assert_eq!(cursors[..2], [Some("1".to_string()), Some("2".to_string())]);

        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_expiry_ends_task_with_error() {
        let source = Scripted::new(vec![Err(ChatError::TokenExpired)]);
        let (poller, mut queue, _degraded, _cancel) = poller(source);
        let handle = tokio::spawn(poller.run());

        assert!(matches!(handle.await.unwrap(), Err(ChatError::TokenExpired)));
        assert!(queue.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_receiver_dropped() {
        let source = Scripted::new(vec![Ok(vec![entry("2", "a"), entry("3", "b")])]);
        let (poller, queue, _degraded, _cancel) = poller(source);
        drop(queue);

        let handle = tokio::spawn(poller.run());
        assert!(handle.await.unwrap().is_ok());
    }
}
