use super::merger::Merger;
use super::scheduler::Poller;
use super::source::{ApiSource, EntrySource, ScrapeSource};
use super::{locate, pacer, ChatError, FeedTarget, Message};
use crate::config::{Backend, ChatConfig};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Capacity of the pacer → subscriber channel. The pacer already holds the
/// backlog; this only lets one revealed message wait for a slow reader.
const OUTPUT_CAPACITY: usize = 1;

/// One running chat feed.
///
/// Yields paced [`Message`]s through [`Session::recv`] or as a
/// [`Stream`]. Failed poll cycles do not end the stream; they flip the
/// [`degraded`](Session::degraded) flag until the next successful cycle.
/// The stream ends only after cancellation or an expired token.
///
/// Dropping a session cancels both of its tasks.
pub struct Session {
    target: FeedTarget,
    backend: &'static str,
    messages: mpsc::Receiver<Message>,
    degraded: watch::Receiver<bool>,
    cancel: CancellationToken,
    poll_task: Option<JoinHandle<Result<(), ChatError>>>,
    pacer_task: Option<JoinHandle<()>>,
}

impl Session {
    /// Resolves the chat URL, connects the configured backend, primes the
    /// watermark and starts polling.
    ///
    /// # Errors
    ///
    /// - [`ChatError::UnrecognizedSource`] for a URL that is not a tag stream
    /// - [`ChatError::Credential`] when the API backend cannot authenticate
    /// - [`ChatError::TransientFetch`] when the prime fetch fails
    pub async fn start(
        chat_url: &str,
        config: &ChatConfig,
        client: reqwest::Client,
    ) -> Result<Self, ChatError> {
        let target = locate(chat_url, config.kind_profile().default_kind)?;

        let source: Arc<dyn EntrySource> = match config.backend {
            Backend::Api => {
                Arc::new(ApiSource::connect(client, &config.api, config.request_timeout()).await?)
            }
            Backend::Scrape => Arc::new(ScrapeSource::new(
                client,
                &config.scrape.base_url,
                config.request_timeout(),
            )),
        };

        Self::start_with_source(target, source, config).await
    }

    /// Starts a session over an already constructed backend.
    pub async fn start_with_source(
        target: FeedTarget,
        source: Arc<dyn EntrySource>,
        config: &ChatConfig,
    ) -> Result<Self, ChatError> {
        let mut merger = Merger::new(
            source.batch_order(),
            source.cursor_kind(),
            source.link_style(),
            config.seen_capacity(),
        );

        let initial = source.fetch_initial(&target).await?;
        let primed = initial.len();
        merger.prime(initial);

        let period = config.kind_profile().poll_interval(target.kind);
        tracing::info!(
            tag = %target.tag,
            kind = %target.kind,
            backend = source.name(),
            primed,
            poll_interval_ms = period.as_millis() as u64,
            "Chat session started"
        );

        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity());
        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CAPACITY);
        let (degraded_tx, degraded_rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        let backend = source.name();

        let poller = Poller {
            source,
            target: target.clone(),
            merger,
            period,
            queue: queue_tx,
            degraded: degraded_tx,
            cancel: cancel.clone(),
        };
        let poll_task = tokio::spawn(poller.run());
        let pacer_task = tokio::spawn(pacer::run(
            queue_rx,
            output_tx,
            config.emission_interval(),
            cancel.clone(),
        ));

        Ok(Self {
            target,
            backend,
            messages: output_rx,
            degraded: degraded_rx,
            cancel,
            poll_task: Some(poll_task),
            pacer_task: Some(pacer_task),
        })
    }

    /// Next paced message, or `None` once the session has ended.
    pub async fn recv(&mut self) -> Option<Message> {
        self.messages.recv().await
    }

    /// A receiver that observes every change of the degraded flag.
    pub fn degraded(&self) -> watch::Receiver<bool> {
        self.degraded.clone()
    }

    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    pub fn target(&self) -> &FeedTarget {
        &self.target
    }

    /// Name of the backend serving this session.
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Stops both tasks and waits for them.
    ///
    /// Returns the error that ended the session on its own, if any.
    pub async fn cancel(mut self) -> Result<(), ChatError> {
        self.cancel.cancel();

        if let Some(pacer) = self.pacer_task.take() {
            if let Err(e) = pacer.await {
                tracing::error!(error = %e, "Pacer task failed");
            }
        }

        match self.poll_task.take() {
            Some(poll) => match poll.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(error = %e, "Poll task failed");
                    Ok(())
                }
            },
            None => Ok(()),
        }
    }
}

impl Stream for Session {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.messages.poll_recv(cx)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target)
            .field("backend", &self.backend)
            .field("degraded", &self.is_degraded())
            .finish_non_exhaustive()
    }
}
