//! The pacer task: reveals queued messages one per emission interval.

use super::Message;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Forwards messages from `queue` to `output`, at most one per `period`.
///
/// Idles while the queue is empty. When the poll side closes the queue the
/// remaining messages are still delivered before the task ends; cancellation
/// ends it immediately. A slot in `output` is reserved before the tick is
/// awaited, so a reader that stalls gets its backlog one period apart rather
/// than in a burst once it resumes.
pub(crate) async fn run(
    mut queue: mpsc::Receiver<Message>,
    output: mpsc::Sender<Message>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let message = tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            next = queue.recv() => match next {
                Some(message) => message,
                None => break,
            },
        };

        let permit = match output.try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Closed(())) => {
                tracing::debug!("Subscriber gone, stopping pacer");
                break;
            }
            Err(TrySendError::Full(())) => {
                let reserved = tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,
                    reserved = output.reserve() => reserved,
                };
                match reserved {
                    Ok(permit) => {
                        // The reader just caught up; count the period from here
                        ticker.reset();
                        permit
                    }
                    Err(_) => {
                        tracing::debug!("Subscriber gone, stopping pacer");
                        break;
                    }
                }
            }
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        permit.send(message);
    }
}
