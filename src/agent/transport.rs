//! Channel plumbing for streaming turns.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AgentError;
use crate::normalized::AgentEvent;
use crate::store::ChatMessage;

pub type AgentEventStream = UnboundedReceiverStream<AgentEvent>;

pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(15);

/// Sending half of a streaming turn.
///
/// Nothing is delivered once the turn is cancelled. A closed receiver
/// cancels the turn.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<AgentEvent>,
    cancel: CancellationToken,
    request_id: String,
}

impl EventSink {
    /// Create a sink for a new turn with a fresh request id.
    pub fn new(tx: mpsc::UnboundedSender<AgentEvent>, cancel: CancellationToken) -> Self {
        Self {
            tx,
            cancel,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    /// Id announced in the `start` event and carried by the turn's logs.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns `false` if the event was not delivered.
    pub fn send(&self, event: AgentEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if self.tx.send(event).is_err() {
            self.cancel.cancel();
            return false;
        }
        true
    }

    pub fn chunk(&self, text: &str) -> bool {
        self.send(AgentEvent::Chunk {
            text: text.to_string(),
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Run `turn` on a spawned task and stream its events.
///
/// Emits `Start`, then whatever `turn` sends, then `Done` or `Error`.
/// Heartbeats are sent every `heartbeat` while the turn runs. When `cancel`
/// fires (or the stream is dropped) the turn future is dropped, aborting any
/// in-flight request, and no further events are sent.
pub fn spawn_turn<F, Fut>(heartbeat: Duration, cancel: CancellationToken, turn: F) -> AgentEventStream
where
    F: FnOnce(EventSink) -> Fut + Send + 'static,
    Fut: Future<Output = Result<ChatMessage, AgentError>> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = EventSink::new(tx, cancel);

    tokio::spawn(async move {
        let request_id = sink.request_id().to_string();
        let cancel = sink.cancel_token().clone();
        sink.send(AgentEvent::Start {
            request_id: request_id.clone(),
        });

        let finished = CancellationToken::new();
        tokio::spawn(keepalive(sink.clone(), heartbeat, finished.clone()));

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(AgentError::Cancelled),
            r = turn(sink.clone()) => r,
        };
        finished.cancel();

        match result {
            Ok(message) => {
                tracing::info!(request_id = %request_id, "Streaming turn complete");
                sink.send(AgentEvent::Done { message });
            }
            Err(AgentError::Cancelled) => {
                tracing::info!(request_id = %request_id, "Streaming turn cancelled");
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Streaming turn failed");
                sink.send(AgentEvent::Error {
                    message: e.to_string(),
                    code: e.code().to_string(),
                });
            }
        }
    });

    UnboundedReceiverStream::new(rx)
}

/// Heartbeats until `finished`; also turns a dropped receiver into
/// cancellation while the turn is quiet. A failed send just stops it.
async fn keepalive(sink: EventSink, period: Duration, finished: CancellationToken) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            () = finished.cancelled() => break,
            () = sink.tx.closed() => {
                sink.cancel.cancel();
                break;
            }
            _ = ticker.tick() => {
                if !sink.send(AgentEvent::Heartbeat) {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn start_events_done() {
        let stream = spawn_turn(DEFAULT_HEARTBEAT, CancellationToken::new(), |sink| async move {
            sink.chunk("hi");
            Ok(ChatMessage::user("done"))
        });
        let events: Vec<_> = stream.collect().await;
        assert!(matches!(events[0], AgentEvent::Start { .. }));
        assert_eq!(events[1], AgentEvent::Chunk { text: "hi".into() });
        assert!(matches!(events[2], AgentEvent::Done { .. }));
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn start_announces_the_sink_request_id() {
        let stream = spawn_turn(DEFAULT_HEARTBEAT, CancellationToken::new(), |sink| async move {
            Ok(ChatMessage::user(sink.request_id()))
        });
        let events: Vec<_> = stream.collect().await;
        let AgentEvent::Start { request_id } = &events[0] else {
            panic!("expected start, got {:?}", events[0]);
        };
        let Some(AgentEvent::Done { message }) = events.last() else {
            panic!("expected done, got {events:?}");
        };
        assert_eq!(&message.content, request_id);
    }

    #[tokio::test]
    async fn error_carries_code() {
        let stream = spawn_turn(DEFAULT_HEARTBEAT, CancellationToken::new(), |_| async move {
            Err(AgentError::IterationCapExceeded { max: 5 })
        });
        let events: Vec<_> = stream.collect().await;
        match events.last() {
            Some(AgentEvent::Error { code, .. }) => assert_eq!(code, "MAX_ITERATIONS"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_while_quiet() {
        let stream = spawn_turn(Duration::from_secs(15), CancellationToken::new(), |_| async move {
            tokio::time::sleep(Duration::from_secs(40)).await;
            Ok(ChatMessage::user("late"))
        });
        let events: Vec<_> = stream.collect().await;
        let beats = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::Heartbeat))
            .count();
        assert_eq!(beats, 2);
        assert!(events.last().is_some_and(AgentEvent::is_terminal));
    }

    #[tokio::test]
    async fn cancelled_turn_sends_nothing_more() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let stream = spawn_turn(DEFAULT_HEARTBEAT, cancel, move |sink| async move {
            sink.chunk("before");
            trigger.cancel();
            sink.chunk("after");
            std::future::pending::<()>().await;
            Ok(ChatMessage::user("never"))
        });
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            AgentEvent::Chunk {
                text: "before".into()
            }
        );
    }
}
