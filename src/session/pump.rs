//! Reader and writer pumps
//!
//! The reader moves binary frames from the socket into the session queue, the
//! writer moves them from the queue back to the socket. Every wait races the
//! session's cancellation token. A pump leaving its loop cancels the token
//! before it touches the socket, so the other pump never holds the socket
//! past that point.

use axum::extract::ws::Message;
use futures_util::{Sink, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::error::{SessionError, SessionResult};
use super::frame::{invalid_message_type, Frame};
use super::queue::{FrameConsumer, FrameProducer, PushOutcome};
use super::socket::SessionSocket;

/// Read frames from `stream` into the queue until the peer goes away, a
/// protocol violation occurs, or `token` is cancelled.
pub async fn run_reader<S, K>(
    mut stream: S,
    socket: &SessionSocket<K>,
    producer: FrameProducer,
    token: &CancellationToken,
) -> SessionResult<()>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    K: Sink<Message, Error = axum::Error> + Unpin,
{
    let result = loop {
        let next = tokio::select! {
            _ = token.cancelled() => {
                debug!("Reader cancelled");
                break Ok(());
            }
            next = stream.next() => next,
        };

        let frame = match next {
            Some(Ok(message)) => Frame::from(message),
            Some(Err(e)) => {
                socket.mark_peer_closed();
                let err = SessionError::Read(e);
                if err.is_expected_close() {
                    info!("Connection closed while reading");
                    break Ok(());
                }
                error!("{}", err);
                break Err(err);
            }
            None => {
                socket.mark_peer_closed();
                debug!("Stream ended");
                break Ok(());
            }
        };

        match frame {
            Frame::Binary(payload) => match producer.push(payload, token).await {
                PushOutcome::Queued => {}
                PushOutcome::Cancelled => {
                    debug!("Reader cancelled while queue was full, dropping message");
                    break Ok(());
                }
                PushOutcome::Closed => {
                    debug!("Writer gone, dropping message");
                    break Ok(());
                }
            },
            Frame::Close(frame) => {
                socket.mark_peer_closed();
                match frame {
                    Some(close) => info!(code = close.code, "Peer closed connection"),
                    None => info!("Peer closed connection"),
                }
                break Ok(());
            }
            Frame::Control => {}
            Frame::Unsupported(kind) => {
                error!("Expected binary message, got {}", kind);
                break Err(SessionError::InvalidMessageType(kind));
            }
        }
    };

    token.cancel();
    producer.close();

    if matches!(result, Err(SessionError::InvalidMessageType(_))) {
        if let Err(e) = socket.send_close_frame(invalid_message_type()).await {
            error!("Unable to write close message: {}", e);
        }
    }
    SessionError::finish(result, socket.close().await)
}

/// Write queued frames back to the socket until the queue is drained and
/// closed, the socket fails, or `token` is cancelled.
pub async fn run_writer<K>(
    socket: &SessionSocket<K>,
    mut consumer: FrameConsumer,
    token: &CancellationToken,
) -> SessionResult<()>
where
    K: Sink<Message, Error = axum::Error> + Unpin,
{
    let result = loop {
        let payload = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Writer cancelled");
                break Ok(());
            }
            popped = consumer.pop() => match popped {
                Some(payload) => payload,
                None => {
                    debug!("Queue closed");
                    break Ok(());
                }
            },
        };

        debug!(bytes = payload.len(), "Fetched message to write");
        let sent = tokio::select! {
            _ = token.cancelled() => {
                debug!("Writer cancelled during write");
                break Ok(());
            }
            sent = socket.send(Message::Binary(payload)) => sent,
        };

        if let Err(err) = sent {
            if err.is_expected_close() {
                info!("Connection closed while writing");
                break Ok(());
            }
            error!("{}", err);
            break Err(err);
        }
    };

    token.cancel();
    SessionError::finish(result, socket.close().await)
}
