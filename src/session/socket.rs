//! Shared write half of a session's WebSocket
//!
//! Both pumps and the admission path write through this handle. Closing is
//! idempotent: the first close takes the sink, later calls are no-ops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt};
use tokio::sync::Mutex;
use tracing::debug;

use super::error::{SessionError, SessionResult};

/// Upper bound on writing a close frame and on closing the socket
pub const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Write half of a WebSocket, closable exactly once
pub struct SessionSocket<K> {
    sink: Mutex<Option<K>>,
    peer_closed: AtomicBool,
}

impl<K> SessionSocket<K>
where
    K: Sink<Message, Error = axum::Error> + Unpin,
{
    pub fn new(sink: K) -> Self {
        Self {
            sink: Mutex::new(Some(sink)),
            peer_closed: AtomicBool::new(false),
        }
    }

    /// Record that the read side has ended.
    ///
    /// Write and close failures after this point report [`SessionError::Closed`].
    pub fn mark_peer_closed(&self) {
        self.peer_closed.store(true, Ordering::Release);
    }

    fn peer_closed(&self) -> bool {
        self.peer_closed.load(Ordering::Acquire)
    }

    /// Send one message.
    ///
    /// Returns [`SessionError::Closed`] if the socket was already closed.
    /// Holds the socket for as long as the write is pending; callers race it
    /// against their cancellation token.
    pub async fn send(&self, message: Message) -> SessionResult<()> {
        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Err(SessionError::Closed);
        };
        match sink.send(message).await {
            Ok(()) => Ok(()),
            Err(e) if self.peer_closed() => {
                debug!("Write after peer closed: {}", e);
                Err(SessionError::Closed)
            }
            Err(e) => Err(SessionError::Write(e)),
        }
    }

    /// Send a close frame, giving up after [`CLOSE_TIMEOUT`]
    pub async fn send_close_frame(&self, message: Message) -> SessionResult<()> {
        match tokio::time::timeout(CLOSE_TIMEOUT, self.send(message)).await {
            Ok(sent) => sent,
            Err(_) => Err(SessionError::TimedOut),
        }
    }

    /// Close the socket if it is still open, giving up after [`CLOSE_TIMEOUT`]
    pub async fn close(&self) -> SessionResult<()> {
        match tokio::time::timeout(CLOSE_TIMEOUT, self.close_sink()).await {
            Ok(closed) => closed,
            Err(_) => Err(SessionError::TimedOut),
        }
    }

    async fn close_sink(&self) -> SessionResult<()> {
        let sink = self.sink.lock().await.take();
        let Some(mut sink) = sink else {
            debug!("Connection already closed");
            return Ok(());
        };
        match sink.close().await {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = if self.peer_closed() {
                    SessionError::Closed
                } else {
                    SessionError::Close(e)
                };
                if err.is_expected_close() {
                    debug!("Connection already closed by peer");
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    #[cfg(test)]
    pub async fn is_closed(&self) -> bool {
        self.sink.lock().await.is_none()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory sinks standing in for a WebSocket peer

    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    use axum::extract::ws::Message;
    use futures_util::Sink;

    /// Everything written to a [`RecordingSink`]
    #[derive(Debug, Default)]
    pub struct Recorded {
        pub messages: Mutex<Vec<Message>>,
        pub closes: AtomicUsize,
    }

    impl Recorded {
        pub fn messages(&self) -> Vec<Message> {
            self.messages.lock().unwrap().clone()
        }

        pub fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    /// Sink that stores messages and counts close calls
    #[derive(Debug, Clone, Default)]
    pub struct RecordingSink {
        pub recorded: Arc<Recorded>,
        pub fail_sends: bool,
    }

    impl RecordingSink {
        pub fn new() -> (Self, Arc<Recorded>) {
            let sink = Self::default();
            let recorded = Arc::clone(&sink.recorded);
            (sink, recorded)
        }

        pub fn failing() -> (Self, Arc<Recorded>) {
            let (mut sink, recorded) = Self::new();
            sink.fail_sends = true;
            (sink, recorded)
        }
    }

    impl Sink<Message> for RecordingSink {
        type Error = axum::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
            if self.fail_sends {
                return Err(axum::Error::new(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "write refused",
                )));
            }
            self.recorded.messages.lock().unwrap().push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            self.recorded.closes.fetch_add(1, Ordering::SeqCst);
            Poll::Ready(Ok(()))
        }
    }

    /// Sink whose peer never reads: every write and close stays pending
    #[derive(Debug, Default)]
    pub struct StalledSink;

    impl Sink<Message> for StalledSink {
        type Error = axum::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }
    }
}
