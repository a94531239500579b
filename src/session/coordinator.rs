//! Session coordinator
//!
//! Admits a connection, runs the reader and writer pumps as two tasks sharing
//! one queue and one cancellation token, and tears the session down once both
//! have exited.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};

use super::admission::AdmissionController;
use super::error::{SessionError, SessionResult};
use super::frame::too_many_connections;
use super::pump::{run_reader, run_writer};
use super::queue::frame_queue;
use super::socket::SessionSocket;

/// How a session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// The gateway was full; the connection was closed with 4429
    Refused,
    /// The session ran; carries the aggregated pump errors
    Finished(SessionResult<()>),
}

/// Runs relay sessions for upgraded connections
#[derive(Debug, Clone)]
pub struct SessionCoordinator {
    admission: Arc<AdmissionController>,
    queue_capacity: usize,
    shutdown: CancellationToken,
}

impl SessionCoordinator {
    /// Create a coordinator.
    ///
    /// Sessions are cancelled when `shutdown` is.
    pub fn new(
        admission: Arc<AdmissionController>,
        queue_capacity: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            admission,
            queue_capacity,
            shutdown,
        }
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// Run a session over an upgraded axum WebSocket
    pub async fn handle_socket(&self, socket: WebSocket) -> SessionEnd {
        let (sink, stream) = socket.split();
        self.handle(stream, sink).await
    }

    /// Run a session over the given read and write halves.
    ///
    /// Returns once both pumps have exited, the socket is closed and the
    /// admission slot is released.
    pub async fn handle<S, K>(&self, stream: S, sink: K) -> SessionEnd
    where
        S: Stream<Item = Result<Message, axum::Error>> + Send + Unpin + 'static,
        K: Sink<Message, Error = axum::Error> + Send + Unpin + 'static,
    {
        let socket = Arc::new(SessionSocket::new(sink));

        let Some(permit) = self.admission.try_admit() else {
            info!("Sending Too Many Connections");
            if let Err(e) = socket.send_close_frame(too_many_connections()).await {
                error!("Unable to write close message: {}", e);
            }
            if let Err(e) = socket.close().await {
                error!("{}", e);
            }
            return SessionEnd::Refused;
        };
        info!(
            active = self.admission.active(),
            max = self.admission.max(),
            "Session started"
        );

        let token = self.shutdown.child_token();
        let (producer, consumer) = frame_queue(self.queue_capacity);

        // Each pump cancels the session when it exits, panics included
        let reader = tokio::spawn({
            let socket = Arc::clone(&socket);
            let token = token.clone();
            async move {
                let _cancel = token.clone().drop_guard();
                run_reader(stream, &socket, producer, &token).await
            }
            .in_current_span()
        });
        let writer = tokio::spawn({
            let socket = Arc::clone(&socket);
            let token = token.clone();
            async move {
                let _cancel = token.clone().drop_guard();
                run_writer(&socket, consumer, &token).await
            }
            .in_current_span()
        });

        let (reader, writer) = tokio::join!(reader, writer);
        token.cancel();

        // A panicked pump never reached its own close
        let closed = socket.close().await;
        drop(permit);

        let result = SessionError::finish(
            SessionError::finish(flatten(reader), flatten(writer)),
            closed,
        );
        match &result {
            Ok(()) => info!("Session finished"),
            Err(e) if e.is_expected_close() => info!("Connection closed: {}", e),
            Err(e) => error!("Unable to handle message: {}", e),
        }
        SessionEnd::Finished(result)
    }
}

fn flatten(joined: Result<SessionResult<()>, tokio::task::JoinError>) -> SessionResult<()> {
    joined.map_err(SessionError::from).and_then(|result| result)
}
