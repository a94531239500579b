//! Session error taxonomy
//!
//! Classifies everything that can end a session: expected closures, protocol
//! violations and transport failures.

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

/// Errors that can end a relay session
#[derive(Debug, Error)]
pub enum SessionError {
    /// The socket was closed by the peer or is already closed locally
    #[error("Connection closed")]
    Closed,

    /// The peer stopped accepting writes while the socket was being closed
    #[error("Timed out closing connection")]
    TimedOut,

    #[error("Expected binary message, got {0}")]
    InvalidMessageType(&'static str),

    #[error("Unable to read message: {0}")]
    Read(#[source] axum::Error),

    #[error("Unable to write message: {0}")]
    Write(#[source] axum::Error),

    #[error("Unable to close connection: {0}")]
    Close(#[source] axum::Error),

    #[error("Pump task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{first}; {second}")]
    Joined {
        first: Box<SessionError>,
        second: Box<SessionError>,
    },
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    /// Whether this error only reports a normal closure of the connection.
    ///
    /// A joined error is an expected closure when every part of it is.
    pub fn is_expected_close(&self) -> bool {
        match self {
            SessionError::Closed => true,
            SessionError::InvalidMessageType(_) | SessionError::TimedOut | SessionError::Task(_) => {
                false
            }
            SessionError::Read(e) | SessionError::Write(e) | SessionError::Close(e) => {
                is_close_error(e)
            }
            SessionError::Joined { first, second } => {
                first.is_expected_close() && second.is_expected_close()
            }
        }
    }

    /// Compose two optional errors, keeping both when both are present.
    pub fn join(first: Option<SessionError>, second: Option<SessionError>) -> Option<SessionError> {
        match (first, second) {
            (Some(first), Some(second)) => Some(SessionError::Joined {
                first: Box::new(first),
                second: Box::new(second),
            }),
            (first, None) => first,
            (None, second) => second,
        }
    }

    /// Compose a pump result with the result of closing its socket.
    pub fn finish(result: SessionResult<()>, close: SessionResult<()>) -> SessionResult<()> {
        match SessionError::join(result.err(), close.err()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Whether a socket error was caused by the peer dropping the connection.
///
/// Walks the source chain for an I/O error. Writes that fail because the peer
/// already sent its close frame are reported by [`SessionSocket`] as
/// [`SessionError::Closed`] instead.
///
/// [`SessionSocket`]: super::SessionSocket
pub fn is_close_error(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(e) = source {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return is_disconnect(io_err.kind());
        }
        source = e.source();
    }
    false
}

fn is_disconnect(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_error(kind: io::ErrorKind) -> axum::Error {
        axum::Error::new(io::Error::new(kind, "socket"))
    }

    #[test]
    fn test_closed_is_expected() {
        assert!(SessionError::Closed.is_expected_close());
    }

    #[test]
    fn test_invalid_message_type_is_not_expected() {
        let err = SessionError::InvalidMessageType("text");
        assert!(!err.is_expected_close());
        assert_eq!(err.to_string(), "Expected binary message, got text");
    }

    #[test]
    fn test_nested_io_disconnect_is_expected() {
        #[derive(Debug, Error)]
        #[error("transport")]
        struct Transport(#[source] io::Error);

        let inner = Transport(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(SessionError::Read(axum::Error::new(inner)).is_expected_close());
    }

    #[test]
    fn test_timed_out_is_not_expected() {
        assert!(!SessionError::TimedOut.is_expected_close());
        let joined = SessionError::join(Some(SessionError::Closed), Some(SessionError::TimedOut));
        assert!(!joined.unwrap().is_expected_close());
    }

    #[test]
    fn test_io_disconnect_is_expected() {
        assert!(SessionError::Write(io_error(io::ErrorKind::BrokenPipe)).is_expected_close());
        assert!(SessionError::Read(io_error(io::ErrorKind::ConnectionReset)).is_expected_close());
    }

    #[test]
    fn test_other_io_error_is_not_expected() {
        let err = SessionError::Read(io_error(io::ErrorKind::PermissionDenied));
        assert!(!err.is_expected_close());
    }

    #[test]
    fn test_join_keeps_both() {
        let joined = SessionError::join(
            Some(SessionError::InvalidMessageType("text")),
            Some(SessionError::Closed),
        )
        .unwrap();
        assert!(matches!(joined, SessionError::Joined { .. }));
        assert!(!joined.is_expected_close());
        assert_eq!(
            joined.to_string(),
            "Expected binary message, got text; Connection closed"
        );
    }

    #[test]
    fn test_join_single_side() {
        assert!(SessionError::join(None, None).is_none());
        assert!(matches!(
            SessionError::join(None, Some(SessionError::Closed)),
            Some(SessionError::Closed)
        ));
        assert!(matches!(
            SessionError::join(Some(SessionError::Closed), None),
            Some(SessionError::Closed)
        ));
    }

    #[test]
    fn test_finish() {
        assert!(SessionError::finish(Ok(()), Ok(())).is_ok());

        let result = SessionError::finish(Ok(()), Err(SessionError::Closed));
        assert!(result.unwrap_err().is_expected_close());

        let result = SessionError::finish(
            Err(SessionError::Closed),
            Err(SessionError::Close(io_error(io::ErrorKind::BrokenPipe))),
        );
        assert!(result.unwrap_err().is_expected_close());
    }
}
