//! Unified error type.

/// The error type returned by hearth's fallible operations.
///
/// Application-level outcomes (404, 405, 500, ...) are expressed as HTTP
/// responses, not as `Error`s. Configuration mistakes (an invalid bind
/// address, a malformed or duplicate route pattern) panic during the build
/// phase, before the server accepts traffic. What remains for this type is
/// infrastructure failure: binding the listener or accepting a connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level I/O failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
