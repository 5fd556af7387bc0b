use thiserror::Error;

/// Failure to decode or encode a websocket frame.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unsupported frame type: {0}")]
    UnsupportedFrame(&'static str),
}
