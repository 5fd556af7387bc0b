//! # lumen-shared
//!
//! Types shared between the Lumen store and server: identity newtypes,
//! hydrated view payloads, and the websocket wire protocol.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;
pub mod views;

pub use error::ProtocolError;
pub use types::*;
