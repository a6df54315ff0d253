//! Wire types and codecs shared by the ForgeFrame consumer/host engines.
//!
//! This crate has no browser dependency on purpose: the message envelope,
//! handshake codec and error taxonomy are pure functions of their inputs,
//! so they're unit-tested here instead of behind `wasm-bindgen-test`.

pub mod callable;
pub mod error;
pub mod handshake;
pub mod ids;
pub mod message;

pub use callable::{CallableRef, CallableRefKind};
pub use error::ForgeFrameError;
pub use handshake::{HandshakePayload, RenderingMode};
pub use message::{Message, MessageKind, MessageSource, RemoteError};
