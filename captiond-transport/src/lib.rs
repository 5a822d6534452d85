//! captiond transport channel
//!
//! Persistent bidirectional WebSocket connection to the speech-recognition
//! backend. Outbound messages are raw binary S16LE PCM frames (plus optional
//! plain-text timestamp markers); inbound messages are UTF-8 JSON transcript
//! events, delivered in arrival order through the event receiver returned by
//! [`TransportChannel::connect`].
//!
//! The channel deliberately does not reconnect: a reconnect behind the
//! caller's back could silently reorder or duplicate audio, so errors are
//! surfaced and the owning session decides.

pub mod channel;
pub mod error;

pub use channel::{eof_message, frame_to_bytes, ChannelEvent, ChannelState, TransportChannel};
pub use error::{ChannelError, Result};
