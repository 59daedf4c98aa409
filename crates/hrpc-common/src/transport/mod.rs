//! hrpc Transport Layer
//!
//! Framing, payload codecs and the TCP plumbing shared by client and server.
//!
//! # Architecture
//!
//! - **Wire Format**: `[4-byte length prefix as u32 big-endian] + [payload]`
//! - **Payload**: postcard (default) or JSON, picked per endpoint
//! - **Writes**: one writer task per connection drains an outbound queue
//!
//! # Components
//!
//! - **[`WireCodec`]**: value ⇄ [`Frame`], restartable streaming decode
//! - **[`PayloadCodec`]**: the pluggable serializer inside frames
//! - **[`FrameDecoder`]**: `tokio_util` decoder over [`WireCodec`]
//! - **[`ConnectionState`]** / **[`StateCell`]**: per-connection lifecycle
//! - **[`tcp::connect`]** / **[`tcp::write_frames`]**: dialing and the writer loop
//!
//! # Frame Size Limits
//!
//! Every endpoint enforces a maximum frame size (16 MB by default). A peer
//! announcing a larger frame is treated as corrupt and disconnected.

pub mod codec;
pub mod connection;
pub mod tcp;

pub use codec::{
    Frame, FrameDecoder, JsonCodec, PayloadCodec, PostcardCodec, WireCodec, DEFAULT_MAX_FRAME_SIZE,
    LENGTH_PREFIX_LEN,
};
pub use connection::{ConnectionState, StateCell};
pub use tcp::{connect, write_frames, DEFAULT_CONNECT_TIMEOUT};
