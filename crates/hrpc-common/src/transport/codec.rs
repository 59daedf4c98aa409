use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::error::{HrpcError, Result};

/// Size of the big-endian `u32` length prefix in front of every frame.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default upper bound for a single frame payload (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Payload serializer used inside frames.
///
/// The serializer only knows how to turn a declared value type into bytes and
/// back; it has no notion of requests or responses.
///
/// # Example
///
/// ```
/// use hrpc_common::transport::PayloadCodec;
///
/// let codec = PayloadCodec::json();
/// let bytes = codec.serialize(&vec![1u32, 2, 3]).unwrap();
/// let back: Vec<u32> = codec.deserialize(&bytes).unwrap();
/// assert_eq!(back, vec![1, 2, 3]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadCodec {
    /// Human-readable JSON, useful when inspecting traffic
    Json(JsonCodec),
    /// Compact binary encoding (default)
    Postcard(PostcardCodec),
}

impl PayloadCodec {
    pub fn json() -> Self {
        PayloadCodec::Json(JsonCodec)
    }

    pub fn postcard() -> Self {
        PayloadCodec::Postcard(PostcardCodec)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PayloadCodec::Json(_) => "json",
            PayloadCodec::Postcard(_) => "postcard",
        }
    }

    pub fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            PayloadCodec::Json(_) => JsonCodec::serialize(value),
            PayloadCodec::Postcard(_) => PostcardCodec::serialize(value),
        }
    }

    pub fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            PayloadCodec::Json(_) => JsonCodec::deserialize(data),
            PayloadCodec::Postcard(_) => PostcardCodec::deserialize(data),
        }
    }
}

impl Default for PayloadCodec {
    fn default() -> Self {
        Self::postcard()
    }
}

impl fmt::Display for PayloadCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PayloadCodec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::json()),
            "postcard" => Ok(Self::postcard()),
            other => Err(format!("unknown payload format '{}' (expected json or postcard)", other)),
        }
    }
}

/// JSON payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    pub fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Postcard payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostcardCodec;

impl PostcardCodec {
    pub fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(value)?)
    }

    pub fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(postcard::from_bytes(data)?)
    }
}

/// One length-prefixed unit on the wire.
///
/// The length is fixed when the frame is built from an already serialized
/// payload, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    length: u32,
    payload: Bytes,
}

impl Frame {
    fn new(payload: Bytes) -> Self {
        Self {
            length: payload.len() as u32,
            payload,
        }
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Writes `[length][payload]` into `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(LENGTH_PREFIX_LEN + self.payload.len());
        dst.put_u32(self.length);
        dst.extend_from_slice(&self.payload);
    }

    /// The full wire representation, prefix included.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_LEN + self.payload.len());
        self.write_to(&mut buf);
        buf.freeze()
    }
}

/// Length-prefixed framing around a [`PayloadCodec`].
///
/// Wire format: `[4-byte length as u32 big-endian] + [payload]`.
///
/// Decoding is restartable: when the buffer holds less than a full frame,
/// [`decode`](Self::decode) returns `Ok(None)` and leaves the buffer untouched
/// so the caller can retry once more bytes have arrived.
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use hrpc_common::transport::WireCodec;
///
/// let codec = WireCodec::default();
/// let frame = codec.encode(&"hello".to_string()).unwrap();
///
/// let mut buf = BytesMut::from(&frame.to_bytes()[..]);
/// let value: Option<String> = codec.decode(&mut buf).unwrap();
/// assert_eq!(value.as_deref(), Some("hello"));
/// assert!(buf.is_empty());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireCodec {
    payload: PayloadCodec,
    max_frame_size: usize,
}

impl WireCodec {
    /// `max_frame_size` is capped at `u32::MAX`, the largest length the prefix can carry.
    pub fn new(payload: PayloadCodec, max_frame_size: usize) -> Self {
        Self {
            payload,
            max_frame_size: max_frame_size.min(u32::MAX as usize),
        }
    }

    pub fn payload(&self) -> &PayloadCodec {
        &self.payload
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Serializes `value` and wraps it in a frame.
    ///
    /// # Errors
    ///
    /// Fails with [`HrpcError::Protocol`] if the payload exceeds the maximum
    /// frame size; nothing has been written at that point, so only this value
    /// is affected.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Frame> {
        let payload = self.payload.serialize(value)?;
        if payload.len() > self.max_frame_size {
            return Err(HrpcError::Protocol(format!(
                "Frame too large: {} bytes (max {} bytes)",
                payload.len(),
                self.max_frame_size
            )));
        }
        Ok(Frame::new(Bytes::from(payload)))
    }

    /// Decodes one value from the front of `src`.
    ///
    /// Returns `Ok(None)` when `src` does not yet hold a complete frame. On
    /// success exactly one frame is consumed, leaving any following bytes in
    /// place.
    ///
    /// # Errors
    ///
    /// Fails with [`HrpcError::Protocol`] when the length prefix exceeds the
    /// maximum frame size or the payload cannot be decoded. Both are fatal for
    /// the connection.
    pub fn decode<T: DeserializeOwned>(&self, src: &mut BytesMut) -> Result<Option<T>> {
        if src.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_LEN]);
        let length = u32::from_be_bytes(prefix) as usize;

        if length > self.max_frame_size {
            return Err(HrpcError::Protocol(format!(
                "Frame too large: {} bytes (max {} bytes)",
                length, self.max_frame_size
            )));
        }

        let frame_len = LENGTH_PREFIX_LEN + length;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_LEN);
        let payload = src.split_to(length);
        let value = self
            .payload
            .deserialize(&payload)
            .map_err(|e| HrpcError::Protocol(format!("Undecodable {} payload: {}", self.payload, e)))?;

        Ok(Some(value))
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new(PayloadCodec::default(), DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Encoder<Frame> for WireCodec {
    type Error = HrpcError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        frame.write_to(dst);
        Ok(())
    }
}

/// `tokio_util` decoder yielding values of type `T` from a byte stream.
///
/// Client connections decode `Response`s, server connections decode `Request`s;
/// the direction decides the type, the frame carries no tag.
pub struct FrameDecoder<T> {
    wire: WireCodec,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FrameDecoder<T> {
    pub fn new(wire: WireCodec) -> Self {
        Self {
            wire,
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Decoder for FrameDecoder<T> {
    type Item = T;
    type Error = HrpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<T>> {
        self.wire.decode(src)
    }
}
