//! Protocol codec implementation for probe messages.
//!
//! This module implements the libp2p Codec trait so probe messages can be
//! carried over a request-response stream. Probe traffic is one-way: every
//! probe message travels as a request and is acknowledged with an empty
//! response.

use std::io;

use async_trait::async_trait;
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::{request_response::Codec, StreamProtocol};
use thiserror::Error;

use super::messages::ProbeMessage;

/// Upper bound on an encoded probe message. Link length replies grow with the
/// responder's peer count; everything else is tiny.
pub const MAX_MESSAGE_SIZE: u64 = 64 * 1024;

/// Failure to encode or decode a probe message
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("probe message is {0} bytes (max: {MAX_MESSAGE_SIZE} bytes)")]
    TooLarge(usize),
    #[error("malformed probe message: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

/// Serialize a probe message.
pub fn encode(message: &ProbeMessage) -> Result<Vec<u8>, CodecError> {
    let bytes = serde_json::to_vec(message)?;
    if bytes.len() as u64 > MAX_MESSAGE_SIZE {
        return Err(CodecError::TooLarge(bytes.len()));
    }
    Ok(bytes)
}

/// Deserialize a probe message.
pub fn decode(bytes: &[u8]) -> Result<ProbeMessage, CodecError> {
    if bytes.len() as u64 > MAX_MESSAGE_SIZE {
        return Err(CodecError::TooLarge(bytes.len()));
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// Codec for serializing/deserializing probe protocol messages
#[derive(Debug, Clone, Default)]
pub struct ProbeCodec;

#[async_trait]
impl Codec for ProbeCodec {
    type Protocol = StreamProtocol;
    type Request = ProbeMessage;
    type Response = ();

    async fn read_request<T>(&mut self, _: &Self::Protocol, io: &mut T) -> io::Result<Self::Request>
    where
        T: AsyncRead + Unpin + Send,
    {
        let mut buf = Vec::new();
        // One byte past the limit so oversized messages are detected rather than truncated.
        io.take(MAX_MESSAGE_SIZE + 1).read_to_end(&mut buf).await?;

        Ok(decode(&buf)?)
    }

    async fn read_response<T>(
        &mut self,
        _: &Self::Protocol,
        io: &mut T,
    ) -> io::Result<Self::Response>
    where
        T: AsyncRead + Unpin + Send,
    {
        let mut buf = Vec::new();
        io.take(MAX_MESSAGE_SIZE).read_to_end(&mut buf).await?;

        Ok(())
    }

    async fn write_request<T>(
        &mut self,
        _: &Self::Protocol,
        io: &mut T,
        req: Self::Request,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        let data = encode(&req)?;

        io.write_all(&data).await?;
        io.close().await?;

        Ok(())
    }

    async fn write_response<T>(
        &mut self,
        _: &Self::Protocol,
        io: &mut T,
        _res: Self::Response,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        io.close().await?;

        Ok(())
    }
}
