use std::fmt;
use std::io;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use vellum_crypto::ContentHasher;
use vellum_types::Address;

use crate::error::{LedgerError, LedgerResult};
use crate::mime;

/// Chunked byte stream carried by a lazy [`Content`].
pub type ContentStream = BoxStream<'static, io::Result<Bytes>>;

/// Metadata describing a stored blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentInfo {
    pub address: Address,
    pub size: u64,
    pub content_type: String,
}

enum Body {
    Eager(Bytes),
    Lazy(ContentStream),
    Empty,
}

/// A blob's metadata together with its bytes.
///
/// The body is single-shot: [`bytes`](Self::bytes) and
/// [`take_stream`](Self::take_stream) each consume it, and a second call
/// fails with [`LedgerError::BodyConsumed`]. Callers that need to replay
/// must keep their own copy.
pub struct Content {
    info: ContentInfo,
    body: Body,
}

impl Content {
    /// Eager content. The address and size are computed from `data`.
    pub fn from_bytes(data: impl Into<Bytes>, content_type: impl Into<String>) -> LedgerResult<Self> {
        let data = data.into();
        let content_type = content_type.into();
        mime::validate(&content_type)?;
        Ok(Self {
            info: ContentInfo {
                address: ContentHasher::HEX.address(&data),
                size: data.len() as u64,
                content_type,
            },
            body: Body::Eager(data),
        })
    }

    /// Lazy content over a stream that must yield exactly `size` bytes. The
    /// address is unknown until the stream is read, unless supplied with
    /// [`with_address`](Self::with_address).
    pub fn from_reader(
        stream: ContentStream,
        size: u64,
        content_type: impl Into<String>,
    ) -> LedgerResult<Self> {
        let content_type = content_type.into();
        mime::validate(&content_type)?;
        Ok(Self {
            info: ContentInfo {
                address: Address::empty(),
                size,
                content_type,
            },
            body: Body::Lazy(stream),
        })
    }

    /// Metadata without a payload.
    pub fn from_metadata_only(
        address: Address,
        size: u64,
        content_type: impl Into<String>,
    ) -> LedgerResult<Self> {
        let content_type = content_type.into();
        mime::validate(&content_type)?;
        Ok(Self {
            info: ContentInfo {
                address,
                size,
                content_type,
            },
            body: Body::Empty,
        })
    }

    /// Attach the address the caller expects this payload to have.
    pub fn with_address(mut self, address: Address) -> Self {
        self.info.address = address;
        self
    }

    pub fn address(&self) -> &Address {
        &self.info.address
    }

    pub fn size(&self) -> u64 {
        self.info.size
    }

    pub fn content_type(&self) -> &str {
        &self.info.content_type
    }

    pub fn info(&self) -> &ContentInfo {
        &self.info
    }

    pub fn into_info(self) -> ContentInfo {
        self.info
    }

    /// Returns `true` while the body has not been taken.
    pub fn has_body(&self) -> bool {
        !matches!(self.body, Body::Empty)
    }

    /// Read the whole body into memory, checking it against the declared
    /// size.
    pub async fn bytes(&mut self) -> LedgerResult<Bytes> {
        match std::mem::replace(&mut self.body, Body::Empty) {
            Body::Eager(data) => Ok(data),
            Body::Lazy(stream) => {
                let capacity = usize::try_from(self.info.size).unwrap_or(0);
                let buf = stream
                    .try_fold(BytesMut::with_capacity(capacity), |mut buf, chunk| async move {
                        buf.extend_from_slice(&chunk);
                        Ok(buf)
                    })
                    .await?;
                let actual = buf.len() as u64;
                if actual != self.info.size {
                    return Err(LedgerError::SizeMismatch {
                        declared: self.info.size,
                        actual,
                    });
                }
                Ok(buf.freeze())
            }
            Body::Empty => Err(LedgerError::BodyConsumed),
        }
    }

    /// Take the body as a chunk stream.
    pub fn take_stream(&mut self) -> LedgerResult<ContentStream> {
        match std::mem::replace(&mut self.body, Body::Empty) {
            Body::Eager(data) => Ok(stream::once(async move { Ok::<_, io::Error>(data) }).boxed()),
            Body::Lazy(stream) => Ok(stream),
            Body::Empty => Err(LedgerError::BodyConsumed),
        }
    }

    /// Make the body eager and verify the address.
    ///
    /// If an address was supplied and disagrees with the payload, fails with
    /// [`LedgerError::AddressMismatch`]. On success the address and size are
    /// the canonical values computed from the bytes.
    pub async fn verified(mut self) -> LedgerResult<(Self, Bytes)> {
        let data = self.bytes().await?;
        let actual = ContentHasher::HEX.address(&data);
        let expected = std::mem::take(&mut self.info.address);
        if !expected.is_empty() && expected != actual {
            return Err(LedgerError::AddressMismatch { expected, actual });
        }
        self.info.address = actual;
        self.info.size = data.len() as u64;
        self.body = Body::Eager(data.clone());
        Ok((self, data))
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match self.body {
            Body::Eager(_) => "eager",
            Body::Lazy(_) => "lazy",
            Body::Empty => "empty",
        };
        f.debug_struct("Content")
            .field("address", &self.info.address)
            .field("size", &self.info.size)
            .field("content_type", &self.info.content_type)
            .field("body", &body)
            .finish()
    }
}
