use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use vellum_types::Address;

/// How a SHA-256 digest is rendered into an [`Address`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressEncoding {
    /// 64 lowercase hex characters.
    #[default]
    Hex,
    /// 44 characters of padded URL-safe base64.
    UrlSafeBase64,
}

impl fmt::Display for AddressEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hex => f.write_str("hex"),
            Self::UrlSafeBase64 => f.write_str("base64url"),
        }
    }
}

impl FromStr for AddressEncoding {
    type Err = HasherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hex" => Ok(Self::Hex),
            "base64url" | "url_safe_base64" => Ok(Self::UrlSafeBase64),
            other => Err(HasherError::UnknownEncoding(other.to_string())),
        }
    }
}

/// SHA-256 content hasher.
///
/// Pure and deterministic; hashing never fails. The encoding only changes
/// how the 32-byte digest is rendered, never the digest itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContentHasher {
    encoding: AddressEncoding,
}

impl ContentHasher {
    /// Hasher producing lowercase hex addresses.
    pub const HEX: Self = Self {
        encoding: AddressEncoding::Hex,
    };

    /// Hasher producing padded URL-safe base64 addresses.
    pub const URL_SAFE_BASE64: Self = Self {
        encoding: AddressEncoding::UrlSafeBase64,
    };

    /// Create a hasher with the given encoding.
    pub const fn new(encoding: AddressEncoding) -> Self {
        Self { encoding }
    }

    /// The encoding used by this hasher.
    pub fn encoding(&self) -> AddressEncoding {
        self.encoding
    }

    /// Address of a complete payload.
    pub fn address(&self, data: &[u8]) -> Address {
        self.encode(Self::raw_hash(data))
    }

    /// Start an incremental digest, for payloads that arrive in chunks.
    pub fn digest(&self) -> AddressDigest {
        AddressDigest {
            inner: Sha256::new(),
            encoding: self.encoding,
            len: 0,
        }
    }

    /// Verify that data produces the expected address.
    pub fn verify(&self, data: &[u8], expected: &Address) -> bool {
        self.address(data) == *expected
    }

    /// Raw SHA-256 digest.
    pub fn raw_hash(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    fn encode(&self, digest: [u8; 32]) -> Address {
        encode(self.encoding, digest)
    }
}

fn encode(encoding: AddressEncoding, digest: [u8; 32]) -> Address {
    let text = match encoding {
        AddressEncoding::Hex => hex::encode(digest),
        AddressEncoding::UrlSafeBase64 => URL_SAFE.encode(digest),
    };
    Address::from_encoded(text)
}

/// Address of `data` in the default (hex) encoding.
pub fn address(data: &[u8]) -> Address {
    ContentHasher::HEX.address(data)
}

/// Incremental SHA-256 over a chunked payload.
pub struct AddressDigest {
    inner: Sha256,
    encoding: AddressEncoding,
    len: u64,
}

impl AddressDigest {
    /// Feed the next chunk.
    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
        self.len += chunk.len() as u64;
    }

    /// Number of bytes fed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if nothing has been fed yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finish and render the address.
    pub fn finish(self) -> Address {
        encode(self.encoding, self.inner.finalize().into())
    }
}

/// Errors from hashing configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("unknown address encoding: {0:?}")]
    UnknownEncoding(String),
}
