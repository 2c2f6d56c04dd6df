use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How AEAD nonces are produced for a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NonceMode {
    /// Fresh random nonce per chunk, appended to the ciphertext.
    ///
    /// No hard limit is enforced. With 12-byte nonces a key should not seal
    /// more than about 2^32 chunks.
    #[default]
    Random,
    /// Nonce is a per-instance counter; sealing fails once it would wrap.
    Counter,
}

/// Concrete AEAD algorithms a `CipherKey` can mint encryptors for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CipherSuite {
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
    #[default]
    #[serde(rename = "xchacha20-poly1305")]
    XChaCha20Poly1305,
    Aes128Gcm,
    Aes256Gcm,
}

impl CipherSuite {
    pub const ALL: [CipherSuite; 4] = [
        CipherSuite::ChaCha20Poly1305,
        CipherSuite::XChaCha20Poly1305,
        CipherSuite::Aes128Gcm,
        CipherSuite::Aes256Gcm,
    ];

    pub fn key_size(self) -> usize {
        match self {
            CipherSuite::Aes128Gcm => 16,
            _ => 32,
        }
    }

    pub fn nonce_size(self) -> usize {
        match self {
            CipherSuite::XChaCha20Poly1305 => 24,
            _ => 12,
        }
    }

    pub fn tag_size(self) -> usize {
        16
    }

    pub fn name(self) -> &'static str {
        match self {
            CipherSuite::ChaCha20Poly1305 => "chacha20-poly1305",
            CipherSuite::XChaCha20Poly1305 => "xchacha20-poly1305",
            CipherSuite::Aes128Gcm => "aes128-gcm",
            CipherSuite::Aes256Gcm => "aes256-gcm",
        }
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CipherSuite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CipherSuite::ALL
            .into_iter()
            .find(|suite| suite.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<_> = CipherSuite::ALL.iter().map(|c| c.name()).collect();
                format!("unknown cipher suite {s:?} (expected one of {})", names.join(", "))
            })
    }
}
