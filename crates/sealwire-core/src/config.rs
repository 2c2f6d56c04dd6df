use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::encoding::IntEncoding;
use crate::error::{SealError, SealResult};
use crate::types::{CipherSuite, NonceMode};

/// Default stream buffer and decode limit: 1 MiB
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Top-level configuration (loaded from sealwire.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SealwireConfig {
    pub stream: StreamConfig,
    pub cipher: CipherConfig,
    pub kdf: KdfConfig,
    pub log: LogConfig,
}

impl SealwireConfig {
    /// Load from a TOML file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("config file not found: {} (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        config
            .stream
            .validate()
            .with_context(|| format!("validating config: {}", path.display()))?;
        Ok(config)
    }
}

/// Chunked stream framing options. Encryptor and decryptor must agree on all
/// of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Nonce strategy for keys built from this config (default: random)
    pub nonce_mode: NonceMode,
    /// Prefix every chunk with its ciphertext length
    pub length_prefix: bool,
    pub length_encoding: IntEncoding,
    /// Embed a sequential counter in every chunk and end with a terminator
    pub chunk_counter: bool,
    /// Encoding of the chunk counter; independent of `length_encoding`
    pub counter_encoding: IntEncoding,
    /// Plaintext bytes per chunk, counter prefix included (0 = one chunk per write)
    pub buffer_size: usize,
    /// Largest plaintext chunk the decryptor will allocate for (0 = unbounded)
    pub max_chunk_size: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            nonce_mode: NonceMode::Random,
            length_prefix: true,
            length_encoding: IntEncoding::Varint,
            chunk_counter: true,
            counter_encoding: IntEncoding::Varint,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_chunk_size: DEFAULT_BUFFER_SIZE as u64,
        }
    }
}

impl StreamConfig {
    pub fn length_framing(&self) -> Option<IntEncoding> {
        self.length_prefix.then_some(self.length_encoding)
    }

    pub fn counter_framing(&self) -> Option<IntEncoding> {
        self.chunk_counter.then_some(self.counter_encoding)
    }

    /// Unbuffered: every write becomes its own chunk.
    pub fn unbuffered(mut self) -> Self {
        self.buffer_size = 0;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_nonce_mode(mut self, nonce_mode: NonceMode) -> Self {
        self.nonce_mode = nonce_mode;
        self
    }

    pub fn validate(&self) -> SealResult<()> {
        if self.chunk_counter && !self.length_prefix {
            return Err(SealError::InvalidConfig(
                "chunk_counter requires length_prefix: a fixed-size stream cannot frame its terminator"
                    .into(),
            ));
        }
        if !self.length_prefix && self.buffer_size == 0 {
            return Err(SealError::InvalidConfig(
                "fixed-size chunks require a non-zero buffer_size".into(),
            ));
        }
        if self.chunk_counter
            && self.buffer_size != 0
            && self.buffer_size <= self.counter_encoding.max_size()
        {
            return Err(SealError::InvalidConfig(format!(
                "buffer_size {} leaves no room for payload after a {}-byte counter",
                self.buffer_size,
                self.counter_encoding.max_size()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CipherConfig {
    /// AEAD used for stream chunks (default: xchacha20-poly1305)
    pub suite: CipherSuite,
}

/// Argon2id parameters for password-derived keys
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
