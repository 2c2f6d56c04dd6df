//! sealwire-stream: chunked AEAD stream encryption over `io::Write` / `io::Read`
//!
//! Wire format, one frame per chunk:
//! ```text
//! [length prefix?][sealed chunk]
//! sealed chunk opens to [counter prefix?][payload]
//! ```
//! Data chunks count up from 1. The stream ends with a terminator: a sealed
//! chunk holding only counter 0, or a zero length prefix when counters are
//! off. Fixed-size streams end with a sealed chunk shorter than a full one,
//! empty if need be. A reader that runs out of input before the terminator reports
//! `StreamTruncated`; a counter out of sequence is `ChunksReordered`.

pub mod reader;
pub mod writer;

use std::io::{Read, Write};

use sealwire_core::{SealResult, StreamConfig};
use sealwire_crypto::{CipherKey, Decryptor, Encryptor};

pub use reader::StreamDecryptor;
pub use writer::StreamEncryptor;

/// Stream encryptor driven by a [`CipherKey`].
pub type KeyedEncryptor<W> = StreamEncryptor<W, Box<dyn Encryptor + Send>>;

/// Stream decryptor driven by a [`CipherKey`].
pub type KeyedDecryptor<R> = StreamDecryptor<R, Box<dyn Decryptor + Send>>;

/// Encrypt into `sink` with `key`, using the nonce mode from `config`.
pub fn encrypt_to<W: Write>(
    sink: W,
    key: &CipherKey,
    config: &StreamConfig,
) -> SealResult<KeyedEncryptor<W>> {
    StreamEncryptor::new(sink, key.encryptor(config.nonce_mode)?, config)
}

/// Decrypt from `source` with `key`, using the nonce mode from `config`.
pub fn decrypt_from<R: Read>(
    source: R,
    key: &CipherKey,
    config: &StreamConfig,
) -> SealResult<KeyedDecryptor<R>> {
    StreamDecryptor::new(source, key.decryptor(config.nonce_mode)?, config)
}
