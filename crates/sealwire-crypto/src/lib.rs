//! sealwire-crypto: AEAD capabilities for the sealwire stream protocol
//!
//! A [`CipherKey`] is a stateless factory: it mints independent chunk
//! [`Encryptor`]s and [`Decryptor`]s, each carrying its own nonce state.
//!
//! Sealed chunk layout per nonce mode:
//! ```text
//! counter: [ciphertext][tag]            nonce = little-endian counter, never sent
//! random:  [ciphertext][tag][nonce]     nonce = fresh CSPRNG bytes
//! ```
//!
//! Password-protected streams derive their key with Argon2id ([`kdf`]).

pub mod aead;
pub mod codec;
pub mod kdf;
pub mod keys;
pub mod nonce;
pub mod random;

pub use aead::{
    decryptor_fn, encryptor_fn, BlankDecryptor, BlankEncryptor, ChunkBuffer, Decryptor, Encryptor,
};
pub use codec::{CounterDecryptor, CounterEncryptor, RandomNonceDecryptor, RandomNonceEncryptor};
pub use kdf::{derive_key, KdfParams, SALT_SIZE};
pub use keys::CipherKey;
pub use nonce::NonceCounter;
pub use random::{os_random, seeded, RandomSource};
