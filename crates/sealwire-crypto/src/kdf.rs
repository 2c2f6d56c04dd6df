//! Key derivation: Argon2id passphrase → stream key

use argon2::{Algorithm, Argon2, Params, Version};
use sealwire_core::{CipherSuite, KdfConfig, SealError, SealResult};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::keys::CipherKey;

/// Salt length stored in front of password-encrypted streams.
pub const SALT_SIZE: usize = 16;

/// Argon2id parameters for KDF
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfConfig::default().into()
    }
}

impl From<KdfConfig> for KdfParams {
    fn from(config: KdfConfig) -> Self {
        Self {
            mem_cost_kib: config.mem_cost_kib,
            time_cost: config.time_cost,
            parallelism: config.parallelism,
        }
    }
}

/// Derive a key for `suite` from a passphrase and salt using Argon2id.
///
/// The salt should be random and stored alongside the encrypted data (it
/// does not need to be secret).
pub fn derive_key(
    passphrase: &SecretString,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
    suite: CipherSuite,
) -> SealResult<CipherKey> {
    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(suite.key_size()),
    )
    .map_err(|e| SealError::InvalidConfig(format!("invalid Argon2id params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = Zeroizing::new(vec![0u8; suite.key_size()]);
    argon2
        .hash_password_into(passphrase.expose_secret().as_bytes(), salt, &mut key)
        .map_err(|e| SealError::InvalidConfig(format!("Argon2id KDF failed: {e}")))?;

    CipherKey::from_bytes(suite, &key)
}
