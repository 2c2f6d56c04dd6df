//! Symmetric keys as stateless factories of chunk encryptors/decryptors.

use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, XChaCha20Poly1305};
use sealwire_core::{CipherSuite, NonceMode, SealError, SealResult};
use zeroize::Zeroizing;

use crate::aead::{Decryptor, Encryptor};
use crate::codec::{CounterDecryptor, CounterEncryptor, RandomNonceDecryptor, RandomNonceEncryptor};
use crate::random::{os_random, RandomSource};

/// A key for one [`CipherSuite`]. Zeroized on drop.
///
/// Immutable and shareable across threads; every call to [`encryptor`] or
/// [`decryptor`] mints an independent instance with its own nonce state.
///
/// [`encryptor`]: CipherKey::encryptor
/// [`decryptor`]: CipherKey::decryptor
#[derive(Clone)]
pub struct CipherKey {
    suite: CipherSuite,
    bytes: Zeroizing<Vec<u8>>,
}

impl CipherKey {
    pub fn from_bytes(suite: CipherSuite, bytes: &[u8]) -> SealResult<Self> {
        if bytes.len() != suite.key_size() {
            return Err(SealError::KeyInvalid {
                expected: suite.key_size(),
                actual: bytes.len(),
            });
        }
        Ok(Self {
            suite,
            bytes: Zeroizing::new(bytes.to_vec()),
        })
    }

    /// Generate a random key from `rng`.
    pub fn generate<R: RandomSource + ?Sized>(suite: CipherSuite, rng: &mut R) -> SealResult<Self> {
        let mut bytes = Zeroizing::new(vec![0u8; suite.key_size()]);
        rng.fill_random(&mut bytes)?;
        Ok(Self { suite, bytes })
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encryptor drawing random nonces from the OS CSPRNG when `mode` is random.
    pub fn encryptor(&self, mode: NonceMode) -> SealResult<Box<dyn Encryptor + Send>> {
        self.encryptor_with_rng(mode, os_random())
    }

    /// Encryptor drawing random nonces from `rng` when `mode` is random.
    pub fn encryptor_with_rng<R>(
        &self,
        mode: NonceMode,
        rng: R,
    ) -> SealResult<Box<dyn Encryptor + Send>>
    where
        R: RandomSource + Send + 'static,
    {
        match self.suite {
            CipherSuite::ChaCha20Poly1305 => {
                boxed_encryptor(self.cipher::<ChaCha20Poly1305>()?, mode, rng)
            }
            CipherSuite::XChaCha20Poly1305 => {
                boxed_encryptor(self.cipher::<XChaCha20Poly1305>()?, mode, rng)
            }
            CipherSuite::Aes128Gcm => boxed_encryptor(self.cipher::<Aes128Gcm>()?, mode, rng),
            CipherSuite::Aes256Gcm => boxed_encryptor(self.cipher::<Aes256Gcm>()?, mode, rng),
        }
    }

    pub fn decryptor(&self, mode: NonceMode) -> SealResult<Box<dyn Decryptor + Send>> {
        match self.suite {
            CipherSuite::ChaCha20Poly1305 => {
                boxed_decryptor(self.cipher::<ChaCha20Poly1305>()?, mode)
            }
            CipherSuite::XChaCha20Poly1305 => {
                boxed_decryptor(self.cipher::<XChaCha20Poly1305>()?, mode)
            }
            CipherSuite::Aes128Gcm => boxed_decryptor(self.cipher::<Aes128Gcm>()?, mode),
            CipherSuite::Aes256Gcm => boxed_decryptor(self.cipher::<Aes256Gcm>()?, mode),
        }
    }

    fn cipher<A: KeyInit>(&self) -> SealResult<A> {
        A::new_from_slice(&self.bytes).map_err(|_| SealError::KeyInvalid {
            expected: self.suite.key_size(),
            actual: self.bytes.len(),
        })
    }
}

fn boxed_encryptor<A, R>(aead: A, mode: NonceMode, rng: R) -> SealResult<Box<dyn Encryptor + Send>>
where
    A: AeadInPlace + Send + 'static,
    R: RandomSource + Send + 'static,
{
    Ok(match mode {
        NonceMode::Counter => Box::new(CounterEncryptor::new(aead)),
        NonceMode::Random => Box::new(RandomNonceEncryptor::new(aead, rng)),
    })
}

fn boxed_decryptor<A>(aead: A, mode: NonceMode) -> SealResult<Box<dyn Decryptor + Send>>
where
    A: AeadInPlace + Send + 'static,
{
    Ok(match mode {
        NonceMode::Counter => Box::new(CounterDecryptor::new(aead)),
        NonceMode::Random => Box::new(RandomNonceDecryptor::new(aead)),
    })
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherKey")
            .field("suite", &self.suite)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aead::ChunkBuffer;

    fn test_key(suite: CipherSuite) -> CipherKey {
        CipherKey::from_bytes(suite, &vec![42u8; suite.key_size()]).unwrap()
    }

    #[test]
    fn test_every_suite_roundtrips_in_both_modes() {
        for suite in CipherSuite::ALL {
            for mode in [NonceMode::Random, NonceMode::Counter] {
                let key = test_key(suite);
                let mut enc = key.encryptor(mode).unwrap();
                let mut dec = key.decryptor(mode).unwrap();
                assert_eq!(enc.overhead(), dec.overhead());

                let sealed = enc.encrypt(ChunkBuffer::Fresh(b"payload")).unwrap();
                assert_eq!(sealed.len(), 7 + enc.overhead(), "{suite} {mode:?}");
                assert_eq!(dec.decrypt(sealed.into()).unwrap(), b"payload");
            }
        }
    }

    #[test]
    fn test_overhead_per_mode() {
        let key = test_key(CipherSuite::XChaCha20Poly1305);
        assert_eq!(key.encryptor(NonceMode::Counter).unwrap().overhead(), 16);
        assert_eq!(key.encryptor(NonceMode::Random).unwrap().overhead(), 16 + 24);
    }

    #[test]
    fn test_wrong_key_length() {
        let err = CipherKey::from_bytes(CipherSuite::Aes128Gcm, &[0u8; 32]).unwrap_err();
        assert!(matches!(err, SealError::KeyInvalid { expected: 16, actual: 32 }));
    }

    #[test]
    fn test_wrong_key_fails() {
        let suite = CipherSuite::ChaCha20Poly1305;
        let key1 = CipherKey::from_bytes(suite, &[1u8; 32]).unwrap();
        let key2 = CipherKey::from_bytes(suite, &[2u8; 32]).unwrap();

        let sealed = key1
            .encryptor(NonceMode::Random)
            .unwrap()
            .encrypt(ChunkBuffer::Fresh(b"secret"))
            .unwrap();
        let result = key2.decryptor(NonceMode::Random).unwrap().decrypt(sealed.into());
        assert!(matches!(result, Err(SealError::AuthenticationFailed)));
    }

    #[test]
    fn test_generated_keys_differ() {
        let mut rng = os_random();
        let k1 = CipherKey::generate(CipherSuite::Aes256Gcm, &mut rng).unwrap();
        let k2 = CipherKey::generate(CipherSuite::Aes256Gcm, &mut rng).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
        assert_eq!(k1.as_bytes().len(), 32);
    }

    #[test]
    fn test_debug_redacts_bytes() {
        let rendered = format!("{:?}", test_key(CipherSuite::Aes128Gcm));
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("42"));
    }

    #[test]
    fn test_key_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CipherKey>();
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn counter_chunks_open_in_sequence(
                chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..512), 1..8),
                suite_idx in 0usize..4,
            ) {
                let key = test_key(CipherSuite::ALL[suite_idx]);
                let mut enc = key.encryptor(NonceMode::Counter).unwrap();
                let mut dec = key.decryptor(NonceMode::Counter).unwrap();
                for chunk in &chunks {
                    let sealed = enc.encrypt(ChunkBuffer::Fresh(chunk)).unwrap();
                    prop_assert_eq!(&dec.decrypt(sealed.into()).unwrap(), chunk);
                }
            }

            #[test]
            fn flipped_bit_never_opens(
                data in prop::collection::vec(any::<u8>(), 1..256),
                flip in any::<prop::sample::Index>(),
            ) {
                let key = test_key(CipherSuite::ChaCha20Poly1305);
                let mut sealed = key
                    .encryptor(NonceMode::Random)
                    .unwrap()
                    .encrypt(ChunkBuffer::Fresh(&data))
                    .unwrap();
                let i = flip.index(sealed.len());
                sealed[i] ^= 0x01;
                prop_assert!(key.decryptor(NonceMode::Random).unwrap().decrypt(sealed.into()).is_err());
            }
        }
    }
}
