//! AEAD primitives wrapped as chunk [`Encryptor`]/[`Decryptor`]s.
//!
//! Counter mode, per chunk:
//! ```text
//! nonce = NonceCounter (incremented after every successful seal/open)
//! [ciphertext][tag]
//! ```
//!
//! Random mode, per chunk:
//! ```text
//! nonce = fresh bytes from the RandomSource
//! [ciphertext][tag][nonce]
//! ```
//! The nonce trails the ciphertext so the opener can slice it off the end.

use chacha20poly1305::aead::generic_array::typenum::Unsigned;
use chacha20poly1305::aead::{AeadCore, AeadInPlace, Nonce};
use sealwire_core::{SealError, SealResult};

use crate::aead::{ChunkBuffer, Decryptor, Encryptor};
use crate::nonce::NonceCounter;
use crate::random::RandomSource;

fn tag_size<A: AeadCore>() -> usize {
    A::TagSize::USIZE
}

fn nonce_size<A: AeadCore>() -> usize {
    A::NonceSize::USIZE
}

fn check_counter<A: AeadCore>(counter: &NonceCounter) -> SealResult<()> {
    if counter.len() != nonce_size::<A>() {
        return Err(SealError::InvalidConfig(format!(
            "nonce counter is {} bytes, cipher needs {}",
            counter.len(),
            nonce_size::<A>()
        )));
    }
    Ok(())
}

/// Seals chunks using a [`NonceCounter`] as the nonce.
pub struct CounterEncryptor<A> {
    aead: A,
    counter: NonceCounter,
    exhausted: bool,
}

impl<A: AeadInPlace> CounterEncryptor<A> {
    pub fn new(aead: A) -> Self {
        Self {
            aead,
            counter: NonceCounter::for_aead::<A>(),
            exhausted: false,
        }
    }

    /// Start from an explicit counter value; its width must match the nonce.
    pub fn with_counter(aead: A, counter: NonceCounter) -> SealResult<Self> {
        check_counter::<A>(&counter)?;
        Ok(Self {
            aead,
            counter,
            exhausted: false,
        })
    }

    pub fn counter(&self) -> &NonceCounter {
        &self.counter
    }
}

impl<A: AeadInPlace> Encryptor for CounterEncryptor<A> {
    fn encrypt(&mut self, chunk: ChunkBuffer<'_>) -> SealResult<Vec<u8>> {
        if self.exhausted {
            return Err(SealError::NonceExhausted);
        }
        let mut buf = chunk.into_vec(tag_size::<A>());
        let nonce = Nonce::<A>::from_slice(self.counter.as_bytes());
        self.aead
            .encrypt_in_place(nonce, &[], &mut buf)
            .map_err(|_| SealError::EncryptionFailed)?;
        // The final counter value has now been used; the next seal must fail.
        if self.counter.increment().is_err() {
            tracing::warn!("nonce counter exhausted; encryptor will refuse further chunks");
            self.exhausted = true;
        }
        Ok(buf)
    }

    fn overhead(&self) -> usize {
        tag_size::<A>()
    }
}

/// Opens chunks sealed by a [`CounterEncryptor`] under the same key.
pub struct CounterDecryptor<A> {
    aead: A,
    counter: NonceCounter,
    exhausted: bool,
}

impl<A: AeadInPlace> CounterDecryptor<A> {
    pub fn new(aead: A) -> Self {
        Self {
            aead,
            counter: NonceCounter::for_aead::<A>(),
            exhausted: false,
        }
    }

    pub fn with_counter(aead: A, counter: NonceCounter) -> SealResult<Self> {
        check_counter::<A>(&counter)?;
        Ok(Self {
            aead,
            counter,
            exhausted: false,
        })
    }

    pub fn counter(&self) -> &NonceCounter {
        &self.counter
    }
}

impl<A: AeadInPlace> Decryptor for CounterDecryptor<A> {
    fn decrypt(&mut self, chunk: ChunkBuffer<'_>) -> SealResult<Vec<u8>> {
        if self.exhausted {
            return Err(SealError::NonceExhausted);
        }
        if chunk.len() < tag_size::<A>() {
            return Err(SealError::AuthenticationFailed);
        }
        let mut buf = chunk.into_vec(0);
        let nonce = Nonce::<A>::from_slice(self.counter.as_bytes());
        self.aead
            .decrypt_in_place(nonce, &[], &mut buf)
            .map_err(|_| SealError::AuthenticationFailed)?;
        if self.counter.increment().is_err() {
            self.exhausted = true;
        }
        Ok(buf)
    }

    fn overhead(&self) -> usize {
        tag_size::<A>()
    }
}

/// Seals chunks under fresh random nonces appended to each ciphertext.
///
/// No hard limit is enforced. Random nonces collide with birthday-bound
/// probability, so a warning is logged once the seal count reaches
/// 2^(nonce bits / 3), i.e. 2^32 for a 12-byte nonce.
pub struct RandomNonceEncryptor<A, R> {
    aead: A,
    rng: R,
    sealed: u64,
    soft_limit: u64,
}

impl<A: AeadInPlace, R: RandomSource> RandomNonceEncryptor<A, R> {
    pub fn new(aead: A, rng: R) -> Self {
        let bits = (nonce_size::<A>() * 8 / 3).min(63) as u32;
        Self {
            aead,
            rng,
            sealed: 0,
            soft_limit: 1u64 << bits,
        }
    }

    /// Chunks sealed so far by this instance.
    pub fn sealed(&self) -> u64 {
        self.sealed
    }
}

impl<A: AeadInPlace, R: RandomSource> Encryptor for RandomNonceEncryptor<A, R> {
    fn encrypt(&mut self, chunk: ChunkBuffer<'_>) -> SealResult<Vec<u8>> {
        let mut nonce = Nonce::<A>::default();
        self.rng.fill_random(&mut nonce)?;

        let mut buf = chunk.into_vec(tag_size::<A>() + nonce_size::<A>());
        self.aead
            .encrypt_in_place(&nonce, &[], &mut buf)
            .map_err(|_| SealError::EncryptionFailed)?;
        buf.extend_from_slice(&nonce);

        self.sealed += 1;
        if self.sealed == self.soft_limit {
            tracing::warn!(
                sealed = self.sealed,
                "random nonces used past the collision soft limit; rotate the key"
            );
        }
        Ok(buf)
    }

    fn overhead(&self) -> usize {
        tag_size::<A>() + nonce_size::<A>()
    }
}

/// Opens chunks sealed by a [`RandomNonceEncryptor`].
pub struct RandomNonceDecryptor<A> {
    aead: A,
}

impl<A: AeadInPlace> RandomNonceDecryptor<A> {
    pub fn new(aead: A) -> Self {
        Self { aead }
    }
}

impl<A: AeadInPlace> Decryptor for RandomNonceDecryptor<A> {
    fn decrypt(&mut self, chunk: ChunkBuffer<'_>) -> SealResult<Vec<u8>> {
        let nonce_len = nonce_size::<A>();
        if chunk.len() < nonce_len {
            return Err(SealError::NonceInvalid);
        }
        if chunk.len() < nonce_len + tag_size::<A>() {
            return Err(SealError::AuthenticationFailed);
        }

        let mut buf = chunk.into_vec(0);
        let split = buf.len() - nonce_len;
        let nonce = Nonce::<A>::clone_from_slice(&buf[split..]);
        buf.truncate(split);
        self.aead
            .decrypt_in_place(&nonce, &[], &mut buf)
            .map_err(|_| SealError::AuthenticationFailed)?;
        Ok(buf)
    }

    fn overhead(&self) -> usize {
        tag_size::<A>() + nonce_size::<A>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chacha20poly1305::aead::KeyInit;
    use chacha20poly1305::{ChaCha20Poly1305, XChaCha20Poly1305};
    use rand::rngs::mock::StepRng;
    use std::collections::HashSet;

    const KEY: [u8; 32] = [42u8; 32];

    fn chacha() -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new((&KEY).into())
    }

    #[test]
    fn counter_mode_roundtrip_in_order() {
        let mut enc = CounterEncryptor::new(chacha());
        let mut dec = CounterDecryptor::new(chacha());

        for i in 0..10u8 {
            let msg = vec![i; i as usize * 7];
            let sealed = enc.encrypt(msg.as_slice().into()).unwrap();
            assert_eq!(sealed.len(), msg.len() + enc.overhead());
            assert_eq!(dec.decrypt(sealed.into()).unwrap(), msg);
        }
    }

    #[test]
    fn counter_mode_rejects_out_of_order_chunks() {
        let mut enc = CounterEncryptor::new(chacha());
        let mut dec = CounterDecryptor::new(chacha());

        let _first = enc.encrypt(b"one".as_slice().into()).unwrap();
        let second = enc.encrypt(b"two".as_slice().into()).unwrap();
        assert!(matches!(
            dec.decrypt(second.into()),
            Err(SealError::AuthenticationFailed)
        ));
    }

    #[test]
    fn counter_mode_never_reuses_a_nonce() {
        let mut enc = CounterEncryptor::new(chacha());
        let mut nonces = HashSet::new();
        let chunk = vec![0u8; 1024];
        for _ in 0..1024 {
            assert!(nonces.insert(enc.counter().as_bytes().to_vec()));
            enc.encrypt(chunk.as_slice().into()).unwrap();
        }
        assert_eq!(nonces.len(), 1024);
    }

    #[test]
    fn counter_mode_resumes_from_given_counter() {
        let mut start = NonceCounter::new(12);
        start.increment().unwrap();
        start.increment().unwrap();

        let mut enc = CounterEncryptor::with_counter(chacha(), start.clone()).unwrap();
        let mut dec = CounterDecryptor::with_counter(chacha(), start).unwrap();
        let sealed = enc.encrypt(b"fine".as_slice().into()).unwrap();
        assert_eq!(enc.counter().as_bytes()[0], 3);
        assert_eq!(dec.decrypt(sealed.into()).unwrap(), b"fine");
        assert_eq!(dec.counter().as_bytes()[0], 3);
    }

    #[test]
    fn exhausted_encryptor_fails_after_last_nonce() {
        let last = NonceCounter::from_bytes(vec![0xff; 12]);
        let mut enc = CounterEncryptor::with_counter(chacha(), last.clone()).unwrap();
        let mut dec = CounterDecryptor::with_counter(chacha(), last).unwrap();

        let sealed = enc.encrypt(b"last".as_slice().into()).unwrap();
        assert!(matches!(
            enc.encrypt(b"again".as_slice().into()),
            Err(SealError::NonceExhausted)
        ));

        assert_eq!(dec.decrypt(sealed.into()).unwrap(), b"last");
        assert!(matches!(
            dec.decrypt(vec![0u8; 32].into()),
            Err(SealError::NonceExhausted)
        ));
    }

    #[test]
    fn counter_width_must_match_cipher() {
        let err = CounterEncryptor::with_counter(chacha(), NonceCounter::new(24))
            .err()
            .unwrap();
        assert!(matches!(err, SealError::InvalidConfig(_)));
        assert!(CounterDecryptor::with_counter(chacha(), NonceCounter::new(12)).is_ok());
    }

    #[test]
    fn random_mode_appends_nonce() {
        let mut enc = RandomNonceEncryptor::new(chacha(), StepRng::new(0, 0));
        let sealed = enc.encrypt(b"hello".as_slice().into()).unwrap();
        assert_eq!(sealed.len(), 5 + 16 + 12);
        assert_eq!(&sealed[sealed.len() - 12..], &[0u8; 12]);

        let mut dec = RandomNonceDecryptor::new(chacha());
        assert_eq!(dec.decrypt(sealed.into()).unwrap(), b"hello");
        assert_eq!(enc.sealed(), 1);
    }

    #[test]
    fn random_mode_is_order_independent() {
        let cipher = || XChaCha20Poly1305::new((&KEY).into());
        let mut enc = RandomNonceEncryptor::new(cipher(), crate::random::os_random());
        let a = enc.encrypt(b"a".as_slice().into()).unwrap();
        let b = enc.encrypt(b"b".as_slice().into()).unwrap();

        let mut dec = RandomNonceDecryptor::new(cipher());
        assert_eq!(dec.decrypt(b.into()).unwrap(), b"b");
        assert_eq!(dec.decrypt(a.into()).unwrap(), b"a");
    }

    #[test]
    fn random_mode_short_inputs() {
        let mut dec = RandomNonceDecryptor::new(chacha());
        assert!(matches!(
            dec.decrypt(vec![0u8; 11].into()),
            Err(SealError::NonceInvalid)
        ));
        assert!(matches!(
            dec.decrypt(vec![0u8; 20].into()),
            Err(SealError::AuthenticationFailed)
        ));
    }

    #[test]
    fn tampered_chunk_fails_authentication() {
        let mut enc = RandomNonceEncryptor::new(chacha(), crate::random::os_random());
        let mut sealed = enc.encrypt(b"secret data".as_slice().into()).unwrap();
        sealed[3] ^= 0x01;
        let mut dec = RandomNonceDecryptor::new(chacha());
        assert!(matches!(
            dec.decrypt(sealed.into()),
            Err(SealError::AuthenticationFailed)
        ));
    }

    #[test]
    fn in_place_seal_keeps_allocation_when_capacity_allows() {
        let mut enc = CounterEncryptor::new(chacha());
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(b"reuse me");
        let ptr = buf.as_ptr();
        let sealed = enc.encrypt(ChunkBuffer::InPlace(buf)).unwrap();
        assert_eq!(sealed.as_ptr(), ptr);

        let mut dec = CounterDecryptor::new(chacha());
        let opened = dec.decrypt(ChunkBuffer::InPlace(sealed)).unwrap();
        assert_eq!(opened.as_ptr(), ptr);
        assert_eq!(opened, b"reuse me");
    }
}
