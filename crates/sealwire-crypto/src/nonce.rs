//! Counter-based nonce generation.

use chacha20poly1305::aead::generic_array::typenum::Unsigned;
use chacha20poly1305::aead::AeadCore;
use sealwire_core::{SealError, SealResult};

/// Fixed-width byte counter producing unique nonces, least-significant byte
/// first.
///
/// Not constant time: the number of carries leaks how many chunks were
/// sealed, which an observer of the stream already knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceCounter {
    bytes: Box<[u8]>,
}

impl NonceCounter {
    /// A zeroed counter of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0u8; len].into_boxed_slice(),
        }
    }

    /// Resume from a previously saved counter value.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }

    /// A zeroed counter as wide as `A`'s nonce.
    pub fn for_aead<A: AeadCore>() -> Self {
        Self::new(A::NonceSize::USIZE)
    }

    /// Advance to the next value.
    ///
    /// Fails with `NonceExhausted`, leaving the value untouched, when every
    /// byte is already `0xff`; a zero-length counter fails immediately.
    pub fn increment(&mut self) -> SealResult<()> {
        if self.bytes.iter().all(|&b| b == u8::MAX) {
            return Err(SealError::NonceExhausted);
        }
        for byte in self.bytes.iter_mut() {
            let (next, carry) = byte.overflowing_add(1);
            *byte = next;
            if !carry {
                break;
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn two_byte_counter_yields_every_value_once() {
        let mut counter = NonceCounter::new(2);
        let mut seen = HashSet::new();
        seen.insert(counter.as_bytes().to_vec());

        let mut increments = 0u32;
        while counter.increment().is_ok() {
            assert!(seen.insert(counter.as_bytes().to_vec()), "counter value repeated");
            increments += 1;
        }
        assert_eq!(increments, 0xFFFF);
        assert_eq!(counter.as_bytes(), [0xff, 0xff]);
    }

    #[test]
    fn exhausted_counter_stays_exhausted() {
        let mut counter = NonceCounter::new(1);
        for _ in 0..255 {
            counter.increment().unwrap();
        }
        assert!(matches!(counter.increment(), Err(SealError::NonceExhausted)));
        assert!(matches!(counter.increment(), Err(SealError::NonceExhausted)));
        assert_eq!(counter.as_bytes(), [0xff]);
    }

    #[test]
    fn zero_length_counter_overflows_immediately() {
        let mut counter = NonceCounter::new(0);
        assert!(counter.is_empty());
        assert!(matches!(counter.increment(), Err(SealError::NonceExhausted)));
    }

    #[test]
    fn carry_is_little_endian() {
        let mut counter = NonceCounter::new(3);
        for _ in 0..256 {
            counter.increment().unwrap();
        }
        assert_eq!(counter.as_bytes(), [0x00, 0x01, 0x00]);
    }

    #[test]
    fn sized_for_aead() {
        assert_eq!(
            NonceCounter::for_aead::<chacha20poly1305::XChaCha20Poly1305>().len(),
            24
        );
        assert_eq!(NonceCounter::for_aead::<aes_gcm::Aes256Gcm>().len(), 12);
    }
}
