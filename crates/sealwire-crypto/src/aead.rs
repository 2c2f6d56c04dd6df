//! Single-chunk seal/open capabilities consumed by the stream codec.

use sealwire_core::SealResult;

/// Where a seal/open operation takes its input from and leaves its output.
///
/// The borrow checker rules out partially overlapping buffers, so the only
/// choices are a fresh allocation or reuse of one owned buffer.
#[derive(Debug)]
pub enum ChunkBuffer<'a> {
    /// Copy the input into a newly allocated buffer; the input is untouched.
    Fresh(&'a [u8]),
    /// The buffer holds the input and is overwritten with the output,
    /// reusing its allocation.
    InPlace(Vec<u8>),
}

impl ChunkBuffer<'_> {
    pub fn len(&self) -> usize {
        match self {
            ChunkBuffer::Fresh(data) => data.len(),
            ChunkBuffer::InPlace(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Owned working buffer with room for `headroom` more bytes.
    pub fn into_vec(self, headroom: usize) -> Vec<u8> {
        match self {
            ChunkBuffer::Fresh(data) => {
                let mut buf = Vec::with_capacity(data.len() + headroom);
                buf.extend_from_slice(data);
                buf
            }
            ChunkBuffer::InPlace(mut buf) => {
                buf.reserve(headroom);
                buf
            }
        }
    }
}

impl<'a> From<&'a [u8]> for ChunkBuffer<'a> {
    fn from(data: &'a [u8]) -> Self {
        ChunkBuffer::Fresh(data)
    }
}

impl From<Vec<u8>> for ChunkBuffer<'_> {
    fn from(buf: Vec<u8>) -> Self {
        ChunkBuffer::InPlace(buf)
    }
}

/// Seals one chunk at a time. Successive calls may depend on each other
/// (e.g. a nonce counter), so chunk boundaries matter.
pub trait Encryptor {
    fn encrypt(&mut self, chunk: ChunkBuffer<'_>) -> SealResult<Vec<u8>>;

    /// Bytes a sealed chunk gains over its plaintext.
    fn overhead(&self) -> usize {
        0
    }
}

/// Reverses an [`Encryptor`], chunk by chunk and in the same order.
pub trait Decryptor {
    fn decrypt(&mut self, chunk: ChunkBuffer<'_>) -> SealResult<Vec<u8>>;

    /// Bytes a sealed chunk carries beyond its plaintext.
    fn overhead(&self) -> usize {
        0
    }
}

impl<E: Encryptor + ?Sized> Encryptor for &mut E {
    fn encrypt(&mut self, chunk: ChunkBuffer<'_>) -> SealResult<Vec<u8>> {
        (**self).encrypt(chunk)
    }

    fn overhead(&self) -> usize {
        (**self).overhead()
    }
}

impl<E: Encryptor + ?Sized> Encryptor for Box<E> {
    fn encrypt(&mut self, chunk: ChunkBuffer<'_>) -> SealResult<Vec<u8>> {
        (**self).encrypt(chunk)
    }

    fn overhead(&self) -> usize {
        (**self).overhead()
    }
}

impl<D: Decryptor + ?Sized> Decryptor for &mut D {
    fn decrypt(&mut self, chunk: ChunkBuffer<'_>) -> SealResult<Vec<u8>> {
        (**self).decrypt(chunk)
    }

    fn overhead(&self) -> usize {
        (**self).overhead()
    }
}

impl<D: Decryptor + ?Sized> Decryptor for Box<D> {
    fn decrypt(&mut self, chunk: ChunkBuffer<'_>) -> SealResult<Vec<u8>> {
        (**self).decrypt(chunk)
    }

    fn overhead(&self) -> usize {
        (**self).overhead()
    }
}

/// A closure used as an [`Encryptor`]. See [`encryptor_fn`].
pub struct EncryptorFn<F> {
    f: F,
    overhead: usize,
}

/// Wrap `f` as an [`Encryptor`] whose chunks grow by `overhead` bytes.
pub fn encryptor_fn<F>(overhead: usize, f: F) -> EncryptorFn<F>
where
    F: FnMut(ChunkBuffer<'_>) -> SealResult<Vec<u8>>,
{
    EncryptorFn { f, overhead }
}

impl<F> Encryptor for EncryptorFn<F>
where
    F: FnMut(ChunkBuffer<'_>) -> SealResult<Vec<u8>>,
{
    fn encrypt(&mut self, chunk: ChunkBuffer<'_>) -> SealResult<Vec<u8>> {
        (self.f)(chunk)
    }

    fn overhead(&self) -> usize {
        self.overhead
    }
}

/// A closure used as a [`Decryptor`]. See [`decryptor_fn`].
pub struct DecryptorFn<F> {
    f: F,
    overhead: usize,
}

/// Wrap `f` as a [`Decryptor`] for chunks carrying `overhead` extra bytes.
pub fn decryptor_fn<F>(overhead: usize, f: F) -> DecryptorFn<F>
where
    F: FnMut(ChunkBuffer<'_>) -> SealResult<Vec<u8>>,
{
    DecryptorFn { f, overhead }
}

impl<F> Decryptor for DecryptorFn<F>
where
    F: FnMut(ChunkBuffer<'_>) -> SealResult<Vec<u8>>,
{
    fn decrypt(&mut self, chunk: ChunkBuffer<'_>) -> SealResult<Vec<u8>> {
        (self.f)(chunk)
    }

    fn overhead(&self) -> usize {
        self.overhead
    }
}

/// Identity "encryption". NOT SECURE: exists so framing can be tested with
/// readable bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlankEncryptor;

impl Encryptor for BlankEncryptor {
    fn encrypt(&mut self, chunk: ChunkBuffer<'_>) -> SealResult<Vec<u8>> {
        Ok(chunk.into_vec(0))
    }
}

/// Counterpart of [`BlankEncryptor`]. NOT SECURE.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlankDecryptor;

impl Decryptor for BlankDecryptor {
    fn decrypt(&mut self, chunk: ChunkBuffer<'_>) -> SealResult<Vec<u8>> {
        Ok(chunk.into_vec(0))
    }
}
