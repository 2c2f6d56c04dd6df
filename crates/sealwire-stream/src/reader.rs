//! Stream decryptor: reads framed chunks, opens them and checks their order.

use std::io::{self, Read};

use sealwire_core::encoding::read_up_to;
use sealwire_core::{IntEncoding, SealError, SealResult, StreamConfig};
use sealwire_crypto::{ChunkBuffer, Decryptor};
use tracing::{debug, trace, warn};

#[derive(Debug)]
enum ReaderState {
    Reading,
    /// A valid terminator was seen; reads report end of stream.
    Terminated,
    Closed,
    Failed(SealError),
}

enum Frame {
    Chunk,
    /// Short chunk closing a fixed-size stream; its payload is the last data.
    FinalChunk,
    /// Bare zero length prefix of a counterless stream.
    Terminator,
    EndOfInput,
}

/// Decrypts a framed chunk stream from `source`.
///
/// `Ok(0)` from a read means the terminator was authenticated. Running out of
/// input without one is `StreamTruncated`, so callers should treat data as
/// complete only once [`close`](Self::close) has succeeded.
pub struct StreamDecryptor<R: Read, D: Decryptor> {
    source: R,
    decryptor: D,
    length: Option<IntEncoding>,
    counter: Option<IntEncoding>,
    fixed_chunk_len: usize,
    overhead: usize,
    chunk_limit: Option<u64>,
    pending: Vec<u8>,
    pending_pos: usize,
    scratch: Vec<u8>,
    expected_counter: u64,
    chunks: u64,
    state: ReaderState,
}

impl<R: Read, D: Decryptor> StreamDecryptor<R, D> {
    pub fn new(source: R, decryptor: D, config: &StreamConfig) -> SealResult<Self> {
        config.validate()?;
        let overhead = decryptor.overhead();
        let chunk_limit = (config.max_chunk_size != 0)
            .then(|| config.max_chunk_size.saturating_add(overhead as u64));
        Ok(Self {
            source,
            decryptor,
            length: config.length_framing(),
            counter: config.counter_framing(),
            fixed_chunk_len: config.buffer_size + overhead,
            overhead,
            chunk_limit,
            pending: Vec::new(),
            pending_pos: 0,
            scratch: Vec::new(),
            expected_counter: 1,
            chunks: 0,
            state: ReaderState::Reading,
        })
    }

    /// Fill `out` with plaintext, pulling as many chunks as it takes.
    ///
    /// Returns `Ok(0)` at the end of the stream. Bytes produced before a
    /// failure are returned first and the failure is reported on the next
    /// call.
    pub fn read_plaintext(&mut self, out: &mut [u8]) -> SealResult<usize> {
        match &self.state {
            ReaderState::Closed => return Err(SealError::StreamClosed),
            ReaderState::Failed(err) => return Err(err.clone()),
            ReaderState::Reading | ReaderState::Terminated => {}
        }

        let mut written = 0;
        while written < out.len() {
            if self.pending_pos < self.pending.len() {
                let available = &self.pending[self.pending_pos..];
                let n = available.len().min(out.len() - written);
                out[written..written + n].copy_from_slice(&available[..n]);
                self.pending_pos += n;
                written += n;
                continue;
            }
            if matches!(self.state, ReaderState::Terminated) {
                break;
            }
            if let Err(err) = self.next_chunk() {
                let err = self.fail(err);
                if written == 0 {
                    return Err(err);
                }
                break;
            }
        }
        Ok(written)
    }

    /// Confirm the stream ended with its terminator.
    ///
    /// Fails with `StreamTruncated` when the terminator has not been read,
    /// with the cached error after a failure, and with `StreamClosed` on a
    /// second call.
    pub fn close(&mut self) -> SealResult<()> {
        let outcome = match &self.state {
            ReaderState::Terminated => Ok(()),
            ReaderState::Reading => Err(SealError::StreamTruncated),
            ReaderState::Failed(err) => return Err(err.clone()),
            ReaderState::Closed => return Err(SealError::StreamClosed),
        };
        match outcome {
            Ok(()) => {
                self.state = ReaderState::Closed;
                debug!(chunks = self.chunks, "stream decryptor closed");
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// True once the terminator has been authenticated.
    pub fn is_terminated(&self) -> bool {
        matches!(self.state, ReaderState::Terminated | ReaderState::Closed)
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    /// Pull one frame from the source and leave its payload in `pending`.
    fn next_chunk(&mut self) -> SealResult<()> {
        let mut chunk = std::mem::take(&mut self.scratch);
        chunk.clear();

        let last = match self.read_frame(&mut chunk)? {
            Frame::Chunk => false,
            Frame::FinalChunk => true,
            Frame::Terminator => return self.terminate(),
            Frame::EndOfInput => return Err(SealError::StreamTruncated),
        };

        let sealed_len = chunk.len();
        let plaintext = self.decryptor.decrypt(ChunkBuffer::InPlace(chunk))?;
        let start = match self.counter {
            Some(encoding) => {
                let (found, used) = encoding.decode(&plaintext)?;
                if found == 0 {
                    if used != plaintext.len() {
                        return Err(SealError::InvalidTerminator);
                    }
                    return self.terminate();
                }
                if found != self.expected_counter {
                    return Err(SealError::ChunksReordered {
                        expected: self.expected_counter,
                        found,
                    });
                }
                self.expected_counter += 1;
                used
            }
            None => 0,
        };

        self.chunks += 1;
        trace!(
            chunk = self.chunks,
            sealed_len,
            plaintext_len = plaintext.len() - start,
            "opened chunk"
        );
        self.scratch = std::mem::replace(&mut self.pending, plaintext);
        self.pending_pos = start;
        if last {
            debug!(chunks = self.chunks, "final fixed-size chunk reached");
            self.state = ReaderState::Terminated;
        }
        Ok(())
    }

    fn read_frame(&mut self, chunk: &mut Vec<u8>) -> SealResult<Frame> {
        let Some(length) = self.length else {
            chunk.resize(self.fixed_chunk_len, 0);
            let got = read_up_to(&mut self.source, chunk.as_mut_slice())?;
            chunk.truncate(got);
            // A codec without overhead seals the empty final chunk to zero bytes.
            return Ok(if got == self.fixed_chunk_len {
                Frame::Chunk
            } else if got == 0 && self.overhead > 0 {
                Frame::EndOfInput
            } else {
                Frame::FinalChunk
            });
        };

        let declared = match length.read_from(&mut self.source)? {
            None => return Ok(Frame::EndOfInput),
            Some(0) if self.counter.is_none() => return Ok(Frame::Terminator),
            Some(declared) => declared,
        };
        if let Some(limit) = self.chunk_limit {
            if declared > limit {
                return Err(SealError::ChunkTooBig { declared, limit });
            }
        }
        // Grows with the bytes actually received, not the declared length.
        let got = (&mut self.source).take(declared).read_to_end(chunk)?;
        if (got as u64) < declared {
            return Err(SealError::StreamTruncated);
        }
        Ok(Frame::Chunk)
    }

    fn terminate(&mut self) -> SealResult<()> {
        debug!(chunks = self.chunks, "stream terminator reached");
        self.pending.clear();
        self.pending_pos = 0;
        self.state = ReaderState::Terminated;
        Ok(())
    }

    fn fail(&mut self, err: SealError) -> SealError {
        warn!(error = %err, chunks = self.chunks, "stream decryptor failed");
        self.state = ReaderState::Failed(err.clone());
        err
    }
}

impl<R: Read, D: Decryptor> Read for StreamDecryptor<R, D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_plaintext(buf)?)
    }
}
