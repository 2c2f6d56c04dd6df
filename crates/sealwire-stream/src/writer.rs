//! Stream encryptor: buffers plaintext into chunks, seals and frames them.

use std::io::{self, Write};

use sealwire_core::encoding::MAX_VARINT_LEN;
use sealwire_core::{IntEncoding, SealError, SealResult, StreamConfig};
use sealwire_crypto::{ChunkBuffer, Encryptor};
use tracing::{debug, trace, warn};

#[derive(Debug)]
enum WriterState {
    Open,
    Closed,
    Failed(SealError),
}

/// Encrypts everything written to it into a framed chunk stream on `sink`.
///
/// Nothing is final until [`close`](Self::close) has emitted the terminator;
/// dropping the encryptor without closing leaves a stream the reader will
/// reject as truncated.
pub struct StreamEncryptor<W: Write, E: Encryptor> {
    sink: W,
    encryptor: E,
    length: Option<IntEncoding>,
    counter: Option<IntEncoding>,
    buffer_size: usize,
    /// Plaintext of the chunk being assembled, counter prefix included.
    buf: Vec<u8>,
    prefix: Vec<u8>,
    next_counter: u64,
    chunks: u64,
    state: WriterState,
}

impl<W: Write, E: Encryptor> StreamEncryptor<W, E> {
    pub fn new(sink: W, encryptor: E, config: &StreamConfig) -> SealResult<Self> {
        config.validate()?;
        let capacity = config.buffer_size + encryptor.overhead();
        if let Some(length) = config.length_framing() {
            if config.buffer_size != 0 && length.size(capacity as u64).is_none() {
                return Err(SealError::InvalidConfig(format!(
                    "a full {capacity}-byte chunk does not fit the {length:?} length prefix"
                )));
            }
        }
        Ok(Self {
            sink,
            encryptor,
            length: config.length_framing(),
            counter: config.counter_framing(),
            buffer_size: config.buffer_size,
            buf: Vec::with_capacity(capacity),
            prefix: Vec::with_capacity(MAX_VARINT_LEN),
            next_counter: 1,
            chunks: 0,
            state: WriterState::Open,
        })
    }

    /// Encrypt `data` into the stream, returning `data.len()` on success.
    ///
    /// Buffered streams seal a chunk each time the buffer fills; unbuffered
    /// ones seal every non-empty call as its own chunk.
    pub fn write_plaintext(&mut self, data: &[u8]) -> SealResult<usize> {
        self.check_open()?;
        if data.is_empty() {
            return Ok(0);
        }
        let result = if self.buffer_size == 0 {
            self.write_unbuffered(data)
        } else {
            self.write_buffered(data)
        };
        match result {
            Ok(()) => Ok(data.len()),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Seal any buffered plaintext, emit the terminator and flush the sink.
    ///
    /// A second call fails with `StreamClosed` and writes nothing.
    pub fn close(&mut self) -> SealResult<()> {
        self.check_open()?;
        if let Err(err) = self.finish() {
            return Err(self.fail(err));
        }
        self.state = WriterState::Closed;
        debug!(chunks = self.chunks, "stream encryptor closed");
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Unwrap the sink. Buffered plaintext that was never sealed is lost.
    pub fn into_inner(self) -> W {
        self.sink
    }

    fn write_buffered(&mut self, data: &[u8]) -> SealResult<()> {
        let mut rest = data;
        while !rest.is_empty() {
            if self.buf.is_empty() {
                self.push_counter()?;
            }
            let room = self.buffer_size - self.buf.len();
            let (head, tail) = rest.split_at(room.min(rest.len()));
            self.buf.extend_from_slice(head);
            rest = tail;
            if self.buf.len() == self.buffer_size {
                self.seal_buffer()?;
            }
        }
        Ok(())
    }

    fn write_unbuffered(&mut self, data: &[u8]) -> SealResult<()> {
        self.push_counter()?;
        self.buf.extend_from_slice(data);
        self.seal_buffer()
    }

    fn push_counter(&mut self) -> SealResult<()> {
        if let Some(encoding) = self.counter {
            encoding.encode(self.next_counter, &mut self.buf)?;
            self.next_counter = self
                .next_counter
                .checked_add(1)
                .ok_or(SealError::NonceExhausted)?;
        }
        Ok(())
    }

    /// Seal `buf` in place, frame it, and keep the allocation for the next chunk.
    fn seal_buffer(&mut self) -> SealResult<()> {
        let chunk = std::mem::take(&mut self.buf);
        let plaintext_len = chunk.len();
        let mut sealed = self.encryptor.encrypt(ChunkBuffer::InPlace(chunk))?;
        self.emit(&sealed)?;
        self.chunks += 1;
        trace!(
            chunk = self.chunks,
            plaintext_len,
            sealed_len = sealed.len(),
            "sealed chunk"
        );
        sealed.clear();
        self.buf = sealed;
        Ok(())
    }

    fn emit(&mut self, sealed: &[u8]) -> SealResult<()> {
        if let Some(encoding) = self.length {
            self.prefix.clear();
            encoding.encode(sealed.len() as u64, &mut self.prefix)?;
            self.sink.write_all(&self.prefix)?;
        }
        self.sink.write_all(sealed)?;
        Ok(())
    }

    fn finish(&mut self) -> SealResult<()> {
        let Some(length) = self.length else {
            // Full buffers are sealed on write, so this chunk is always short
            // (possibly empty) and marks the end of a fixed-size stream.
            self.seal_buffer()?;
            self.sink.flush()?;
            return Ok(());
        };
        if !self.buf.is_empty() {
            self.seal_buffer()?;
        }
        match self.counter {
            Some(counter) => {
                counter.encode(0, &mut self.buf)?;
                self.seal_buffer()?;
            }
            None => {
                self.prefix.clear();
                length.encode(0, &mut self.prefix)?;
                self.sink.write_all(&self.prefix)?;
            }
        }
        self.sink.flush()?;
        Ok(())
    }

    fn check_open(&self) -> SealResult<()> {
        match &self.state {
            WriterState::Open => Ok(()),
            WriterState::Closed => Err(SealError::StreamClosed),
            WriterState::Failed(err) => Err(err.clone()),
        }
    }

    fn fail(&mut self, err: SealError) -> SealError {
        warn!(error = %err, chunks = self.chunks, "stream encryptor failed");
        self.state = WriterState::Failed(err.clone());
        err
    }
}

impl<W: Write, E: Encryptor> Write for StreamEncryptor<W, E> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_plaintext(buf)?)
    }

    /// Flushes the sink only. A partially filled chunk stays buffered.
    fn flush(&mut self) -> io::Result<()> {
        if let WriterState::Failed(err) = &self.state {
            return Err(err.clone().into());
        }
        self.sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealwire_crypto::BlankEncryptor;

    fn blank_writer(config: &StreamConfig) -> StreamEncryptor<Vec<u8>, BlankEncryptor> {
        StreamEncryptor::new(Vec::new(), BlankEncryptor, config).unwrap()
    }

    #[test]
    fn unbuffered_frames_each_write() {
        let mut w = blank_writer(&StreamConfig::default().unbuffered());
        w.write_plaintext(b"abc").unwrap();
        w.write_plaintext(b"de").unwrap();
        w.close().unwrap();
        // [len][counter][payload] per chunk, then the sealed zero counter
        assert_eq!(
            w.into_inner(),
            [4, 1, b'a', b'b', b'c', 3, 2, b'd', b'e', 1, 0]
        );
    }

    #[test]
    fn buffered_seals_when_full() {
        let config = StreamConfig {
            counter_encoding: IntEncoding::Fixed1,
            ..StreamConfig::default().with_buffer_size(4)
        };
        let mut w = blank_writer(&config);
        w.write_plaintext(b"abcdef").unwrap();
        assert_eq!(w.get_ref(), &[4, 1, b'a', b'b', b'c', 4, 2, b'd', b'e', b'f']);
        w.close().unwrap();
        assert_eq!(
            w.into_inner(),
            [4, 1, b'a', b'b', b'c', 4, 2, b'd', b'e', b'f', 1, 0]
        );
    }

    #[test]
    fn close_seals_partial_buffer() {
        let mut w = blank_writer(&StreamConfig::default().with_buffer_size(16));
        w.write_plaintext(b"xy").unwrap();
        assert!(w.get_ref().is_empty());
        w.close().unwrap();
        assert_eq!(w.into_inner(), [3, 1, b'x', b'y', 1, 0]);
    }

    #[test]
    fn flush_does_not_seal() {
        let mut w = blank_writer(&StreamConfig::default().with_buffer_size(16));
        w.write_all(b"xy").unwrap();
        w.flush().unwrap();
        assert!(w.get_ref().is_empty());
    }

    #[test]
    fn empty_writes_emit_nothing() {
        let mut w = blank_writer(&StreamConfig::default().unbuffered());
        assert_eq!(w.write_plaintext(b"").unwrap(), 0);
        w.close().unwrap();
        assert_eq!(w.into_inner(), [1, 0]);
    }

    #[test]
    fn without_counter_terminator_is_zero_length() {
        let config = StreamConfig {
            chunk_counter: false,
            ..StreamConfig::default().unbuffered()
        };
        let mut w = blank_writer(&config);
        w.write_plaintext(b"hi").unwrap();
        w.close().unwrap();
        assert_eq!(w.into_inner(), [2, b'h', b'i', 0]);
    }

    #[test]
    fn fixed_size_chunks_are_unframed() {
        let config = StreamConfig {
            length_prefix: false,
            chunk_counter: false,
            ..StreamConfig::default().with_buffer_size(4)
        };
        let mut w = blank_writer(&config);
        w.write_plaintext(b"abcdef").unwrap();
        w.close().unwrap();
        assert_eq!(w.into_inner(), b"abcdef");
    }

    #[test]
    fn fixed_size_stream_always_ends_with_short_chunk() {
        let config = StreamConfig {
            length_prefix: false,
            chunk_counter: false,
            ..StreamConfig::default().with_buffer_size(2)
        };
        let tagged = sealwire_crypto::encryptor_fn(1, |chunk| {
            let mut buf = chunk.into_vec(1);
            buf.push(b'#');
            Ok(buf)
        });
        let mut w = StreamEncryptor::new(Vec::new(), tagged, &config).unwrap();
        w.write_plaintext(b"abcd").unwrap();
        w.close().unwrap();
        // two full chunks, then the sealed empty one
        assert_eq!(w.into_inner(), b"ab#cd##");
    }

    #[test]
    fn narrow_length_prefix_is_rejected_up_front() {
        let config = StreamConfig {
            length_encoding: IntEncoding::Fixed1,
            ..StreamConfig::default().with_buffer_size(1 << 20)
        };
        assert!(matches!(
            StreamEncryptor::new(Vec::new(), BlankEncryptor, &config).err(),
            Some(SealError::InvalidConfig(_))
        ));

        // 255-byte chunks fit; unbuffered chunks are checked as they are sealed
        let fits = StreamConfig {
            counter_encoding: IntEncoding::Fixed1,
            ..config.clone().with_buffer_size(255)
        };
        assert!(StreamEncryptor::new(Vec::new(), BlankEncryptor, &fits).is_ok());
        assert!(StreamEncryptor::new(Vec::new(), BlankEncryptor, &config.unbuffered()).is_ok());
    }

    #[test]
    fn fixed_width_encodings() {
        let config = StreamConfig {
            length_encoding: IntEncoding::Fixed2,
            counter_encoding: IntEncoding::Fixed4,
            ..StreamConfig::default().unbuffered()
        };
        let mut w = blank_writer(&config);
        w.write_plaintext(b"z").unwrap();
        w.close().unwrap();
        assert_eq!(
            w.into_inner(),
            [0, 5, 0, 0, 0, 1, b'z', 0, 4, 0, 0, 0, 0]
        );
    }

    #[test]
    fn double_close_fails_without_writing() {
        let mut w = blank_writer(&StreamConfig::default());
        w.close().unwrap();
        let len = w.get_ref().len();
        assert!(matches!(w.close(), Err(SealError::StreamClosed)));
        assert!(matches!(w.write_plaintext(b"late"), Err(SealError::StreamClosed)));
        assert_eq!(w.get_ref().len(), len);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = StreamConfig {
            length_prefix: false,
            ..StreamConfig::default()
        };
        assert!(matches!(
            StreamEncryptor::new(Vec::new(), BlankEncryptor, &config).err(),
            Some(SealError::InvalidConfig(_))
        ));
    }

    #[test]
    fn counter_overflowing_its_encoding_is_sticky() {
        let config = StreamConfig {
            counter_encoding: IntEncoding::Fixed1,
            ..StreamConfig::default().unbuffered()
        };
        let mut w = blank_writer(&config);
        for _ in 1..=255 {
            w.write_plaintext(b"x").unwrap();
        }
        assert!(matches!(
            w.write_plaintext(b"x"),
            Err(SealError::IntTooWide { value: 256, .. })
        ));
        assert!(matches!(w.close(), Err(SealError::IntTooWide { .. })));
    }

    /// Sink that fails every write and counts the attempts.
    struct BrokenSink {
        attempts: usize,
    }

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            self.attempts += 1;
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_failure_is_cached() {
        let mut w = StreamEncryptor::new(
            BrokenSink { attempts: 0 },
            BlankEncryptor,
            &StreamConfig::default().unbuffered(),
        )
        .unwrap();

        assert!(matches!(w.write_plaintext(b"a"), Err(SealError::Io(_))));
        assert_eq!(w.get_ref().attempts, 1);

        assert!(matches!(w.write_plaintext(b"b"), Err(SealError::Io(_))));
        assert!(matches!(w.close(), Err(SealError::Io(_))));
        assert!(w.flush().is_err());
        assert_eq!(w.get_ref().attempts, 1, "no sink access after failure");
    }

    #[test]
    fn encryptor_failure_is_cached() {
        let failing = sealwire_crypto::encryptor_fn(0, |_| Err(SealError::NonceExhausted));
        let mut w =
            StreamEncryptor::new(Vec::new(), failing, &StreamConfig::default().unbuffered())
                .unwrap();
        assert!(matches!(w.write_plaintext(b"a"), Err(SealError::NonceExhausted)));
        let err = w.write(b"b").unwrap_err();
        assert!(matches!(SealError::from_io(&err), Some(SealError::NonceExhausted)));
        assert!(w.get_ref().is_empty());
    }
}
