// Word codec for the RouterOS API wire format.
//
// Every word on the wire is a self-describing length prefix followed by
// that many payload bytes. The number of leading one-bits in the first
// prefix byte says how many more prefix bytes follow:
//
//   0xxxxxxx                                  < 0x80
//   10xxxxxx xxxxxxxx                         < 0x4000
//   110xxxxx xxxxxxxx xxxxxxxx                < 0x20_0000
//   1110xxxx xxxxxxxx xxxxxxxx xxxxxxxx       < 0x1000_0000
//   11110000 xxxxxxxx xxxxxxxx xxxxxxxx xxxxxxxx
//
// First bytes 0xF8..=0xFF are reserved control bytes. A zero-length word
// terminates a sentence.

use std::ops::Deref;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;

/// Default upper bound for a single decoded word (16 MiB).
pub const DEFAULT_MAX_WORD_LEN: usize = 16 * 1024 * 1024;

// ── Length prefix ────────────────────────────────────────────────────

/// An encoded length prefix (1 to 5 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthPrefix {
    buf: [u8; 5],
    len: usize,
}

impl Deref for LengthPrefix {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl AsRef<[u8]> for LengthPrefix {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

/// Encode a word length into its variable-size prefix.
pub fn encode_length(len: u32) -> LengthPrefix {
    let mut buf = [0u8; 5];
    let n = if len < 0x80 {
        buf[0] = len.to_be_bytes()[3];
        1
    } else if len < 0x4000 {
        buf[..2].copy_from_slice(&(len | 0x8000).to_be_bytes()[2..]);
        2
    } else if len < 0x20_0000 {
        buf[..3].copy_from_slice(&(len | 0xC0_0000).to_be_bytes()[1..]);
        3
    } else if len < 0x1000_0000 {
        buf[..4].copy_from_slice(&(len | 0xE000_0000).to_be_bytes());
        4
    } else {
        buf[0] = 0xF0;
        buf[1..].copy_from_slice(&len.to_be_bytes());
        5
    };
    LengthPrefix { buf, len: n }
}

/// Decode a length prefix from the front of `src`.
///
/// Returns `(length, prefix_bytes_consumed)`, or `None` if `src` does not
/// yet hold the whole prefix.
pub fn decode_length(src: &[u8]) -> Result<Option<(u32, usize)>, Error> {
    let Some(&first) = src.first() else {
        return Ok(None);
    };

    let (extra, mask) = match first {
        0x00..=0x7F => (0, 0x7F),
        0x80..=0xBF => (1, 0x3F),
        0xC0..=0xDF => (2, 0x1F),
        0xE0..=0xEF => (3, 0x0F),
        0xF0 => (4, 0x00),
        reserved => return Err(Error::ReservedControlByte(reserved)),
    };

    let Some(rest) = src.get(1..=extra) else {
        return Ok(None);
    };

    let len = rest
        .iter()
        .fold(u32::from(first & mask), |acc, &b| (acc << 8) | u32::from(b));
    Ok(Some((len, extra + 1)))
}

// ── Codec ────────────────────────────────────────────────────────────

/// `tokio_util` codec that turns a byte stream into RouterOS words.
///
/// Decoding yields one [`Bytes`] per word (empty for a sentence
/// terminator). Encoding accepts anything byte-like and writes the length
/// prefix followed by the payload.
#[derive(Debug, Clone)]
pub struct WordCodec {
    max_word_len: usize,
}

impl WordCodec {
    pub fn new(max_word_len: usize) -> Self {
        Self { max_word_len }
    }

    pub fn max_word_len(&self) -> usize {
        self.max_word_len
    }
}

impl Default for WordCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORD_LEN)
    }
}

impl Decoder for WordCodec {
    type Item = Bytes;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, Error> {
        let Some((len, prefix)) = decode_length(src)? else {
            return Ok(None);
        };

        let len = usize::try_from(len).unwrap_or(usize::MAX);
        if len > self.max_word_len {
            return Err(Error::OversizedWord {
                len,
                max: self.max_word_len,
            });
        }

        let total = prefix + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(prefix);
        Ok(Some(src.split_to(len).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, Error> {
        match self.decode(src)? {
            Some(word) => Ok(Some(word)),
            None if src.is_empty() => Ok(None),
            None => Err(Error::ConnectionClosed),
        }
    }
}

impl<T: AsRef<[u8]>> Encoder<T> for WordCodec {
    type Error = Error;

    fn encode(&mut self, word: T, dst: &mut BytesMut) -> Result<(), Error> {
        let payload = word.as_ref();
        let len = u32::try_from(payload.len()).map_err(|_| Error::OversizedWord {
            len: payload.len(),
            max: self.max_word_len,
        })?;
        let prefix = encode_length(len);
        dst.reserve(prefix.len() + payload.len());
        dst.put_slice(&prefix);
        dst.put_slice(payload);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    #[test]
    fn length_round_trips_across_prefix_sizes() {
        for len in [
            0,
            1,
            127,
            128,
            16_383,
            0x4000,
            0x1F_FFFF,
            0x20_0000,
            0x0FFF_FFFF,
            0x1000_0000,
            u32::MAX,
        ] {
            let prefix = encode_length(len);
            assert_eq!(
                decode_length(&prefix).unwrap(),
                Some((len, prefix.len())),
                "length {len:#x}"
            );
        }
    }

    #[test]
    fn prefix_bytes_match_wire_format() {
        assert_eq!(&*encode_length(0), &[0x00_u8]);
        assert_eq!(&*encode_length(0x7F), &[0x7F_u8]);
        assert_eq!(&*encode_length(0x80), &[0x80_u8, 0x80]);
        assert_eq!(&*encode_length(0x3FFF), &[0xBF_u8, 0xFF]);
        assert_eq!(&*encode_length(0x4000), &[0xC0_u8, 0x40, 0x00]);
        assert_eq!(&*encode_length(0x20_0000), &[0xE0_u8, 0x20, 0x00, 0x00]);
        assert_eq!(
            &*encode_length(0x1000_0000),
            &[0xF0_u8, 0x10, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn incomplete_prefix_needs_more_bytes() {
        assert_eq!(decode_length(&[]).unwrap(), None);
        assert_eq!(decode_length(&[0x80]).unwrap(), None);
        assert_eq!(decode_length(&[0xC0_u8, 0x40]).unwrap(), None);
        assert_eq!(decode_length(&[0xF0_u8, 0, 0, 0]).unwrap(), None);
    }

    #[test]
    fn reserved_control_byte_is_framing_error() {
        let err = decode_length(&[0xF8_u8, 0, 0]).unwrap_err();
        assert!(err.is_framing());
        assert!(matches!(err, Error::ReservedControlByte(0xF8)));
    }

    #[test]
    fn decoder_waits_for_full_payload() {
        let mut codec = WordCodec::default();
        let mut buf = BytesMut::from(&[0x05_u8, b'h', b'e'][..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"llo");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), &b"hello"[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn decoder_rejects_oversized_word() {
        let mut codec = WordCodec::new(16);
        let mut buf = BytesMut::from(&[0x20][..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::OversizedWord { len: 32, max: 16 }));
    }

    #[test]
    fn eof_inside_word_is_connection_closed() {
        let mut codec = WordCodec::default();
        let mut buf = BytesMut::from(&[0x04_u8, b'a'][..]);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn words_survive_fragmented_delivery() {
        let long = vec![b'x'; 0x4100];
        let words: Vec<Vec<u8>> = vec![
            Vec::new(),
            b"!done".to_vec(),
            b"=comment=Pelican: a=b".to_vec(),
            long,
        ];

        let mut encoded = BytesMut::new();
        let mut codec = WordCodec::default();
        for word in &words {
            codec.encode(word.as_slice(), &mut encoded).unwrap();
        }

        let (mut tx, rx) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            // Dribble the stream out in small uneven chunks.
            for chunk in encoded.chunks(7) {
                tx.write_all(chunk).await.unwrap();
            }
        });

        let mut reader = FramedRead::new(rx, WordCodec::default());
        for expected in &words {
            let word = reader.next().await.unwrap().unwrap();
            assert_eq!(&word[..], expected.as_slice());
        }
        writer.await.unwrap();
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn framed_write_emits_prefix_then_payload() {
        let mut out = FramedWrite::new(Vec::new(), WordCodec::default());
        out.send("/login").await.unwrap();
        out.send("").await.unwrap();
        assert_eq!(out.get_ref().as_slice(), b"\x06/login\x00");
    }
}
