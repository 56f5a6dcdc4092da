//! Binary chunk codec
//!
//! Versioned little-endian layout: magic, version, chunk id, sample count,
//! then (timestamp, value bit pattern) pairs. Values round-trip through
//! `f64::to_bits` so the decode is bit-exact.

use crate::schema::Sample;
use crate::store::{ChunkId, SealedChunk};
use crate::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const MAGIC: [u8; 4] = *b"PVCK";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 16 + 4;
const SAMPLE_LEN: usize = 8 + 8;

/// Encode a sealed chunk into its wire form.
pub fn encode(chunk: &SealedChunk) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + chunk.len() * SAMPLE_LEN);
    buf.put_slice(&MAGIC);
    buf.put_u8(VERSION);
    buf.put_slice(chunk.id().as_bytes());
    buf.put_u32_le(chunk.len() as u32);
    for sample in chunk.samples() {
        buf.put_i64_le(sample.timestamp);
        buf.put_u64_le(sample.value.to_bits());
    }
    buf.freeze()
}

/// Decode a chunk, verifying magic, version, length, and sample ordering.
pub fn decode(mut data: &[u8]) -> Result<SealedChunk> {
    if data.remaining() < HEADER_LEN {
        return Err(Error::Codec(format!(
            "chunk too short: {} bytes",
            data.remaining()
        )));
    }

    let mut magic = [0u8; 4];
    data.copy_to_slice(&mut magic);
    if magic != MAGIC {
        return Err(Error::Codec("bad magic".to_string()));
    }
    let version = data.get_u8();
    if version != VERSION {
        return Err(Error::Codec(format!("unsupported chunk version {}", version)));
    }

    let mut id_bytes = [0u8; 16];
    data.copy_to_slice(&mut id_bytes);
    let id = ChunkId::from_bytes(id_bytes);

    let count = data.get_u32_le() as usize;
    if data.remaining() != count * SAMPLE_LEN {
        return Err(Error::Codec(format!(
            "length mismatch: {} samples declared, {} bytes remain",
            count,
            data.remaining()
        )));
    }

    let mut samples = Vec::with_capacity(count);
    let mut prev: Option<i64> = None;
    for _ in 0..count {
        let timestamp = data.get_i64_le();
        let value = f64::from_bits(data.get_u64_le());
        if let Some(prev_ts) = prev {
            if timestamp <= prev_ts {
                return Err(Error::Codec(format!(
                    "samples out of order: {} after {}",
                    timestamp, prev_ts
                )));
            }
        }
        prev = Some(timestamp);
        samples.push(Sample::new(timestamp, value));
    }

    Ok(SealedChunk::from_ordered(id, samples))
}
