//! Length-prefixed framing over a deterministic binary payload.
//!
//! Frames carry a big-endian `u64` length followed by the `bincode` bytes of
//! the value. Encoding the same value always yields the same bytes, which
//! the commit metadata and the simulate query response rely on.

use std::io::{Cursor, Read};

use byteorder::ReadBytesExt;
use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CResult, Error};

/// Encodes a value as a length-prefixed frame.
pub fn encode<T>(value: &T) -> CResult<Vec<u8>>
where
    T: ?Sized + Serialize,
{
    let payload = bincode::serialize(value).map_err(|e| Error::TxDecode(e.to_string()))?;

    let mut buf = BytesMut::with_capacity(8 + payload.len());
    buf.put_u64(payload.len() as u64);
    buf.put(payload.as_slice());

    Ok(buf.to_vec())
}

/// Decodes a single frame. Trailing bytes after the frame are rejected.
pub fn decode<R>(value: &[u8]) -> CResult<R>
where
    R: DeserializeOwned,
{
    let mut cursor = Cursor::new(value);
    match decode_cursor(&mut cursor)? {
        Some(r) if cursor.position() == value.len() as u64 => Ok(r),
        Some(_) => Err(Error::TxDecode("trailing bytes after frame".to_string())),
        None => Err(Error::TxDecode("empty frame".to_string())),
    }
}

/// Decodes the next frame behind the cursor, or None when exhausted.
pub fn decode_cursor<R>(cursor: &mut Cursor<&[u8]>) -> CResult<Option<R>>
where
    R: DeserializeOwned,
{
    if cursor.position() >= cursor.get_ref().len() as u64 {
        return Ok(None);
    }

    let len = cursor
        .read_u64::<byteorder::BigEndian>()
        .map_err(|e| Error::TxDecode(e.to_string()))? as usize;
    if len > cursor.get_ref().len() - cursor.position() as usize {
        return Err(Error::TxDecode(format!("frame length {} overruns input", len)));
    }

    let mut payload = vec![0; len];
    cursor
        .read_exact(&mut payload)
        .map_err(|e| Error::TxDecode(e.to_string()))?;

    let r = bincode::deserialize(&payload).map_err(|e| Error::TxDecode(e.to_string()))?;
    Ok(Some(r))
}
