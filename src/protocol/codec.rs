//! Protocol codec
//!
//! Encoding and decoding functions for the binary wire protocol.
//!
//! The server side reads requests and writes responses; the client side
//! (used by [`crate::client::Client`] and the tests) does the reverse.
//!
//! Stream readers consume exactly `HEADER_SIZE + total_body_length` bytes
//! per frame, so the next read starts on a frame boundary.

use std::io::{self, Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CacheError, Result};
use super::{Request, RequestHeader, Response, Status, HEADER_SIZE, REQUEST_MAGIC, RESPONSE_MAGIC};

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Parse and validate a request header
///
/// Rejects a wrong magic byte, key + extras longer than the declared body,
/// and bodies over `max_body_size`. Any of these leaves the stream
/// desynchronized, so callers must drop the connection.
fn decode_request_header(mut buf: &[u8], max_body_size: usize) -> Result<RequestHeader> {
    debug_assert_eq!(buf.len(), HEADER_SIZE);

    let magic = buf.get_u8();
    let opcode = buf.get_u8();
    let key_length = buf.get_u16();
    let extras_length = buf.get_u8();
    let data_type = buf.get_u8();
    let vbucket = buf.get_u16();
    let total_body_length = buf.get_u32();
    let opaque = buf.get_u32();
    let cas = buf.get_u64();

    if magic != REQUEST_MAGIC {
        return Err(CacheError::Protocol(format!(
            "Invalid request magic: 0x{:02x}",
            magic
        )));
    }

    if key_length as u64 + extras_length as u64 > total_body_length as u64 {
        return Err(CacheError::Protocol(format!(
            "Key length {} + extras length {} exceeds body length {}",
            key_length, extras_length, total_body_length
        )));
    }

    if total_body_length as usize > max_body_size {
        return Err(CacheError::BodyTooLarge {
            size: total_body_length as usize,
            max: max_body_size,
        });
    }

    Ok(RequestHeader {
        magic,
        opcode,
        key_length,
        extras_length,
        data_type,
        vbucket,
        total_body_length,
        opaque,
        cas,
    })
}

/// Split a validated body into extras, key and value
fn assemble_request(header: RequestHeader, mut body: Bytes) -> Request {
    let extras = body.split_to(header.extras_length as usize);
    let key = body.split_to(header.key_length as usize);
    debug_assert_eq!(body.len(), header.value_length());

    Request {
        opcode: header.opcode,
        data_type: header.data_type,
        vbucket: header.vbucket,
        opaque: header.opaque,
        cas: header.cas,
        extras,
        key,
        value: body,
    }
}

/// Encode a request to bytes
///
/// Fails if a segment does not fit its header field (key over 65535
/// bytes, extras over 255 bytes, body over 4 GiB).
pub fn encode_request(request: &Request) -> Result<Bytes> {
    let key_length = u16::try_from(request.key.len()).map_err(|_| {
        CacheError::Protocol(format!(
            "Key too long: {} bytes (max {})",
            request.key.len(),
            u16::MAX
        ))
    })?;
    let extras_length = u8::try_from(request.extras.len()).map_err(|_| {
        CacheError::Protocol(format!(
            "Extras too long: {} bytes (max {})",
            request.extras.len(),
            u8::MAX
        ))
    })?;
    let body_length = u32::try_from(request.body_length()).map_err(|_| {
        CacheError::Protocol(format!(
            "Body too long: {} bytes (max {})",
            request.body_length(),
            u32::MAX
        ))
    })?;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + request.body_length());
    buf.put_u8(REQUEST_MAGIC);
    buf.put_u8(request.opcode);
    buf.put_u16(key_length);
    buf.put_u8(extras_length);
    buf.put_u8(request.data_type);
    buf.put_u16(request.vbucket);
    buf.put_u32(body_length);
    buf.put_u32(request.opaque);
    buf.put_u64(request.cas);
    buf.put_slice(&request.extras);
    buf.put_slice(&request.key);
    buf.put_slice(&request.value);

    Ok(buf.freeze())
}

/// Decode a request from a complete in-memory frame
pub fn decode_request(bytes: &[u8], max_body_size: usize) -> Result<Request> {
    if bytes.len() < HEADER_SIZE {
        return Err(CacheError::Protocol(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let header = decode_request_header(&bytes[..HEADER_SIZE], max_body_size)?;

    let total_len = HEADER_SIZE + header.total_body_length as usize;
    if bytes.len() < total_len {
        return Err(CacheError::Protocol(format!(
            "Incomplete body: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    let body = Bytes::copy_from_slice(&bytes[HEADER_SIZE..total_len]);
    Ok(assemble_request(header, body))
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Response header fields the client cares about
struct ResponseHeader {
    opcode: u8,
    key_length: u16,
    extras_length: u8,
    status: Status,
    total_body_length: u32,
    opaque: u32,
    cas: u64,
}

fn encode_response_header(response: &Response) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    let mut buf = &mut header[..];

    buf.put_u8(RESPONSE_MAGIC);
    buf.put_u8(response.opcode);
    buf.put_u16(0); // key length
    buf.put_u8(0); // extras length
    buf.put_u8(0); // data type
    buf.put_u16(response.status.code());
    buf.put_u32(response.body_length() as u32);
    buf.put_u32(response.opaque);
    buf.put_u64(response.cas);

    header
}

fn decode_response_header(mut buf: &[u8]) -> Result<ResponseHeader> {
    debug_assert_eq!(buf.len(), HEADER_SIZE);

    let magic = buf.get_u8();
    let opcode = buf.get_u8();
    let key_length = buf.get_u16();
    let extras_length = buf.get_u8();
    let _data_type = buf.get_u8();
    let status_code = buf.get_u16();
    let total_body_length = buf.get_u32();
    let opaque = buf.get_u32();
    let cas = buf.get_u64();

    if magic != RESPONSE_MAGIC {
        return Err(CacheError::Protocol(format!(
            "Invalid response magic: 0x{:02x}",
            magic
        )));
    }

    let status = Status::from_u16(status_code).ok_or_else(|| {
        CacheError::Protocol(format!("Unknown response status: 0x{:04x}", status_code))
    })?;

    if key_length as u64 + extras_length as u64 > total_body_length as u64 {
        return Err(CacheError::Protocol(format!(
            "Key length {} + extras length {} exceeds body length {}",
            key_length, extras_length, total_body_length
        )));
    }

    Ok(ResponseHeader {
        opcode,
        key_length,
        extras_length,
        status,
        total_body_length,
        opaque,
        cas,
    })
}

/// Extras and key in a response are skipped; only the value is kept
fn assemble_response(header: ResponseHeader, mut body: Bytes) -> Response {
    body.advance(header.extras_length as usize + header.key_length as usize);

    Response {
        opcode: header.opcode,
        status: header.status,
        opaque: header.opaque,
        cas: header.cas,
        value: if body.is_empty() { None } else { Some(body) },
    }
}

/// Encode a response to bytes
///
/// Key and extras lengths are always 0; the body is the value alone.
pub fn encode_response(response: &Response) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + response.body_length());
    buf.put_slice(&encode_response_header(response));
    if let Some(value) = &response.value {
        buf.put_slice(value);
    }
    buf.freeze()
}

/// Decode a response from a complete in-memory frame
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    if bytes.len() < HEADER_SIZE {
        return Err(CacheError::Protocol(format!(
            "Incomplete response header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let header = decode_response_header(&bytes[..HEADER_SIZE])?;

    let total_len = HEADER_SIZE + header.total_body_length as usize;
    if bytes.len() < total_len {
        return Err(CacheError::Protocol(format!(
            "Incomplete response body: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    let body = Bytes::copy_from_slice(&bytes[HEADER_SIZE..total_len]);
    Ok(assemble_response(header, body))
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Fill `buf` from the reader
///
/// Returns `Ok(false)` when the stream ends before the first byte. Ending
/// part-way through is `UnexpectedEof`.
fn fill_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("Truncated header: got {} of {} bytes", filled, buf.len()),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Read one complete request from a stream
///
/// Blocks until a full frame arrives. Returns `Ok(None)` on a clean end of
/// stream between frames. The whole body is consumed even when the
/// opcode is unknown.
pub fn read_request<R: Read>(reader: &mut R, max_body_size: usize) -> Result<Option<Request>> {
    let mut header = [0u8; HEADER_SIZE];
    if !fill_or_eof(reader, &mut header)? {
        return Ok(None);
    }

    let header = decode_request_header(&header, max_body_size)?;

    let mut body = vec![0u8; header.total_body_length as usize];
    reader.read_exact(&mut body)?;

    Ok(Some(assemble_request(header, Bytes::from(body))))
}

/// Write a request to a stream
pub fn write_request<W: Write>(writer: &mut W, request: &Request) -> Result<()> {
    let bytes = encode_request(request)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read one complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let header = decode_response_header(&header)?;

    let mut body = vec![0u8; header.total_body_length as usize];
    reader.read_exact(&mut body)?;

    Ok(assemble_response(header, Bytes::from(body)))
}

/// Write a response to a stream
///
/// The value is written straight from the stored buffer, not copied into
/// a frame first.
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    writer.write_all(&encode_response_header(response))?;
    if let Some(value) = &response.value {
        writer.write_all(value)?;
    }
    writer.flush()?;
    Ok(())
}
