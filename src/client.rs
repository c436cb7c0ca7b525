//! Blocking client
//!
//! Speaks the same binary protocol as the server, one request in flight
//! at a time. Used by `memkv-cli` and the end-to-end tests.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};

use bytes::Bytes;

use crate::error::{CacheError, Result};
use crate::protocol::{read_response, write_request, Request, Response, Status};

/// A connection to a memkv (or memcached) server
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,

    /// Opaque assigned to the next request
    next_opaque: u32,
}

impl Client {
    /// Connect to a server
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;

        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
            next_opaque: 1,
        })
    }

    /// Send a request as-is and wait for its response
    ///
    /// Fails if the response does not echo the request's opaque.
    pub fn execute(&mut self, request: &Request) -> Result<Response> {
        write_request(&mut self.writer, request)?;
        let response = read_response(&mut self.reader)?;

        if response.opaque != request.opaque {
            return Err(CacheError::UnexpectedResponse(format!(
                "opaque mismatch: sent {}, got {}",
                request.opaque, response.opaque
            )));
        }

        Ok(response)
    }

    /// Fetch a value, `None` on a miss
    pub fn get(&mut self, key: impl Into<Bytes>) -> Result<Option<Bytes>> {
        let request = Request::get(key).with_opaque(self.opaque());
        let response = self.execute(&request)?;

        match response.status {
            Status::Ok => Ok(Some(response.value.unwrap_or_default())),
            Status::KeyNotFound => Ok(None),
            status => Err(unexpected("GET", status)),
        }
    }

    /// Store a value unconditionally
    pub fn set(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<()> {
        let request = Request::set(key, value).with_opaque(self.opaque());
        self.expect_ok("SET", &request)
    }

    /// Delete a key
    ///
    /// A miss is not an error: memkv answers OK either way, and memcached's
    /// KEY_NOT_FOUND is accepted too.
    pub fn delete(&mut self, key: impl Into<Bytes>) -> Result<()> {
        let request = Request::delete(key).with_opaque(self.opaque());
        let response = self.execute(&request)?;

        match response.status {
            Status::Ok | Status::KeyNotFound => Ok(()),
            status => Err(unexpected("DELETE", status)),
        }
    }

    fn expect_ok(&mut self, command: &str, request: &Request) -> Result<()> {
        let response = self.execute(request)?;
        match response.status {
            Status::Ok => Ok(()),
            status => Err(unexpected(command, status)),
        }
    }

    fn opaque(&mut self) -> u32 {
        let opaque = self.next_opaque;
        self.next_opaque = self.next_opaque.wrapping_add(1);
        opaque
    }
}

fn unexpected(command: &str, status: Status) -> CacheError {
    CacheError::UnexpectedResponse(format!(
        "{} failed with status {:?} (0x{:04x})",
        command,
        status,
        status.code()
    ))
}
