//! Configuration for memkv
//!
//! Centralized configuration with sensible defaults. A `Config` is built
//! once and handed to the server; it is never mutated afterwards.

use crate::error::{CacheError, Result};

/// Main configuration for a memkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Host (or IP) to bind the listener to
    pub host: String,

    /// TCP port; 0 lets the OS pick one
    pub port: u16,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 = block forever)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = block forever)
    pub write_timeout_ms: u64,

    /// How long the accept loop waits for a shutdown signal between
    /// empty accept attempts (milliseconds)
    pub accept_poll_interval_ms: u64,

    /// Consecutive accept failures tolerated before the accept loop gives up
    pub max_accept_failures: u32,

    // -------------------------------------------------------------------------
    // Protocol Configuration
    // -------------------------------------------------------------------------
    /// Largest request body (extras + key + value) accepted, in bytes
    pub max_body_size: usize,

    // -------------------------------------------------------------------------
    // Store Configuration
    // -------------------------------------------------------------------------
    /// Number of lock shards in the memory store (rounded up to a power of two)
    pub shard_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11211,
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            accept_poll_interval_ms: 50,
            max_accept_failures: 8,
            max_body_size: 1024 * 1024, // 1 MB
            shard_count: 16,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Address the listener binds to, as `host:port`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the host to bind to
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the TCP port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the accept loop's shutdown poll interval (in milliseconds)
    pub fn accept_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.accept_poll_interval_ms = ms;
        self
    }

    /// Set how many consecutive accept failures stop the accept loop
    pub fn max_accept_failures(mut self, count: u32) -> Self {
        self.config.max_accept_failures = count;
        self
    }

    /// Set the maximum request body size (in bytes)
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Set the number of store shards
    pub fn shard_count(mut self, count: usize) -> Self {
        self.config.shard_count = count;
        self
    }

    pub fn build(self) -> Result<Config> {
        let config = self.config;

        if config.host.is_empty() {
            return Err(CacheError::Config("host must not be empty".to_string()));
        }
        if config.max_connections == 0 {
            return Err(CacheError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if config.shard_count == 0 {
            return Err(CacheError::Config(
                "shard_count must be at least 1".to_string(),
            ));
        }
        if config.accept_poll_interval_ms == 0 {
            return Err(CacheError::Config(
                "accept_poll_interval_ms must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }
}
