//! # memkv
//!
//! An in-memory key-value cache speaking the memcached binary protocol:
//! - GET / SET / DELETE on byte-string keys and opaque byte values
//! - Sharded reader/writer-locked store shared by all connections
//! - One blocking handler thread per TCP connection
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │              (accept thread, Start / Stop)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ one thread per connection
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Connection Handler                           │
//! │        read frame → dispatch → write response                │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌─────────────────┐               ┌──────────────────┐
//!   │  Wire Codec     │               │   MemoryStore    │
//!   │ (24-byte header)│               │ (sharded RwLock) │
//!   └─────────────────┘               └──────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod store;
pub mod protocol;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CacheError, Result};
pub use config::Config;
pub use store::{MemoryStore, Storage};
pub use network::Server;
pub use client::Client;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of memkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
