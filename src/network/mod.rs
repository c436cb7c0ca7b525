//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread, woken by a shutdown channel
//! - One handler thread per connection
//! - Requests dispatched straight to the shared store

mod server;
mod connection;
mod shutdown;

pub use server::Server;
pub use connection::dispatch;
