//! TCP Server
//!
//! Accepts connections and hands each one to its own handler thread.
//!
//! ## Lifecycle
//! `Idle --start--> Running --stop--> Stopped --start--> Running ...`
//!
//! `stop` fires the shutdown signal and joins the accept thread, which
//! drops the listening socket. Handlers see the signal only between
//! frames: one blocked reading from an idle client stays until that
//! client sends a frame (which is answered) or disconnects.

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::store::Storage;

use super::connection::Connection;
use super::shutdown::{self, Shutdown, ShutdownTrigger};

/// TCP server for memkv
pub struct Server {
    config: Config,
    storage: Arc<dyn Storage>,
    lifecycle: Mutex<Lifecycle>,

    /// Live connection handlers
    active: Arc<AtomicUsize>,
}

enum Lifecycle {
    Idle,
    Running(Running),
    Stopped,
}

struct Running {
    local_addr: SocketAddr,
    trigger: ShutdownTrigger,
    accept_thread: JoinHandle<()>,

    /// Disconnects when the accept thread exits
    done: Receiver<()>,
}

impl Running {
    /// False once the accept loop has returned, whether it was stopped or
    /// gave up on its own
    fn is_alive(&self) -> bool {
        !self.accept_thread.is_finished()
            && matches!(self.done.try_recv(), Err(TryRecvError::Empty))
    }
}

/// Everything the accept thread owns
///
/// `accept` is the listener's `accept` in production.
struct Acceptor<A> {
    accept: A,
    config: Config,
    storage: Arc<dyn Storage>,
    shutdown: Shutdown,
    active: Arc<AtomicUsize>,
    _done: Sender<()>,
}

impl Server {
    /// Create a new server with the given config and store
    pub fn new(config: Config, storage: Arc<dyn Storage>) -> Self {
        Self {
            config,
            storage,
            lifecycle: Mutex::new(Lifecycle::Idle),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bind the listener and spawn the accept loop
    ///
    /// Returns the bound address (useful with port 0). Bind failures are
    /// returned as-is.
    pub fn start(&self) -> Result<SocketAddr> {
        let mut lifecycle = self.lifecycle.lock();
        ensure_not_running(&lifecycle)?;

        let listener = TcpListener::bind(self.config.listen_addr())?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        self.launch(&mut lifecycle, local_addr, move || listener.accept())?;
        tracing::info!("Listening on {}", local_addr);

        Ok(local_addr)
    }

    /// Spawn the accept loop over `accept` and record it as running
    fn launch<A>(&self, lifecycle: &mut Lifecycle, local_addr: SocketAddr, accept: A) -> Result<()>
    where
        A: FnMut() -> io::Result<(TcpStream, SocketAddr)> + Send + 'static,
    {
        let (trigger, shutdown) = shutdown::channel();
        let (done_tx, done) = channel::bounded(0);

        let acceptor = Acceptor {
            accept,
            config: self.config.clone(),
            storage: Arc::clone(&self.storage),
            shutdown,
            active: Arc::clone(&self.active),
            _done: done_tx,
        };

        let accept_thread = thread::Builder::new()
            .name("memkv-accept".to_string())
            .spawn(move || acceptor.run())?;

        *lifecycle = Lifecycle::Running(Running {
            local_addr,
            trigger,
            accept_thread,
            done,
        });

        Ok(())
    }

    /// Stop accepting connections
    ///
    /// Waits for the accept loop to exit. A no-op if the server is not
    /// running.
    pub fn stop(&self) -> Result<()> {
        let running = {
            let mut lifecycle = self.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(running) => running,
                other => {
                    *lifecycle = other;
                    return Ok(());
                }
            }
        };

        tracing::info!("Stopping server on {}", running.local_addr);
        running.trigger.trigger();

        if running.accept_thread.join().is_err() {
            tracing::error!("Accept thread panicked");
        }

        Ok(())
    }

    /// Block until the accept loop exits
    ///
    /// Returns immediately if the server is not running.
    pub fn join(&self) {
        let done = match &*self.lifecycle.lock() {
            Lifecycle::Running(running) => running.done.clone(),
            _ => return,
        };

        // Never receives a message; returns once the sender is dropped
        let _ = done.recv();
    }

    /// Whether the accept loop is alive
    ///
    /// False after `stop`, and also after the loop gave up on repeated
    /// accept failures.
    pub fn is_running(&self) -> bool {
        match &*self.lifecycle.lock() {
            Lifecycle::Running(running) => running.is_alive(),
            _ => false,
        }
    }

    /// Address the listener is bound to, while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.lifecycle.lock() {
            Lifecycle::Running(running) if running.is_alive() => Some(running.local_addr),
            _ => None,
        }
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// An accept loop that gave up on its own can be restarted
fn ensure_not_running(lifecycle: &Lifecycle) -> Result<()> {
    match lifecycle {
        Lifecycle::Running(running) if running.is_alive() => Err(CacheError::AlreadyRunning),
        _ => Ok(()),
    }
}

impl<A> Acceptor<A>
where
    A: FnMut() -> io::Result<(TcpStream, SocketAddr)>,
{
    fn run(mut self) {
        let poll_interval = Duration::from_millis(self.config.accept_poll_interval_ms);
        let mut failures = 0u32;

        loop {
            if self.shutdown.is_triggered() {
                break;
            }

            match (self.accept)() {
                Ok((stream, addr)) => {
                    failures = 0;
                    self.spawn_connection(stream, addr);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    if self.shutdown.wait_timeout(poll_interval) {
                        break;
                    }
                }
                // A client that reset before being accepted is not a
                // listener failure
                Err(ref e)
                    if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::ConnectionAborted) => {}
                Err(e) => {
                    failures += 1;
                    tracing::error!(
                        "Failed to accept client ({}/{}): {}",
                        failures, self.config.max_accept_failures, e
                    );
                    if failures >= self.config.max_accept_failures {
                        tracing::error!("Too many accept failures, stopping accept loop");
                        break;
                    }
                    if self.shutdown.wait_timeout(poll_interval) {
                        break;
                    }
                }
            }
        }

        tracing::info!("Accept loop stopped");
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        // Accepted sockets may inherit non-blocking mode from the listener
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Failed to configure socket for {}: {}", addr, e);
            return;
        }

        let guard = match ActiveGuard::acquire(&self.active, self.config.max_connections) {
            Some(guard) => guard,
            None => {
                tracing::warn!(
                    "Refusing {}: connection limit ({}) reached",
                    addr, self.config.max_connections
                );
                return;
            }
        };

        let storage = Arc::clone(&self.storage);
        let shutdown = self.shutdown.clone();
        let config = self.config.clone();

        let spawned = thread::Builder::new()
            .name(format!("memkv-conn-{}", addr))
            .spawn(move || {
                let _guard = guard;
                match Connection::new(stream, storage, shutdown, &config) {
                    // Errors are logged by the handler itself
                    Ok(mut connection) => {
                        let _ = connection.handle();
                    }
                    Err(e) => tracing::warn!("Failed to set up connection from {}: {}", addr, e),
                }
            });

        if let Err(e) = spawned {
            tracing::error!("Failed to spawn handler for {}: {}", addr, e);
        }
    }
}

/// Counts a live connection until dropped
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn acquire(active: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        if active.fetch_add(1, Ordering::AcqRel) >= max {
            active.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        Some(Self(Arc::clone(active)))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
