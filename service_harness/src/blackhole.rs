//! Blackhole listener
//! ==================
//!
//! A TCP listener that accepts connections, reads whatever arrives and never
//! writes a byte back. Point a client at it to exercise connect/read
//! timeouts without a real server.

use std::{
    io::{ErrorKind, Read},
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream},
    os::fd::AsFd,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags, PollTimeout},
};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::error::{HarnessError, HarnessResult};

const LISTEN_BACKLOG: i32 = 5;
const POLL_TIMEOUT_MS: u16 = 1000;
const STOP_TIMEOUT: Duration = Duration::from_secs(3);
const READ_CHUNK: usize = 1024;

#[derive(Debug)]
struct Running {
    shutdown: Arc<AtomicBool>,
    done: Receiver<()>,
    thread: JoinHandle<()>,
}

#[derive(Debug)]
pub struct BlackholeListener {
    address: IpAddr,
    port: u16,
    host: String,
    local_addr: Option<SocketAddr>,
    connections: Arc<AtomicUsize>,
    running: Option<Running>,
}

impl BlackholeListener {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self {
            address,
            port,
            host: "localhost".into(),
            local_addr: None,
            connections: Arc::new(AtomicUsize::new(0)),
            running: None,
        }
    }

    /// Loopback listener on `port`.
    pub fn on_port(port: u16) -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    /// Host name used by [`base_url`](Self::base_url).
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = host.into();
        self
    }

    /// Binds on the calling thread, then hands the socket to a
    /// `blackhole-<port>` thread. Starting a running listener is a no-op.
    pub fn start(&mut self) -> HarnessResult<()> {
        if self.running.is_some() {
            return Ok(());
        }
        let addr = SocketAddr::new(self.address, self.port);
        let listener = bind(addr)?;
        let local = listener
            .local_addr()
            .map_err(|e| HarnessError::Internal(format!("could not read local address: {e}")))?;
        self.local_addr = Some(local);
        crate::info!("blackhole listening on {local}");

        let shutdown = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();
        let thread = {
            let shutdown = Arc::clone(&shutdown);
            let connections = Arc::clone(&self.connections);
            let span = tracing::Span::current();
            std::thread::Builder::new()
                .name(format!("blackhole-{}", local.port()))
                .spawn(move || {
                    let _enter = span.enter();
                    serve(listener, &shutdown, &connections);
                    let _ = done_tx.send(());
                })
                .map_err(|e| HarnessError::Internal(format!("spawn blackhole thread: {e}")))?
        };
        self.running = Some(Running {
            shutdown,
            done: done_rx,
            thread,
        });
        Ok(())
    }

    /// Raises the shutdown flag and waits up to three seconds for the loop to
    /// notice. Safe to call at any time, any number of times.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.shutdown.store(true, Ordering::Relaxed);
        match running.done.recv_timeout(STOP_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if running.thread.join().is_err() {
                    crate::warn!("blackhole thread panicked");
                }
                crate::info!("blackhole stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                crate::warn!(
                    "blackhole thread did not stop within {STOP_TIMEOUT:?}; detaching it"
                );
            }
        }
    }

    /// Start, run `f`, stop.
    pub fn run_scoped<T>(mut self, f: impl FnOnce(&Self) -> T) -> HarnessResult<T> {
        self.start()?;
        let out = f(&self);
        self.stop();
        Ok(out)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Bound address once started. Differs from the requested one when port
    /// `0` was asked for.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn base_url(&self) -> String {
        let port = self.local_addr.map_or(self.port, |a| a.port());
        format!("http://{}:{port}", self.host)
    }

    /// Connections accepted since start.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}

impl Drop for BlackholeListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind(addr: SocketAddr) -> HarnessResult<TcpListener> {
    let bind_err =
        |what: &str, e: std::io::Error| HarnessError::Internal(format!("blackhole {what} {addr}: {e}"));
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| bind_err("socket for", e))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| bind_err("SO_REUSEADDR on", e))?;
    socket
        .bind(&SockAddr::from(addr))
        .map_err(|e| bind_err("bind", e))?;
    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|e| bind_err("listen on", e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| bind_err("non-blocking mode on", e))?;
    Ok(socket.into())
}

fn serve(listener: TcpListener, shutdown: &AtomicBool, connections: &AtomicUsize) {
    let mut clients: Vec<TcpStream> = Vec::new();
    let mut buf = [0u8; READ_CHUNK];
    while !shutdown.load(Ordering::Relaxed) {
        let (accept_ready, readable) = {
            let mut fds = Vec::with_capacity(clients.len() + 1);
            fds.push(PollFd::new(listener.as_fd(), PollFlags::POLLIN));
            fds.extend(
                clients
                    .iter()
                    .map(|c| PollFd::new(c.as_fd(), PollFlags::POLLIN)),
            );
            match poll(&mut fds, PollTimeout::from(POLL_TIMEOUT_MS)) {
                Ok(0) | Err(Errno::EINTR) => continue,
                Ok(_) => {}
                Err(e) => {
                    crate::error!("blackhole poll failed: {e}");
                    break;
                }
            }
            let is_ready = |fd: &PollFd| {
                fd.revents().is_some_and(|r| {
                    r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
                })
            };
            let flags: Vec<bool> = fds[1..].iter().map(is_ready).collect();
            (is_ready(&fds[0]), flags)
        };

        let mut flags = readable.into_iter();
        clients.retain_mut(|client| {
            if flags.next().unwrap_or(false) {
                discard(client, &mut buf)
            } else {
                true
            }
        });

        if accept_ready {
            accept_pending(&listener, &mut clients, connections);
        }
    }
    crate::debug!("blackhole loop exiting with {} open clients", clients.len());
}

fn accept_pending(listener: &TcpListener, clients: &mut Vec<TcpStream>, connections: &AtomicUsize) {
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nonblocking(true) {
                    crate::warn!("dropping {peer}: {e}");
                    continue;
                }
                connections.fetch_add(1, Ordering::Relaxed);
                crate::info!("connect from {peer}");
                clients.push(stream);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                crate::warn!("blackhole accept failed: {e}");
                return;
            }
        }
    }
}

/// Reads until the socket would block. Returns `false` once the peer is gone.
fn discard(client: &mut TcpStream, buf: &mut [u8]) -> bool {
    loop {
        match client.read(buf) {
            Ok(0) => {
                crate::info!("connection closed");
                return false;
            }
            Ok(n) => crate::debug!("received {n} bytes"),
            Err(e) if e.kind() == ErrorKind::WouldBlock => return true,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                crate::debug!("client read failed: {e}");
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write,
        time::Instant,
    };

    use super::*;

    fn started() -> BlackholeListener {
        let mut bh = BlackholeListener::on_port(0);
        bh.start().unwrap();
        bh
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn accepts_but_never_answers() {
        let bh = started();
        let mut client = TcpStream::connect(bh.local_addr().unwrap()).unwrap();
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .unwrap();
        client
            .set_read_timeout(Some(Duration::from_millis(300)))
            .unwrap();
        let mut buf = [0u8; 16];
        let err = client.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::WouldBlock | ErrorKind::TimedOut
        ));
        assert!(wait_for(|| bh.connection_count() == 1));
    }

    #[test]
    fn counts_every_connection() {
        let bh = started();
        let addr = bh.local_addr().unwrap();
        let clients: Vec<_> = (0..3).map(|_| TcpStream::connect(addr).unwrap()).collect();
        assert!(wait_for(|| bh.connection_count() == 3));
        drop(clients);
        TcpStream::connect(addr).unwrap();
        assert!(wait_for(|| bh.connection_count() == 4));
    }

    #[test]
    fn stop_is_prompt_and_idempotent() {
        let mut bh = started();
        let _client = TcpStream::connect(bh.local_addr().unwrap()).unwrap();
        let t0 = Instant::now();
        bh.stop();
        assert!(t0.elapsed() < Duration::from_secs(4));
        assert!(!bh.is_running());
        bh.stop();
    }

    #[test]
    fn stop_before_start_is_noop() {
        let mut bh = BlackholeListener::on_port(0);
        bh.stop();
        assert!(bh.local_addr().is_none());
    }

    #[test]
    fn bind_conflict_surfaces_on_start() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let mut bh = BlackholeListener::on_port(port);
        let err = bh.start().unwrap_err();
        assert!(err.to_string().contains("bind"), "{err}");
        assert!(!bh.is_running());
    }

    #[test]
    fn base_url_uses_host_and_bound_port() {
        let mut bh = BlackholeListener::on_port(0).host("blackhole.local");
        assert_eq!(bh.base_url(), "http://blackhole.local:0");
        bh.start().unwrap();
        let port = bh.local_addr().unwrap().port();
        assert_eq!(bh.base_url(), format!("http://blackhole.local:{port}"));
    }

    #[test]
    fn run_scoped_stops_afterwards() {
        let addr = BlackholeListener::on_port(0)
            .run_scoped(|bh| bh.local_addr().unwrap())
            .unwrap();
        assert!(wait_for(|| TcpStream::connect(addr).is_err()));
    }
}
