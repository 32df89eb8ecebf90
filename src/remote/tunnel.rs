//! Loopback relay for the second hop of a jump connection.
//!
//! libssh2 needs a real socket under each session, so the bastion's
//! `direct-tcpip` channel is pumped to a connected loopback socket pair by a
//! dedicated thread. The target session is then built on the caller's end of
//! that pair.

use log::{debug, trace, warn};
use ssh2::{Channel, Session};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const RELAY_BUFFER: usize = 16 * 1024;
const IDLE_POLL: Duration = Duration::from_millis(2);

/// The far side of the relay: a byte stream that can half-close.
pub(crate) trait RelayChannel: Read + Write + Send {
    /// Switches between blocking and non-blocking reads and writes.
    fn set_blocking(&self, blocking: bool);

    /// Signals that no more bytes will be written.
    fn send_eof(&mut self) -> io::Result<()>;

    /// True once the remote end has sent EOF.
    fn eof(&self) -> bool;

    /// Releases the channel and whatever carries it.
    fn close(&mut self);
}

/// A `direct-tcpip` channel together with the bastion session it lives on.
pub(crate) struct BastionChannel {
    session: Session,
    channel: Channel,
}

impl BastionChannel {
    pub(crate) fn new(session: Session, channel: Channel) -> Self {
        Self { session, channel }
    }
}

impl Read for BastionChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.channel.read(buf)
    }
}

impl Write for BastionChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.channel.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.channel.flush()
    }
}

impl RelayChannel for BastionChannel {
    fn set_blocking(&self, blocking: bool) {
        self.session.set_blocking(blocking);
    }

    fn send_eof(&mut self) -> io::Result<()> {
        self.channel.send_eof().map_err(io::Error::from)
    }

    fn eof(&self) -> bool {
        self.channel.eof()
    }

    fn close(&mut self) {
        let _ = self.channel.close();
        let _ = self.session.disconnect(None, "topoprobe done", None);
    }
}

/// Owns the relay thread and, through it, the far channel.
///
/// Dropping the tunnel stops the relay, closes the channel and disconnects
/// from the bastion.
pub struct Tunnel {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Tunnel {
    /// Starts relaying `channel` and returns the socket to speak SSH over.
    pub(crate) fn open<C>(channel: C) -> io::Result<(Self, TcpStream)>
    where
        C: RelayChannel + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        let local_addr = listener.local_addr()?;

        // Connect before accepting so neither side can block waiting on the other.
        let client = TcpStream::connect(local_addr)?;
        let relay_end = accept_from(&listener, client.local_addr()?)?;
        relay_end.set_nonblocking(true)?;
        relay_end.set_nodelay(true)?;
        client.set_nodelay(true)?;

        debug!("Relaying channel through {}", local_addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("topoprobe-relay".to_string())
            .spawn(move || relay(channel, relay_end, flag))?;

        Ok((
            Self {
                shutdown,
                handle: Some(handle),
            },
            client,
        ))
    }
}

/// Accepts connections until the one from `expected` arrives.
fn accept_from(listener: &TcpListener, expected: SocketAddr) -> io::Result<TcpStream> {
    loop {
        let (stream, peer) = listener.accept()?;
        if peer == expected {
            return Ok(stream);
        }
        warn!("Dropping unexpected connection to relay port from {}", peer);
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("Relay thread panicked");
            }
        }
    }
}

fn relay<C: RelayChannel>(mut channel: C, mut local: TcpStream, shutdown: Arc<AtomicBool>) {
    channel.set_blocking(false);

    let mut buf = vec![0u8; RELAY_BUFFER];
    let mut to_remote: Vec<u8> = Vec::new();
    let mut to_local: Vec<u8> = Vec::new();
    let mut local_eof = false;
    let mut eof_sent = false;

    while !shutdown.load(Ordering::Relaxed) {
        let mut idle = true;

        if to_remote.is_empty() && !local_eof {
            match local.read(&mut buf) {
                Ok(0) => local_eof = true,
                Ok(n) => {
                    to_remote.extend_from_slice(&buf[..n]);
                    idle = false;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    trace!("Relay local read failed: {}", e);
                    break;
                }
            }
        }

        if !to_remote.is_empty() {
            match channel.write(&to_remote) {
                Ok(n) => {
                    to_remote.drain(..n);
                    idle = false;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    trace!("Relay channel write failed: {}", e);
                    break;
                }
            }
        } else if local_eof && !eof_sent && channel.send_eof().is_ok() {
            eof_sent = true;
        }

        if to_local.is_empty() {
            match channel.read(&mut buf) {
                Ok(0) => {
                    if channel.eof() {
                        break;
                    }
                }
                Ok(n) => {
                    to_local.extend_from_slice(&buf[..n]);
                    idle = false;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    trace!("Relay channel read failed: {}", e);
                    break;
                }
            }
        }

        if !to_local.is_empty() {
            match local.write(&to_local) {
                Ok(n) => {
                    to_local.drain(..n);
                    idle = false;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    trace!("Relay local write failed: {}", e);
                    break;
                }
            }
        }

        if idle {
            thread::sleep(IDLE_POLL);
        }
    }

    let _ = local.shutdown(std::net::Shutdown::Both);
    channel.set_blocking(true);
    channel.close();
    debug!("Relay stopped");
}

/// A plain TCP stream standing in for a bastion channel.
#[cfg(test)]
pub(crate) mod loopback {
    use super::RelayChannel;
    use std::io::{self, Read, Write};
    use std::net::{Shutdown, TcpListener, TcpStream};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    pub(crate) struct LoopbackChannel {
        stream: TcpStream,
        remote_eof: bool,
        pub(crate) eof_sent: Arc<AtomicBool>,
        pub(crate) closed: Arc<AtomicBool>,
    }

    impl Read for LoopbackChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.stream.read(buf)?;
            if n == 0 {
                self.remote_eof = true;
            }
            Ok(n)
        }
    }

    impl Write for LoopbackChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.stream.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.stream.flush()
        }
    }

    impl RelayChannel for LoopbackChannel {
        fn set_blocking(&self, blocking: bool) {
            let _ = self.stream.set_nonblocking(!blocking);
        }

        fn send_eof(&mut self) -> io::Result<()> {
            self.stream.shutdown(Shutdown::Write)?;
            self.eof_sent.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn eof(&self) -> bool {
            self.remote_eof
        }

        fn close(&mut self) {
            let _ = self.stream.shutdown(Shutdown::Both);
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// A channel plus the stream on its far end, which plays the remote host.
    pub(crate) fn pair() -> (LoopbackChannel, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let near = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (far, _) = listener.accept().unwrap();
        let channel = LoopbackChannel {
            stream: near,
            remote_eof: false,
            eof_sent: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        };
        (channel, far)
    }
}
