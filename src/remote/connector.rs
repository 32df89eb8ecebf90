//! SSH sessions to targets, directly or through a bastion.
//!
//! The connector never retries; callers wrap it in
//! [`crate::remote::retry::run`]. Every failure says which hop broke so a dead
//! bastion can be told apart from a dead internal host.

use crate::config::SshSettings;
use crate::error::{Error, Hop, Result};
use crate::remote::target::{KeyMaterial, RemoteTarget};
use crate::remote::tunnel::{BastionChannel, RelayChannel, Tunnel};
use log::{debug, info, warn};
use ssh2::Session;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// An established session that can run commands.
pub trait RemoteSession {
    /// Host the commands run on.
    fn host(&self) -> &str;

    /// Runs `command` and returns its raw, untrimmed stdout.
    ///
    /// # Errors
    ///
    /// `Error::Execution` if the command exits non-zero or the transport
    /// drops mid-command.
    fn execute(&mut self, command: &str) -> Result<String>;
}

/// Opens sessions to remote targets.
pub trait Connector {
    /// Connects straight to `target`.
    fn connect(&self, target: &RemoteTarget) -> Result<Box<dyn RemoteSession>>;

    /// Connects to `target` through `bastion`, authenticating to each with its own identity.
    fn connect_through(
        &self,
        bastion: &RemoteTarget,
        target: &RemoteTarget,
    ) -> Result<Box<dyn RemoteSession>>;
}

/// libssh2-backed connector.
#[derive(Debug, Clone)]
pub struct SshConnector {
    timeout: Duration,
}

impl SshConnector {
    pub fn new(settings: &SshSettings) -> Self {
        Self {
            timeout: settings.timeout(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn tcp_connect(&self, target: &RemoteTarget, hop: Hop) -> Result<TcpStream> {
        let addr_str = format!("{}:{}", target.host(), target.port());
        let addr = addr_str
            .to_socket_addrs()
            .map_err(|e| {
                Error::connection(hop, target.host(), format!("failed to resolve host: {}", e))
            })?
            .next()
            .ok_or_else(|| Error::connection(hop, target.host(), "no addresses found for host"))?;

        let tcp = TcpStream::connect_timeout(&addr, self.timeout)
            .map_err(|e| Error::connection(hop, target.host(), e.to_string()))?;

        tcp.set_read_timeout(Some(self.timeout))
            .and_then(|_| tcp.set_write_timeout(Some(self.timeout)))
            .map_err(|e| Error::connection(hop, target.host(), e.to_string()))?;

        Ok(tcp)
    }

    /// Handshakes and authenticates over an already-connected stream.
    fn open_session(&self, tcp: TcpStream, target: &RemoteTarget, hop: Hop) -> Result<Session> {
        let mut sess = Session::new().map_err(|e| {
            Error::connection(hop, target.host(), format!("failed to create SSH session: {}", e))
        })?;

        sess.set_tcp_stream(tcp);
        sess.set_timeout(self.timeout.as_millis().min(u32::MAX as u128) as u32);
        sess.handshake().map_err(|e| {
            Error::connection(hop, target.host(), format!("SSH handshake failed: {}", e))
        })?;

        authenticate(&mut sess, target, hop)?;
        Ok(sess)
    }

    /// Opens the target session over an already-forwarded channel.
    fn jump<C>(&self, channel: C, target: &RemoteTarget) -> Result<Box<dyn RemoteSession>>
    where
        C: RelayChannel + 'static,
    {
        let (tunnel, stream) = Tunnel::open(channel).map_err(|e| {
            Error::connection(Hop::Target, target.host(), format!("local relay failed: {}", e))
        })?;

        // On error the tunnel drops here and takes the bastion session with it.
        let session = self.open_session(stream, target, Hop::Target)?;

        Ok(Box::new(SshSession {
            session,
            host: target.host().to_string(),
            tunnel: Some(tunnel),
        }))
    }
}

impl Connector for SshConnector {
    fn connect(&self, target: &RemoteTarget) -> Result<Box<dyn RemoteSession>> {
        info!("Connecting to {}", target);

        let tcp = self.tcp_connect(target, Hop::Direct)?;
        let session = self.open_session(tcp, target, Hop::Direct)?;

        Ok(Box::new(SshSession {
            session,
            host: target.host().to_string(),
            tunnel: None,
        }))
    }

    fn connect_through(
        &self,
        bastion: &RemoteTarget,
        target: &RemoteTarget,
    ) -> Result<Box<dyn RemoteSession>> {
        info!("Connecting to {} via bastion {}", target, bastion);

        let tcp = self.tcp_connect(bastion, Hop::Bastion)?;
        let bastion_session = self.open_session(tcp, bastion, Hop::Bastion)?;

        let channel = bastion_session
            .channel_direct_tcpip(target.host(), target.port(), None)
            .map_err(|e| {
                Error::connection(
                    Hop::Target,
                    target.host(),
                    format!(
                        "bastion {} could not open a channel to port {}: {}",
                        bastion.host(),
                        target.port(),
                        e
                    ),
                )
            })?;

        self.jump(BastionChannel::new(bastion_session, channel), target)
    }
}

/// Tries the configured key file, then the SSH agent.
fn authenticate(sess: &mut Session, target: &RemoteTarget, hop: Hop) -> Result<()> {
    debug!("Authenticating as user: {}", target.user());

    if let KeyMaterial::File {
        private_key,
        public_key,
        passphrase,
    } = target.key()
    {
        debug!("Attempting public key authentication with: {:?}", private_key);
        match sess.userauth_pubkey_file(
            target.user(),
            public_key.as_deref(),
            private_key,
            passphrase.as_deref(),
        ) {
            Ok(_) => {
                debug!("Public key authentication successful");
                return Ok(());
            }
            Err(e) => warn!("Public key authentication failed: {}", e),
        }
    }

    debug!("Attempting agent authentication");
    match sess.userauth_agent(target.user()) {
        Ok(_) if sess.authenticated() => {
            debug!("Agent authentication successful");
            return Ok(());
        }
        Ok(_) => warn!("Agent authentication did not complete"),
        Err(e) => warn!("Agent authentication failed: {}", e),
    }

    Err(Error::connection(
        hop,
        target.host(),
        format!(
            "SSH authentication failed for user {}. Tried: {}, agent",
            target.user(),
            target.key_path().as_deref().unwrap_or("no key specified")
        ),
    ))
}

/// A live libssh2 session, plus the relay it rides on when jumped.
pub struct SshSession {
    session: Session,
    host: String,
    tunnel: Option<Tunnel>,
}

impl SshSession {
    fn execution_error(&self, command: &str, detail: String) -> Error {
        Error::Execution {
            host: self.host.clone(),
            command: command.to_string(),
            exit_code: None,
            stderr: String::new(),
            detail,
        }
    }
}

impl RemoteSession for SshSession {
    fn host(&self) -> &str {
        &self.host
    }

    fn execute(&mut self, command: &str) -> Result<String> {
        debug!("Executing on {}: {}", self.host, command);

        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| self.execution_error(command, format!("failed to open channel: {}", e)))?;

        channel
            .exec(command)
            .map_err(|e| self.execution_error(command, format!("failed to execute command: {}", e)))?;

        let stdout = read_lossy(&mut channel)
            .map_err(|e| self.execution_error(command, format!("failed to read stdout: {}", e)))?;

        let stderr = read_lossy(&mut channel.stderr())
            .map_err(|e| self.execution_error(command, format!("failed to read stderr: {}", e)))?;

        channel
            .wait_close()
            .map_err(|e| self.execution_error(command, format!("failed to close channel: {}", e)))?;

        let exit_code = channel
            .exit_status()
            .map_err(|e| self.execution_error(command, format!("failed to get exit status: {}", e)))?;

        debug!("Command exit code: {}", exit_code);
        if exit_code != 0 {
            let first_line = stderr.lines().next().unwrap_or("").trim().to_string();
            return Err(Error::Execution {
                host: self.host.clone(),
                command: command.to_string(),
                exit_code: Some(exit_code),
                detail: if first_line.is_empty() {
                    format!("`{}` exited with status {}", command, exit_code)
                } else {
                    format!("`{}` exited with status {}: {}", command, exit_code, first_line)
                },
                stderr,
            });
        }

        Ok(stdout)
    }
}

/// Reads a stream to the end; output isn't required to be UTF-8.
fn read_lossy<R: Read>(reader: &mut R) -> std::io::Result<String> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

impl Drop for SshSession {
    fn drop(&mut self) {
        let _ = self.session.disconnect(None, "topoprobe done", None);
        // The target session rides on the relay, so stop the relay last.
        if let Some(tunnel) = self.tunnel.take() {
            drop(tunnel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::tunnel::loopback;
    use std::io::Write;
    use std::net::TcpListener;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::thread;

    fn target(host: &str, port: u16) -> RemoteTarget {
        RemoteTarget::new(host, port, "opc", KeyMaterial::Agent)
    }

    /// A port nothing is listening on.
    fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    /// Accepts one connection, answers with something that isn't SSH, and hangs up.
    fn not_ssh_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n");
            }
        });
        port
    }

    fn connector() -> SshConnector {
        SshConnector::with_timeout(Duration::from_secs(5))
    }

    #[test]
    fn test_direct_connect_refused() {
        let err = connector()
            .connect(&target("127.0.0.1", closed_port()))
            .err()
            .unwrap();
        assert_eq!(err.hop(), Some(Hop::Direct));
    }

    #[test]
    fn test_unreachable_bastion_is_bastion_hop() {
        let bastion = target("127.0.0.1", closed_port());
        let internal = target("10.0.0.5", 22);

        let err = connector().connect_through(&bastion, &internal).err().unwrap();

        assert_eq!(err.hop(), Some(Hop::Bastion));
        match err {
            Error::Connection { host, .. } => assert_eq!(host, "127.0.0.1"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_target_handshake_failure_is_target_hop() {
        let (channel, mut far) = loopback::pair();
        let closed = Arc::clone(&channel.closed);
        // The forwarded port answers, but not with SSH.
        thread::spawn(move || {
            let _ = far.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n");
        });

        let err = connector()
            .jump(channel, &target("10.0.0.5", 22))
            .err()
            .unwrap();

        assert_eq!(err.hop(), Some(Hop::Target));
        match err {
            Error::Connection { host, .. } => assert_eq!(host, "10.0.0.5"),
            other => panic!("unexpected error: {}", other),
        }
        // The relay and its channel are released once the attempt fails.
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_read_lossy_keeps_non_utf8_output() {
        let mut bytes: &[u8] = b"ok \xff\xfe done\n";
        let text = read_lossy(&mut bytes).unwrap();
        assert!(text.starts_with("ok "));
        assert!(text.ends_with(" done\n"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_bastion_handshake_failure_is_bastion_hop() {
        let bastion = target("127.0.0.1", not_ssh_server());
        let internal = target("10.0.0.5", 22);

        let err = connector().connect_through(&bastion, &internal).err().unwrap();

        assert_eq!(err.hop(), Some(Hop::Bastion));
    }
}
