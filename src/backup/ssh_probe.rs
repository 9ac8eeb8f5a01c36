//! One-off SSH handshake used to pin the server key before git connects.

use crate::backup::host_trust::{HostKey, HostTrustVerifier, TrustStore};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use ssh2::Session;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub static DEFAULT_SSH_USER: &str = "git";
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Where an ssh remote lives
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshSite {
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl SshSite {
    /// Accepts `ssh://[user@]host[:port]/path` and scp-like `[user@]host:path`
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = || Error::InvalidSshUrl(url.to_string());

        if url.contains("://") {
            let parsed = Url::parse(url).map_err(|_| invalid())?;
            if !matches!(parsed.scheme(), "ssh" | "git+ssh" | "ssh+git") {
                return Err(invalid());
            }
            let host = parsed
                .host_str()
                .filter(|h| !h.is_empty())
                .ok_or_else(invalid)?
                .trim_start_matches('[')
                .trim_end_matches(']');
            let user = match parsed.username() {
                "" => DEFAULT_SSH_USER,
                user => user,
            };
            return Ok(SshSite {
                user: user.to_string(),
                host: host.to_string(),
                port: parsed.port().unwrap_or(DEFAULT_SSH_PORT),
            });
        }

        let (authority, path) = url.split_once(':').ok_or_else(invalid)?;
        if authority.contains('/') || path.is_empty() {
            return Err(invalid());
        }
        let (user, host) = match authority.rsplit_once('@') {
            Some((user, host)) => (user, host),
            None => (DEFAULT_SSH_USER, authority),
        };
        if host.is_empty() || user.is_empty() {
            return Err(invalid());
        }

        Ok(SshSite {
            user: user.to_string(),
            host: host.to_string(),
            port: DEFAULT_SSH_PORT,
        })
    }

    fn resolve(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                Error::from(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no address for {}:{}", self.host, self.port),
                ))
            })
    }
}

/// Checks that an ssh remote is trusted and accepts `key` before cloning
pub trait HostProbe {
    fn probe(&self, site: &SshSite, key: &Path) -> Result<()>;
}

pub struct Ssh2Probe<S> {
    verifier: HostTrustVerifier<S>,
    timeout: Duration,
}

impl<S: TrustStore> Ssh2Probe<S> {
    pub fn new(store: S) -> Self {
        Self {
            verifier: HostTrustVerifier::new(store),
            timeout: PROBE_TIMEOUT,
        }
    }

    fn handshake(&self, site: &SshSite, key: &Path) -> Result<()> {
        let remote = site.resolve()?;
        let tcp = TcpStream::connect_timeout(&remote, self.timeout)?;
        tcp.set_read_timeout(Some(self.timeout))?;
        tcp.set_write_timeout(Some(self.timeout))?;

        let mut session = Session::new()?;
        session.set_timeout(u32::try_from(self.timeout.as_millis()).unwrap_or(u32::MAX));
        session.set_tcp_stream(tcp);
        session.handshake()?;

        let (blob, key_type) = session.host_key().ok_or_else(|| {
            Error::from(std::io::Error::other(format!(
                "{} presented no host key",
                site.host
            )))
        })?;
        self.verifier
            .verify(&site.host, remote, &HostKey::new(key_type, blob))?;

        session.userauth_pubkey_file(&site.user, None, key, None)?;
        if !session.authenticated() {
            return Err(Error::InvalidSshKey {
                path: key.to_path_buf(),
                reason: format!("rejected by {}", site.host),
            });
        }

        if let Err(e) = session.disconnect(None, "probe finished", None) {
            debug!(stage = "ssh-probe", host = %site.host, "disconnect failed: {e}");
        }
        Ok(())
    }
}

impl<S: TrustStore> HostProbe for Ssh2Probe<S> {
    fn probe(&self, site: &SshSite, key: &Path) -> Result<()> {
        debug!(
            stage = "ssh-probe",
            host = %site.host,
            port = site.port,
            user = %site.user,
            "probing"
        );
        self.handshake(site, key)
            .with_msg(format!("SSH probe of {}:{} failed", site.host, site.port))
    }
}
