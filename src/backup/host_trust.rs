//! Trust-on-first-use verification of SSH host keys.
//!
//! Unknown hosts are pinned on first contact. A known host presenting a
//! different key is rejected.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use ssh2::{CheckResult, HostKeyType, KnownHostFileKind, KnownHostKeyFormat, KnownHosts, Session};
use std::fs::OpenOptions;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

static KNOWN_HOSTS_COMMENT: &str = "k_git_backup";

/// Raw public key presented by a server during the handshake
#[derive(Clone, Debug)]
pub struct HostKey {
    pub key_type: HostKeyType,
    pub blob: Vec<u8>,
}

impl HostKey {
    pub fn new<B: Into<Vec<u8>>>(key_type: HostKeyType, blob: B) -> Self {
        Self {
            key_type,
            blob: blob.into(),
        }
    }
}

// `HostKeyType` has no `PartialEq`
impl PartialEq for HostKey {
    fn eq(&self, other: &Self) -> bool {
        self.key_type as isize == other.key_type as isize && self.blob == other.blob
    }
}

impl Eq for HostKey {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrustLookup {
    Match,
    Mismatch,
    NotFound,
}

/// Persistent record of trusted host keys
pub trait TrustStore {
    fn lookup(&self, host: &str, port: u16, key: &HostKey) -> Result<TrustLookup>;

    fn trust(&self, host: &str, port: u16, key: &HostKey) -> Result<()>;
}

/// `host` for port 22, `[host]:port` otherwise, as in OpenSSH `known_hosts`
pub fn known_hosts_name(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_string()
    } else {
        format!("[{host}]:{port}")
    }
}

pub struct HostTrustVerifier<S> {
    store: S,
}

impl<S: TrustStore> HostTrustVerifier<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn verify(&self, host: &str, remote: SocketAddr, key: &HostKey) -> Result<()> {
        let port = remote.port();
        match self.store.lookup(host, port, key)? {
            TrustLookup::Match => Ok(()),
            TrustLookup::NotFound => {
                info!(stage = "host-trust", host, %remote, "trusting new host key");
                self.store.trust(host, port, key)
            }
            TrustLookup::Mismatch => {
                warn!(
                    stage = "host-trust",
                    host,
                    %remote,
                    "host key changed, possible man-in-the-middle attack"
                );
                Err(Error::HostKeyMismatch {
                    host: known_hosts_name(host, port),
                })
            }
        }
    }
}

/// OpenSSH `known_hosts` file read and appended through libssh2
#[derive(Clone, Debug)]
pub struct KnownHostsFile {
    path: PathBuf,
}

impl KnownHostsFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// `$HOME/.ssh/known_hosts`
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".ssh").join("known_hosts"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn empty() -> Result<KnownHosts> {
        Ok(Session::new()?.known_hosts()?)
    }

    fn load(&self) -> Result<KnownHosts> {
        let mut known_hosts = Self::empty()?;
        if self.path.exists() {
            known_hosts
                .read_file(&self.path, KnownHostFileKind::OpenSSH)
                .map_err(Error::from)
                .with_msg(format!("Reading {:?} failed", self.path))?;
        }
        Ok(known_hosts)
    }

    fn entry_line(host: &str, port: u16, key: &HostKey) -> Result<String> {
        let mut known_hosts = Self::empty()?;
        known_hosts.add(
            &known_hosts_name(host, port),
            &key.blob,
            KNOWN_HOSTS_COMMENT,
            KnownHostKeyFormat::from(key.key_type),
        )?;
        let entry = known_hosts
            .hosts()?
            .into_iter()
            .next()
            .ok_or_else(|| Error::from(std::io::Error::other("known host entry was not added")))?;
        let mut line = known_hosts.write_string(&entry, KnownHostFileKind::OpenSSH)?;
        if !line.ends_with('\n') {
            line.push('\n');
        }
        Ok(line)
    }

    fn ends_with_newline(&self) -> bool {
        std::fs::read(&self.path)
            .map(|bytes| bytes.last().map_or(true, |b| *b == b'\n'))
            .unwrap_or(true)
    }
}

impl TrustStore for KnownHostsFile {
    fn lookup(&self, host: &str, port: u16, key: &HostKey) -> Result<TrustLookup> {
        match self.load()?.check_port(host, port, &key.blob) {
            CheckResult::Match => Ok(TrustLookup::Match),
            CheckResult::Mismatch => Ok(TrustLookup::Mismatch),
            CheckResult::NotFound => Ok(TrustLookup::NotFound),
            CheckResult::Failure => Err(Error::from(std::io::Error::other(format!(
                "checking {:?} against {:?} failed",
                host, self.path
            )))),
        }
    }

    /// Appends one line and leaves the rest of the file untouched
    fn trust(&self, host: &str, port: u16, key: &HostKey) -> Result<()> {
        let line = Self::entry_line(host, port, key)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let prefix = if self.ends_with_newline() { "" } else { "\n" };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(format!("{prefix}{line}").as_bytes())?;
        Ok(())
    }
}
