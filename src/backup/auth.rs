use crate::backup::descriptor::RepositoryDescriptor;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use std::path::{Path, PathBuf};

/// Username sent alongside an access token; hosts only look at the password
pub static TOKEN_USERNAME: &str = "xyz";

/// Credential used for every transport operation of one sync
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    SshKey(PathBuf),
    /// Access token sent as the password of [`TOKEN_USERNAME`]
    Token(RedactedString),
    Basic {
        username: String,
        password: RedactedString,
    },
    None,
}

impl AuthMethod {
    /// Picks the credential for `repo`, first match wins:
    /// ssh requested, access token, username and password, anonymous.
    ///
    /// A missing ssh key path defaults to `$HOME/.ssh/id_rsa`.
    pub fn select(repo: &RepositoryDescriptor) -> AuthMethod {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        Self::select_with_home(repo, home.as_deref())
    }

    pub fn select_with_home(repo: &RepositoryDescriptor, home: Option<&Path>) -> AuthMethod {
        if repo.ssh() {
            let key = repo.ssh_key().clone().unwrap_or_else(|| {
                home.unwrap_or(Path::new(""))
                    .join(".ssh")
                    .join("id_rsa")
            });
            return AuthMethod::SshKey(key);
        }

        if !repo.token().is_empty() {
            return AuthMethod::Token(repo.token().clone());
        }

        if !repo.username().is_empty() && !repo.password().is_empty() {
            return AuthMethod::Basic {
                username: repo.username().clone(),
                password: repo.password().clone(),
            };
        }

        AuthMethod::None
    }

    /// Loads the ssh key, if any, and checks that it holds a private key
    pub fn ensure_usable(&self) -> Result<()> {
        match self {
            AuthMethod::SshKey(path) => check_private_key(path),
            _ => Ok(()),
        }
    }

    pub fn ssh_key(&self) -> Option<&Path> {
        match self {
            AuthMethod::SshKey(path) => Some(path),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthMethod::SshKey(_) => "ssh-key",
            AuthMethod::Token(_) => "token",
            AuthMethod::Basic { .. } => "basic",
            AuthMethod::None => "none",
        }
    }
}

/// Base64 of the `openssh-key-v1` magic followed by the `none` cipher
static OPENSSH_MAGIC: &str = "b3BlbnNzaC1rZXktdjE";
static OPENSSH_UNENCRYPTED: &str = "b3BlbnNzaC1rZXktdjEAAAAABG5vbmU";

/// Checks the PEM framing and rejects passphrase protected keys, which
/// cannot be used unattended
fn check_private_key(path: &Path) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidSshKey {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let contents = std::fs::read_to_string(path).map_err(|e| Error::InvalidSshKey {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let lines: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let label = lines
        .first()
        .and_then(|l| l.strip_prefix("-----BEGIN "))
        .and_then(|l| l.strip_suffix("-----"))
        .filter(|l| l.ends_with("PRIVATE KEY"))
        .ok_or_else(|| invalid("not a PEM or OpenSSH private key"))?;
    let end = format!("-----END {label}-----");
    let body_len = lines[1..]
        .iter()
        .position(|l| *l == end)
        .ok_or_else(|| invalid("truncated key, END line is missing"))?;
    let body = &lines[1..1 + body_len];

    let (headers, data): (Vec<&str>, Vec<&str>) = body.iter().partition(|l| l.contains(':'));
    let data = data.concat();

    if label == "ENCRYPTED PRIVATE KEY"
        || headers
            .iter()
            .any(|h| h.starts_with("Proc-Type:") && h.contains("ENCRYPTED"))
    {
        return Err(invalid("key is passphrase protected"));
    }
    if data.is_empty()
        || !data
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
    {
        return Err(invalid("key body is not base64"));
    }
    if label == "OPENSSH PRIVATE KEY" && !data.starts_with(OPENSSH_UNENCRYPTED) {
        return Err(if data.starts_with(OPENSSH_MAGIC) {
            invalid("key is passphrase protected")
        } else {
            invalid("not an openssh-key-v1 key")
        });
    }
    Ok(())
}
