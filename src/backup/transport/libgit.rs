use crate::backup::auth::{AuthMethod, TOKEN_USERNAME};
use crate::backup::transport::{
    GitTransport, TransportError, TransportErrorKind, TransportResult, UpdateOutcome,
};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    AutotagOption, Cred, CredentialType, Direction, ErrorClass, ErrorCode, FetchOptions, Remote,
    RemoteCallbacks, Repository,
};
use std::cell::Cell;
use std::path::Path;
use tracing::debug;

/// Every ref of the remote, mirrored one to one
static MIRROR_REFSPEC: &str = "+refs/*:refs/*";
/// Every branch of `origin` into remote-tracking refs
static BRANCHES_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";
/// libgit2 calls the credential callback again after a rejected credential
static MAX_CREDENTIAL_ATTEMPTS: usize = 3;

/// [`GitTransport`] backed by libgit2
#[derive(Clone, Debug, Default)]
pub struct Git2Transport;

impl Git2Transport {
    pub fn new() -> Self {
        Self
    }
}

fn remote_callbacks(auth: &AuthMethod) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    let mut attempts = 0;
    callbacks.credentials(move |_url, username_from_url, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::new(
                ErrorCode::Auth,
                ErrorClass::Net,
                "authentication failed",
            ));
        }

        match auth {
            AuthMethod::SshKey(key) => {
                let user = username_from_url.unwrap_or("git");
                if allowed.contains(CredentialType::USERNAME) {
                    Cred::username(user)
                } else {
                    Cred::ssh_key(user, None, key, None)
                }
            }
            AuthMethod::Token(token) => Cred::userpass_plaintext(TOKEN_USERNAME, token.inner()),
            AuthMethod::Basic { username, password } => {
                Cred::userpass_plaintext(username, password.inner())
            }
            AuthMethod::None => Cred::default(),
        }
    });
    callbacks
}

/// Fetch options counting updated refs into `tips_updated`
fn fetch_options<'a>(auth: &'a AuthMethod, tips_updated: &'a Cell<usize>) -> FetchOptions<'a> {
    let mut callbacks = remote_callbacks(auth);
    callbacks.update_tips(move |refname, _old, new| {
        debug!("Updated {} to {}", refname, new);
        tips_updated.set(tips_updated.get() + 1);
        true
    });

    let mut fetch_opts = FetchOptions::new();
    fetch_opts
        .remote_callbacks(callbacks)
        .download_tags(AutotagOption::All);
    fetch_opts
}

fn outcome(tips_updated: &Cell<usize>) -> UpdateOutcome {
    if tips_updated.get() > 0 {
        UpdateOutcome::Updated
    } else {
        UpdateOutcome::AlreadyUpToDate
    }
}

/// Maps errors of operations talking to the remote
pub(crate) fn remote_error(e: git2::Error) -> TransportError {
    let message = e.message().to_string();
    let lower = message.to_ascii_lowercase();

    let kind = if lower.contains("repository not found")
        || lower.contains("status code: 404")
        || lower.contains("could not find repository")
    {
        TransportErrorKind::RepositoryNotFound
    } else if lower.contains("access denied") || lower.contains("not exported") {
        TransportErrorKind::AccessDenied
    } else if lower.contains("remote repository is empty") {
        TransportErrorKind::EmptyRepository
    } else {
        TransportErrorKind::Other
    };

    TransportError::new(kind, message)
}

/// Maps errors of operations on the local repository
pub(crate) fn local_error(e: git2::Error) -> TransportError {
    TransportError::new(TransportErrorKind::LocalRepository, e.message())
}

fn log_stats(remote: &Remote, path: &Path) {
    let stats = remote.stats();
    if stats.received_bytes() == 0 {
        return;
    }

    // A thin pack reuses objects that are already present locally
    if stats.local_objects() > 0 {
        debug!(
            "Received {} objects in {} bytes for {:?} (used {} local objects)",
            stats.indexed_objects(),
            stats.received_bytes(),
            path,
            stats.local_objects()
        );
    } else {
        debug!(
            "Received {} objects in {} bytes for {:?}",
            stats.indexed_objects(),
            stats.received_bytes(),
            path
        );
    }
}

impl GitTransport for Git2Transport {
    fn list_remote(&self, url: &str, auth: &AuthMethod) -> TransportResult<usize> {
        let mut remote = Remote::create_detached(url).map_err(remote_error)?;
        let connection = remote
            .connect_auth(Direction::Fetch, Some(remote_callbacks(auth)), None)
            .map_err(remote_error)?;

        // `list()` builds a slice from a null pointer when the remote has no
        // refs, so an advertised HEAD has to be seen first
        match connection.default_branch() {
            Ok(_) => {}
            Err(e) if e.code() == ErrorCode::NotFound => {
                return Err(TransportError::new(
                    TransportErrorKind::EmptyRepository,
                    format!("{url} has no refs"),
                ));
            }
            Err(e) => return Err(remote_error(e)),
        }
        Ok(connection.list().map_err(remote_error)?.len())
    }

    fn clone_repository(
        &self,
        url: &str,
        path: &Path,
        bare: bool,
        auth: &AuthMethod,
    ) -> TransportResult<()> {
        debug!("Cloning {} into {:?} (bare: {})", url, path, bare);
        let tips_updated = Cell::new(0);
        let mut builder = RepoBuilder::new();
        builder
            .bare(bare)
            .fetch_options(fetch_options(auth, &tips_updated));
        if bare {
            builder.remote_create(|repo, name, url| repo.remote_with_fetch(name, url, MIRROR_REFSPEC));
        }

        builder.clone(url, path).map_err(remote_error)?;
        debug!("Clone of {:?} created {} refs", path, tips_updated.get());
        Ok(())
    }

    fn fetch_all(&self, path: &Path, auth: &AuthMethod) -> TransportResult<UpdateOutcome> {
        let repo = Repository::open_bare(path).map_err(local_error)?;
        let mut remote = repo.find_remote("origin").map_err(local_error)?;

        let tips_updated = Cell::new(0);
        remote
            .fetch(
                &[MIRROR_REFSPEC],
                Some(&mut fetch_options(auth, &tips_updated)),
                None,
            )
            .map_err(remote_error)?;
        log_stats(&remote, path);

        Ok(outcome(&tips_updated))
    }

    fn pull(&self, path: &Path, auth: &AuthMethod) -> TransportResult<UpdateOutcome> {
        let repo = Repository::open(path).map_err(local_error)?;
        let tips_updated = Cell::new(0);
        {
            let mut remote = repo.find_remote("origin").map_err(local_error)?;
            remote
                .fetch(
                    &[BRANCHES_REFSPEC],
                    Some(&mut fetch_options(auth, &tips_updated)),
                    None,
                )
                .map_err(remote_error)?;
            log_stats(&remote, path);
        }

        let head = match repo.head() {
            Ok(head) => head,
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                return Ok(outcome(&tips_updated));
            }
            Err(e) => return Err(local_error(e)),
        };

        // Detached heads have nothing to fast-forward
        let (Some(head_name), Some(branch)) = (head.name(), head.shorthand()) else {
            return Ok(outcome(&tips_updated));
        };
        if !head.is_branch() {
            return Ok(outcome(&tips_updated));
        }
        let head_name = head_name.to_string();
        let branch = branch.to_string();

        let upstream = match repo.find_reference(&format!("refs/remotes/origin/{branch}")) {
            Ok(upstream) => upstream,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(outcome(&tips_updated)),
            Err(e) => return Err(local_error(e)),
        };
        let fetched = repo
            .reference_to_annotated_commit(&upstream)
            .map_err(local_error)?;
        let (analysis, _) = repo.merge_analysis(&[&fetched]).map_err(local_error)?;

        if analysis.is_up_to_date() {
            return Ok(outcome(&tips_updated));
        }

        if analysis.is_fast_forward() {
            repo.find_reference(&head_name)
                .and_then(|mut r| r.set_target(fetched.id(), "pull: fast-forward"))
                .and_then(|_| repo.checkout_head(Some(CheckoutBuilder::default().force())))
                .map_err(local_error)?;
            return Ok(UpdateOutcome::Updated);
        }

        Err(TransportError::new(
            TransportErrorKind::LocalRepository,
            format!("{branch} has diverged from origin and cannot be fast-forwarded"),
        ))
    }

    fn open(&self, path: &Path) -> TransportResult<()> {
        Repository::open(path).map(|_| ()).map_err(local_error)
    }
}
