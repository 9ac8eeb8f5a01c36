//! Scriptable stand-ins for the network-facing traits.

use crate::backup::auth::AuthMethod;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::ssh_probe::{HostProbe, SshSite};
use crate::backup::sync::Sleeper;
use crate::backup::transport::{
    GitTransport, TransportError, TransportErrorKind, TransportResult, UpdateOutcome,
};
use std::cell::{Cell, RefCell};
use std::path::Path;
use std::time::Duration;

/// Records calls and fails the first `n` clones or updates on request
///
/// Clones create the target directory. Discards are counted but leave the
/// directory in place, so a run of failing updates stays on the update path.
#[derive(Default)]
pub struct MockTransport {
    lists: Cell<usize>,
    clones: Cell<usize>,
    fetches: Cell<usize>,
    pulls: Cell<usize>,
    opens: Cell<usize>,
    discards: Cell<usize>,
    list_failure: RefCell<Option<TransportErrorKind>>,
    clone_failures: Cell<usize>,
    clone_failure_kind: Cell<Option<TransportErrorKind>>,
    update_failures: Cell<usize>,
    update_outcome: Cell<Option<UpdateOutcome>>,
    cloned_urls: RefCell<Vec<String>>,
}

impl MockTransport {
    pub fn fail_list(&self, kind: TransportErrorKind) {
        self.list_failure.replace(Some(kind));
    }

    pub fn fail_clones(&self, n: usize, kind: TransportErrorKind) {
        self.clone_failures.set(n);
        self.clone_failure_kind.set(Some(kind));
    }

    pub fn fail_updates(&self, n: usize) {
        self.update_failures.set(n);
    }

    pub fn update_outcome(&self, outcome: UpdateOutcome) {
        self.update_outcome.set(Some(outcome));
    }

    pub fn lists(&self) -> usize {
        self.lists.get()
    }

    pub fn clones(&self) -> usize {
        self.clones.get()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.get()
    }

    pub fn pulls(&self) -> usize {
        self.pulls.get()
    }

    pub fn opens(&self) -> usize {
        self.opens.get()
    }

    pub fn discards(&self) -> usize {
        self.discards.get()
    }

    pub fn cloned_urls(&self) -> Vec<String> {
        self.cloned_urls.borrow().clone()
    }

    fn bump(counter: &Cell<usize>) {
        counter.set(counter.get() + 1);
    }

    fn take_failure(remaining: &Cell<usize>) -> bool {
        match remaining.get() {
            0 => false,
            n => {
                remaining.set(n - 1);
                true
            }
        }
    }

    fn update(&self) -> TransportResult<UpdateOutcome> {
        if Self::take_failure(&self.update_failures) {
            return Err(TransportError::new(
                TransportErrorKind::Other,
                "object file is corrupt",
            ));
        }
        Ok(self
            .update_outcome
            .get()
            .unwrap_or(UpdateOutcome::AlreadyUpToDate))
    }
}

impl GitTransport for MockTransport {
    fn list_remote(&self, _url: &str, _auth: &AuthMethod) -> TransportResult<usize> {
        Self::bump(&self.lists);
        match *self.list_failure.borrow() {
            Some(kind) => Err(TransportError::new(kind, "scripted list failure")),
            None => Ok(1),
        }
    }

    fn clone_repository(
        &self,
        url: &str,
        path: &Path,
        _bare: bool,
        _auth: &AuthMethod,
    ) -> TransportResult<()> {
        Self::bump(&self.clones);
        if Self::take_failure(&self.clone_failures) {
            let kind = self
                .clone_failure_kind
                .get()
                .unwrap_or(TransportErrorKind::Other);
            return Err(TransportError::new(kind, "scripted clone failure"));
        }

        self.cloned_urls.borrow_mut().push(url.to_string());
        std::fs::create_dir_all(path)
            .and_then(|()| std::fs::write(path.join("HEAD"), "ref: refs/heads/main\n"))
            .map_err(|e| TransportError::new(TransportErrorKind::LocalRepository, e.to_string()))
    }

    fn fetch_all(&self, _path: &Path, _auth: &AuthMethod) -> TransportResult<UpdateOutcome> {
        Self::bump(&self.fetches);
        self.update()
    }

    fn pull(&self, _path: &Path, _auth: &AuthMethod) -> TransportResult<UpdateOutcome> {
        Self::bump(&self.pulls);
        self.update()
    }

    fn open(&self, path: &Path) -> TransportResult<()> {
        Self::bump(&self.opens);
        if path.is_dir() {
            Ok(())
        } else {
            Err(TransportError::new(
                TransportErrorKind::LocalRepository,
                "could not find repository",
            ))
        }
    }

    fn discard(&self, _path: &Path) -> std::io::Result<()> {
        Self::bump(&self.discards);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockProbe {
    reject: bool,
    probes: Cell<usize>,
    last_site: RefCell<Option<SshSite>>,
}

impl MockProbe {
    /// A probe that reports a changed host key
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub fn probes(&self) -> usize {
        self.probes.get()
    }

    pub fn last_site(&self) -> Option<SshSite> {
        self.last_site.borrow().clone()
    }
}

impl HostProbe for MockProbe {
    fn probe(&self, site: &SshSite, _key: &Path) -> Result<()> {
        self.probes.set(self.probes.get() + 1);
        self.last_site.replace(Some(site.clone()));
        if self.reject {
            Err(Error::HostKeyMismatch {
                host: site.host.clone(),
            })
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}
