//! Clone-or-update of one repository with bounded retries.
//!
//! [`SyncState::next`] is the whole retry policy: given the current state and
//! what the last action reported, it picks the next state. [`RetryDriver`]
//! performs the actions and feeds their results back in.

use crate::backup::auth::AuthMethod;
use crate::backup::descriptor::RepositoryDescriptor;
use crate::backup::ssh_probe::{HostProbe, SshSite};
use crate::backup::transport::{
    CloneDisposition, GitTransport, TransportError, TransportErrorKind, UpdateOutcome,
};
use bon::Builder;
use derive_more::Display;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Fixed wait between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration)
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Synced {
    #[display("cloned")]
    Cloned,
    #[display("updated")]
    Updated,
    #[display("already up-to-date")]
    AlreadyUpToDate,
    #[display("dry run")]
    DryRun,
}

impl From<UpdateOutcome> for Synced {
    fn from(outcome: UpdateOutcome) -> Self {
        match outcome {
            UpdateOutcome::Updated => Synced::Updated,
            UpdateOutcome::AlreadyUpToDate => Synced::AlreadyUpToDate,
        }
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum SkipReason {
    #[display("target exists and is a file")]
    TargetIsFile,
    #[display("repository not found")]
    RepositoryNotFound,
    #[display("access denied or repository not exported")]
    AccessDenied,
    #[display("remote repository is empty")]
    EmptyRepository,
    /// Every clone attempt failed; nothing was written locally
    #[display("clone retries exhausted")]
    CloneRetriesExhausted,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum AbandonReason {
    #[display("destination unusable")]
    DestinationUnusable,
    #[display("ssh key unusable")]
    SshKeyUnusable,
    #[display("ssh probe failed")]
    ProbeFailed,
    #[display("retries exhausted")]
    RetriesExhausted,
}

/// Result of one repository/destination pair
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum PairOutcome {
    #[display("synced ({_0})")]
    Synced(Synced),
    #[display("skipped ({_0})")]
    Skipped(SkipReason),
    #[display("abandoned ({_0})")]
    Abandoned(AbandonReason),
}

impl PairOutcome {
    /// Everything but an abandoned pair counts as handled
    pub fn is_success(&self) -> bool {
        !matches!(self, PairOutcome::Abandoned(_))
    }
}

/// What an action reported
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    LocalMissing,
    LocalIsDirectory,
    LocalIsFile,
    ProbeFailed,
    Cloned,
    CloneFailed(TransportError),
    Updated(UpdateOutcome),
    UpdateFailed(TransportError),
    Waited,
    DryRun,
}

/// Attempts count from 1
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    CheckLocal { attempt: u32 },
    Clone { attempt: u32 },
    Update { attempt: u32 },
    /// Wait out the delay, discarding the local copy first if `discard`
    Retry { attempt: u32, discard: bool },
    Done(PairOutcome),
}

impl SyncState {
    pub fn start() -> Self {
        SyncState::CheckLocal { attempt: 1 }
    }

    pub fn next(self, event: SyncEvent, policy: &RetryPolicy) -> SyncState {
        use SyncState::*;

        match (self, event) {
            (Done(outcome), _) => Done(outcome),
            (_, SyncEvent::DryRun) => Done(PairOutcome::Synced(Synced::DryRun)),

            (CheckLocal { attempt }, SyncEvent::LocalMissing) => Clone { attempt },
            (CheckLocal { attempt }, SyncEvent::LocalIsDirectory) => Update { attempt },
            (CheckLocal { .. }, SyncEvent::LocalIsFile) => {
                Done(PairOutcome::Skipped(SkipReason::TargetIsFile))
            }

            (Clone { .. }, SyncEvent::Cloned) => Done(PairOutcome::Synced(Synced::Cloned)),
            (Clone { .. }, SyncEvent::ProbeFailed) => {
                Done(PairOutcome::Abandoned(AbandonReason::ProbeFailed))
            }
            (Clone { attempt }, SyncEvent::CloneFailed(e)) => {
                match e.kind().clone_disposition() {
                    CloneDisposition::Abort | CloneDisposition::Skip => {
                        Done(PairOutcome::Skipped(skip_reason(e.kind())))
                    }
                    CloneDisposition::Retry => retry_or_finish(
                        attempt,
                        false,
                        PairOutcome::Skipped(SkipReason::CloneRetriesExhausted),
                        policy,
                    ),
                }
            }

            (Update { .. }, SyncEvent::Updated(outcome)) => Done(PairOutcome::Synced(outcome.into())),
            (Update { attempt }, SyncEvent::UpdateFailed(_)) => retry_or_finish(
                attempt,
                true,
                PairOutcome::Abandoned(AbandonReason::RetriesExhausted),
                policy,
            ),

            (Retry { attempt, .. }, SyncEvent::Waited) => CheckLocal {
                attempt: attempt + 1,
            },

            (state, event) => {
                error!(stage = "sync", ?state, ?event, "unexpected event");
                Done(PairOutcome::Abandoned(AbandonReason::RetriesExhausted))
            }
        }
    }
}

/// `exhausted` once the last attempt has failed
fn retry_or_finish(
    attempt: u32,
    discard: bool,
    exhausted: PairOutcome,
    policy: &RetryPolicy,
) -> SyncState {
    if attempt >= policy.max_attempts {
        SyncState::Done(exhausted)
    } else {
        SyncState::Retry { attempt, discard }
    }
}

fn skip_reason(kind: TransportErrorKind) -> SkipReason {
    match kind {
        TransportErrorKind::RepositoryNotFound => SkipReason::RepositoryNotFound,
        TransportErrorKind::AccessDenied => SkipReason::AccessDenied,
        _ => SkipReason::EmptyRepository,
    }
}

/// The actions of one sync, each reported as a [`SyncEvent`]
#[derive(Builder)]
pub struct SyncAttempt<'a, T, P> {
    transport: &'a T,
    probe: &'a P,
    repo: &'a RepositoryDescriptor,
    auth: &'a AuthMethod,
    /// Absolute path of the local copy
    path: &'a Path,
    #[builder(default)]
    bare: bool,
    #[builder(default)]
    dry_run: bool,
}

impl<T: GitTransport, P: HostProbe> SyncAttempt<'_, T, P> {
    pub fn check_local(&self) -> SyncEvent {
        match std::fs::symlink_metadata(self.path) {
            Err(_) => SyncEvent::LocalMissing,
            Ok(_) if self.path.is_dir() => SyncEvent::LocalIsDirectory,
            Ok(_) => SyncEvent::LocalIsFile,
        }
    }

    pub fn clone_remote(&self, attempt: u32) -> SyncEvent {
        let url = self.repo.transport_url();
        info!(
            stage = "sync",
            repo = self.repo.name().as_str(),
            path = ?self.path,
            attempt,
            "cloning"
        );
        if self.dry_run {
            return SyncEvent::DryRun;
        }

        if let Some(key) = self.auth.ssh_key() {
            let probed = SshSite::parse(url).and_then(|site| self.probe.probe(&site, key));
            if let Err(e) = probed {
                error!(stage = "sync", repo = self.repo.name().as_str(), "{e}");
                return SyncEvent::ProbeFailed;
            }
        }

        if let Err(e) = self.transport.list_remote(url, self.auth) {
            return SyncEvent::CloneFailed(e);
        }

        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return SyncEvent::CloneFailed(TransportError::new(
                    TransportErrorKind::LocalRepository,
                    format!("creating {parent:?} failed: {e}"),
                ));
            }
        }

        match self
            .transport
            .clone_repository(url, self.path, self.bare, self.auth)
        {
            Ok(()) => SyncEvent::Cloned,
            Err(e) => SyncEvent::CloneFailed(e),
        }
    }

    pub fn update(&self, attempt: u32) -> SyncEvent {
        info!(
            stage = "sync",
            repo = self.repo.name().as_str(),
            path = ?self.path,
            attempt,
            "opening locally"
        );
        if let Err(e) = self.transport.open(self.path) {
            if self.dry_run {
                warn!(stage = "sync", path = ?self.path, "would be re-cloned: {e}");
                return SyncEvent::DryRun;
            }
            return SyncEvent::UpdateFailed(e);
        }
        if self.dry_run {
            return SyncEvent::DryRun;
        }

        let updated = if self.bare {
            self.transport.fetch_all(self.path, self.auth)
        } else {
            info!(stage = "sync", path = ?self.path, "pulling");
            self.transport.pull(self.path, self.auth)
        };
        match updated {
            Ok(outcome) => SyncEvent::Updated(outcome),
            Err(e) => SyncEvent::UpdateFailed(e),
        }
    }

    pub fn discard(&self) {
        if let Err(e) = self.transport.discard(self.path) {
            warn!(stage = "sync", path = ?self.path, "Removing local copy failed: {e}");
        }
    }
}

#[derive(Builder)]
pub struct RetryDriver<'a, Z> {
    sleeper: &'a Z,
    #[builder(default)]
    policy: RetryPolicy,
}

impl<Z: Sleeper> RetryDriver<'_, Z> {
    pub fn run<T: GitTransport, P: HostProbe>(&self, sync: &SyncAttempt<'_, T, P>) -> PairOutcome {
        let mut state = SyncState::start();
        loop {
            let event = match state {
                SyncState::CheckLocal { .. } => sync.check_local(),
                SyncState::Clone { attempt } => sync.clone_remote(attempt),
                SyncState::Update { attempt } => sync.update(attempt),
                SyncState::Retry { discard, .. } => {
                    if discard {
                        sync.discard();
                    }
                    self.sleeper.sleep(self.policy.delay);
                    SyncEvent::Waited
                }
                SyncState::Done(outcome) => return outcome,
            };
            self.log_event(sync, &state, &event);
            state = state.next(event, &self.policy);
        }
    }

    fn log_event<T, P>(&self, sync: &SyncAttempt<'_, T, P>, state: &SyncState, event: &SyncEvent) {
        let repo = sync.repo.name().as_str();
        let path = sync.path;
        let max_attempts = self.policy.max_attempts;
        match (state, event) {
            (SyncState::CheckLocal { .. }, SyncEvent::LocalIsFile) => {
                warn!(stage = "sync", repo, ?path, "{:?} is a file", path)
            }
            (SyncState::Clone { attempt }, SyncEvent::CloneFailed(e))
            | (SyncState::Update { attempt }, SyncEvent::UpdateFailed(e)) => {
                let attempt = *attempt;
                let retryable = matches!(state, SyncState::Update { .. })
                    || e.kind().clone_disposition() == CloneDisposition::Retry;
                if !retryable {
                    warn!(stage = "sync", repo, ?path, "{e}");
                } else if attempt >= max_attempts && matches!(state, SyncState::Clone { .. }) {
                    warn!(stage = "sync", repo, ?path, attempt, max_attempts, "giving up: {e}");
                } else if attempt >= max_attempts {
                    error!(stage = "sync", repo, ?path, attempt, max_attempts, "giving up: {e}");
                } else {
                    warn!(
                        stage = "sync",
                        repo,
                        ?path,
                        attempt,
                        max_attempts,
                        "retry {attempt} from {max_attempts}: {e}"
                    );
                }
            }
            (SyncState::Update { .. }, SyncEvent::Updated(UpdateOutcome::AlreadyUpToDate)) => {
                info!(stage = "sync", repo, ?path, "already up-to-date")
            }
            _ => {}
        }
    }
}
