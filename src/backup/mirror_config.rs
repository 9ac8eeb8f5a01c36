use crate::backup::descriptor::RepositoryDescriptor;
use crate::backup::destination::DestinationConfig;
use crate::backup::engine::LocalBackupEngine;
use crate::backup::host_trust::KnownHostsFile;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::ssh_probe::HostProbe;
use crate::backup::sync::{PairOutcome, Sleeper};
use crate::backup::transport::GitTransport;
use chrono::Utc;
use derive_more::Display;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;
use validator::Validate;

#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct Destinations {
    #[serde(default)]
    #[validate(nested)]
    local: Vec<DestinationConfig>,
}

/// Top level YAML config
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct MirrorConfig {
    /// Defaults to `$HOME/.ssh/known_hosts`
    known_hosts: Option<PathBuf>,
    #[serde(default)]
    #[validate(nested)]
    destination: Destinations,
    #[serde(default)]
    #[validate(nested)]
    repositories: Vec<RepositoryDescriptor>,
}

#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
#[display("{synced} synced, {skipped} skipped, {abandoned} abandoned")]
pub struct RunSummary {
    pub synced: usize,
    pub skipped: usize,
    pub abandoned: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: PairOutcome) {
        match outcome {
            PairOutcome::Synced(_) => self.synced += 1,
            PairOutcome::Skipped(_) => self.skipped += 1,
            PairOutcome::Abandoned(_) => self.abandoned += 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.abandoned == 0
    }
}

impl MirrorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = File::open(path)
            .map_err(Error::from)
            .and_then(|f| {
                serde_yml::from_reader::<_, MirrorConfig>(f)
                    .map_err(Error::from)
                    .with_msg(format!("Parse YAML config failed: {:?}", path))
            })?;
        config
            .validate()
            .map_err(Error::from)
            .with_msg(format!("Config validation failed: {:?}", path))?;
        Ok(config)
    }

    pub fn known_hosts_file(&self) -> Option<KnownHostsFile> {
        self.known_hosts
            .clone()
            .or_else(KnownHostsFile::default_path)
            .map(KnownHostsFile::new)
    }

    /// Every repository into every local destination, one pair at a time
    pub fn run_all<T, P, Z>(&self, engine: &LocalBackupEngine<T, P, Z>, dry_run: bool) -> RunSummary
    where
        T: GitTransport,
        P: HostProbe,
        Z: Sleeper,
    {
        let mut summary = RunSummary::default();
        for repo in &self.repositories {
            for destination in self.destination.local() {
                summary.record(engine.sync_pair(repo, destination, dry_run, Utc::now()));
            }
        }
        info!(stage = "locally", "{summary}");
        summary
    }
}
