//! # k-git-backup
//!
//! Mirrors remote git repositories into local directories.
//!
//! ## Features
//!
//! - **Clone or update**: full-history clones, later runs pull (or fetch every ref for bare mirrors)
//! - **Authentication**: SSH keys, access tokens or username and password
//! - **Host trust**: SSH host keys are pinned on first use, changed keys are refused
//! - **Retries**: transient failures are retried with a fixed delay
//! - **Snapshots**: timestamped copies, optionally packed as `.zip` or `.tar.zst`
//! - **Retention**: only the newest snapshots are kept
//!
//! ## Quick Start
//!
//! ```no_run
//! use k_git_backup::backup::engine::LocalBackupEngine;
//! use k_git_backup::backup::host_trust::KnownHostsFile;
//! use k_git_backup::backup::mirror_config::MirrorConfig;
//! use k_git_backup::backup::ssh_probe::Ssh2Probe;
//! use k_git_backup::backup::sync::ThreadSleeper;
//! use k_git_backup::backup::transport::Git2Transport;
//!
//! let config = MirrorConfig::from_file("config.yml")?;
//! let known_hosts = config
//!     .known_hosts_file()
//!     .unwrap_or_else(|| KnownHostsFile::new("known_hosts"));
//! let engine = LocalBackupEngine::builder()
//!     .transport(Git2Transport)
//!     .probe(Ssh2Probe::new(known_hosts))
//!     .sleeper(ThreadSleeper)
//!     .build();
//!
//! let summary = config.run_all(&engine, false);
//! println!("{summary}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
