use clap::Parser;
use k_git_backup::backup::engine::LocalBackupEngine;
use k_git_backup::backup::host_trust::KnownHostsFile;
use k_git_backup::backup::mirror_config::MirrorConfig;
use k_git_backup::backup::ssh_probe::Ssh2Probe;
use k_git_backup::backup::sync::ThreadSleeper;
use k_git_backup::backup::transport::Git2Transport;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, warn};

/// Mirror git repositories into local directories
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,

    /// Log what would be done without cloning, pulling, archiving or deleting
    #[arg(long)]
    dry_run: bool,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = match MirrorConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    };

    let known_hosts = config.known_hosts_file().unwrap_or_else(|| {
        warn!("HOME is not set, trusting hosts through ./known_hosts");
        KnownHostsFile::new("known_hosts")
    });
    let engine = LocalBackupEngine::builder()
        .transport(Git2Transport)
        .probe(Ssh2Probe::new(known_hosts))
        .sleeper(ThreadSleeper)
        .build();

    let summary = config.run_all(&engine, args.dry_run);
    if !summary.is_success() {
        exit(1);
    }
}
