use crate::backup::compress::CompressionConfig;
use crate::backup::validate::validate_not_a_file;
use bon::Builder;
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

/// A local directory repositories are mirrored into
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, CopyGetters)]
#[serde(deny_unknown_fields)]
pub struct DestinationConfig {
    #[validate(custom(function = validate_not_a_file))]
    #[builder(into)]
    #[getset(get = "pub")]
    path: PathBuf,

    /// Lay repositories out as `hoster/owner/name`
    #[serde(default)]
    #[builder(default)]
    #[getset(get_copy = "pub")]
    structured: bool,

    #[serde(default)]
    #[builder(default)]
    #[getset(get_copy = "pub")]
    bare: bool,

    /// Number of timestamped snapshots to keep, 0 syncs a single copy in place
    #[serde(default)]
    #[builder(default)]
    #[getset(get_copy = "pub")]
    keep: usize,

    #[serde(default)]
    #[builder(default)]
    #[getset(get_copy = "pub")]
    compression: CompressionConfig,
}

impl DestinationConfig {
    pub fn snapshots(&self) -> bool {
        self.keep > 0
    }
}
