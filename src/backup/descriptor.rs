use crate::backup::redacted::RedactedString;
use crate::backup::validate::{validate_optional_path_component, validate_path_component};
use bon::Builder;
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::path::PathBuf;
use validator::Validate;

/// A remote repository to mirror
///
/// Produced by whatever lists repositories on a hosting service (or read
/// directly from config) and left untouched for the duration of one sync.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, CopyGetters)]
#[serde(deny_unknown_fields)]
pub struct RepositoryDescriptor {
    #[validate(custom(function = validate_path_component))]
    #[builder(into)]
    #[getset(get = "pub")]
    name: String,

    /// Hosting service identifier, e.g. `github.com`
    #[serde(default)]
    #[validate(custom(function = validate_optional_path_component))]
    #[builder(default, into)]
    #[getset(get = "pub")]
    hoster: String,

    #[serde(default)]
    #[validate(custom(function = validate_optional_path_component))]
    #[builder(default, into)]
    #[getset(get = "pub")]
    owner: String,

    /// HTTPS clone url
    #[validate(length(min = 1))]
    #[builder(into)]
    #[getset(get = "pub")]
    url: String,

    /// SSH clone url, used when `ssh` is set
    #[serde(default)]
    #[builder(default, into)]
    #[getset(get = "pub")]
    ssh_url: String,

    #[serde(default)]
    #[builder(default, into)]
    #[getset(get = "pub")]
    token: RedactedString,

    #[serde(default)]
    #[builder(default, into)]
    #[getset(get = "pub")]
    username: String,

    #[serde(default)]
    #[builder(default, into)]
    #[getset(get = "pub")]
    password: RedactedString,

    #[serde(default)]
    #[builder(default)]
    #[getset(get_copy = "pub")]
    ssh: bool,

    #[builder(into)]
    #[getset(get = "pub")]
    ssh_key: Option<PathBuf>,
}

impl RepositoryDescriptor {
    /// The url matching the requested transport
    pub fn transport_url(&self) -> &str {
        if self.ssh && !self.ssh_url.is_empty() {
            &self.ssh_url
        } else {
            &self.url
        }
    }
}
