pub mod archive;
pub mod auth;
pub mod compress;
pub mod descriptor;
pub mod destination;
pub mod engine;
pub mod file_ext;
pub mod finish;
pub mod host_trust;
pub mod mirror_config;
pub mod redacted;
pub mod result_error;
pub mod retention;
pub mod ssh_probe;
pub mod sync;
pub mod transport;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;
