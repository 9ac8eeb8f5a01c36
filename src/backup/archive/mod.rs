pub mod tarball;
pub mod walk;
pub mod zipfile;

use crate::backup::compress::CompressionConfig;
use crate::backup::file_ext::FileExtProvider;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use std::ffi::OsString;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// What a walked path is, decided without following symlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// A single path of the working copy to be put into an archive
#[derive(Debug)]
pub struct ArchiveEntry {
    /// Absolute path on disk
    pub src: PathBuf,
    /// Path inside the archive, relative to the working copy root
    pub dst: PathBuf,
    pub kind: EntryKind,
}

impl ArchiveEntry {
    pub fn new<A: Into<PathBuf>, B: Into<PathBuf>>(src: A, dst: B, kind: EntryKind) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            kind,
        }
    }
}

/// `<working_copy><suffix>`, e.g. `/backup/foo/1700000000.zip`
pub fn archive_path_for<P: AsRef<Path>>(working_copy: P, compression: CompressionConfig) -> PathBuf {
    let mut name = OsString::from(working_copy.as_ref().as_os_str());
    name.push(compression.file_suffix());
    PathBuf::from(name)
}

/// Temporary archive created with the mode a plain `File::create` would get
#[cfg(unix)]
fn archive_tempfile(parent: &Path) -> std::io::Result<NamedTempFile> {
    use std::fs::Permissions;
    use std::os::unix::fs::PermissionsExt;
    tempfile::Builder::new()
        .permissions(Permissions::from_mode(0o666))
        .tempfile_in(parent)
}

#[cfg(not(unix))]
fn archive_tempfile(parent: &Path) -> std::io::Result<NamedTempFile> {
    NamedTempFile::new_in(parent)
}

/// Packs `working_copy` into `<working_copy><suffix>` and removes the working copy
///
/// The archive is written to a temporary file next to its final location and
/// only persisted once complete. If anything fails the working copy is left
/// untouched.
pub fn compress<P: AsRef<Path>>(working_copy: P, compression: CompressionConfig) -> Result<PathBuf> {
    let working_copy = working_copy.as_ref();
    if !compression.is_enabled() {
        return Ok(working_copy.to_path_buf());
    }

    let archive_path = archive_path_for(working_copy, compression);
    let parent = archive_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let entries = walk::working_copy_entries(working_copy)?;
    let tmp = archive_tempfile(parent)
        .map_err(Error::from)
        .with_msg(format!("Creating temporary archive in {:?} failed", parent))?;

    let entry_count = {
        let writer = BufWriter::new(tmp.as_file());
        match compression {
            CompressionConfig::Zstd => tarball::write_tar_zst(entries, writer),
            _ => zipfile::write_zip(entries, writer),
        }
        .with_debug_object_and_fn_name(working_copy.to_path_buf(), "compress")?
    };

    tmp.persist(&archive_path)?;
    tracing::info!(
        "Archived {} entries of {:?} into {:?}",
        entry_count,
        working_copy,
        archive_path
    );

    std::fs::remove_dir_all(working_copy)
        .map_err(Error::from)
        .with_msg(format!(
            "Archive {:?} created but removing {:?} failed",
            archive_path, working_copy
        ))?;

    Ok(archive_path)
}

/// Opens an archive produced by [`compress`] and unpacks it into `dst_dir`
pub fn extract<P: AsRef<Path>, D: AsRef<Path>>(
    archive: P,
    compression: CompressionConfig,
    dst_dir: D,
) -> Result<()> {
    let file = File::open(archive.as_ref())?;
    match compression {
        CompressionConfig::None => Ok(()),
        CompressionConfig::Zstd => tarball::unpack_tar_zst(file, dst_dir.as_ref()),
        CompressionConfig::Zip => zipfile::unpack_zip(file, dst_dir.as_ref()),
    }
}
