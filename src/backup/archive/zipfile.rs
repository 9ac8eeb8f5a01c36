use crate::backup::archive::{ArchiveEntry, EntryKind};
use crate::backup::finish::Finish;
use crate::backup::result_error::result::Result;
use itertools::Itertools;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Writes entries as a deflate-compressed zip archive
///
/// Returns the number of entries written.
pub fn write_zip<I, W>(entries: I, writer: W) -> Result<usize>
where
    I: IntoIterator<Item = Result<ArchiveEntry>>,
    W: Write + Seek,
{
    let mut zip = ZipWriter::new(writer);
    let base_options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entry_count = 0;
    for entry in entries {
        let entry = entry?;
        let name = zip_name(&entry.dst);
        let metadata = std::fs::symlink_metadata(&entry.src)?;
        let options = with_permissions(base_options, &metadata);

        match entry.kind {
            EntryKind::Directory => zip.add_directory(name, options)?,
            EntryKind::Symlink => {
                let target = std::fs::read_link(&entry.src)?;
                zip.add_symlink(name, target.to_string_lossy(), options)?
            }
            EntryKind::File => {
                let options = options.large_file(metadata.len() >= u32::MAX as u64);
                zip.start_file(name, options)?;
                std::io::copy(&mut File::open(&entry.src)?, &mut zip)?;
            }
        }
        entry_count += 1;
    }
    tracing::debug!("Processed {} zip entries", entry_count);

    Finish::finish(zip)?.flush()?;
    Ok(entry_count)
}

pub fn unpack_zip<R: Read + Seek>(reader: R, dst_dir: &Path) -> Result<()> {
    ZipArchive::new(reader)?.extract(dst_dir)?;
    Ok(())
}

/// Zip entry names always use `/` as separator
fn zip_name(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .join("/")
}

#[cfg(unix)]
fn with_permissions(options: SimpleFileOptions, metadata: &std::fs::Metadata) -> SimpleFileOptions {
    use std::os::unix::fs::PermissionsExt;
    options.unix_permissions(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn with_permissions(options: SimpleFileOptions, _metadata: &std::fs::Metadata) -> SimpleFileOptions {
    options
}
