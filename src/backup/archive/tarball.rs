use crate::backup::archive::{ArchiveEntry, EntryKind};
use crate::backup::compress::{CompressionConfig, CompressorBuilder};
use crate::backup::finish::Finish;
use crate::backup::result_error::result::Result;
use std::io::{BufReader, Read, Write};
use std::path::Path;

/// Writes entries as a zstd-compressed TAR stream
///
/// Returns the number of entries written.
pub fn write_tar_zst<I, W>(entries: I, writer: W) -> Result<usize>
where
    I: IntoIterator<Item = Result<ArchiveEntry>>,
    W: Write,
{
    let mut builder = tar::Builder::new(CompressionConfig::Zstd.build_compressor(writer)?);
    builder.follow_symlinks(false);

    let mut entry_count = 0;
    for entry in entries {
        let entry = entry?;
        match entry.kind {
            EntryKind::Directory => builder.append_dir(&entry.dst, &entry.src)?,
            EntryKind::File | EntryKind::Symlink => {
                builder.append_path_with_name(&entry.src, &entry.dst)?
            }
        }
        entry_count += 1;
    }
    tracing::debug!("Processed {} tar entries", entry_count);

    let compressor = Finish::finish(builder)?;
    compressor.finish()?.flush()?;
    Ok(entry_count)
}

pub fn unpack_tar_zst<R: Read>(reader: R, dst_dir: &Path) -> Result<()> {
    let decoder = zstd::stream::read::Decoder::new(BufReader::new(reader))?;
    tar::Archive::new(decoder).unpack(dst_dir)?;
    Ok(())
}
