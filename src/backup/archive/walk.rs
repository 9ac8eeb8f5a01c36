use crate::backup::archive::{ArchiveEntry, EntryKind};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Lists every file, directory and symlink below `src_dir`
///
/// Entry destinations are relative to `src_dir`, so the archive root holds the
/// working copy's contents. The root itself is not listed. Symlinks are kept as
/// links and never followed.
pub fn working_copy_entries<P: AsRef<Path>>(
    src_dir: P,
) -> Result<impl Iterator<Item = Result<ArchiveEntry>>> {
    let src_dir = src_dir.as_ref().to_path_buf();
    if !src_dir.is_dir() {
        tracing::error!(
            "Working copy does not exist or is not a directory: {:?}",
            src_dir
        );
        return Err(Error::NotADirectory(src_dir));
    }

    tracing::debug!("Scanning working copy {:?}", src_dir);

    let base = src_dir.clone();
    let entries = WalkDir::new(&src_dir)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(move |res| match res {
            Ok(de) => process_dir_entry(de, &base),
            Err(e) => Err(e.into()),
        });

    Ok(entries)
}

fn process_dir_entry(de: DirEntry, base_src_dir: &Path) -> Result<ArchiveEntry> {
    let file_type = de.file_type();
    let kind = if file_type.is_symlink() {
        EntryKind::Symlink
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    };

    let src = de.into_path();
    let dst = src
        .strip_prefix(base_src_dir)
        .map(Path::to_path_buf)
        .map_err(|e| {
            Error::from(e).with_msg(format!(
                "Stripping {:?} from {:?} failed",
                base_src_dir, src
            ))
        })?;

    tracing::trace!("Including {:?}: {:?} -> {:?}", kind, src, dst);
    Ok(ArchiveEntry::new(src, dst, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_files(dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir.join("subdir/empty"))?;
        std::fs::write(dir.join("file1.txt"), "content1")?;
        std::fs::write(dir.join("subdir/file2.txt"), "content2")?;
        Ok(())
    }

    #[test]
    fn test_entries_are_relative_and_include_directories() {
        let temp_dir = TempDir::new().unwrap();
        create_test_files(temp_dir.path()).unwrap();

        let entries: Vec<_> = working_copy_entries(temp_dir.path())
            .unwrap()
            .map(Result::unwrap)
            .collect();

        let dsts: Vec<_> = entries.iter().map(|e| e.dst.clone()).collect();
        assert_eq!(
            dsts,
            vec![
                PathBuf::from("file1.txt"),
                PathBuf::from("subdir"),
                PathBuf::from("subdir/empty"),
                PathBuf::from("subdir/file2.txt"),
            ]
        );
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[1].kind, EntryKind::Directory);
        assert_eq!(entries[2].kind, EntryKind::Directory);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("target.txt"), "t").unwrap();
        std::os::unix::fs::symlink("target.txt", temp_dir.path().join("link")).unwrap();

        let link = working_copy_entries(temp_dir.path())
            .unwrap()
            .map(Result::unwrap)
            .find(|e| e.dst == Path::new("link"))
            .unwrap();
        assert_eq!(link.kind, EntryKind::Symlink);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = working_copy_entries(temp_dir.path().join("missing"));
        assert!(matches!(result, Err(Error::NotADirectory(_))));
    }

    #[test]
    fn test_file_as_src_dir_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("not_a_directory.txt");
        std::fs::write(&file_path, "content").unwrap();

        assert!(working_copy_entries(file_path).is_err());
    }
}
