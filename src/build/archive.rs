//! Build context packaging.
//!
//! Walks a context directory and produces an uncompressed tar stream whose
//! entry names are relative to that directory. Directories, regular files
//! and symbolic links are archived with their permission bits; other entry
//! kinds such as sockets and FIFOs are skipped.

use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs::Metadata;
use cap_std::fs_utf8::Dir;
use tar::{Builder, EntryType, Header};
use tokio::io::DuplexStream;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::io::SyncIoBridge;

use crate::error::FilesystemError;

const DEFAULT_DIRECTORY_MODE: u32 = 0o755;
const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_SYMLINK_MODE: u32 = 0o777;

/// Bytes buffered between the packaging thread and the request body.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Package `context_dir` into an in-memory tar archive.
///
/// The context directory itself is not emitted as an entry. Entries are
/// written depth-first in name order so the same tree always yields the same
/// archive.
///
/// # Errors
///
/// Returns `FilesystemError` if the directory cannot be opened or any entry
/// cannot be read.
pub fn pack_directory(context_dir: &Utf8Path) -> Result<Vec<u8>, FilesystemError> {
    open_context(context_dir)
        .and_then(|root| write_context_archive(&root, vec![]))
        .map_err(|error| FilesystemError::from_io(context_dir, &error))
}

/// Package `context_dir` on the blocking thread pool, exposing the archive
/// as a byte stream while it is written.
///
/// The directory is opened before this returns, so a missing or unreadable
/// context fails before any bytes are produced. At most [`PIPE_CAPACITY`]
/// bytes are buffered ahead of the reader.
///
/// # Errors
///
/// Returns `FilesystemError` if the context directory cannot be opened.
pub fn stream_directory(
    context_dir: &Utf8Path,
    runtime: &Handle,
) -> Result<PackedContext, FilesystemError> {
    let root =
        open_context(context_dir).map_err(|error| FilesystemError::from_io(context_dir, &error))?;
    let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
    let bridge = SyncIoBridge::new_with_handle(writer, runtime.clone());
    let handle = runtime.spawn_blocking(move || {
        let mut finished = write_context_archive(&root, bridge)?;
        finished.flush()
    });

    Ok(PackedContext {
        reader,
        task: PackagingTask {
            context_dir: context_dir.to_owned(),
            handle,
        },
    })
}

/// A build context archive being written on the blocking pool.
#[derive(Debug)]
pub struct PackedContext {
    reader: DuplexStream,
    task: PackagingTask,
}

impl PackedContext {
    /// Split into the readable archive stream and the task writing it.
    #[must_use]
    pub fn into_parts(self) -> (DuplexStream, PackagingTask) {
        (self.reader, self.task)
    }
}

/// Handle on the thread packaging a build context.
#[derive(Debug)]
pub struct PackagingTask {
    context_dir: Utf8PathBuf,
    handle: JoinHandle<io::Result<()>>,
}

impl PackagingTask {
    /// Wait for packaging to end.
    ///
    /// A reader that stops early is not a packaging failure: whoever dropped
    /// the stream reports why.
    ///
    /// # Errors
    ///
    /// Returns `FilesystemError` if an entry could not be read, or
    /// `FilesystemError::IoError` if the packaging task was cancelled.
    pub async fn finish(self) -> Result<(), FilesystemError> {
        let Self {
            context_dir,
            handle,
        } = self;
        match handle.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) if error.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            Ok(Err(error)) => Err(FilesystemError::from_io(&context_dir, &error)),
            Err(error) => Err(FilesystemError::IoError {
                path: context_dir.into_std_path_buf(),
                message: format!("context packaging task failed: {error}"),
            }),
        }
    }
}

fn open_context(context_dir: &Utf8Path) -> io::Result<Dir> {
    Dir::open_ambient_dir(context_dir, ambient_authority())
}

fn write_context_archive<W: Write>(root: &Dir, writer: W) -> io::Result<W> {
    let mut archive = ContextArchive {
        builder: Builder::new(writer),
    };

    archive.append_directory_contents(root, Utf8Path::new(""))?;
    archive.builder.into_inner()
}

struct ContextArchive<W: Write> {
    builder: Builder<W>,
}

impl<W: Write> ContextArchive<W> {
    fn append_directory_contents(
        &mut self,
        current_dir: &Dir,
        current_relative_path: &Utf8Path,
    ) -> io::Result<()> {
        for entry in sorted_entries(current_dir)? {
            let entry_relative_path = current_relative_path.join(&entry.file_name);

            match entry.entry_kind {
                EntryKind::Directory => {
                    let metadata = current_dir.metadata(&entry.file_name)?;
                    self.append_directory_header(&entry_relative_path, &metadata)?;
                    let child_dir = current_dir.open_dir(&entry.file_name)?;
                    self.append_directory_contents(&child_dir, &entry_relative_path)?;
                }
                EntryKind::File => {
                    self.append_file(current_dir, &entry.file_name, &entry_relative_path)?;
                }
                EntryKind::Symlink => {
                    self.append_symlink(current_dir, &entry.file_name, &entry_relative_path)?;
                }
                EntryKind::Other => {
                    tracing::debug!(path = %entry_relative_path, "skipping special file");
                }
            }
        }

        Ok(())
    }

    fn append_directory_header(
        &mut self,
        relative_path: &Utf8Path,
        metadata: &Metadata,
    ) -> io::Result<()> {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        header.set_mode(metadata_mode(metadata, DEFAULT_DIRECTORY_MODE));
        header.set_cksum();

        let path = format!("{}/", normalize_archive_path(relative_path));
        self.builder.append_data(&mut header, path, io::empty())
    }

    fn append_file(
        &mut self,
        parent_dir: &Dir,
        file_name: &str,
        relative_path: &Utf8Path,
    ) -> io::Result<()> {
        let metadata = parent_dir.metadata(file_name)?;
        let mut file = parent_dir.open(file_name)?;

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(metadata.len());
        header.set_mode(metadata_mode(&metadata, DEFAULT_FILE_MODE));
        header.set_cksum();

        let path = normalize_archive_path(relative_path);
        self.builder.append_data(&mut header, path, &mut file)
    }

    fn append_symlink(
        &mut self,
        parent_dir: &Dir,
        file_name: &str,
        relative_path: &Utf8Path,
    ) -> io::Result<()> {
        let metadata = parent_dir.symlink_metadata(file_name)?;
        let target = parent_dir.read_link_contents(file_name)?;

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        header.set_mode(metadata_mode(&metadata, DEFAULT_SYMLINK_MODE));

        let path = normalize_archive_path(relative_path);
        self.builder
            .append_link(&mut header, path, normalize_archive_path(&target))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Directory,
    File,
    Symlink,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SortedEntry {
    file_name: String,
    entry_kind: EntryKind,
}

fn sorted_entries(directory: &Dir) -> io::Result<Vec<SortedEntry>> {
    let mut entries = vec![];

    for entry_result in directory.entries()? {
        let entry = entry_result?;
        let file_name = entry.file_name()?;
        let file_type = entry.file_type()?;

        let entry_kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        entries.push(SortedEntry {
            file_name,
            entry_kind,
        });
    }

    entries.sort_unstable_by(|left, right| left.file_name.cmp(&right.file_name));
    Ok(entries)
}

fn normalize_archive_path(path: &Utf8Path) -> String {
    path.as_str().replace('\\', "/")
}

#[cfg(unix)]
fn metadata_mode(metadata: &Metadata, _fallback: u32) -> u32 {
    use cap_std::fs::PermissionsExt;

    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn metadata_mode(_metadata: &Metadata, fallback: u32) -> u32 {
    fallback
}
