//! Streams a directory tree into a single zip archive.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Entry-count progress, throttled by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryProgress {
    pub entries_done: u64,
    pub entries_total: u64,
}

/// A successfully produced archive.
#[derive(Debug, Clone)]
pub struct BuiltArchive {
    pub path: PathBuf,
    pub size: u64,
    pub entries: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The source directory is missing or holds no entries.
    #[error("no content to archive")]
    NoContent,
    /// The finished archive is below the minimum size floor.
    #[error("archive too small: {size} bytes (floor {floor})")]
    TooSmall { size: u64, floor: u64 },
    #[error("archive build exceeded its deadline")]
    Timeout,
    #[error("archive build cancelled")]
    Cancelled,
    #[error("io failure during archive build: {0}")]
    Io(#[from] io::Error),
    #[error("zip failure: {0}")]
    Zip(#[from] zip::result::ZipError),
}

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// An archive smaller than this is treated as a failed build.
    pub min_archive_bytes: u64,
    /// Wall-clock bound on the whole build.
    pub deadline: Duration,
    /// Emit a progress event at most once per this many entries.
    pub progress_stride: u64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            min_archive_bytes: 512,
            deadline: Duration::from_secs(30 * 60),
            progress_stride: 25,
        }
    }
}

/// Builds `output` from the tree rooted at `source`.
///
/// Entries are stored relative to `source` with the fastest deflate
/// level; the inputs are mostly already-compressed game assets, so
/// ratio is not worth trading time for. Runs on the blocking pool; the
/// deadline and the cancellation token are both checked per entry.
pub async fn build(
    source: &Path,
    output: &Path,
    config: &BuilderConfig,
    progress: mpsc::Sender<EntryProgress>,
    cancel: CancellationToken,
) -> Result<BuiltArchive, ArchiveError> {
    let source = source.to_path_buf();
    let output = output.to_path_buf();
    let config = config.clone();
    tokio::task::spawn_blocking(move || build_blocking(&source, &output, &config, progress, cancel))
        .await
        .map_err(|err| ArchiveError::Io(io::Error::other(err)))?
}

fn build_blocking(
    source: &Path,
    output: &Path,
    config: &BuilderConfig,
    progress: mpsc::Sender<EntryProgress>,
    cancel: CancellationToken,
) -> Result<BuiltArchive, ArchiveError> {
    let started = Instant::now();

    let entries: Vec<walkdir::DirEntry> = WalkDir::new(source)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .collect();
    if entries.iter().filter(|e| e.file_type().is_file()).count() == 0 {
        return Err(ArchiveError::NoContent);
    }
    let entries_total = entries.len() as u64;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(1));

    let file = File::create(output)?;
    let mut zip = ZipWriter::new(file);
    let mut uncompressed: u64 = 0;
    let mut entries_done: u64 = 0;
    let mut copy_buf = vec![0u8; 64 * 1024];

    for entry in entries {
        if cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }
        if started.elapsed() > config.deadline {
            return Err(ArchiveError::Timeout);
        }

        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|err| ArchiveError::Io(io::Error::other(err)))?;
        let name = relative.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options)?;
            let mut input = File::open(entry.path())?;
            loop {
                let read = input.read(&mut copy_buf)?;
                if read == 0 {
                    break;
                }
                zip.write_all(&copy_buf[..read])?;
                uncompressed += read as u64;
            }
        } else {
            // Symlinks and specials are skipped; steamcmd does not produce them.
            continue;
        }

        entries_done += 1;
        if entries_done % config.progress_stride == 0 || entries_done == entries_total {
            let _ = progress.try_send(EntryProgress {
                entries_done,
                entries_total,
            });
        }
    }

    zip.finish()?;

    let size = std::fs::metadata(output)?.len();
    if size < config.min_archive_bytes {
        return Err(ArchiveError::TooSmall {
            size,
            floor: config.min_archive_bytes,
        });
    }
    if uncompressed > 10 * 1024 && size < uncompressed / 100 {
        warn!(
            output = %output.display(),
            size,
            uncompressed,
            "unusually high compression ratio for workshop content"
        );
    }

    Ok(BuiltArchive {
        path: output.to_path_buf(),
        size,
        entries: entries_done,
    })
}
