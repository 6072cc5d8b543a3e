//! Where received bytes go until the finished file is handed to the user.

use std::{
    io,
    path::{Path, PathBuf},
};

use tempfile::TempPath;
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};

use crate::config::BufferMode;
use crate::error::DownloadError;

pub const DEFAULT_EXTENSION: &str = "mp4";
const MAX_NAME_ATTEMPTS: u32 = 10_000;
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// File extension for a response `content-type`, falling back to mp4 when
/// the type is missing, generic, or unknown.
pub fn extension_for(content_type: Option<&str>) -> &'static str {
    let essence = content_type
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .unwrap_or_default();
    if essence.is_empty() || essence.eq_ignore_ascii_case("application/octet-stream") {
        return DEFAULT_EXTENSION;
    }
    match mime_guess::get_mime_extensions_str(essence) {
        Some(exts) if exts.contains(&DEFAULT_EXTENSION) => DEFAULT_EXTENSION,
        Some(exts) => exts.first().copied().unwrap_or(DEFAULT_EXTENSION),
        None => DEFAULT_EXTENSION,
    }
}

/// `stem.ext` for the first attempt, `stem (N).ext` after that.
fn candidate(dir: &Path, stem: &str, ext: &str, attempt: u32) -> PathBuf {
    if attempt == 0 {
        dir.join(format!("{stem}.{ext}"))
    } else {
        dir.join(format!("{stem} ({attempt}).{ext}"))
    }
}

fn no_free_name(dir: &Path, stem: &str, ext: &str) -> DownloadError {
    DownloadError::assembly(
        candidate(dir, stem, ext, 0),
        io::Error::new(
            io::ErrorKind::AlreadyExists,
            "no free file name left for this title",
        ),
    )
}

/// Bytes reserved up front in memory mode. The announced length is only a
/// hint from the transfer server, so it is capped.
fn preallocation(size_hint: u64) -> usize {
    usize::try_from(size_hint.min(MAX_PREALLOCATION)).unwrap_or(0)
}

/// Accumulates a transfer and saves it under a unique name.
///
/// `Disk` writes through a hidden `.part` file in the target directory. If
/// the sink is dropped before [`ChunkSink::finish`], the part file is
/// deleted with it.
#[derive(Debug)]
pub enum ChunkSink {
    Memory {
        dir: PathBuf,
        buffer: Vec<u8>,
    },
    Disk {
        dir: PathBuf,
        file: File,
        part: TempPath,
    },
}

impl ChunkSink {
    pub async fn open(mode: BufferMode, dir: &Path, size_hint: u64) -> Result<Self, DownloadError> {
        fs::create_dir_all(dir)
            .await
            .map_err(|err| DownloadError::assembly(dir, err))?;

        match mode {
            BufferMode::Memory => Ok(Self::Memory {
                dir: dir.to_path_buf(),
                buffer: Vec::with_capacity(preallocation(size_hint)),
            }),
            BufferMode::Disk => {
                let named = tempfile::Builder::new()
                    .prefix(".ryotube-")
                    .suffix(".part")
                    .tempfile_in(dir)
                    .map_err(|err| DownloadError::assembly(dir, err))?;
                let (std_file, part) = named.into_parts();
                Ok(Self::Disk {
                    dir: dir.to_path_buf(),
                    file: File::from_std(std_file),
                    part,
                })
            }
        }
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), DownloadError> {
        match self {
            Self::Memory { dir, buffer } => {
                buffer.try_reserve(chunk.len()).map_err(|err| {
                    DownloadError::assembly(
                        dir.as_path(),
                        io::Error::new(io::ErrorKind::OutOfMemory, err),
                    )
                })?;
                buffer.extend_from_slice(chunk);
                Ok(())
            }
            Self::Disk { file, part, .. } => file
                .write_all(chunk)
                .await
                .map_err(|err| DownloadError::assembly(part.to_path_buf(), err)),
        }
    }

    /// Saves the accumulated bytes as `<stem>.<ext>` (or the next free
    /// variant) and returns the final path.
    ///
    /// Each name is claimed atomically, so sinks finishing at the same time
    /// never take the same file; a name taken in between moves on to the next.
    pub async fn finish(self, stem: &str, ext: &str) -> Result<PathBuf, DownloadError> {
        match self {
            Self::Memory { dir, buffer } => {
                for attempt in 0..MAX_NAME_ATTEMPTS {
                    let target = candidate(&dir, stem, ext, attempt);
                    let file = OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .open(&target)
                        .await;
                    let mut file = match file {
                        Ok(file) => file,
                        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                        Err(err) => return Err(DownloadError::assembly(&target, err)),
                    };
                    let written = match file.write_all(&buffer).await {
                        Ok(()) => file.flush().await,
                        Err(err) => Err(err),
                    };
                    if let Err(err) = written {
                        drop(file);
                        let _ = fs::remove_file(&target).await;
                        return Err(DownloadError::assembly(&target, err));
                    }
                    return Ok(target);
                }
                Err(no_free_name(&dir, stem, ext))
            }
            Self::Disk {
                dir,
                mut file,
                mut part,
            } => {
                file.flush()
                    .await
                    .map_err(|err| DownloadError::assembly(part.to_path_buf(), err))?;
                drop(file);
                for attempt in 0..MAX_NAME_ATTEMPTS {
                    let target = candidate(&dir, stem, ext, attempt);
                    match part.persist_noclobber(&target) {
                        Ok(()) => return Ok(target),
                        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                            part = err.path;
                        }
                        Err(err) => return Err(DownloadError::assembly(&target, err.error)),
                    }
                }
                Err(no_free_name(&dir, stem, ext))
            }
        }
    }
}
