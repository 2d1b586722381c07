// streamdkim – streaming DKIM signer
// Copyright © 2023 The streamdkim authors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

//! Temporary storage for the canonical body while the message is signed.
//!
//! The signature headers precede the body in the output, but can only be
//! computed after the whole body has been seen. The canonical body is
//! therefore retained until signing is complete: in memory, and, once a size
//! threshold is crossed and a cache directory is available, in a temporary
//! file.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::SystemTime,
};
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncWriteExt, BufReader, BufWriter},
};
use tracing::{debug, trace};

/// The default number of body bytes kept in memory before spilling to disk.
pub const DEFAULT_CACHE_THRESHOLD: usize = 2 * 1024 * 1024;

const RANDOM_SUFFIX_LEN: usize = 14;

/// A temporary file owned exclusively by one signing operation.
///
/// The file is removed when this value is dropped, unless it has already been
/// removed with [`TempFile::remove`]. Removal failures are ignored.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    removed: bool,
}

impl TempFile {
    /// Creates a new, uniquely named file in the given directory.
    pub async fn create(dir: &Path) -> io::Result<(Self, File)> {
        let path = dir.join(unique_file_name()?);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        trace!(path = %path.display(), "created temporary file");

        Ok((Self { path, removed: false }, file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn remove(mut self) {
        self.removed = true;
        if let Err(e) = fs::remove_file(&self.path).await {
            debug!(path = %self.path.display(), "could not remove temporary file: {e}");
        }
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.removed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                debug!(path = %self.path.display(), "could not remove temporary file: {e}");
            }
        }
    }
}

// message.<unix millis>-<random hex>
fn unique_file_name() -> io::Result<String> {
    let millis = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |t| t.as_millis());

    let mut random = [0; RANDOM_SUFFIX_LEN];
    getrandom::getrandom(&mut random)
        .map_err(|e| io::Error::new(ErrorKind::Other, e.to_string()))?;

    let suffix: String = random.iter().map(|b| format!("{b:02x}")).collect();

    Ok(format!("message.{millis}-{suffix}"))
}

#[derive(Debug)]
struct DiskSegment {
    file: TempFile,
    writer: Option<BufWriter<File>>,  // `None` once sealed
    len: u64,
}

/// Storage for canonical body chunks, in memory or spilled to disk.
///
/// Chunks are buffered in memory until adding a chunk would take the buffered
/// length past the threshold. If a cache directory was given, that chunk and
/// all later ones are then written to a temporary file instead. The chunks
/// already in memory stay there: the body is the memory segment followed by
/// the disk segment. Without a cache directory, memory is used regardless of
/// the threshold.
#[derive(Debug)]
pub struct SpilloverCache {
    dir: Option<PathBuf>,
    threshold: usize,
    memory: Vec<Vec<u8>>,
    memory_len: usize,
    disk: Option<DiskSegment>,
}

impl SpilloverCache {
    pub fn new(dir: Option<PathBuf>, threshold: usize) -> Self {
        Self {
            dir,
            threshold,
            memory: vec![],
            memory_len: 0,
            disk: None,
        }
    }

    pub async fn push(&mut self, chunk: Vec<u8>) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }

        if self.disk.is_none() {
            match &self.dir {
                Some(dir) if self.memory_len + chunk.len() > self.threshold => {
                    let (file, f) = TempFile::create(dir).await?;
                    debug!(
                        path = %file.path().display(),
                        buffered = self.memory_len,
                        "body exceeds cache threshold, spilling to disk"
                    );
                    self.disk = Some(DiskSegment {
                        file,
                        writer: Some(BufWriter::new(f)),
                        len: 0,
                    });
                }
                _ => {
                    self.memory_len += chunk.len();
                    self.memory.push(chunk);
                    return Ok(());
                }
            }
        }

        match &mut self.disk {
            Some(DiskSegment { writer: Some(writer), len, .. }) => {
                writer.write_all(&chunk).await?;
                *len += chunk.len() as u64;
                Ok(())
            }
            _ => Err(io::Error::new(ErrorKind::Other, "cache file already sealed")),
        }
    }

    /// Completes writing. Must be called before the disk segment is read.
    pub async fn seal(&mut self) -> io::Result<()> {
        if let Some(disk) = &mut self.disk {
            if let Some(mut writer) = disk.writer.take() {
                writer.flush().await?;
                writer.into_inner().shutdown().await?;
            }
        }
        Ok(())
    }

    pub fn is_on_disk(&self) -> bool {
        self.disk.is_some()
    }

    /// The total number of bytes stored.
    pub(crate) fn len(&self) -> u64 {
        self.memory_len as u64 + self.disk.as_ref().map_or(0, |d| d.len)
    }

    pub fn memory_segment(&self) -> impl Iterator<Item = &[u8]> {
        self.memory.iter().map(|c| &c[..])
    }

    /// Opens the disk segment for reading, if there is one.
    pub async fn open_disk_segment(&self) -> io::Result<Option<BufReader<File>>> {
        match &self.disk {
            Some(disk) => {
                debug_assert!(disk.writer.is_none(), "cache not sealed");
                let f = File::open(disk.file.path()).await?;
                Ok(Some(BufReader::new(f)))
            }
            None => Ok(None),
        }
    }

    /// Discards all content and removes the temporary file, if any.
    pub async fn remove(self) {
        if let Some(DiskSegment { file, writer, .. }) = self.disk {
            drop(writer);
            file.remove().await;
        }
    }
}
