//! Zip export of a folder subtree.
//!
//! The archive is produced in a single pass straight into the caller's sink.
//! `zip` writes through `std::io::Write + Seek` and seeks back only to patch
//! the local header of the entry it just closed. It therefore writes into a
//! windowed spool: once an entry is closed, every byte before it is final
//! and is handed to the async sink. At most the open entry's compressed bytes
//! are held in memory.

use std::io::{self, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use stashfs_common::error::{TreeError, TreeResult};
use stashfs_common::paths::{to_key, UserId, VirtualPath};

use crate::tree::TreeManager;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub files: usize,
    pub folders: usize,
    pub bytes: u64,
}

/// Archive bytes not yet handed to the sink. `base` is the archive offset of
/// `buf[0]`; everything before it has already been sent.
#[derive(Default)]
struct SpoolState {
    base: u64,
    buf: Vec<u8>,
    pos: u64,
}

impl SpoolState {
    fn end(&self) -> u64 {
        self.base + self.buf.len() as u64
    }
}

#[derive(Clone, Default)]
struct Spool(Arc<Mutex<SpoolState>>);

impl Spool {
    fn state(&self) -> io::Result<MutexGuard<'_, SpoolState>> {
        self.0.lock().map_err(|_| io::Error::other("archive spool poisoned"))
    }

    fn end(&self) -> io::Result<u64> {
        Ok(self.state()?.end())
    }

    /// Remove and return the bytes before archive offset `offset`.
    fn take_before(&self, offset: u64) -> io::Result<Vec<u8>> {
        let mut state = self.state()?;
        let n = offset.saturating_sub(state.base).min(state.buf.len() as u64) as usize;
        let out: Vec<u8> = state.buf.drain(..n).collect();
        state.base += n as u64;
        Ok(out)
    }
}

impl Write for Spool {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state()?;
        if state.pos < state.base {
            return Err(io::Error::other(format!(
                "archive offset {} was already sent",
                state.pos
            )));
        }
        let offset = (state.pos - state.base) as usize;
        if offset > state.buf.len() {
            state.buf.resize(offset, 0);
        }
        let overlap = data.len().min(state.buf.len() - offset);
        state.buf[offset..offset + overlap].copy_from_slice(&data[..overlap]);
        state.buf.extend_from_slice(&data[overlap..]);
        state.pos += data.len() as u64;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for Spool {
    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        let mut state = self.state()?;
        let target = match from {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => state.end().checked_add_signed(delta),
            SeekFrom::Current(delta) => state.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek outside the archive")
        })?;
        state.pos = target;
        Ok(target)
    }
}

/// `ZipWriter` over a spool. Entry boundaries return the bytes that became
/// final, ready for the sink.
struct ArchiveStream {
    writer: ZipWriter<Spool>,
    spool: Spool,
}

impl ArchiveStream {
    fn new() -> Self {
        let spool = Spool::default();
        Self {
            writer: ZipWriter::new(spool.clone()),
            spool,
        }
    }

    fn start_file(&mut self, name: &str, options: SimpleFileOptions) -> TreeResult<Vec<u8>> {
        let settled = self.spool.end().map_err(TreeError::Archive)?;
        self.writer.start_file(name, options).map_err(zip_error)?;
        self.spool.take_before(settled).map_err(TreeError::Archive)
    }

    fn add_directory(&mut self, name: &str, options: SimpleFileOptions) -> TreeResult<Vec<u8>> {
        let settled = self.spool.end().map_err(TreeError::Archive)?;
        self.writer.add_directory(name, options).map_err(zip_error)?;
        self.spool.take_before(settled).map_err(TreeError::Archive)
    }

    fn write(&mut self, data: &[u8]) -> TreeResult<()> {
        self.writer.write_all(data).map_err(TreeError::Archive)
    }

    fn finish(self) -> TreeResult<Vec<u8>> {
        self.writer.finish().map_err(zip_error)?;
        self.spool.take_before(u64::MAX).map_err(TreeError::Archive)
    }
}

async fn send<W: AsyncWrite + Unpin>(sink: &mut W, bytes: &[u8]) -> TreeResult<()> {
    if !bytes.is_empty() {
        sink.write_all(bytes).await.map_err(TreeError::Archive)?;
    }
    Ok(())
}

fn entry_options(size: u64) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(size > u32::MAX as u64)
}

fn zip_error(e: zip::result::ZipError) -> TreeError {
    TreeError::Archive(io::Error::other(e))
}

impl TreeManager {
    /// Write every descendant of `folder` into `sink` as a zip archive.
    /// Entry names are relative to `folder`; explicit empty folders become
    /// directory entries.
    ///
    /// Any store failure aborts the export, leaving a truncated archive in
    /// the sink.
    pub async fn write_folder_content<W>(
        &self,
        user: UserId,
        folder: &VirtualPath,
        sink: &mut W,
    ) -> TreeResult<ExportSummary>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.validate_folder_exists(user, folder).await?;

        let entries = self.store.list(&to_key(user, folder)).await?;
        let mut archive = ArchiveStream::new();
        let mut summary = ExportSummary::default();
        let mut buf = vec![0u8; CHUNK_SIZE];

        for meta in &entries {
            let Some(path) = Self::decode(user, &meta.key) else {
                continue;
            };
            let Some(name) = path.relative_to(folder) else {
                continue;
            };
            if name.is_empty() {
                continue; // the exported folder's own marker
            }

            if path.is_folder() {
                let settled = archive.add_directory(&name, entry_options(0))?;
                send(sink, &settled).await?;
                summary.folders += 1;
                continue;
            }

            let settled = archive.start_file(&name, entry_options(meta.size))?;
            send(sink, &settled).await?;
            let mut reader = self.store.get(&meta.key).await?;
            loop {
                let n = reader.read(&mut buf).await.map_err(TreeError::Archive)?;
                if n == 0 {
                    break;
                }
                archive.write(&buf[..n])?;
                summary.bytes += n as u64;
            }
            summary.files += 1;
            debug!(user = %user, entry = %path, "Archived entry");
        }

        let tail = archive.finish()?;
        send(sink, &tail).await?;
        sink.flush().await.map_err(TreeError::Archive)?;

        info!(
            user = %user,
            folder = %folder,
            files = summary.files,
            folders = summary.folders,
            bytes = summary.bytes,
            "Folder exported"
        );
        Ok(summary)
    }
}
