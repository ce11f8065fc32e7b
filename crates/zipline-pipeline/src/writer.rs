//! Streaming ZIP writer draining the transfer queue.
//!
//! # Design
//! - Runs on a blocking thread; the encoder is synchronous and owns the sink.
//! - Every mover call races the request's cancellation token.
//! - Entries appear in transfer-queue order, which is discovery order.
//! - Any failure cancels the whole request; the client keeps a truncated archive.

use std::future::Future;
use std::io::{self, Write};

use chrono::{DateTime, Datelike, Timelike, Utc};
use tokio::io::AsyncReadExt;
use tokio::runtime::Handle;
use tracing::{debug, info};
use zip::write::FullFileOptions;
use zip::{CompressionMethod, ZipWriter};
use zipline_config::PipelineConfig;
use zipline_core::{FileAttributes, FsPath, TransferError};
use zipline_telemetry::Metrics;

use crate::error::{ArchiveError, ArchiveResult};
use crate::lease::ReadyTransfer;
use crate::problems::{Problem, ProblemStage};
use crate::request::ArchiveRequest;

/// Name of the optional trailing entry listing per-file problems.
pub const PROBLEMS_MANIFEST_NAME: &str = "ZIPLINE-PROBLEMS.txt";

const LARGE_FILE_THRESHOLD: u64 = u32::MAX as u64;

/// Info-ZIP extended timestamp extra field (unix seconds).
const EXTENDED_TIMESTAMP_ID: u16 = 0x5455;

/// Outcome of a completed archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliverySummary {
    /// Entries written, excluding the problems manifest.
    pub entries: usize,
    /// File bytes relayed.
    pub bytes: u64,
    /// Problems recorded while building the archive.
    pub problems: Vec<Problem>,
}

/// Encodes ready transfers into a ZIP stream.
#[derive(Clone)]
pub struct ArchiveWriter {
    compression_level: i64,
    copy_buffer_bytes: usize,
    problems_manifest: bool,
    metrics: Metrics,
}

impl ArchiveWriter {
    /// Writer honouring the pipeline's compression and manifest settings.
    #[must_use]
    pub fn new(limits: &PipelineConfig, metrics: Metrics) -> Self {
        Self {
            compression_level: limits.compression_level,
            copy_buffer_bytes: limits.copy_buffer_bytes.max(1),
            problems_manifest: limits.problems_manifest,
            metrics,
        }
    }

    /// Drain `request`'s transfer queue into `sink` until the final flag.
    ///
    /// Must run outside the async runtime (e.g. in `spawn_blocking`); `runtime`
    /// drives the transfer futures.
    ///
    /// # Errors
    ///
    /// Returns an error, after cancelling the request, when the sink, the
    /// encoder or a mover fails, or when the request was cancelled.
    pub fn deliver<W: Write>(
        &self,
        request: &ArchiveRequest,
        runtime: &Handle,
        sink: W,
    ) -> ArchiveResult<DeliverySummary> {
        let result = self.write_archive(request, runtime, sink);
        match &result {
            Ok(summary) => info!(
                request_id = %request.id(),
                entries = summary.entries,
                bytes = summary.bytes,
                problems = summary.problems.len(),
                "archive delivered"
            ),
            Err(err) => {
                debug!(request_id = %request.id(), error = %err, "archive aborted");
                request.cancel();
            }
        }
        result
    }

    fn write_archive<W: Write>(
        &self,
        request: &ArchiveRequest,
        runtime: &Handle,
        sink: W,
    ) -> ArchiveResult<DeliverySummary> {
        let mut archive = ZipWriter::new_stream(sink);
        let mut buffer = vec![0_u8; self.copy_buffer_bytes];
        let mut summary = DeliverySummary::default();

        while let Some(mut ready) = runtime.block_on(request.transfers().recv()) {
            if request.is_cancelled() {
                return Err(ArchiveError::Cancelled);
            }
            let bytes = self.write_entry(request, runtime, &mut archive, &mut ready, &mut buffer)?;
            ready.release();
            self.metrics.record_entry(bytes);
            summary.entries += 1;
            summary.bytes += bytes;
        }
        if request.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }

        let problems = request.problems().snapshot();
        if self.problems_manifest && !problems.is_empty() {
            self.write_manifest(&mut archive, &problems)?;
        }

        let mut sink = archive.finish().map_err(|source| ArchiveError::Zip {
            operation: "finish",
            path: None,
            source,
        })?;
        sink.flush().map_err(|source| ArchiveError::Io {
            operation: "flush",
            source,
        })?;

        summary.problems = problems;
        Ok(summary)
    }

    fn write_entry<W: Write + io::Seek>(
        &self,
        request: &ArchiveRequest,
        runtime: &Handle,
        archive: &mut ZipWriter<W>,
        ready: &mut ReadyTransfer,
        buffer: &mut [u8],
    ) -> ArchiveResult<u64> {
        let path = ready.file().path.clone();
        let name = path
            .relative_to(request.root())
            .ok_or_else(|| ArchiveError::EntryOutsideRoot { path: path.clone() })?;
        let options = self.entry_options(&path, &ready.file().attributes)?;
        archive
            .start_file(name, options)
            .map_err(|source| ArchiveError::Zip {
                operation: "start_file",
                path: Some(path.clone()),
                source,
            })?;

        let mut reader = cancellable(runtime, request, ready.open())?
            .map_err(|source| self.relay_failure(request, &path, source))?;

        let mut written = 0_u64;
        loop {
            let read = match cancellable(runtime, request, reader.read(buffer))? {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    let source = TransferError::other("read", path.clone(), err);
                    return Err(self.relay_failure(request, &path, source));
                }
            };
            archive
                .write_all(&buffer[..read])
                .map_err(|source| ArchiveError::Io {
                    operation: "write_entry",
                    source,
                })?;
            written += read as u64;
        }

        cancellable(runtime, request, ready.finish())?
            .map_err(|source| self.relay_failure(request, &path, source))?;
        debug!(path = %path, bytes = written, "archive entry written");
        Ok(written)
    }

    fn write_manifest<W: Write + io::Seek>(
        &self,
        archive: &mut ZipWriter<W>,
        problems: &[Problem],
    ) -> ArchiveResult<()> {
        archive
            .start_file(PROBLEMS_MANIFEST_NAME, self.base_options())
            .map_err(|source| ArchiveError::Zip {
                operation: "start_manifest",
                path: None,
                source,
            })?;
        let mut manifest = String::new();
        for problem in problems {
            manifest.push_str(&problem.to_string());
            manifest.push('\n');
        }
        archive
            .write_all(manifest.as_bytes())
            .map_err(|source| ArchiveError::Io {
                operation: "write_manifest",
                source,
            })
    }

    /// Level 0 stores entries; the Deflate encoder only accepts 1..=9.
    fn base_options(&self) -> FullFileOptions<'static> {
        let options = FullFileOptions::default();
        if self.compression_level == 0 {
            options.compression_method(CompressionMethod::Stored)
        } else {
            options
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(self.compression_level))
        }
    }

    fn entry_options(
        &self,
        path: &FsPath,
        attributes: &FileAttributes,
    ) -> ArchiveResult<FullFileOptions<'static>> {
        let mut options = self
            .base_options()
            .large_file(attributes.size >= LARGE_FILE_THRESHOLD);
        if let Some(mtime) = attributes.modification_time.and_then(dos_time) {
            options = options.last_modified_time(mtime);
        }
        if let Some(field) = extended_timestamp(attributes) {
            options
                .add_extra_data(EXTENDED_TIMESTAMP_ID, field, false)
                .map_err(|source| ArchiveError::Zip {
                    operation: "extra_data",
                    path: Some(path.clone()),
                    source,
                })?;
        }
        Ok(options)
    }

    fn relay_failure(
        &self,
        request: &ArchiveRequest,
        path: &FsPath,
        source: TransferError,
    ) -> ArchiveError {
        self.metrics.inc_problem(ProblemStage::Relay.as_str());
        request.record_problem(Problem::from_error(
            ProblemStage::Relay,
            path.clone(),
            &source,
        ));
        ArchiveError::Relay {
            path: path.clone(),
            source,
        }
    }
}

/// Drive `future` to completion unless the request is cancelled first.
fn cancellable<F: Future>(
    runtime: &Handle,
    request: &ArchiveRequest,
    future: F,
) -> ArchiveResult<F::Output> {
    runtime.block_on(async {
        tokio::select! {
            biased;
            () = request.cancellation().cancelled() => Err(ArchiveError::Cancelled),
            output = future => Ok(output),
        }
    })
}

/// Flags byte followed by the mtime, atime and ctime that fit in unix `u32` seconds.
fn extended_timestamp(attributes: &FileAttributes) -> Option<Box<[u8]>> {
    let times = [
        (0b001, attributes.modification_time),
        (0b010, attributes.access_time),
        (0b100, attributes.creation_time),
    ];
    let mut field = vec![0_u8];
    for (flag, time) in times {
        if let Some(seconds) = time.and_then(|time| u32::try_from(time.timestamp()).ok()) {
            field[0] |= flag;
            field.extend_from_slice(&seconds.to_le_bytes());
        }
    }
    (field[0] != 0).then(|| field.into_boxed_slice())
}

fn dos_time(timestamp: DateTime<Utc>) -> Option<zip::DateTime> {
    zip::DateTime::from_date_and_time(
        u16::try_from(timestamp.year()).ok()?,
        u8::try_from(timestamp.month()).ok()?,
        u8::try_from(timestamp.day()).ok()?,
        u8::try_from(timestamp.hour()).ok()?,
        u8::try_from(timestamp.minute()).ok()?,
        u8::try_from(timestamp.second()).ok()?,
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dos_time_respects_the_dos_range() {
        let inside = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 12).single();
        let converted = inside.and_then(dos_time);
        assert!(matches!(
            converted,
            Some(value) if value.year() == 2024 && value.month() == 5 && value.minute() == 30
        ));

        let before_epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).single();
        assert!(before_epoch.and_then(dos_time).is_none());
    }

    #[test]
    fn extended_timestamp_packs_known_times_in_flag_order() {
        let mut attributes = FileAttributes::regular(4);
        attributes.modification_time = Utc.timestamp_opt(1_700_000_000, 0).single();
        attributes.creation_time = Utc.timestamp_opt(1_600_000_000, 0).single();

        let field = extended_timestamp(&attributes);
        let mut expected = vec![0b101_u8];
        expected.extend_from_slice(&1_700_000_000_u32.to_le_bytes());
        expected.extend_from_slice(&1_600_000_000_u32.to_le_bytes());
        assert_eq!(field.as_deref(), Some(expected.as_slice()));

        assert!(extended_timestamp(&FileAttributes::regular(4)).is_none());
    }
}
