//! Archive files: naming policy and plain/gzip I/O.
//!
//! An archive is newline-delimited UTF-8 SQL text, optionally wrapped in
//! gzip. The `.gz` suffix alone decides whether the gzip layer is used.

use crate::error::PgToolsError;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const SQL_SUFFIX: &str = ".sql";
const GZ_SUFFIX: &str = ".gz";

/// Normalize a user-supplied archive name to `<name>.sql` or `<name>.sql.gz`.
///
/// Idempotent: resolving an already resolved name returns it unchanged.
pub fn resolve_archive_name(input: &str) -> String {
    let (stem, compressed) = match input.strip_suffix(GZ_SUFFIX) {
        Some(stem) => (stem, true),
        None => (input, false),
    };
    let stem = stem.strip_suffix(SQL_SUFFIX).unwrap_or(stem);
    let mut name = format!("{stem}{SQL_SUFFIX}");
    if compressed {
        name.push_str(GZ_SUFFIX);
    }
    name
}

/// Location of an archive and whether it is gzip-wrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePath {
    path: PathBuf,
    compressed: bool,
}

impl ArchivePath {
    /// Archive path for a backup, normalized by [`resolve_archive_name`].
    pub fn for_backup(input: &str) -> Self {
        let resolved = resolve_archive_name(input);
        let compressed = resolved.ends_with(GZ_SUFFIX);
        Self { path: PathBuf::from(resolved), compressed }
    }

    /// Archive path for a restore, used exactly as given.
    pub fn for_restore(input: impl Into<PathBuf>) -> Self {
        let path = input.into();
        let compressed = path.to_string_lossy().ends_with(GZ_SUFFIX);
        Self { path, compressed }
    }

    /// Filesystem path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the archive is gzip-compressed.
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Path as shown in messages.
    pub fn display(&self) -> String {
        self.path.display().to_string()
    }
}

enum Sink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

/// Output side of an archive.
///
/// Dropping an unfinished writer still finishes the gzip stream and flushes
/// the file (gzip layer first), ignoring errors; call [`ArchiveWriter::finish`]
/// to observe them.
pub struct ArchiveWriter {
    archive: ArchivePath,
    sink: Sink,
}

impl ArchiveWriter {
    /// Create (or truncate) the archive file.
    pub fn create(archive: &ArchivePath) -> Result<Self, PgToolsError> {
        let file = File::create(archive.path())
            .map_err(|e| PgToolsError::archive_open(archive.display(), e.to_string()))?;
        let buffered = BufWriter::new(file);
        let sink = if archive.is_compressed() {
            Sink::Gzip(GzEncoder::new(buffered, Compression::default()))
        } else {
            Sink::Plain(buffered)
        };
        tracing::debug!(path = %archive.display(), compressed = archive.is_compressed(), "Archive created");
        Ok(Self { archive: archive.clone(), sink })
    }

    /// Archive being written.
    pub fn archive(&self) -> &ArchivePath {
        &self.archive
    }

    /// Finish the gzip stream (if any), then flush the file.
    pub fn finish(self) -> Result<(), PgToolsError> {
        let path = self.archive.display();
        let to_write_error = |e: io::Error| PgToolsError::archive_write(path.clone(), e.to_string());
        let mut buffered = match self.sink {
            Sink::Plain(buffered) => buffered,
            Sink::Gzip(encoder) => encoder.finish().map_err(to_write_error)?,
        };
        buffered.flush().map_err(to_write_error)?;
        Ok(())
    }
}

impl Write for ArchiveWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.sink {
            Sink::Plain(w) => w.write(buf),
            Sink::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::Plain(w) => w.flush(),
            Sink::Gzip(w) => w.flush(),
        }
    }
}

/// Input side of an archive, decompressing transparently.
pub struct ArchiveReader {
    archive: ArchivePath,
    inner: BufReader<Box<dyn Read + Send>>,
}

impl ArchiveReader {
    /// Open an archive for reading.
    ///
    /// For gzip archives the header is read immediately so a file that is not
    /// gzip fails here with `Decompress`, before any statement runs. Files made
    /// of several concatenated gzip members are read to the end of the last one.
    pub fn open(archive: &ArchivePath) -> Result<Self, PgToolsError> {
        let file = File::open(archive.path())
            .map_err(|e| PgToolsError::archive_open(archive.display(), e.to_string()))?;
        let raw: Box<dyn Read + Send> = if archive.is_compressed() {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let mut reader = Self { archive: archive.clone(), inner: BufReader::new(raw) };
        if archive.is_compressed() {
            let header = reader.inner.fill_buf().map(|_| ());
            header.map_err(|e| reader.read_error(e))?;
        }
        Ok(reader)
    }

    /// Archive being read.
    pub fn archive(&self) -> &ArchivePath {
        &self.archive
    }

    /// Read one line without its line terminator; `None` at end of input.
    pub fn next_line(&mut self) -> Result<Option<String>, PgToolsError> {
        let mut line = String::new();
        let read = self.inner.read_line(&mut line).map_err(|e| self.read_error(e))?;
        if read == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    // Invalid UTF-8 surfaces as InvalidData from read_line; flate2 reports
    // corrupt streams as InvalidInput.
    fn read_error(&self, err: io::Error) -> PgToolsError {
        if self.archive.is_compressed() && err.kind() != io::ErrorKind::InvalidData {
            PgToolsError::decompress(self.archive.display(), err.to_string())
        } else {
            PgToolsError::archive_read(self.archive.display(), err.to_string())
        }
    }
}
