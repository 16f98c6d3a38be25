//! Byte sources and multi-pass access
//!
//! Ingestion reads a source more than once: a sniffing probe, an optional
//! sampling pass, and the full decode. Path sources are simply reopened for
//! each pass. Plain readers cannot be reopened, so every byte a probe pulls
//! from them is recorded (up to `Limits::max_replay_bytes`) and replayed in
//! front of the remaining stream when the next pass starts.
//!
//! Sources whose first four bytes are the zstd frame magic are decompressed
//! transparently on every pass.

use jsl_format::constants::ZSTD_MAGIC;
use jsl_format::{JslError, Limits, Result};
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

/// Where the bytes of an ingestion job come from
pub enum ByteSource {
    /// File on disk; reopened for every pass
    Path(PathBuf),
    /// Caller-supplied stream, read once
    Reader(Box<dyn Read + Send>),
}

impl ByteSource {
    /// File source
    pub fn path(path: impl AsRef<Path>) -> Self {
        ByteSource::Path(path.as_ref().to_path_buf())
    }

    /// Stream source
    pub fn reader<R: Read + Send + 'static>(reader: R) -> Self {
        ByteSource::Reader(Box::new(reader))
    }

    /// In-memory source
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::reader(Cursor::new(bytes.into()))
    }

    /// Human-readable description used in errors and logs
    pub fn describe(&self) -> String {
        match self {
            ByteSource::Path(path) => path.display().to_string(),
            ByteSource::Reader(_) => "<reader>".to_string(),
        }
    }

    /// Open the source for multi-pass access.
    ///
    /// Failure to open or to read the leading bytes yields
    /// [`JslError::SourceUnavailable`].
    pub fn open(self, limits: &Limits) -> Result<OpenedSource> {
        let description = self.describe();
        let unavailable = |err: io::Error| JslError::SourceUnavailable {
            source_desc: description.clone(),
            reason: err.to_string(),
        };

        match self {
            ByteSource::Path(path) => {
                let mut file = File::open(&path).map_err(unavailable)?;
                let len = file.metadata().map(|meta| meta.len()).ok();
                let compressed = has_zstd_magic(&mut file).map_err(unavailable)?;
                Ok(OpenedSource {
                    origin: Origin::File(path),
                    compressed,
                    size_hint: if compressed { None } else { len },
                    description,
                })
            }
            ByteSource::Reader(inner) => {
                let mut stream = StreamState {
                    inner,
                    recorded: Vec::new(),
                    cap: limits.max_replay_bytes,
                    capped: false,
                };
                let compressed =
                    has_zstd_magic(&mut Replay::new(&mut stream)).map_err(unavailable)?;
                Ok(OpenedSource {
                    origin: Origin::Stream(stream),
                    compressed,
                    size_hint: None,
                    description,
                })
            }
        }
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            ByteSource::Reader(_) => f.debug_tuple("Reader").finish_non_exhaustive(),
        }
    }
}

impl From<PathBuf> for ByteSource {
    fn from(path: PathBuf) -> Self {
        ByteSource::Path(path)
    }
}

fn has_zstd_magic<R: Read>(reader: &mut R) -> io::Result<bool> {
    let mut magic = [0u8; 4];
    let mut filled = 0;
    while filled < magic.len() {
        match reader.read(&mut magic[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled == magic.len() && magic == ZSTD_MAGIC)
}

enum Origin {
    File(PathBuf),
    Stream(StreamState),
}

struct StreamState {
    inner: Box<dyn Read + Send>,
    recorded: Vec<u8>,
    cap: usize,
    capped: bool,
}

/// Opened source that can hand out probe passes and one final decode pass
pub struct OpenedSource {
    origin: Origin,
    compressed: bool,
    size_hint: Option<u64>,
    description: String,
}

impl fmt::Debug for OpenedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedSource")
            .field("compressed", &self.compressed)
            .field("size_hint", &self.size_hint)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl OpenedSource {
    /// Whether the source is zstd-compressed
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Size of the decoded JSON in bytes, when cheaply known
    pub fn size_hint(&self) -> Option<u64> {
        self.size_hint
    }

    /// Description passed to [`ByteSource::open`]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Raw bytes recorded for replay so far (always 0 for path sources)
    pub fn replay_bytes(&self) -> usize {
        match &self.origin {
            Origin::File(_) => 0,
            Origin::Stream(stream) => stream.recorded.len(),
        }
    }

    /// Whether a probe stopped early because the replay cap was reached
    pub fn replay_capped(&self) -> bool {
        match &self.origin {
            Origin::File(_) => false,
            Origin::Stream(stream) => stream.capped,
        }
    }

    /// Start a probe pass at offset 0.
    ///
    /// On stream sources a probe ends early (clean EOF) once the replay cap
    /// is reached; the final pass is unaffected.
    pub fn probe(&mut self) -> Result<Box<dyn Read + '_>> {
        let raw: Box<dyn Read + '_> = match &mut self.origin {
            Origin::File(path) => Box::new(reopen(path, &self.description)?),
            Origin::Stream(stream) => Box::new(Replay::new(stream)),
        };
        decompressed(raw, self.compressed)
    }

    /// Consume the source and return the final pass, starting at offset 0
    pub fn into_reader(self) -> Result<Box<dyn Read + Send>> {
        let raw: Box<dyn Read + Send> = match self.origin {
            Origin::File(path) => Box::new(reopen(&path, &self.description)?),
            Origin::Stream(stream) => {
                Box::new(PrefixThenStream::new(stream.recorded, stream.inner))
            }
        };
        if self.compressed {
            Ok(Box::new(zstd::stream::read::Decoder::new(raw)?))
        } else {
            Ok(raw)
        }
    }
}

fn reopen(path: &Path, description: &str) -> Result<File> {
    File::open(path).map_err(|err| JslError::SourceUnavailable {
        source_desc: description.to_string(),
        reason: err.to_string(),
    })
}

fn decompressed<'a, R: Read + 'a>(raw: R, compressed: bool) -> Result<Box<dyn Read + 'a>> {
    if compressed {
        Ok(Box::new(zstd::stream::read::Decoder::new(raw)?))
    } else {
        Ok(Box::new(raw))
    }
}

/// Replays the recorded prefix, then records fresh bytes up to the cap
struct Replay<'a> {
    stream: &'a mut StreamState,
    pos: usize,
}

impl<'a> Replay<'a> {
    fn new(stream: &'a mut StreamState) -> Self {
        Self { stream, pos: 0 }
    }
}

impl Read for Replay<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let recorded = &self.stream.recorded;
        if self.pos < recorded.len() {
            let n = buf.len().min(recorded.len() - self.pos);
            buf[..n].copy_from_slice(&recorded[self.pos..self.pos + n]);
            self.pos += n;
            return Ok(n);
        }

        let remaining = self.stream.cap.saturating_sub(recorded.len());
        if remaining == 0 {
            self.stream.capped = true;
            return Ok(0);
        }

        let max_read = buf.len().min(remaining);
        let n = self.stream.inner.read(&mut buf[..max_read])?;
        self.stream.recorded.extend_from_slice(&buf[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// Final-pass reader: the recorded prefix, then the live stream. The prefix
/// buffer is freed as soon as it has been handed out.
struct PrefixThenStream {
    prefix: Vec<u8>,
    pos: usize,
    inner: Box<dyn Read + Send>,
}

impl PrefixThenStream {
    fn new(prefix: Vec<u8>, inner: Box<dyn Read + Send>) -> Self {
        Self {
            prefix,
            pos: 0,
            inner,
        }
    }
}

impl Read for PrefixThenStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.prefix.len() {
            let n = buf.len().min(self.prefix.len() - self.pos);
            buf[..n].copy_from_slice(&self.prefix[self.pos..self.pos + n]);
            self.pos += n;
            if self.pos == self.prefix.len() {
                self.prefix = Vec::new();
                self.pos = 0;
            }
            return Ok(n);
        }
        self.inner.read(buf)
    }
}
