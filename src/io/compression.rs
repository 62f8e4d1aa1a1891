//! Pluggable compression for text output.
//!
//! Each [`CompressionCodec`] wraps a raw file sink in an encoder and reports the
//! file extension that goes with it. Encoders are returned as [`FinishingWrite`]
//! so the codec trailer is written (and its errors surfaced) when a task closes its
//! file, rather than silently on drop.
//!
//! ## Built-in Codecs
//!
//! - **Gzip** (`.gz`) - via `flate2` (feature: `compression-gzip`)
//! - **Bzip2** (`.bz2`) - via `bzip2` (feature: `compression-bzip2`)
//!
//! Parquet output compresses internally and does not go through this module.

use crate::error::{ErrorKind, Result, WriterError};
use crate::plan::Compression;
use std::io::Write;
use tracing::debug;

/// A writer that must be explicitly finished.
pub trait FinishingWrite: Write + Send {
    /// Write any trailer, flush, and release the underlying sink.
    ///
    /// # Errors
    /// Returns the first I/O error hit while finishing.
    fn finish(self: Box<Self>) -> std::io::Result<()>;
}

/// Pluggable compression codec.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip").
    fn name(&self) -> &str;

    /// Extension appended to file names, including the leading dot.
    fn extension(&self) -> &str;

    /// Wrap a writer with compression.
    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> Box<dyn FinishingWrite>;
}

/// Pass-through sink used when no codec is configured.
struct Plain(Box<dyn Write + Send>);

impl Write for Plain {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

impl FinishingWrite for Plain {
    fn finish(mut self: Box<Self>) -> std::io::Result<()> {
        self.0.flush()
    }
}

/// Look up the codec for a text compression setting. `None` means no codec.
///
/// # Errors
/// Returns [`ErrorKind::IllegalValue`] when the codec's feature is not compiled in
/// or the setting does not apply to text output.
pub fn codec_for(compression: Compression) -> Result<Option<Box<dyn CompressionCodec>>> {
    match compression {
        Compression::None => Ok(None),
        #[cfg(feature = "compression-gzip")]
        Compression::Gzip => Ok(Some(Box::new(GzipCodec))),
        #[cfg(feature = "compression-bzip2")]
        Compression::Bzip2 => Ok(Some(Box::new(Bzip2Codec))),
        #[allow(unreachable_patterns)]
        other => Err(WriterError::new(
            ErrorKind::IllegalValue,
            format!("{other:?} compression is not available for text output"),
        )),
    }
}

/// Wrap `writer` according to `compression`.
///
/// # Errors
/// See [`codec_for`].
pub fn wrap_writer(
    writer: Box<dyn Write + Send>,
    compression: Compression,
) -> Result<Box<dyn FinishingWrite>> {
    Ok(match codec_for(compression)? {
        Some(codec) => {
            debug!(codec = codec.name(), "compressing output");
            codec.wrap_writer(writer)
        }
        None => Box::new(Plain(writer)),
    })
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl FinishingWrite for flate2::write::GzEncoder<Box<dyn Write + Send>> {
    fn finish(self: Box<Self>) -> std::io::Result<()> {
        let mut inner = (*self).finish()?;
        inner.flush()
    }
}

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extension(&self) -> &str {
        ".gz"
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> Box<dyn FinishingWrite> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Box::new(GzEncoder::new(writer, Compression::default()))
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl FinishingWrite for bzip2::write::BzEncoder<Box<dyn Write + Send>> {
    fn finish(self: Box<Self>) -> std::io::Result<()> {
        let mut inner = (*self).finish()?;
        inner.flush()
    }
}

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extension(&self) -> &str {
        ".bz2"
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> Box<dyn FinishingWrite> {
        use bzip2::Compression;
        use bzip2::write::BzEncoder;
        Box::new(BzEncoder::new(writer, Compression::default()))
    }
}
