use crate::backup::file_ext::FileExtProvider;
use crate::backup::finish::Finish;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithDebugObjectAndFnName;
use derive_more::From;
use io_enum::Write;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Formatter;
use std::io;
use std::io::Write;
use std::result;
use zstd::stream::write::Encoder as ZstdEncoder;

/// zstd level used for `.tar.zst` snapshots
static DEFAULT_ZSTD_LEVEL: i32 = 3;

#[derive(Write, From)]
pub enum Compressor<W: Write> {
    None(W),
    Zstd(ZstdEncoder<'static, W>),
}

/// How a finished working copy is packed
///
/// Deserialized from the plain strings `""`/`"none"`, `"zip"` and `"zstd"`.
/// Any other value falls back to zip.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum CompressionConfig {
    #[default]
    None,
    Zip,
    Zstd,
}

impl CompressionConfig {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => CompressionConfig::None,
            "zip" => CompressionConfig::Zip,
            "zstd" | "tar.zst" => CompressionConfig::Zstd,
            other => {
                tracing::warn!("Unknown compression {:?}, using zip", other);
                CompressionConfig::Zip
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, CompressionConfig::None)
    }

    fn as_str(&self) -> &'static str {
        match self {
            CompressionConfig::None => "none",
            CompressionConfig::Zip => "zip",
            CompressionConfig::Zstd => "zstd",
        }
    }
}

impl FileExtProvider for CompressionConfig {
    fn file_ext(&self) -> Option<&'static str> {
        match self {
            CompressionConfig::None => None,
            CompressionConfig::Zip => Some("zip"),
            CompressionConfig::Zstd => Some("tar.zst"),
        }
    }
}

impl Serialize for CompressionConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

struct CompressionConfigVisitor;

impl Visitor<'_> for CompressionConfigVisitor {
    type Value = CompressionConfig;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a compression name")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(CompressionConfig::parse(v))
    }

    fn visit_unit<E>(self) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(CompressionConfig::None)
    }
}

impl<'de> Deserialize<'de> for CompressionConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_any(CompressionConfigVisitor)
    }
}

pub trait CompressorBuilder<W: Write> {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>>;
}

impl<W: Write> Finish<W> for Compressor<W> {
    fn finish(self) -> io::Result<W> {
        match self {
            Compressor::None(w) => Ok(w),
            Compressor::Zstd(w) => w.finish(),
        }
    }
}

/// Builds the stream compressor wrapped around a tar writer
///
/// Zip archives compress per entry, so only zstd yields a stream compressor.
impl<W: Write> CompressorBuilder<W> for CompressionConfig {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>> {
        match self {
            CompressionConfig::None | CompressionConfig::Zip => Ok(Compressor::None(writer)),
            CompressionConfig::Zstd => {
                tracing::debug!("Creating zstd compressor with level={}", DEFAULT_ZSTD_LEVEL);
                ZstdEncoder::new(writer, DEFAULT_ZSTD_LEVEL)
                    .map(Compressor::from)
                    .map_err(Into::into)
            }
        }
        .with_debug_object_and_fn_name(*self, "build_compressor")
    }
}
