use std::io::{Error, Seek, Write};
use zip::ZipWriter;
use zstd::stream::write::Encoder as ZstdEncoder;

/// Flushes trailing frames/footers of a writer and hands back the inner writer
pub trait Finish<O> {
    fn finish(self) -> Result<O, Error>;
}

impl<W: Write> Finish<W> for ZstdEncoder<'static, W> {
    fn finish(self) -> Result<W, Error> {
        self.finish()
    }
}

impl<W: Write + Seek> Finish<W> for ZipWriter<W> {
    fn finish(self) -> Result<W, Error> {
        self.finish().map_err(Error::other)
    }
}

impl<W: Write> Finish<W> for tar::Builder<W> {
    fn finish(self) -> Result<W, Error> {
        self.into_inner()
    }
}
