//! Compression framing for input and output streams.
//!
//! A bzip2 stream starts with the two bytes `B`,`Z`; a gzip stream with
//! `1f 8b`. Readers sniff or verify that prefix before decoding.

use std::io::{self, BufRead, BufReader, Cursor, Read, Write};
use std::path::Path;

use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SiftError};

pub const BZIP2_MAGIC: [u8; 2] = *b"BZ";
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Sniff the magic prefix on read; plain on write
    #[default]
    Auto,
    None,
    Bzip2,
    Gzip,
}

impl Compression {
    /// Guess from a file extension (`.bz2`, `.gz`)
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("bz2") => Compression::Bzip2,
            Some("gz") => Compression::Gzip,
            _ => Compression::None,
        }
    }
}

/// Wrap `inner` in the decoder for `compression`.
///
/// With [`Compression::Bzip2`] the stream must begin with `BZ`, otherwise
/// this fails with a format error before anything is decoded.
pub fn open_reader<'a, R: Read + 'a>(
    mut inner: R,
    compression: Compression,
) -> Result<Box<dyn BufRead + 'a>> {
    let mut magic = [0u8; 2];
    let n = read_prefix(&mut inner, &mut magic)?;
    let prefix = &magic[..n];
    // Put the sniffed bytes back in front; the decoders expect them.
    let stream = Cursor::new(prefix.to_vec()).chain(inner);

    let detected = match compression {
        Compression::Auto if prefix == BZIP2_MAGIC => Compression::Bzip2,
        Compression::Auto if prefix == GZIP_MAGIC => Compression::Gzip,
        Compression::Auto => Compression::None,
        Compression::Bzip2 if prefix != BZIP2_MAGIC => {
            return Err(SiftError::format(
                0,
                "stream is declared bzip2 but does not start with 'BZ'",
            ));
        }
        Compression::Gzip if prefix != GZIP_MAGIC => {
            return Err(SiftError::format(
                0,
                "stream is declared gzip but does not start with the gzip magic",
            ));
        }
        other => other,
    };

    Ok(match detected {
        Compression::Bzip2 => Box::new(BufReader::new(MultiBzDecoder::new(stream))),
        Compression::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(stream))),
        _ => Box::new(BufReader::new(stream)),
    })
}

fn read_prefix<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Output stream that may be compressed. Call [`OutputStream::finish`]
/// to flush the compressor trailer.
pub enum OutputStream<W: Write> {
    Plain(W),
    Bzip2(BzEncoder<W>),
    Gzip(GzEncoder<W>),
}

impl<W: Write> OutputStream<W> {
    pub fn new(inner: W, compression: Compression) -> Self {
        match compression {
            Compression::Bzip2 => {
                OutputStream::Bzip2(BzEncoder::new(inner, bzip2::Compression::best()))
            }
            Compression::Gzip => {
                OutputStream::Gzip(GzEncoder::new(inner, flate2::Compression::default()))
            }
            Compression::Auto | Compression::None => OutputStream::Plain(inner),
        }
    }

    pub fn finish(self) -> io::Result<W> {
        match self {
            OutputStream::Plain(mut w) => {
                w.flush()?;
                Ok(w)
            }
            OutputStream::Bzip2(e) => e.finish(),
            OutputStream::Gzip(e) => e.finish(),
        }
    }
}

impl<W: Write> Write for OutputStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputStream::Plain(w) => w.write(buf),
            OutputStream::Bzip2(e) => e.write(buf),
            OutputStream::Gzip(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputStream::Plain(w) => w.flush(),
            OutputStream::Bzip2(e) => e.flush(),
            OutputStream::Gzip(e) => e.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compress(data: &[u8], compression: Compression) -> Vec<u8> {
        let mut out = OutputStream::new(Vec::new(), compression);
        out.write_all(data).unwrap();
        out.finish().unwrap()
    }

    fn read_all(reader: &mut dyn BufRead) -> String {
        let mut s = String::new();
        reader.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn test_bzip2_output_starts_with_magic() {
        let data = compress(b"<osm/>", Compression::Bzip2);
        assert_eq!(&data[..2], b"BZ");
    }

    #[test]
    fn test_auto_detects_bzip2_and_plain() {
        let packed = compress(b"<osm></osm>", Compression::Bzip2);
        let mut reader = open_reader(Cursor::new(packed), Compression::Auto).unwrap();
        assert_eq!(read_all(&mut reader), "<osm></osm>");

        let mut reader = open_reader(Cursor::new(b"<osm/>".to_vec()), Compression::Auto).unwrap();
        assert_eq!(read_all(&mut reader), "<osm/>");
    }

    #[test]
    fn test_declared_bzip2_without_magic_fails_fast() {
        let result = open_reader(Cursor::new(b"<osm/>".to_vec()), Compression::Bzip2);
        assert!(matches!(result, Err(SiftError::Format { .. })));
    }

    #[test]
    fn test_gzip_round_trip() {
        let packed = compress(b"hello", Compression::Gzip);
        let mut reader = open_reader(Cursor::new(packed), Compression::Gzip).unwrap();
        assert_eq!(read_all(&mut reader), "hello");
    }

    #[test]
    fn test_empty_plain_stream() {
        let mut reader = open_reader(Cursor::new(Vec::new()), Compression::Auto).unwrap();
        assert_eq!(read_all(&mut reader), "");
    }
}
