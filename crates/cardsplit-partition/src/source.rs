//! Source document: local file (optionally gzipped) with a byte counter

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::read::GzDecoder;

/// Read buffer for the source file (1MB)
const SOURCE_BUF_SIZE: usize = 1024 * 1024;

/// Shared byte counter for progress tracking
pub type ByteCounter = Arc<AtomicU64>;

/// Reader wrapper that tracks bytes read
pub struct CountingReader<R> {
    inner: R,
    count: ByteCounter,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R, count: ByteCounter) -> Self {
        Self { inner, count }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// An opened source document.
///
/// `bytes` counts bytes read from disk (compressed bytes for `.gz`), so it
/// can be compared against `total_bytes` for a progress bar.
pub struct Source {
    pub reader: Box<dyn BufRead>,
    pub bytes: ByteCounter,
    pub total_bytes: u64,
    pub compressed: bool,
}

/// Open `path` for streaming; `.gz` files are decompressed on the fly.
pub fn open_source(path: &Path) -> io::Result<Source> {
    let file = File::open(path)?;
    let total_bytes = file.metadata()?.len();
    let bytes = ByteCounter::default();
    let counting = CountingReader::new(file, bytes.clone());

    let compressed = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    let reader: Box<dyn BufRead> = if compressed {
        Box::new(BufReader::with_capacity(SOURCE_BUF_SIZE, GzDecoder::new(counting)))
    } else {
        Box::new(BufReader::with_capacity(SOURCE_BUF_SIZE, counting))
    };

    Ok(Source {
        reader,
        bytes,
        total_bytes,
        compressed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    const XML: &str = "<root><businesscard/></root>";

    #[test]
    fn counting_reader_counts() {
        let counter = ByteCounter::default();
        let mut reader = CountingReader::new(XML.as_bytes(), counter.clone());
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, XML);
        assert_eq!(counter.load(Ordering::Relaxed), XML.len() as u64);
    }

    #[test]
    fn opens_plain_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.xml");
        std::fs::write(&path, XML).unwrap();

        let mut source = open_source(&path).unwrap();
        assert!(!source.compressed);
        assert_eq!(source.total_bytes, XML.len() as u64);
        let mut out = String::new();
        source.reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, XML);
        assert_eq!(source.bytes.load(Ordering::Relaxed), XML.len() as u64);
    }

    #[test]
    fn opens_gzip_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.xml.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(XML.as_bytes()).unwrap();
        enc.finish().unwrap();

        let mut source = open_source(&path).unwrap();
        assert!(source.compressed);
        let mut out = String::new();
        source.reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, XML);
        assert_eq!(source.bytes.load(Ordering::Relaxed), source.total_bytes);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = open_source(Path::new("/nonexistent/export.xml")).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
