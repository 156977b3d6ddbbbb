//! Partition output file: XML header on open, footer exactly once on close

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::extract::RootTag;

/// XML declaration written at the top of every output file
const XML_DECL: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Root start tag used when the source's own root is not known
pub const DEFAULT_ROOT: &str =
    r#"<root xmlns="http://www.peppol.eu/schema/pd/businesscard-generic/201907/" version="2">"#;

/// Records buffered per open file before they are written (64KB)
const SINK_BUF_SIZE: usize = 64 * 1024;

/// Header and footer shared by all output files of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    header: Vec<u8>,
    footer: Vec<u8>,
}

impl Envelope {
    /// Envelope reusing the source document's root start tag
    pub fn from_root(root: &RootTag) -> Self {
        let mut header = XML_DECL.to_vec();
        header.extend_from_slice(&root.raw);
        header.push(b'\n');

        let mut footer = b"</".to_vec();
        footer.extend_from_slice(&root.name);
        footer.extend_from_slice(b">\n");

        Self { header, footer }
    }

    pub fn header(&self) -> &[u8] {
        &self.header
    }

    pub fn footer(&self) -> &[u8] {
        &self.footer
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::from_root(&RootTag {
            raw: DEFAULT_ROOT.as_bytes().to_vec(),
            name: b"root".to_vec(),
        })
    }
}

/// How to open a sink's file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Write a new file next to the destination and rename it into place on
    /// finish; an existing destination stays untouched until then
    Fresh,
    /// Strip the existing footer and continue after the last record
    Resume,
}

/// Staging path of a fresh sink: `<name>.tmp` beside `path`
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// One open output file.
///
/// Records are written verbatim, one per line. [`XmlSink::finish`] writes the
/// footer and releases the handle; it runs at most once, and `Drop` calls it
/// if nobody else did. A write failure never leaves a record cut in half: the
/// file is closed after the last record that was written completely.
pub struct XmlSink {
    path: PathBuf,
    /// Set while a fresh file is being staged
    tmp_path: Option<PathBuf>,
    out: Option<RecordWriter<File>>,
    footer: Vec<u8>,
    records: usize,
}

impl std::fmt::Debug for XmlSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlSink")
            .field("path", &self.path)
            .field("records", &self.records)
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

impl XmlSink {
    /// Open `path` (creating parent directories) according to `mode`.
    pub fn open(path: &Path, envelope: &Envelope, mode: OpenMode) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let (file, committed, tmp) = match mode {
            OpenMode::Fresh => {
                let tmp = tmp_path(path);
                let mut file = File::create(&tmp)?;
                if let Err(e) = file.write_all(envelope.header()) {
                    drop(file);
                    let _ = fs::remove_file(&tmp);
                    return Err(e);
                }
                (file, envelope.header().len() as u64, Some(tmp))
            }
            OpenMode::Resume => {
                let mut file = OpenOptions::new().read(true).write(true).open(path)?;
                let len = strip_footer(&mut file, envelope.footer())?;
                file.seek(SeekFrom::Start(len))?;
                (file, len, None)
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            tmp_path: tmp,
            out: Some(RecordWriter::new(file, committed)),
            footer: envelope.footer().to_vec(),
            records: 0,
        })
    }

    /// Append one serialized record followed by a newline.
    pub fn write_record(&mut self, raw: &[u8]) -> io::Result<()> {
        let out = self.out.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "sink already finished")
        })?;
        out.push(raw)?;
        self.records += 1;
        Ok(())
    }

    /// Write the footer, sync and close; a fresh file is then renamed into
    /// place.
    ///
    /// Returns `false` (and does nothing) if the sink was already finished.
    /// After a failed write the file still gets its footer right after the
    /// last complete record, and the records that were lost are reported as
    /// an error.
    pub fn finish(&mut self) -> io::Result<bool> {
        let Some(mut out) = self.out.take() else {
            return Ok(false);
        };
        let lost = out.close(&self.footer)?;
        out.inner.sync_data()?;
        if let Some(tmp) = &self.tmp_path {
            fs::rename(tmp, &self.path)?;
        }

        if lost > 0 {
            return Err(io::Error::other(format!(
                "{lost} records lost to a failed write, file ends after the last complete record"
            )));
        }
        Ok(true)
    }

    pub fn is_finished(&self) -> bool {
        self.out.is_none()
    }

    /// Records written through this handle
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for XmlSink {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::error!("Failed to close {}: {e}", self.path.display());
        }
    }
}

/// Shrink a file back to `len` bytes and continue writing there.
trait Truncate {
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl Truncate for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len))?;
        Ok(())
    }
}

/// Buffered writer that only ever hands whole records to the file.
///
/// Records collect in `pending` and are written as one batch once it holds
/// [`SINK_BUF_SIZE`] bytes. `committed` is the file length after the last
/// batch that was written completely.
struct RecordWriter<W> {
    inner: W,
    pending: Vec<u8>,
    pending_records: usize,
    committed: u64,
    failed: bool,
}

impl<W: Write + Truncate> RecordWriter<W> {
    fn new(inner: W, committed: u64) -> Self {
        Self {
            inner,
            pending: Vec::with_capacity(SINK_BUF_SIZE),
            pending_records: 0,
            committed,
            failed: false,
        }
    }

    fn push(&mut self, raw: &[u8]) -> io::Result<()> {
        if self.failed {
            return Err(io::Error::other("an earlier write to this file failed"));
        }
        self.pending.extend_from_slice(raw);
        self.pending.push(b'\n');
        self.pending_records += 1;
        if self.pending.len() >= SINK_BUF_SIZE {
            self.write_pending()?;
        }
        Ok(())
    }

    fn write_pending(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.inner.write_all(&self.pending) {
            self.failed = true;
            return Err(e);
        }
        self.committed += self.pending.len() as u64;
        self.pending.clear();
        self.pending_records = 0;
        Ok(())
    }

    /// Write what is pending, then `footer`. Returns the number of records
    /// dropped because a write failed.
    fn close(&mut self, footer: &[u8]) -> io::Result<usize> {
        if !self.failed {
            if let Err(e) = self.write_pending() {
                log::warn!("Write failed while closing: {e}");
            }
        }

        let mut lost = 0;
        if self.failed {
            lost = self.pending_records;
            self.pending.clear();
            self.pending_records = 0;
            self.inner.truncate(self.committed)?;
        }
        self.inner.write_all(footer)?;
        self.inner.flush()?;
        Ok(lost)
    }
}

/// Remove `*.tmp` files left in the month directories under `base` by an
/// earlier run that was killed before closing its files.
pub fn cleanup_tmp_files(base: &Path) -> io::Result<usize> {
    if !base.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for month in fs::read_dir(base)? {
        let month = month?.path();
        if !month.is_dir() {
            continue;
        }
        for entry in fs::read_dir(&month)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "tmp") {
                log::warn!("Removing stale tmp file: {}", path.display());
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// Cut the trailing footer (plus trailing whitespace) off an existing file.
///
/// A file that does not end with `footer` was not closed properly and is
/// rejected with `InvalidData`. Returns the new length.
fn strip_footer(file: &mut File, footer: &[u8]) -> io::Result<u64> {
    let footer = footer.trim_ascii_end();
    let len = file.metadata()?.len();
    let tail_len = len.min(footer.len() as u64 + 256);

    file.seek(SeekFrom::Start(len - tail_len))?;
    let mut tail = Vec::with_capacity(tail_len as usize);
    file.read_to_end(&mut tail)?;

    let trimmed = tail.trim_ascii_end();
    if !trimmed.ends_with(footer) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "existing file does not end with {}",
                String::from_utf8_lossy(footer)
            ),
        ));
    }

    let cut = len - tail_len + (trimmed.len() - footer.len()) as u64;
    file.set_len(cut)?;
    Ok(cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn default_envelope() {
        let env = Envelope::default();
        let header = String::from_utf8(env.header().to_vec()).unwrap();
        assert!(header.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<root xmlns="));
        assert_eq!(env.footer(), b"</root>\n");
    }

    #[test]
    fn envelope_from_prefixed_root() {
        let env = Envelope::from_root(&RootTag {
            raw: br#"<ns0:root xmlns:ns0="urn:x">"#.to_vec(),
            name: b"ns0:root".to_vec(),
        });
        assert_eq!(env.footer(), b"</ns0:root>\n");
        assert!(env.header().ends_with(b"<ns0:root xmlns:ns0=\"urn:x\">\n"));
    }

    #[test]
    fn fresh_sink_writes_header_records_footer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2025-10/x.BE.xml");
        let env = Envelope::default();

        let mut sink = XmlSink::open(&path, &env, OpenMode::Fresh).unwrap();
        sink.write_record(b"<businesscard/>").unwrap();
        sink.write_record(b"<businesscard/>").unwrap();
        assert_eq!(sink.records(), 2);
        assert!(sink.finish().unwrap());

        let content = read(&path);
        assert!(content.starts_with("<?xml"));
        assert_eq!(content.matches("<root ").count(), 1);
        assert!(content.ends_with("<businesscard/>\n<businesscard/>\n</root>\n"));
    }

    #[test]
    fn finish_twice_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.xml");
        let mut sink = XmlSink::open(&path, &Envelope::default(), OpenMode::Fresh).unwrap();
        assert!(sink.finish().unwrap());
        assert!(!sink.finish().unwrap());
        drop(sink);
        assert_eq!(read(&path).matches("</root>").count(), 1);
    }

    #[test]
    fn write_after_finish_fails() {
        let dir = TempDir::new().unwrap();
        let mut sink =
            XmlSink::open(&dir.path().join("a.xml"), &Envelope::default(), OpenMode::Fresh)
                .unwrap();
        sink.finish().unwrap();
        assert!(sink.write_record(b"<businesscard/>").is_err());
    }

    #[test]
    fn drop_writes_footer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.xml");
        {
            let mut sink = XmlSink::open(&path, &Envelope::default(), OpenMode::Fresh).unwrap();
            sink.write_record(b"<businesscard/>").unwrap();
        }
        assert!(read(&path).ends_with("<businesscard/>\n</root>\n"));
    }

    #[test]
    fn fresh_truncates_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.xml");
        fs::write(&path, "old content that is not xml").unwrap();
        let mut sink = XmlSink::open(&path, &Envelope::default(), OpenMode::Fresh).unwrap();
        sink.finish().unwrap();
        assert!(!read(&path).contains("old content"));
    }

    #[test]
    fn resume_strips_footer_and_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.xml");
        let env = Envelope::default();

        let mut first = XmlSink::open(&path, &env, OpenMode::Fresh).unwrap();
        first.write_record(b"<businesscard n=\"1\"/>").unwrap();
        first.finish().unwrap();

        let mut second = XmlSink::open(&path, &env, OpenMode::Resume).unwrap();
        second.write_record(b"<businesscard n=\"2\"/>").unwrap();
        second.finish().unwrap();

        let content = read(&path);
        assert_eq!(content.matches("<?xml").count(), 1);
        assert_eq!(content.matches("</root>").count(), 1);
        assert!(content.ends_with("<businesscard n=\"1\"/>\n<businesscard n=\"2\"/>\n</root>\n"));
    }

    #[test]
    fn resume_tolerates_trailing_whitespace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.xml");
        fs::write(&path, "<?xml version=\"1.0\"?>\n<root>\n<a/>\n</root>\n\n  \n").unwrap();

        let mut sink = XmlSink::open(&path, &Envelope::default(), OpenMode::Resume).unwrap();
        sink.write_record(b"<b/>").unwrap();
        sink.finish().unwrap();
        assert_eq!(read(&path), "<?xml version=\"1.0\"?>\n<root>\n<a/>\n<b/>\n</root>\n");
    }

    #[test]
    fn resume_rejects_unterminated_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.xml");
        fs::write(&path, "<?xml version=\"1.0\"?>\n<root>\n<businesscard>").unwrap();

        let err = XmlSink::open(&path, &Envelope::default(), OpenMode::Resume).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn fresh_sink_is_staged_until_finish() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2025-10/x.BE.xml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "previous complete file").unwrap();

        let mut sink = XmlSink::open(&path, &Envelope::default(), OpenMode::Fresh).unwrap();
        sink.write_record(b"<businesscard/>").unwrap();
        assert!(tmp_path(&path).exists());
        assert_eq!(read(&path), "previous complete file");

        sink.finish().unwrap();
        assert!(!tmp_path(&path).exists());
        assert!(read(&path).ends_with("<businesscard/>\n</root>\n"));
    }

    #[test]
    fn tmp_path_appends_suffix() {
        assert_eq!(
            tmp_path(Path::new("out/2025-10/x.BE.xml")),
            Path::new("out/2025-10/x.BE.xml.tmp")
        );
    }

    #[test]
    fn cleanup_tmp_files_removes_only_tmp() {
        let dir = TempDir::new().unwrap();
        let month = dir.path().join("2025-10");
        fs::create_dir_all(&month).unwrap();
        fs::write(month.join("x.BE.xml"), "keep").unwrap();
        fs::write(month.join("x.FR.xml.tmp"), "stale").unwrap();
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        assert_eq!(cleanup_tmp_files(dir.path()).unwrap(), 1);
        assert!(month.join("x.BE.xml").exists());
        assert!(!month.join("x.FR.xml.tmp").exists());
        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(cleanup_tmp_files(&dir.path().join("missing")).unwrap(), 0);
    }

    /// In-memory file that refuses to grow past `limit` bytes
    struct LimitedFile {
        data: Vec<u8>,
        limit: usize,
    }

    impl Write for LimitedFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.limit.saturating_sub(self.data.len());
            if room == 0 {
                return Err(io::Error::other("File too large"));
            }
            let n = buf.len().min(room);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Truncate for LimitedFile {
        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }
    }

    fn big_record(n: u8) -> Vec<u8> {
        let mut raw = format!("<businesscard n=\"{n}\"><name name=\"").into_bytes();
        raw.resize(40_000, b'A');
        raw.extend_from_slice(b"\"/></businesscard>");
        raw
    }

    #[test]
    fn failed_write_closes_after_last_complete_record() {
        let header = b"<root>\n";
        let mut out = RecordWriter::new(
            LimitedFile {
                data: header.to_vec(),
                limit: 100_000,
            },
            header.len() as u64,
        );

        // First two records fill the batch and reach the file whole
        out.push(&big_record(1)).unwrap();
        out.push(&big_record(2)).unwrap();
        out.push(&big_record(3)).unwrap();
        // The next batch only partly fits
        assert!(out.push(&big_record(4)).is_err());
        assert_eq!(out.inner.data.len(), 100_000);
        assert!(out.push(&big_record(5)).is_err());

        assert_eq!(out.close(b"</root>\n").unwrap(), 2);

        let text = String::from_utf8(out.inner.data.clone()).unwrap();
        assert!(text.ends_with("</businesscard>\n</root>\n"));
        assert_eq!(text.matches("<businesscard ").count(), 2);
        assert_eq!(text.matches("</businesscard>").count(), 2);
    }

    #[test]
    fn close_without_failure_loses_nothing() {
        let mut out = RecordWriter::new(
            LimitedFile {
                data: Vec::new(),
                limit: usize::MAX,
            },
            0,
        );
        out.push(b"<businesscard/>").unwrap();
        assert_eq!(out.close(b"</root>\n").unwrap(), 0);
        assert_eq!(out.inner.data, b"<businesscard/>\n</root>\n");
    }
}
