//! Output router: one open [`XmlSink`] per partition key
//!
//! Owns every sink of a run. Sinks are opened lazily on the first record for
//! their key and stay open until [`Router::finish_all`] (or until evicted when
//! `max_open_files` is set). Dropping the router drops its sinks, and each
//! sink writes its footer on drop, so every exit path leaves closed files.

use std::collections::VecDeque;
use std::path::PathBuf;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::{Config, ExistingFilePolicy};
use crate::error::SplitError;
use crate::key::PartitionKey;
use crate::sink::{Envelope, OpenMode, XmlSink};

pub struct Router {
    base: PathBuf,
    prefix: String,
    policy: ExistingFilePolicy,
    max_open: Option<usize>,
    envelope: Envelope,
    open: FxHashMap<PartitionKey, XmlSink>,
    /// Open keys, most recently used first (only kept when capped)
    lru: VecDeque<PartitionKey>,
    /// Every key that got a file during this run
    created: FxHashSet<PartitionKey>,
    resumed_files: usize,
    evictions: usize,
}

impl Router {
    pub fn new(config: &Config) -> Self {
        Self {
            base: config.extracts_dir.clone(),
            prefix: config.prefix.clone(),
            policy: config.existing,
            max_open: config.max_open_files.map(|n| n.max(1)),
            envelope: Envelope::default(),
            open: FxHashMap::default(),
            lru: VecDeque::new(),
            created: FxHashSet::default(),
            resumed_files: 0,
            evictions: 0,
        }
    }

    /// Use `envelope` for files opened from now on.
    ///
    /// Ignored once a file exists: all files of a run share one envelope.
    pub fn set_envelope(&mut self, envelope: Envelope) {
        if !self.created.is_empty() {
            log::debug!("Envelope already in use, keeping it");
            return;
        }
        self.envelope = envelope;
    }

    /// Destination path of `key`
    pub fn path_for(&self, key: &PartitionKey) -> PathBuf {
        self.base.join(key.relative_path(&self.prefix))
    }

    /// Write one serialized record to the file of `key`.
    pub fn route(&mut self, key: &PartitionKey, raw: &[u8]) -> Result<(), SplitError> {
        let sink = self.sink_for(key)?;
        sink.write_record(raw).map_err(|source| SplitError::SinkWrite {
            path: sink.path().to_path_buf(),
            source,
        })
    }

    fn sink_for(&mut self, key: &PartitionKey) -> Result<&mut XmlSink, SplitError> {
        if self.open.contains_key(key) {
            self.touch(key);
        } else {
            self.make_room()?;
            let sink = self.open_sink(key)?;
            self.open.insert(key.clone(), sink);
            if self.max_open.is_some() {
                self.lru.push_front(key.clone());
            }
        }

        // Present: either found above or just inserted
        self.open.get_mut(key).ok_or_else(|| SplitError::SinkOpen {
            path: self.base.join(key.relative_path(&self.prefix)),
            source: std::io::Error::other("sink missing after open"),
        })
    }

    fn open_sink(&mut self, key: &PartitionKey) -> Result<XmlSink, SplitError> {
        let path = self.path_for(key);
        let reopening = self.created.contains(key);

        let mode = if reopening {
            // Evicted earlier in this run: never lose what we already wrote
            OpenMode::Resume
        } else if path.exists() {
            match self.policy {
                ExistingFilePolicy::Truncate => OpenMode::Fresh,
                ExistingFilePolicy::Append => OpenMode::Resume,
            }
        } else {
            OpenMode::Fresh
        };

        let sink = XmlSink::open(&path, &self.envelope, mode).map_err(|source| {
            log::error!("Cannot open {}: {source}", path.display());
            SplitError::SinkOpen {
                path: path.clone(),
                source,
            }
        })?;

        if !reopening {
            self.created.insert(key.clone());
            match mode {
                OpenMode::Fresh => log::info!("Created output file: {}", path.display()),
                OpenMode::Resume => {
                    self.resumed_files += 1;
                    log::info!("Appending to existing file: {}", path.display());
                }
            }
        } else {
            log::debug!("Reopened {}", path.display());
        }
        Ok(sink)
    }

    fn touch(&mut self, key: &PartitionKey) {
        if self.max_open.is_none() || self.lru.front() == Some(key) {
            return;
        }
        if let Some(pos) = self.lru.iter().position(|k| k == key) {
            self.lru.remove(pos);
        }
        self.lru.push_front(key.clone());
    }

    /// Close least recently used sinks until there is room for one more.
    fn make_room(&mut self) -> Result<(), SplitError> {
        let Some(max) = self.max_open else {
            return Ok(());
        };
        while self.open.len() >= max {
            let Some(victim) = self.lru.pop_back() else {
                break;
            };
            if let Some(mut sink) = self.open.remove(&victim) {
                log::debug!("Closing {} to stay under {max} open files", sink.path().display());
                finish_sink(&mut sink)?;
                self.evictions += 1;
            }
        }
        Ok(())
    }

    /// Finalize every open sink (footer, flush, close).
    ///
    /// Every sink is attempted even if some fail; the first failure is
    /// returned. Calling this again is a no-op. Returns the number of sinks
    /// closed by this call.
    pub fn finish_all(&mut self) -> Result<usize, SplitError> {
        let mut sinks: Vec<(PartitionKey, XmlSink)> = self.open.drain().collect();
        self.lru.clear();
        sinks.sort_by(|a, b| a.0.cmp(&b.0));

        let mut closed = 0;
        let mut first_err = None;
        for (_, mut sink) in sinks {
            match finish_sink(&mut sink) {
                Ok(true) => closed += 1,
                Ok(false) => {}
                Err(e) => {
                    log::error!("{e}");
                    first_err.get_or_insert(e);
                }
            }
        }
        log::debug!("Closed {closed} output files");

        match first_err {
            Some(e) => Err(e),
            None => Ok(closed),
        }
    }

    /// Files currently open
    pub fn open_files(&self) -> usize {
        self.open.len()
    }

    /// Distinct partitions written during this run
    pub fn partitions_created(&self) -> usize {
        self.created.len()
    }

    /// Files from an earlier run that were appended to
    pub fn resumed_files(&self) -> usize {
        self.resumed_files
    }

    /// Sinks closed early to respect `max_open_files`
    pub fn evictions(&self) -> usize {
        self.evictions
    }
}

fn finish_sink(sink: &mut XmlSink) -> Result<bool, SplitError> {
    sink.finish().map_err(|source| SplitError::SinkWrite {
        path: sink.path().to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn config(dir: &Path) -> Config {
        Config {
            extracts_dir: dir.to_path_buf(),
            prefix: "x".to_string(),
            ..Default::default()
        }
    }

    fn read(dir: &Path, rel: &str) -> String {
        fs::read_to_string(dir.join(rel)).unwrap()
    }

    #[test]
    fn routes_interleaved_keys() {
        let dir = TempDir::new().unwrap();
        let mut router = Router::new(&config(dir.path()));
        let be = PartitionKey::new("BE", "2025-10");
        let fr = PartitionKey::new("FR", "2025-11");

        router.route(&be, b"<businesscard id=\"1\"/>").unwrap();
        router.route(&fr, b"<businesscard id=\"2\"/>").unwrap();
        router.route(&be, b"<businesscard id=\"3\"/>").unwrap();
        assert_eq!(router.open_files(), 2);
        assert_eq!(router.finish_all().unwrap(), 2);

        let be_file = read(dir.path(), "2025-10/x.BE.xml");
        assert_eq!(be_file.matches("<?xml").count(), 1);
        assert!(be_file.contains("id=\"1\""));
        assert!(be_file.contains("id=\"3\""));
        assert!(!be_file.contains("id=\"2\""));
        assert!(be_file.ends_with("</root>\n"));
        assert!(read(dir.path(), "2025-11/x.FR.xml").contains("id=\"2\""));
    }

    #[test]
    fn finish_all_twice_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut router = Router::new(&config(dir.path()));
        router
            .route(&PartitionKey::new("BE", "2025-10"), b"<businesscard/>")
            .unwrap();
        assert_eq!(router.finish_all().unwrap(), 1);
        assert_eq!(router.finish_all().unwrap(), 0);
        drop(router);
        assert_eq!(read(dir.path(), "2025-10/x.BE.xml").matches("</root>").count(), 1);
    }

    #[test]
    fn drop_closes_open_sinks() {
        let dir = TempDir::new().unwrap();
        {
            let mut router = Router::new(&config(dir.path()));
            router
                .route(&PartitionKey::new("DE", "2024-01"), b"<businesscard/>")
                .unwrap();
        }
        assert!(read(dir.path(), "2024-01/x.DE.xml").ends_with("</root>\n"));
    }

    #[test]
    fn lru_eviction_reopens_in_append_mode() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(dir.path());
        cfg.max_open_files = Some(1);
        let mut router = Router::new(&cfg);
        let a = PartitionKey::new("AT", "2025-01");
        let b = PartitionKey::new("BG", "2025-01");

        router.route(&a, b"<businesscard n=\"1\"/>").unwrap();
        router.route(&b, b"<businesscard n=\"2\"/>").unwrap();
        router.route(&a, b"<businesscard n=\"3\"/>").unwrap();
        assert_eq!(router.open_files(), 1);
        router.finish_all().unwrap();

        assert_eq!(router.evictions(), 2);
        assert_eq!(router.partitions_created(), 2);
        assert_eq!(router.resumed_files(), 0);

        let a_file = read(dir.path(), "2025-01/x.AT.xml");
        assert_eq!(a_file.matches("<?xml").count(), 1);
        assert_eq!(a_file.matches("</root>").count(), 1);
        assert!(a_file.ends_with("<businesscard n=\"1\"/>\n<businesscard n=\"3\"/>\n</root>\n"));
    }

    #[test]
    fn truncate_policy_replaces_old_file() {
        let dir = TempDir::new().unwrap();
        let key = PartitionKey::new("BE", "2025-10");
        for n in ["old", "new"] {
            let mut router = Router::new(&config(dir.path()));
            router
                .route(&key, format!("<businesscard run=\"{n}\"/>").as_bytes())
                .unwrap();
            router.finish_all().unwrap();
        }
        let content = read(dir.path(), "2025-10/x.BE.xml");
        assert!(!content.contains("run=\"old\""));
        assert!(content.contains("run=\"new\""));
    }

    #[test]
    fn append_policy_keeps_old_records() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(dir.path());
        cfg.existing = ExistingFilePolicy::Append;
        let key = PartitionKey::new("BE", "2025-10");
        for n in ["old", "new"] {
            let mut router = Router::new(&cfg);
            router
                .route(&key, format!("<businesscard run=\"{n}\"/>").as_bytes())
                .unwrap();
            router.finish_all().unwrap();
        }
        let content = read(dir.path(), "2025-10/x.BE.xml");
        assert_eq!(content.matches("<?xml").count(), 1);
        assert_eq!(content.matches("</root>").count(), 1);
        assert!(content.contains("run=\"old\""));
        assert!(content.contains("run=\"new\""));
    }

    #[test]
    fn open_failure_is_sink_open_error() {
        let dir = TempDir::new().unwrap();
        // A regular file where the month directory should go
        fs::write(dir.path().join("2025-11"), b"not a directory").unwrap();
        let mut router = Router::new(&config(dir.path()));

        let err = router
            .route(&PartitionKey::new("FR", "2025-11"), b"<businesscard/>")
            .unwrap_err();
        assert!(matches!(err, SplitError::SinkOpen { .. }));
    }

    #[test]
    fn envelope_fixed_after_first_file() {
        let dir = TempDir::new().unwrap();
        let mut router = Router::new(&config(dir.path()));
        router
            .route(&PartitionKey::new("BE", "2025-10"), b"<businesscard/>")
            .unwrap();
        router.set_envelope(Envelope::from_root(&crate::extract::RootTag {
            raw: b"<other>".to_vec(),
            name: b"other".to_vec(),
        }));
        router
            .route(&PartitionKey::new("FR", "2025-10"), b"<businesscard/>")
            .unwrap();
        router.finish_all().unwrap();
        assert!(read(dir.path(), "2025-10/x.FR.xml").ends_with("</root>\n"));
    }
}
