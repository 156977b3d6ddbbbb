//! Cardsplit Partition - streaming splitter for the business-card export
//!
//! Reads one large XML document and writes every `<businesscard>` record to
//! `<extracts>/<YYYY-MM>/<prefix>.<CC>.xml`, keyed by the record's country
//! code and registration month. Memory stays bounded by the largest record;
//! every output file is closed with its root end tag, also on failure.
//!
//! Pipeline: [`source`] → [`extract`] → [`key`] → [`router`] / [`sink`],
//! driven by [`runner`].

pub mod config;
pub mod error;
pub mod extract;
pub mod key;
pub mod router;
pub mod runner;
pub mod sink;
pub mod source;
pub mod stats;

// Re-exports for convenience
pub use config::{Config, ExistingFilePolicy};
pub use error::{ParseError, RunFailure, SplitError};
pub use extract::{Record, RecordExtractor, RootTag};
pub use key::{DerivedKey, FieldIssue, PartitionKey, UNKNOWN_COUNTRY, UNKNOWN_MONTH, derive_key};
pub use router::Router;
pub use runner::{run, split_reader};
pub use sink::{Envelope, OpenMode, XmlSink, cleanup_tmp_files};
pub use source::{ByteCounter, CountingReader, Source, open_source};
pub use stats::Summary;
