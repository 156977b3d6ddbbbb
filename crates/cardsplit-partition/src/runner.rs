//! Split runner: extractor → key deriver → router, one record at a time

use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use cardsplit_core::progress::upgrade_to_bar;
use cardsplit_core::{ProgressContext, fmt_mb, fmt_num, shutdown_flag};
use indicatif::ProgressBar;

use crate::config::Config;
use crate::error::{RunFailure, SplitError};
use crate::extract::RecordExtractor;
use crate::key::derive_key;
use crate::router::Router;
use crate::sink::{Envelope, cleanup_tmp_files};
use crate::source::{ByteCounter, open_source};
use crate::stats::Summary;

/// Split the document at `source` into partition files under
/// `config.extracts_dir`.
///
/// Polls the process shutdown flag after every record. Output files are
/// closed with a footer on every path out of this function; on failure the
/// partial summary travels with the error.
pub fn run(source: &Path, config: &Config, progress: &ProgressContext) -> Result<Summary, RunFailure> {
    let src = open_source(source).map_err(|e| RunFailure {
        error: SplitError::SourceUnavailable {
            path: source.to_path_buf(),
            source: e,
        },
        summary: Summary::default(),
    })?;

    log::info!(
        "Splitting {} ({}{}) into {}",
        source.display(),
        fmt_mb(src.total_bytes),
        if src.compressed { ", gzip" } else { "" },
        config.extracts_dir.display()
    );

    let pb = progress.bytes_bar("split");
    upgrade_to_bar(&pb, src.total_bytes);

    let result = split_reader(src.reader, config, shutdown_flag(), &pb, &src.bytes);
    pb.finish_and_clear();
    result
}

/// Split an already opened document.
///
/// `counter` is the byte counter feeding `pb`; `stop` is polled after every
/// record.
pub fn split_reader<R: BufRead>(
    reader: R,
    config: &Config,
    stop: &AtomicBool,
    pb: &ProgressBar,
    counter: &ByteCounter,
) -> Result<Summary, RunFailure> {
    let start = Instant::now();
    if let Err(e) = cleanup_tmp_files(&config.extracts_dir) {
        log::warn!("Could not remove stale tmp files: {e}");
    }
    let mut extractor = RecordExtractor::new(reader, &config.record_tag);
    let mut router = Router::new(config);
    let mut summary = Summary::default();

    let outcome = split_records(&mut extractor, &mut router, &mut summary, config, stop, pb, counter);

    // Always finalize, whatever happened above
    let finished = router.finish_all();

    summary.files_resumed = router.resumed_files();
    summary.evictions = router.evictions();
    summary.bytes_read = counter.load(Ordering::Relaxed);
    summary.elapsed = start.elapsed();

    let error = match (outcome, finished) {
        (Ok(()), Ok(closed)) => {
            log::debug!("Split complete, {closed} files closed");
            return Ok(summary);
        }
        (Err(e), Err(close_err)) => {
            log::warn!("Also failed to close output: {close_err}");
            e
        }
        (Err(e), Ok(_)) | (Ok(()), Err(e)) => e,
    };
    Err(RunFailure { error, summary })
}

fn split_records<R: BufRead>(
    extractor: &mut RecordExtractor<R>,
    router: &mut Router,
    summary: &mut Summary,
    config: &Config,
    stop: &AtomicBool,
    pb: &ProgressBar,
    counter: &ByteCounter,
) -> Result<(), SplitError> {
    let mut envelope_set = false;

    while let Some(item) = extractor.next() {
        let record = item.map_err(|e| {
            log::error!(
                "Malformed source at byte {} after {} records: {}",
                e.offset,
                fmt_num(e.records),
                e.message
            );
            SplitError::Parse(e)
        })?;

        if !envelope_set {
            if let Some(root) = extractor.root() {
                router.set_envelope(Envelope::from_root(root));
            }
            envelope_set = true;
        }

        let derived = derive_key(&record);
        if derived.is_degraded() {
            log::debug!(
                "Record {} routed to {} ({:?})",
                record.seq,
                derived.key,
                derived.degradation
            );
        }
        router.route(&derived.key, &record.raw)?;
        summary.record(&derived);

        pb.set_position(counter.load(Ordering::Relaxed));
        if !pb.is_hidden() && summary.records % 1_000 == 0 {
            pb.set_message(format!("{} records", fmt_num(summary.records)));
        } else if pb.is_hidden() && config.log_every > 0 && summary.records % config.log_every == 0 {
            log::info!(
                "{} records, {} partitions, {} degraded",
                fmt_num(summary.records),
                fmt_num(summary.partition_count() as u64),
                fmt_num(summary.degraded)
            );
        }

        if stop.load(Ordering::Relaxed) {
            log::warn!("Shutdown requested, closing output files");
            return Err(SplitError::Interrupted {
                records: summary.records,
            });
        }
    }

    Ok(())
}
