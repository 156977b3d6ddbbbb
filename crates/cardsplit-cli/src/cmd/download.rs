//! Download subcommand - fetch the export without splitting it

use anyhow::Result;
use cardsplit_core::{SharedProgress, fmt_mb};

use super::{Settings, fetch_source, print_summary};

pub fn run(settings: &Settings, progress: &SharedProgress) -> Result<()> {
    let download = fetch_source(settings, progress)?;

    print_summary(
        "Download",
        &[
            ("Location", download.path.display().to_string()),
            ("Size", fmt_mb(download.bytes)),
            (
                "Status",
                if download.skipped {
                    "already present".to_string()
                } else {
                    "downloaded".to_string()
                },
            ),
        ],
    );
    Ok(())
}
