//! Logging system demonstration
//!
//! Walks through the log output of a typical recitation session: a verse
//! whose first CDN fails, a fallback that succeeds, and autoplay advancing.
//!
//! Run with:
//! ```bash
//! cargo run -p core-runtime --example logging_demo
//! cargo run -p core-runtime --example logging_demo -- json
//! cargo run -p core-runtime --example logging_demo -- compact "core_playback=trace"
//! ```

use bridge_traits::logging::{ConsoleLogger, LogLevel};
use core_runtime::logging::{init_logging, redact_url, LogFormat, LoggingConfig};
use std::env;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const CANDIDATES: &[&str] = &[
    "https://cdn.islamic.network/quran/audio/128/ar.alafasy/1.mp3?sig=abc",
    "https://everyayah.com/data/Alafasy_128kbps/001001.mp3",
];

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::default(),
    };

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Trace)
        .with_logger_sink(Arc::new(ConsoleLogger {
            min_level: LogLevel::Warn,
        }));

    if let Some(filter) = args.get(2) {
        config = config.with_filter(filter.clone());
    }

    if let Err(err) = init_logging(config) {
        eprintln!("failed to initialize logging: {}", err);
        return;
    }

    info!(format = ?format, "logging initialized");

    for (index, verse) in ["1:1", "1:2"].iter().enumerate() {
        play_with_fallback(verse, index as u64 + 1).await;
    }

    info!(unit = "surah:1", "demo complete");
}

#[instrument]
async fn play_with_fallback(verse: &str, request: u64) {
    for (index, url) in CANDIDATES.iter().enumerate() {
        debug!(candidate_index = index, url = %redact_url(url), "trying candidate");
        tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;

        if index == 0 && request == 1 {
            warn!(url = %redact_url(url), "candidate failed to load");
            continue;
        }

        info!(candidate_index = index, "recitation started");
        return;
    }
}
