//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static INIT: Once = Once::new();

/// Installs the global subscriber.
///
/// Levels come from `RAG_LOG` (e.g. `RAG_LOG=passage_retrieval=debug`),
/// falling back to `passage_retrieval=info`. Safe to call more than once.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("RAG_LOG")
            .unwrap_or_else(|_| EnvFilter::new("passage_retrieval=info"));

        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .init();
    });
}
