//! Log output for genobench processes.
//!
//! All records go to stderr; stdout carries only the run summary and the
//! `summarize` JSON. Without `RUST_LOG`, the chosen level applies to the
//! genobench crates and everything else (reqwest, hyper, rustls) stays at
//! `warn`. In JSON mode every record is one flat object: the `obs` fields
//! (`event`, `task_id`, ...) sit at top level next to the enclosing run span's
//! `run_id` and `domain`, so a log pipeline can filter on `event` directly.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const GENOBENCH_TARGETS: [&str; 3] = ["genobench_core", "genobench_agent", "genobench"];

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(
        GENOBENCH_TARGETS
            .iter()
            .map(|target| format!("{target}={}", level.as_str().to_lowercase())),
    );
    directives.join(",")
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Install the global subscriber. Only the first call in a process wins.
pub fn init_tracing(json: bool, level: Level) {
    let registry = tracing_subscriber::registry().with(env_filter(level));
    let result = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        // Targets only help when debugging across crates.
        registry
            .with(
                fmt::layer()
                    .with_target(level >= Level::DEBUG)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
