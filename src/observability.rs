//! Tracing bootstrap plus the ids attached to errors and backend calls.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Filter applied when neither `PAIRCHAT_LOG` nor `RUST_LOG` is set.
const DEFAULT_FILTER: &str = "pairchat=info";

static SESSION_TRACE_ID: OnceLock<String> = OnceLock::new();

/// Install the global JSON subscriber. The composition root calls this
/// once; embedding apps that bring their own subscriber skip it.
pub fn init_tracing() {
    let filter = std::env::var("PAIRCHAT_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .json()
        .flatten_event(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        tracing::info!(
            component = "bootstrap",
            trace_id = %trace_id(),
            "tracing initialized"
        );
    }
}

/// Process-stable id stamped onto every surfaced error so a user
/// report can be matched to this session's logs.
pub fn trace_id() -> &'static str {
    SESSION_TRACE_ID.get_or_init(|| Uuid::new_v4().to_string())
}

/// Fresh id for one backend call or subscription.
pub fn request_id() -> String {
    Uuid::new_v4().to_string()
}
