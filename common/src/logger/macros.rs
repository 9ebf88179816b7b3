use std::time::Duration;

use tracing::{Span, field};

use super::trace_id::TraceId;

/// Root span for a user command, scheduled settlement or stats run.
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "root",
        name = %name,
        trace_id = %trace_id.as_str(),
        user_id = field::Empty,
        card_id = field::Empty,
        auction_id = field::Empty
    )
}

/// Child span that inherits the trace id of the enclosing root.
pub fn child_span(name: &'static str) -> Span {
    tracing::info_span!(
        "child",
        name = %name,
        user_id = field::Empty,
        card_id = field::Empty,
        auction_id = field::Empty
    )
}

/// Records the ids most log queries filter on into the current span.
pub fn annotate_span(user_id: Option<&str>, card_id: Option<i64>, auction_id: Option<i64>) {
    let span = Span::current();
    if let Some(uid) = user_id {
        span.record("user_id", field::display(uid));
    }
    if let Some(cid) = card_id {
        span.record("card_id", field::display(cid));
    }
    if let Some(aid) = auction_id {
        span.record("auction_id", field::display(aid));
    }
}

/// Runs `fut`, logging a warning when it exceeds `max`.
pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = std::time::Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
