//! Exchange spans.
//!
//! Every `send` runs inside one span carrying a random exchange id, so the
//! connection, redirect and pool events of a request chain can be grouped.

use tracing::Span;
use uuid::Uuid;

/// Span for one `send` call.
pub fn exchange_span(method: &str, uri: &str) -> (Span, Uuid) {
    let id = Uuid::new_v4();
    let span = tracing::debug_span!("exchange", exchange_id = %id, method = %method, uri = %uri);
    (span, id)
}
