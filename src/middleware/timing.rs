//! `Server-Timing` header.

use std::time::Instant;

use http::HeaderValue;
use http::header::HeaderName;
use tracing::trace;

use crate::handler::{Link, Outcome};
use crate::inject::Injected;
use crate::response::Reply;

/// Name of the header the timing middleware sets.
pub const SERVER_TIMING: HeaderName = HeaderName::from_static("server-timing");

/// The timing middleware. Declares only `next`.
///
/// Adds `server-timing: app;dur=<ms>` to every successful outcome. A plain
/// value coming up the chain is finalized into its success envelope first,
/// so the header always has a response to land on. Errors pass through.
pub fn timing() -> Link {
    Link::middleware("timing", add_timing_header).next()
}

async fn add_timing_header(inj: Injected) -> Outcome {
    let next = inj.next()?;
    let start = Instant::now();
    let reply = next.run().await?;
    let mut res = reply.into_response()?;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    trace!(elapsed_ms, status = res.status_code().as_u16(), "timed");
    if let Ok(value) = HeaderValue::try_from(format!("app;dur={elapsed_ms:.1}")) {
        res.headers_mut().append(SERVER_TIMING, value);
    }
    Ok(Reply::Response(res))
}
