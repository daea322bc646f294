//! Built-in middleware.
//!
//! Both are ordinary [`Link`](crate::Link)s built on the same primitives as
//! user middleware. Registration order matters:
//!
//! ```rust
//! # use pushgate::{App, middleware};
//! App::new()
//!     .middleware(middleware::timing())    // outermost: times everything below
//!     .middleware(middleware::envelope()); // turns API outcomes into JSON
//! ```
//!
//! With timing registered first it wraps the envelope stage, so the
//! `server-timing` header lands on the final, already-enveloped response and
//! the measured duration includes the JSON conversion.

mod envelope;
mod timing;

pub use envelope::envelope;
pub use timing::{SERVER_TIMING, timing};
