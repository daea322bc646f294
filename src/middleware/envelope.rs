//! JSON envelope for the API namespace.
//!
//! Every outcome of a chain under the API prefix leaves as one of:
//!
//! ```text
//! {"success": true,  "data": <value>}                            200
//! {"success": false, "info": {"code": <int>, "message": <str>}}  <code>
//! ```
//!
//! Finished responses (a redirect, a file) pass through untouched. Requests
//! outside the prefix pass through entirely.

use tracing::{debug, error, warn};

use crate::error::{Error, HttpError};
use crate::handler::{Link, Outcome};
use crate::inject::Injected;
use crate::response::{Reply, failure_response};

/// The envelope middleware. Declares `app`, `request` and `next`.
pub fn envelope() -> Link {
    Link::middleware("envelope", convert_json).app().request().next()
}

async fn convert_json(inj: Injected) -> Outcome {
    let next = inj.next()?;
    let request = inj.request()?;
    if !inj.app()?.is_api_path(request.path()) {
        return next.run().await;
    }

    let (status, message) = match next.run().await {
        Ok(Reply::Response(res)) => return Ok(Reply::Response(res)),
        Ok(value @ Reply::Value(_)) => return Ok(Reply::Response(value.into_response()?)),
        Err(Error::Http(e)) => {
            if e.status.is_server_error() {
                warn!(path = request.path(), status = e.code(), message = %e.message, "API request failed");
            } else {
                debug!(path = request.path(), status = e.code(), message = %e.message, "API request rejected");
            }
            (e.status, e.message)
        }
        Err(Error::Chain(e)) => {
            error!(path = request.path(), error = %e, "middleware chain fault");
            let e = HttpError::internal();
            (e.status, e.message)
        }
        Err(e) => {
            error!(path = request.path(), error = %e, "unhandled error in API request");
            let e = HttpError::internal();
            (e.status, e.message)
        }
    };
    Ok(Reply::Response(failure_response(status, &message)?))
}
