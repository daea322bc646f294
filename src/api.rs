//! The push-notification HTTP surface.
//!
//! | Method | Path                                  | Handler                    |
//! |--------|---------------------------------------|----------------------------|
//! | GET    | `/api/application-server-key.json`    | [`application_server_key`] |
//! | POST   | `/api/submit-subscription`            | [`submit_subscription`]    |
//! | POST   | `/api/send-notification/<token>`      | [`send_notification`]      |
//! | GET    | `/`                                   | [`redirect_to_index`]      |
//!
//! Everything else falls through to the static file handler.

use http::{Method, StatusCode};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::app::App;
use crate::error::{Error, HttpError};
use crate::handler::Link;
use crate::hash::token_for;
use crate::inject::{Injected, ResourceKey};
use crate::middleware;
use crate::push::Pusher;
use crate::response::Response;
use crate::static_files::{self, STATIC_FILES, StaticFiles};
use crate::store::Store;
use crate::vapid::VapidKey;

pub const DB: ResourceKey<Store> = ResourceKey::new("db");
pub const VAPID: ResourceKey<VapidKey> = ResourceKey::new("vapid");
pub const PUSH: ResourceKey<Pusher> = ResourceKey::new("push");

const SENT: &str = "idk man what'd you want me to say. it worked.";

/// Why a JSON document was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Invalid {
    #[error("Expected a JSON object")]
    NotAnObject,

    #[error("Missing property '{0}'")]
    Missing(&'static str),

    #[error("Property '{0}' should be {1}")]
    WrongType(&'static str, &'static str),

    #[error("Optional property '{0}' should be a string")]
    OptionalNotString(&'static str),
}

/// Checks the shape of a `PushSubscription` as browsers serialize it.
/// Unknown extra fields are kept.
pub fn validate_subscription(value: &Value) -> Result<(), Invalid> {
    let obj = value.as_object().ok_or(Invalid::NotAnObject)?;
    match obj.get("endpoint") {
        None => return Err(Invalid::Missing("endpoint")),
        Some(v) if !v.is_string() => return Err(Invalid::WrongType("endpoint", "a string")),
        Some(_) => {}
    }
    match obj.get("keys") {
        None => Err(Invalid::Missing("keys")),
        Some(v) if !v.is_object() => Err(Invalid::WrongType("keys", "an object")),
        Some(_) => Ok(()),
    }
}

/// Checks a notification body: `title` required, `message` and `url`
/// optional, all strings.
pub fn validate_notification(value: &Value) -> Result<(), Invalid> {
    let obj = value.as_object().ok_or(Invalid::NotAnObject)?;
    match obj.get("title") {
        None => return Err(Invalid::Missing("title")),
        Some(v) if !v.is_string() => return Err(Invalid::WrongType("title", "a string")),
        Some(_) => {}
    }
    optional_string(obj, "message")?;
    optional_string(obj, "url")
}

fn optional_string(obj: &Map<String, Value>, field: &'static str) -> Result<(), Invalid> {
    match obj.get(field) {
        Some(v) if !v.is_string() => Err(Invalid::OptionalNotString(field)),
        _ => Ok(()),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// `{"key": <base64url public key>}`, for `pushManager.subscribe`.
pub async fn application_server_key(inj: Injected) -> Result<Value, Error> {
    let vapid = inj.resource(VAPID)?;
    Ok(json!({ "key": vapid.public_key() }))
}

/// Stores a subscription and answers with its token. Submitting the same
/// subscription again yields the same token.
pub async fn submit_subscription(inj: Injected) -> Result<Value, Error> {
    let request = inj.request()?;
    let subscription: Value = request
        .json()
        .map_err(|e| HttpError::bad_request(format!("Malformed json: {e}")))?;
    validate_subscription(&subscription).map_err(|e| HttpError::bad_request(e.to_string()))?;

    let token = token_for(&subscription);
    let db = inj.resource(DB)?;
    db.put(&token, &serde_json::to_string(&subscription)?).await?;

    info!(token = %token, "subscription registered");
    Ok(json!({ "token": token }))
}

/// Sends the request body, verbatim, as a push message to the subscription
/// stored under `token`.
pub async fn send_notification(inj: Injected) -> Result<&'static str, Error> {
    let token = inj.param("token")?;
    let db = inj.resource(DB)?;
    let stored = db
        .get(token)
        .await?
        .ok_or_else(|| HttpError::not_found(format!("Unknown token: {token}")))?;
    let subscription: Value = serde_json::from_str(&stored)?;

    let request = inj.request()?;
    let notification: Value = request
        .json()
        .map_err(|e| HttpError::bad_request(format!("Malformed json: {e}")))?;
    validate_notification(&notification)
        .map_err(|e| HttpError::bad_request(format!("Malformed json: {e}")))?;

    let push = inj.resource(PUSH)?;
    if let Err(e) = push.send(&subscription, request.body()).await {
        warn!(token, error = %e, "push relay rejected notification");
        return Err(HttpError::service_unavailable(format!(
            "Request to Web Push server failed: {e}"
        ))
        .into());
    }

    info!(token, "notification sent");
    Ok(SENT)
}

/// `GET /` sends browsers to the client page.
pub async fn redirect_to_index(_inj: Injected) -> Result<Response, Error> {
    Ok(Response::redirect(StatusCode::PERMANENT_REDIRECT, "/index.html"))
}

/// The full service: timing and envelope middleware, the API routes, the
/// shared resources, and static files for everything else.
pub fn app(store: Store, vapid: VapidKey, pusher: Pusher, statics: StaticFiles) -> App {
    App::new()
        .middleware(middleware::timing())
        .middleware(middleware::envelope())
        .resource(DB, store)
        .resource(VAPID, vapid)
        .resource(PUSH, pusher)
        .resource(STATIC_FILES, statics)
        .route(
            Method::GET,
            "/api/application-server-key.json",
            Link::handler("application_server_key", application_server_key).resource(VAPID),
        )
        .route(
            Method::POST,
            "/api/submit-subscription",
            Link::handler("submit_subscription", submit_subscription).request().resource(DB),
        )
        .route(
            Method::POST,
            "/api/send-notification/<token>",
            Link::handler("send_notification", send_notification)
                .request()
                .param("token")
                .resource(DB)
                .resource(PUSH),
        )
        .route(Method::GET, "/", Link::handler("redirect_to_index", redirect_to_index))
        .fallback(static_files::serve_static())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_shape() {
        let ok = json!({ "endpoint": "https://push.example/1", "keys": { "auth": "a" } });
        assert_eq!(validate_subscription(&ok), Ok(()));

        let cases = [
            (json!([]), "Expected a JSON object"),
            (json!({ "keys": {} }), "Missing property 'endpoint'"),
            (json!({ "endpoint": 1, "keys": {} }), "Property 'endpoint' should be a string"),
            (json!({ "endpoint": "e" }), "Missing property 'keys'"),
            (json!({ "endpoint": "e", "keys": "k" }), "Property 'keys' should be an object"),
        ];
        for (value, message) in cases {
            assert_eq!(validate_subscription(&value).unwrap_err().to_string(), message);
        }
    }

    #[test]
    fn notification_shape() {
        assert!(validate_notification(&json!({ "title": "t" })).is_ok());
        assert!(validate_notification(&json!({ "title": "t", "message": "m", "url": "/" })).is_ok());

        assert_eq!(validate_notification(&json!({})), Err(Invalid::Missing("title")));
        assert_eq!(
            validate_notification(&json!({ "title": 3 })),
            Err(Invalid::WrongType("title", "a string"))
        );
        assert_eq!(
            validate_notification(&json!({ "title": "t", "message": false }))
                .unwrap_err()
                .to_string(),
            "Optional property 'message' should be a string"
        );
        assert_eq!(
            validate_notification(&json!({ "title": "t", "url": null })),
            Err(Invalid::OptionalNotString("url"))
        );
    }
}
