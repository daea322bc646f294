//! Application builder and request dispatcher.
//!
//! [`App`] collects global middleware, routes, and shared resources.
//! [`App::build`] validates the whole table once and freezes it into a
//! [`Dispatcher`], which the [`Server`](crate::Server) drives per request.
//!
//! ```rust
//! use http::Method;
//! use pushgate::{App, Error, Injected, Link, middleware};
//!
//! async fn ping(_inj: Injected) -> Result<&'static str, Error> {
//!     Ok("pong")
//! }
//!
//! let dispatcher = App::new()
//!     .middleware(middleware::timing())
//!     .middleware(middleware::envelope())
//!     .route(Method::GET, "/api/ping", Link::handler("ping", ping))
//!     .build()
//!     .expect("valid route table");
//! ```
//!
//! Global middleware are snapshotted when a route is registered: a
//! middleware added after a route does not wrap it.
//!
//! # Unmatched requests
//!
//! A request no route claims still runs through the global middleware,
//! ending in a built-in handler that raises `404` (or `405` when the path
//! exists under another method). Under the API prefix the envelope
//! middleware turns that into a JSON error like any other; elsewhere the
//! dispatcher renders a plain-text error page. A `405` carries an `allow`
//! header listing the methods the path does accept.
//!
//! `HEAD` runs the `GET` route of the same path; the body is dropped on the
//! way out.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{ALLOW, HeaderValue};
use http::{Method, StatusCode};
use tracing::{debug, error};

use crate::chain::Chain;
use crate::error::{ConfigError, Error, HttpError};
use crate::handler::{Link, Role};
use crate::inject::{Context, Dep, ResourceKey, Resources};
use crate::request::Request;
use crate::response::Response;
use crate::router::{self, Params, RouteMatch, Router};

const DEFAULT_API_PREFIX: &str = "/api";

const NOT_FOUND_MESSAGE: &str = "The requested URL was not found on the server. \
     If you entered the URL manually please check your spelling and try again.";
const METHOD_NOT_ALLOWED_MESSAGE: &str = "The method is not allowed for the requested URL.";

// ── Application ───────────────────────────────────────────────────────────────

/// The frozen, shared half of an app: what `Dep::App` injects.
#[derive(Debug)]
pub struct Application {
    api_prefix: String,
    resources: Resources,
}

impl Application {
    pub(crate) fn new(api_prefix: impl Into<String>, resources: Resources) -> Self {
        Self { api_prefix: api_prefix.into(), resources }
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    /// Whether `path` is the API prefix itself or lies below it.
    pub fn is_api_path(&self, path: &str) -> bool {
        match path.strip_prefix(self.api_prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }
}

// ── App ───────────────────────────────────────────────────────────────────────

struct RouteDef {
    method: Method,
    pattern: String,
    links: Vec<Link>,
}

/// Application builder.
pub struct App {
    api_prefix: String,
    global: Vec<Link>,
    routes: Vec<RouteDef>,
    resources: Resources,
    fallback: Link,
    errors: Vec<ConfigError>,
}

impl App {
    pub fn new() -> Self {
        Self {
            api_prefix: DEFAULT_API_PREFIX.to_owned(),
            global: Vec::new(),
            routes: Vec::new(),
            resources: Resources::new(),
            fallback: Link::handler("not_found", not_found),
            errors: Vec::new(),
        }
    }

    /// Path prefix of the API namespace. Defaults to `/api`.
    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    /// Appends a global middleware. Earlier middleware wrap later ones.
    pub fn middleware(mut self, link: Link) -> Self {
        self.global.push(link);
        self
    }

    /// Registers a route with no route-specific middleware.
    pub fn route(self, method: Method, pattern: &str, handler: Link) -> Self {
        self.route_with(method, pattern, Vec::new(), handler)
    }

    /// Registers a route. Its chain is the global middleware registered so
    /// far, then `middleware`, then `handler`.
    pub fn route_with(
        mut self,
        method: Method,
        pattern: &str,
        middleware: Vec<Link>,
        handler: Link,
    ) -> Self {
        let mut links = self.global.clone();
        links.extend(middleware);
        links.push(handler);
        self.routes.push(RouteDef { method, pattern: pattern.to_owned(), links });
        self
    }

    /// Adds a shared resource under `key`.
    pub fn resource<T: Send + Sync + 'static>(mut self, key: ResourceKey<T>, value: T) -> Self {
        if let Err(e) = self.resources.insert(key, value) {
            self.errors.push(e);
        }
        self
    }

    /// Replaces the handler that ends the chain for unrouted requests.
    pub fn fallback(mut self, handler: Link) -> Self {
        self.fallback = handler;
        self
    }

    /// Validates every chain and freezes the app.
    ///
    /// Returns the first problem found: a duplicate or malformed route, a
    /// duplicate resource, a dependency that can never be satisfied, or a
    /// chain whose shape is wrong.
    pub fn build(self) -> Result<Dispatcher, ConfigError> {
        if let Some(e) = self.errors.into_iter().next() {
            return Err(e);
        }

        let mut router = Router::new();
        for def in self.routes {
            let compiled = router::compile(&def.pattern)?;
            validate(&def.pattern, &def.links, &compiled.params, &self.resources)?;
            let endpoint = Endpoint {
                id: format!("{} {}", def.method, def.pattern),
                chain: Chain::compose(def.links),
            };
            router.register(def.method, &def.pattern, endpoint)?;
        }

        let mut not_found = self.global.clone();
        not_found.push(self.fallback);
        validate("<fallback>", &not_found, &[], &self.resources)?;

        let mut method_not_allowed = self.global;
        method_not_allowed.push(Link::handler("method_not_allowed", method_not_allowed_handler));
        validate("<fallback>", &method_not_allowed, &[], &self.resources)?;

        Ok(Dispatcher {
            app: Arc::new(Application::new(self.api_prefix, self.resources)),
            router,
            not_found: Chain::compose(not_found),
            method_not_allowed: Chain::compose(method_not_allowed),
        })
    }
}

impl Default for App {
    fn default() -> Self { Self::new() }
}

/// Checks one composed chain against the resource pool and its pattern.
fn validate(
    pattern: &str,
    links: &[Link],
    params: &[String],
    resources: &Resources,
) -> Result<(), ConfigError> {
    let Some((terminal, middleware)) = links.split_last() else {
        return Ok(());
    };

    if terminal.role != Role::Handler {
        return Err(wrong_role(terminal, Role::Handler));
    }
    if terminal.deps.contains(&Dep::Next) {
        return Err(ConfigError::NextInTerminal {
            link: terminal.name.to_owned(),
            pattern: pattern.to_owned(),
        });
    }
    if let Some(link) = middleware.iter().find(|l| l.role != Role::Middleware) {
        return Err(wrong_role(link, Role::Middleware));
    }

    let params: HashSet<&str> = params.iter().map(String::as_str).collect();
    for link in links {
        for dep in &link.deps {
            match dep {
                Dep::Resource(name) if !resources.contains(name) => {
                    return Err(ConfigError::MissingResource {
                        link: link.name.to_owned(),
                        resource: *name,
                    });
                }
                Dep::Param(name) if !params.contains(name.as_str()) => {
                    return Err(ConfigError::MissingParam {
                        link: link.name.to_owned(),
                        param: name.clone(),
                        pattern: pattern.to_owned(),
                    });
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn wrong_role(link: &Link, expected: Role) -> ConfigError {
    ConfigError::WrongRole {
        link: link.name.to_owned(),
        expected: expected.as_str(),
        actual: link.role.as_str(),
    }
}

async fn not_found(_inj: crate::Injected) -> Result<Response, Error> {
    Err(HttpError::not_found(NOT_FOUND_MESSAGE).into())
}

async fn method_not_allowed_handler(_inj: crate::Injected) -> Result<Response, Error> {
    Err(HttpError::method_not_allowed(METHOD_NOT_ALLOWED_MESSAGE).into())
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// A registered route: its identifier and composed chain.
#[derive(Debug)]
pub struct Endpoint {
    pub id: String,
    pub chain: Chain,
}

/// The frozen app. Routes one request to one chain and adapts the outcome
/// into a response.
pub struct Dispatcher {
    app: Arc<Application>,
    router: Router<Endpoint>,
    not_found: Chain,
    method_not_allowed: Chain,
}

impl Dispatcher {
    pub fn application(&self) -> &Application {
        &self.app
    }

    /// Handles one request end to end. Never fails: every error becomes a
    /// response.
    pub async fn handle(&self, request: Request) -> Response {
        let method = request.method().clone();
        let path = request.path().to_owned();
        let client = request.forwarded_for().map(str::to_owned);

        let mut allow = None;
        let (endpoint, chain, params) = match self.router.lookup(&method, &path) {
            RouteMatch::Found { value, params } => (value.id.as_str(), &value.chain, params),
            RouteMatch::MethodNotAllowed { allowed } => {
                allow = Some(allowed);
                ("<method not allowed>", &self.method_not_allowed, Params::new())
            }
            RouteMatch::NotFound => ("<not found>", &self.not_found, Params::new()),
        };

        let ctx = Context { app: Arc::clone(&self.app), request: Arc::new(request), params };
        let mut response = finalize(chain.invoke(ctx).await);

        if let Some(allowed) = allow {
            let list = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
            if let Ok(value) = HeaderValue::try_from(list) {
                response.headers_mut().insert(ALLOW, value);
            }
        }
        if method == Method::HEAD {
            response.body = Bytes::new();
        }

        debug!(
            %method,
            %path,
            endpoint,
            client = client.as_deref(),
            status = response.status_code().as_u16(),
            "request handled"
        );
        response
    }
}

/// Adapts a chain outcome into the transport response.
fn finalize(outcome: crate::Outcome) -> Response {
    let result = outcome.and_then(|reply| reply.into_response());
    match result {
        Ok(res) => res,
        Err(Error::Http(e)) => error_page(e.status, &e.message),
        Err(Error::Chain(e)) => {
            error!(error = %e, "middleware chain fault");
            error_page(StatusCode::INTERNAL_SERVER_ERROR, &HttpError::internal().message)
        }
        Err(e) => {
            error!(error = %e, "unhandled error");
            error_page(StatusCode::INTERNAL_SERVER_ERROR, &HttpError::internal().message)
        }
    }
}

/// The plain-text default error page for responses outside the API.
fn error_page(status: StatusCode, message: &str) -> Response {
    let reason = status.canonical_reason().unwrap_or("Error");
    Response::builder()
        .status(status)
        .text(format!("{} {reason}\n\n{message}\n", status.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::HeaderMap;
    use serde_json::{Value, json};

    use crate::Injected;

    struct Greeting(&'static str);
    const GREETING: ResourceKey<Greeting> = ResourceKey::new("greeting");

    async fn greet(inj: Injected) -> Result<Value, Error> {
        let greeting = inj.resource(GREETING)?;
        let name = inj.param("name")?;
        Ok(json!(format!("{} {name}", greeting.0)))
    }

    async fn passthrough(inj: Injected) -> crate::Outcome {
        inj.next()?.run().await
    }

    fn greet_link() -> Link {
        Link::handler("greet", greet).resource(GREETING).param("name")
    }

    fn get(path: &str) -> Request {
        Request::new(Method::GET, path, HeaderMap::new(), Bytes::new())
    }

    #[tokio::test]
    async fn injects_resources_and_params() {
        let dispatcher = App::new()
            .resource(GREETING, Greeting("hello"))
            .route(Method::GET, "/greet/<name>", greet_link())
            .build()
            .unwrap();

        let res = dispatcher.handle(get("/greet/ada")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body, json!({ "success": true, "data": "hello ada" }));
    }

    #[test]
    fn missing_resource_fails_the_build() {
        let err = App::new()
            .route(Method::GET, "/greet/<name>", greet_link())
            .build()
            .err()
            .unwrap();
        assert_eq!(
            err,
            ConfigError::MissingResource { link: "greet".into(), resource: "greeting" }
        );
    }

    #[test]
    fn missing_param_fails_the_build() {
        let err = App::new()
            .resource(GREETING, Greeting("hi"))
            .route(Method::GET, "/greet", greet_link())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingParam { ref param, .. } if param == "name"));
    }

    #[test]
    fn handler_declaring_next_fails_the_build() {
        let err = App::new()
            .route(Method::GET, "/", Link::handler("greedy", greet).next())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::NextInTerminal { ref link, .. } if link == "greedy"));
    }

    #[test]
    fn roles_are_checked() {
        let err = App::new()
            .route(Method::GET, "/", Link::middleware("mw", passthrough).next())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::WrongRole { expected: "handler", .. }));

        let err = App::new()
            .resource(GREETING, Greeting("hi"))
            .route_with(Method::GET, "/greet/<name>", vec![greet_link()], greet_link())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::WrongRole { expected: "middleware", .. }));
    }

    #[test]
    fn duplicate_route_fails_the_build() {
        let err = App::new()
            .resource(GREETING, Greeting("hi"))
            .route(Method::GET, "/greet/<name>", greet_link())
            .route(Method::GET, "/greet/<name>", greet_link())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::DuplicateRoute { .. }));
    }

    #[test]
    fn duplicate_resource_fails_the_build() {
        let err = App::new()
            .resource(GREETING, Greeting("a"))
            .resource(GREETING, Greeting("b"))
            .build()
            .err()
            .unwrap();
        assert_eq!(err, ConfigError::DuplicateResource("greeting"));
    }

    #[test]
    fn global_middleware_is_snapshotted_per_route() {
        let dispatcher = App::new()
            .resource(GREETING, Greeting("hi"))
            .route(Method::GET, "/early/<name>", greet_link())
            .middleware(Link::middleware("late", passthrough).next())
            .route(Method::GET, "/late/<name>", greet_link())
            .build()
            .unwrap();

        let chain_len = |path: &str| match dispatcher.router.lookup(&Method::GET, path) {
            RouteMatch::Found { value, .. } => value.chain.links().len(),
            _ => panic!("route {path} missing"),
        };
        assert_eq!(chain_len("/early/x"), 1);
        assert_eq!(chain_len("/late/x"), 2);
    }

    #[tokio::test]
    async fn unrouted_requests_get_plain_error_pages() {
        let dispatcher = App::new()
            .resource(GREETING, Greeting("hi"))
            .route(Method::GET, "/greet/<name>", greet_link())
            .build()
            .unwrap();

        let res = dispatcher.handle(get("/nowhere")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(res.header("content-type"), Some("text/plain; charset=utf-8"));

        let post = Request::new(Method::POST, "/greet/ada", HeaderMap::new(), Bytes::new());
        let res = dispatcher.handle(post).await;
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header("allow"), Some("GET, HEAD"));
    }

    #[tokio::test]
    async fn head_runs_the_get_route_without_a_body() {
        let dispatcher = App::new()
            .resource(GREETING, Greeting("hi"))
            .route(Method::GET, "/greet/<name>", greet_link())
            .build()
            .unwrap();

        let head = Request::new(Method::HEAD, "/greet/ada", HeaderMap::new(), Bytes::new());
        let res = dispatcher.handle(head).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert!(res.body().is_empty());
    }

    #[tokio::test]
    async fn chain_faults_become_500() {
        async fn twice(inj: Injected) -> crate::Outcome {
            let next = inj.next()?;
            let _ = next.run().await;
            next.run().await
        }
        let dispatcher = App::new()
            .middleware(Link::middleware("twice", twice).next())
            .resource(GREETING, Greeting("hi"))
            .route(Method::GET, "/greet/<name>", greet_link())
            .build()
            .unwrap();

        let res = dispatcher.handle(get("/greet/ada")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn api_prefix_is_segment_aware() {
        let app = Application::new("/api", Resources::new());
        assert!(app.is_api_path("/api"));
        assert!(app.is_api_path("/api/submit-subscription"));
        assert!(!app.is_api_path("/apix"));
        assert!(!app.is_api_path("/index.html"));
    }
}
