//! # pushgate
//!
//! A Web Push relay for browser clients, built on a small middleware
//! framework of its own.
//!
//! ## The framework
//!
//! Every route is a chain of [`Link`]s: zero or more middleware followed by
//! exactly one handler. A middleware receives a [`Next`] continuation and
//! decides whether, and how, the rest of the chain runs. It can short-circuit,
//! post-process what comes back, or catch the error a downstream link raised.
//!
//! Links do not receive fixed arguments. Each one declares what it needs
//! (the [`Request`], the [`Application`], a route parameter, a shared
//! resource, the continuation) and [`App::build`] checks that every
//! declaration can be satisfied before the first request arrives.
//!
//! - Radix-tree routing with `<name>` placeholders, via [`matchit`]
//! - Onion-style composition, `next()` callable at most once per activation
//! - A JSON envelope for everything under the API prefix
//! - hyper 1 on tokio, graceful shutdown on SIGTERM / Ctrl-C
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::Method;
//! use pushgate::{App, Error, Injected, Link, ResourceKey, Server, middleware};
//! use serde_json::{Value, json};
//!
//! struct Greeting(String);
//! const GREETING: ResourceKey<Greeting> = ResourceKey::new("greeting");
//!
//! async fn hello(inj: Injected) -> Result<Value, Error> {
//!     let greeting = inj.resource(GREETING)?;
//!     let name = inj.param("name")?;
//!     Ok(json!(format!("{} {name}", greeting.0)))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dispatcher = App::new()
//!         .middleware(middleware::timing())
//!         .middleware(middleware::envelope())
//!         .resource(GREETING, Greeting("hello".into()))
//!         .route(
//!             Method::GET,
//!             "/api/hello/<name>",
//!             Link::handler("hello", hello).resource(GREETING).param("name"),
//!         )
//!         .build()?;
//!
//!     // GET /api/hello/ada → {"success":true,"data":"hello ada"}
//!     Server::bind(([0, 0, 0, 0], 8000).into()).serve(dispatcher).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## The service
//!
//! [`api::app`] assembles the push relay: VAPID key publication,
//! subscription registration, notification delivery, and the static client.

mod app;
mod chain;
mod error;
mod handler;
mod inject;
mod request;
mod response;
mod router;
mod server;

pub mod api;
pub mod config;
pub mod hash;
pub mod middleware;
pub mod push;
pub mod static_files;
pub mod store;
pub mod vapid;

pub use app::{App, Application, Dispatcher, Endpoint};
pub use chain::{Chain, Next};
pub use error::{ChainError, ConfigError, Error, HttpError, ServeError};
pub use handler::{BoxFuture, Link, Outcome, Role};
pub use inject::{Dep, Injected, ResourceKey, Resources};
pub use request::Request;
pub use response::{ContentType, IntoReply, Json, Reply, Response, ResponseBuilder};
pub use router::{Params, RouteMatch, Router};
pub use server::Server;
