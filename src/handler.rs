//! Chain links: middleware and handlers, type-erased.
//!
//! # How async links are stored
//!
//! A chain holds middleware and handlers of *different* concrete types in a
//! single slice. Rust collections can only hold one concrete type, so each
//! function is wrapped in a newtype that implements [`ErasedLink`] and stored
//! behind an `Arc<dyn ErasedLink>`.
//!
//! ```text
//! async fn submit(inj: Injected) -> Result<Json<T>, Error> { … }  ← user writes this
//!        ↓ Link::handler("submit", submit).request()
//! Arc::new(FnHandler(submit))                   ← heap-allocated wrapper
//!        ↓  stored in Link { deps, role, call }
//! link.call.call(injected)  at request time      ← one vtable dispatch
//!        ↓
//! Box::pin(async { submit(inj).await?.into_reply() })   ← BoxFuture
//! ```
//!
//! Handlers return `Result<impl IntoReply, Error>`. Middleware return the
//! chain's own currency, `Result<Reply, Error>`, because they mostly pass
//! through what `next` gave them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::inject::{Dep, Injected, ResourceKey};
use crate::response::{IntoReply, Reply};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` let tokio move it across worker threads.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// What every link resolves to.
pub type Outcome = Result<Reply, Error>;

/// Internal dispatch interface.
#[doc(hidden)]
pub trait ErasedLink: Send + Sync + 'static {
    fn call(&self, inj: Injected) -> BoxFuture<Outcome>;
}

/// Whether a link sits in the middle of a chain or at its end.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Middleware,
    Handler,
}

impl Role {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Middleware => "middleware",
            Self::Handler => "handler",
        }
    }
}

// ── Link ──────────────────────────────────────────────────────────────────────

/// One element of a middleware chain plus the names it depends on.
///
/// ```rust
/// use pushgate::{Error, Injected, Link, Outcome};
///
/// async fn log_path(inj: Injected) -> Outcome {
///     let path = inj.request()?.path().to_owned();
///     let out = inj.next()?.run().await;
///     tracing::debug!(%path, ok = out.is_ok(), "handled");
///     out
/// }
///
/// async fn hello(_inj: Injected) -> Result<&'static str, Error> {
///     Ok("hello")
/// }
///
/// let mw = Link::middleware("log_path", log_path).request().next();
/// let handler = Link::handler("hello", hello);
/// ```
#[derive(Clone)]
pub struct Link {
    pub(crate) name: &'static str,
    pub(crate) role: Role,
    pub(crate) deps: Vec<Dep>,
    pub(crate) call: Arc<dyn ErasedLink>,
}

impl Link {
    /// Wraps a middleware function. Declare `.next()` if it delegates.
    pub fn middleware<F, Fut>(name: &'static str, f: F) -> Self
    where
        F: Fn(Injected) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        Self { name, role: Role::Middleware, deps: Vec::new(), call: Arc::new(FnMiddleware(f)) }
    }

    /// Wraps a terminal handler. Handlers never get `next`.
    pub fn handler<F, Fut, R>(name: &'static str, f: F) -> Self
    where
        F: Fn(Injected) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoReply + Send + 'static,
    {
        Self { name, role: Role::Handler, deps: Vec::new(), call: Arc::new(FnHandler(f)) }
    }

    pub fn name(&self) -> &'static str { self.name }
    pub fn role(&self) -> Role { self.role }
    pub fn deps(&self) -> &[Dep] { &self.deps }

    /// Declares a dependency. Declaring the same one twice is harmless.
    pub fn with(mut self, dep: Dep) -> Self {
        if !self.deps.contains(&dep) {
            self.deps.push(dep);
        }
        self
    }

    pub fn app(self) -> Self { self.with(Dep::App) }
    pub fn request(self) -> Self { self.with(Dep::Request) }
    pub fn next(self) -> Self { self.with(Dep::Next) }

    pub fn resource<T>(self, key: ResourceKey<T>) -> Self {
        self.with(Dep::Resource(key.name()))
    }

    pub fn param(self, name: &str) -> Self {
        self.with(Dep::Param(name.to_owned()))
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("deps", &self.deps)
            .finish()
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

struct FnMiddleware<F>(F);

impl<F, Fut> ErasedLink for FnMiddleware<F>
where
    F: Fn(Injected) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    fn call(&self, inj: Injected) -> BoxFuture<Outcome> {
        Box::pin((self.0)(inj))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedLink for FnHandler<F>
where
    F: Fn(Injected) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn call(&self, inj: Injected) -> BoxFuture<Outcome> {
        // Run the wrapped function, then lift its success value into a Reply
        // so every link in the chain speaks the same type.
        let fut = (self.0)(inj);
        Box::pin(async move { fut.await?.into_reply() })
    }
}
