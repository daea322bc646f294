//! Dependency injection by declared name.
//!
//! Every chain link states up front what it needs ([`Dep`]). Per request the
//! injector looks those names up in the request context and hands the link
//! an [`Injected`] holding exactly that subset. Whether a declared name
//! can ever be satisfied is checked once in
//! [`App::build`](crate::App::build), so at request time a miss means the
//! pool or route table changed shape, and is reported as a chain fault.
//!
//! Shared resources are keyed by [`ResourceKey<T>`]: the name is what links
//! declare, the type parameter is what they get back.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::app::Application;
use crate::chain::Next;
use crate::error::{ChainError, ConfigError, Error};
use crate::request::Request;
use crate::router::Params;

/// A named value a link asks for.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Dep {
    /// The running [`Application`].
    App,
    /// The current [`Request`].
    Request,
    /// The continuation to the rest of the chain.
    Next,
    /// A shared resource by registered name.
    Resource(&'static str),
    /// A path parameter by placeholder name.
    Param(String),
}

impl fmt::Display for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::App => f.write_str("app"),
            Self::Request => f.write_str("request"),
            Self::Next => f.write_str("next"),
            Self::Resource(name) => write!(f, "resource `{name}`"),
            Self::Param(name) => write!(f, "param `{name}`"),
        }
    }
}

// ── Resources ─────────────────────────────────────────────────────────────────

/// Typed handle to a shared resource.
///
/// ```rust
/// use pushgate::ResourceKey;
///
/// struct Clock;
/// const CLOCK: ResourceKey<Clock> = ResourceKey::new("clock");
/// ```
pub struct ResourceKey<T> {
    name: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> ResourceKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self { name, _type: PhantomData }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ResourceKey<T> {
    fn clone(&self) -> Self { *self }
}

impl<T> Copy for ResourceKey<T> {}

impl<T> fmt::Debug for ResourceKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourceKey").field(&self.name).finish()
    }
}

type AnyResource = Arc<dyn Any + Send + Sync>;

/// The shared resource pool. Filled before serving, read-only afterwards.
#[derive(Clone, Default)]
pub struct Resources {
    entries: HashMap<&'static str, AnyResource>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Send + Sync + 'static>(
        &mut self,
        key: ResourceKey<T>,
        value: T,
    ) -> Result<(), ConfigError> {
        if self.entries.contains_key(key.name) {
            return Err(ConfigError::DuplicateResource(key.name));
        }
        self.entries.insert(key.name, Arc::new(value));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Typed lookup. `None` when absent or registered under another type.
    pub fn get<T: Send + Sync + 'static>(&self, key: ResourceKey<T>) -> Option<Arc<T>> {
        self.entries.get(key.name).cloned()?.downcast::<T>().ok()
    }

    fn get_raw(&self, name: &str) -> Option<AnyResource> {
        self.entries.get(name).cloned()
    }
}

impl fmt::Debug for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("Resources").field("names", &names).finish()
    }
}

// ── Per-request context ───────────────────────────────────────────────────────

/// Everything one request could offer a link. Built fresh per request.
pub(crate) struct Context {
    pub(crate) app: Arc<Application>,
    pub(crate) request: Arc<Request>,
    pub(crate) params: Params,
}

// ── Injected ──────────────────────────────────────────────────────────────────

/// The declared subset of the request context, handed to one link.
///
/// Every accessor fails with [`ChainError::Unresolved`] for a name the link
/// did not declare.
pub struct Injected {
    link: &'static str,
    app: Option<Arc<Application>>,
    request: Option<Arc<Request>>,
    next: Option<Next>,
    resources: HashMap<&'static str, AnyResource>,
    params: HashMap<String, String>,
}

impl Injected {
    /// Picks `deps` out of `ctx`. Fails on the first one the context lacks.
    pub(crate) fn resolve(
        link: &'static str,
        deps: &[Dep],
        ctx: &Context,
        next: Next,
    ) -> Result<Self, ChainError> {
        let mut injected = Self {
            link,
            app: None,
            request: None,
            next: None,
            resources: HashMap::new(),
            params: HashMap::new(),
        };
        for dep in deps {
            match dep {
                Dep::App => injected.app = Some(Arc::clone(&ctx.app)),
                Dep::Request => injected.request = Some(Arc::clone(&ctx.request)),
                Dep::Next => injected.next = Some(next.clone()),
                Dep::Resource(name) => {
                    let value = ctx.app.resources().get_raw(name)
                        .ok_or_else(|| unresolved(link, dep))?;
                    injected.resources.insert(*name, value);
                }
                Dep::Param(name) => {
                    let value = ctx.params.get(name).ok_or_else(|| unresolved(link, dep))?;
                    injected.params.insert(name.clone(), value.clone());
                }
            }
        }
        Ok(injected)
    }

    /// Name of the link this was resolved for.
    pub fn link(&self) -> &'static str {
        self.link
    }

    pub fn app(&self) -> Result<&Application, Error> {
        self.app.as_deref().ok_or_else(|| self.missing(&Dep::App))
    }

    pub fn request(&self) -> Result<&Request, Error> {
        self.request.as_deref().ok_or_else(|| self.missing(&Dep::Request))
    }

    pub fn next(&self) -> Result<Next, Error> {
        self.next.clone().ok_or_else(|| self.missing(&Dep::Next))
    }

    pub fn resource<T: Send + Sync + 'static>(&self, key: ResourceKey<T>) -> Result<Arc<T>, Error> {
        self.resources
            .get(key.name)
            .cloned()
            .and_then(|v| v.downcast::<T>().ok())
            .ok_or_else(|| self.missing(&Dep::Resource(key.name)))
    }

    pub fn param(&self, name: &str) -> Result<&str, Error> {
        self.params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| self.missing(&Dep::Param(name.to_owned())))
    }

    fn missing(&self, dep: &Dep) -> Error {
        unresolved(self.link, dep).into()
    }
}

fn unresolved(link: &str, dep: &Dep) -> ChainError {
    ChainError::Unresolved { link: link.to_owned(), dependency: dep.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);
    struct Other;

    const COUNTER: ResourceKey<Counter> = ResourceKey::new("counter");
    const COUNTER_AS_OTHER: ResourceKey<Other> = ResourceKey::new("counter");

    #[test]
    fn typed_lookup() {
        let mut pool = Resources::new();
        pool.insert(COUNTER, Counter(7)).unwrap();
        assert_eq!(pool.get(COUNTER).map(|c| c.0), Some(7));
        assert!(pool.get(COUNTER_AS_OTHER).is_none());
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut pool = Resources::new();
        pool.insert(COUNTER, Counter(1)).unwrap();
        assert_eq!(
            pool.insert(COUNTER_AS_OTHER, Other).unwrap_err(),
            ConfigError::DuplicateResource("counter")
        );
    }

    #[test]
    fn dep_display_names_the_dependency() {
        assert_eq!(Dep::Resource("db").to_string(), "resource `db`");
        assert_eq!(Dep::Param("token".into()).to_string(), "param `token`");
        assert_eq!(Dep::Next.to_string(), "next");
    }
}
