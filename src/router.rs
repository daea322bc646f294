//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. A pattern is a plain
//! path whose segments may be single named placeholders:
//! `/api/send-notification/<token>`. Captures are strings; there are no
//! wildcards and no type coercion.
//!
//! The router knows nothing about chains. It stores whatever the
//! [`App`](crate::App) registers and answers three ways: a match, a path that
//! exists under another method, or nothing.

use std::collections::HashMap;

use http::Method;
use matchit::{InsertError, Router as MatchitRouter};

use crate::error::ConfigError;

/// Path parameters captured by a match, by placeholder name.
pub type Params = HashMap<String, String>;

/// Result of [`Router::lookup`].
#[derive(Debug)]
pub enum RouteMatch<'a, T> {
    Found { value: &'a T, params: Params },
    /// The path is routed, just not for this method. `allowed` is sorted.
    MethodNotAllowed { allowed: Vec<Method> },
    NotFound,
}

/// Method + pattern → value table.
pub struct Router<T> {
    routes: HashMap<Method, MatchitRouter<T>>,
}

impl<T> Router<T> {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Registers `value` under `method` + `pattern`.
    ///
    /// Fails on a malformed pattern or when the pair is already taken.
    pub fn register(&mut self, method: Method, pattern: &str, value: T) -> Result<(), ConfigError> {
        let compiled = compile(pattern)?;
        self.routes
            .entry(method.clone())
            .or_default()
            .insert(compiled.path, value)
            .map_err(|e| match e {
                InsertError::Conflict { .. } => ConfigError::DuplicateRoute {
                    method,
                    pattern: pattern.to_owned(),
                },
                other => ConfigError::InvalidPattern {
                    pattern: pattern.to_owned(),
                    reason: other.to_string(),
                },
            })
    }

    /// Looks up `method` + `path`. `HEAD` falls back to the `GET` route of
    /// the same path.
    pub fn lookup(&self, method: &Method, path: &str) -> RouteMatch<'_, T> {
        if let Some(found) = self.find(method, path) {
            return found;
        }
        if *method == Method::HEAD {
            if let Some(found) = self.find(&Method::GET, path) {
                return found;
            }
        }

        let mut allowed: Vec<Method> = self.routes.iter()
            .filter(|(m, tree)| *m != method && tree.at(path).is_ok())
            .map(|(m, _)| m.clone())
            .collect();
        if allowed.is_empty() {
            return RouteMatch::NotFound;
        }
        if allowed.contains(&Method::GET) && !allowed.contains(&Method::HEAD) {
            allowed.push(Method::HEAD);
        }
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        RouteMatch::MethodNotAllowed { allowed }
    }

    fn find(&self, method: &Method, path: &str) -> Option<RouteMatch<'_, T>> {
        let matched = self.routes.get(method)?.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some(RouteMatch::Found { value: matched.value, params })
    }
}

impl<T> Default for Router<T> {
    fn default() -> Self { Self::new() }
}

/// A pattern translated to matchit syntax, with its placeholder names.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Compiled {
    pub(crate) path: String,
    pub(crate) params: Vec<String>,
}

/// Translates `/a/<name>/b` into `/a/{name}/b`, rejecting anything richer.
pub(crate) fn compile(pattern: &str) -> Result<Compiled, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidPattern {
        pattern: pattern.to_owned(),
        reason: reason.to_owned(),
    };

    let Some(rest) = pattern.strip_prefix('/') else {
        return Err(invalid("must start with `/`"));
    };

    let mut path = String::with_capacity(pattern.len());
    let mut params: Vec<String> = Vec::new();
    for segment in rest.split('/') {
        path.push('/');
        if let Some(name) = segment.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid("placeholder names are [A-Za-z0-9_]+"));
            }
            if params.iter().any(|p| p == name) {
                return Err(invalid("placeholder used twice"));
            }
            path.push('{');
            path.push_str(name);
            path.push('}');
            params.push(name.to_owned());
        } else if segment.contains(['<', '>', '{', '}', '*']) {
            return Err(invalid("placeholders must span a whole segment"));
        } else {
            path.push_str(segment);
        }
    }
    Ok(Compiled { path, params })
}
