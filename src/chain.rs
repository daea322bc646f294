//! Onion-style middleware composition.
//!
//! A [`Chain`] is an ordered list of links: middleware first, the handler
//! last. Invoking it runs link 0; each link's [`Next`] runs the link after
//! it. Return values unwind in reverse, so every middleware sees (and may
//! replace) what the rest of the chain produced.
//!
//! ```text
//!   A before ─▶ B before ─▶ handler
//!   A after  ◀─ B after  ◀──┘
//! ```
//!
//! Each invocation carries one cursor, the highest index dispatched so far,
//! starting at -1. Dispatching an index at or below the cursor means some
//! link ran its continuation a second time; dispatching past the end means
//! the terminal link asked for a continuation it does not have. Both are
//! [`ChainError`]s, never business errors.

use std::sync::Arc;
use std::sync::atomic::{AtomicIsize, Ordering};

use crate::error::ChainError;
use crate::handler::{BoxFuture, Link, Outcome};
use crate::inject::{Context, Injected};

/// A composed, immutable list of links. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Chain {
    links: Arc<[Link]>,
}

impl Chain {
    pub fn compose(links: Vec<Link>) -> Self {
        Self { links: links.into() }
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Runs the chain for one request. Each call gets its own cursor.
    pub(crate) async fn invoke(&self, ctx: Context) -> Outcome {
        let activation = Arc::new(Activation {
            links: Arc::clone(&self.links),
            ctx,
            cursor: AtomicIsize::new(-1),
        });
        dispatch(activation, 0).await
    }
}

/// The activation record of one chain invocation. Never outlives the request.
struct Activation {
    links: Arc<[Link]>,
    ctx: Context,
    cursor: AtomicIsize,
}

/// The rest of the chain, as seen from one link.
#[derive(Clone)]
pub struct Next {
    activation: Arc<Activation>,
    index: usize,
}

impl Next {
    /// Runs the remaining links and returns their outcome.
    ///
    /// At most once per link; a second run fails with
    /// [`ChainError::NextCalledMultipleTimes`].
    pub async fn run(&self) -> Outcome {
        dispatch(Arc::clone(&self.activation), self.index).await
    }
}

fn dispatch(activation: Arc<Activation>, index: usize) -> BoxFuture<Outcome> {
    Box::pin(async move {
        let links = &activation.links;

        // fetch_max leaves the cursor alone when `index` is not ahead of it.
        let previous = activation.cursor.fetch_max(index as isize, Ordering::AcqRel);
        if index as isize <= previous {
            let caller = index.checked_sub(1).and_then(|i| links.get(i));
            return Err(ChainError::NextCalledMultipleTimes {
                link: caller.map_or("<chain>", |l| l.name).to_owned(),
            }
            .into());
        }

        let Some(link) = links.get(index) else {
            return Err(ChainError::NextFromTerminal {
                link: links.last().map_or("<empty chain>", |l| l.name).to_owned(),
            }
            .into());
        };

        let next = Next { activation: Arc::clone(&activation), index: index + 1 };
        let injected = Injected::resolve(link.name, &link.deps, &activation.ctx, next)?;
        link.call.call(injected).await
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;
    use http::{HeaderMap, Method, StatusCode};
    use parking_lot::Mutex;
    use serde_json::{Value, json};

    use crate::app::Application;
    use crate::error::{Error, HttpError};
    use crate::inject::{Dep, Resources};
    use crate::request::Request;
    use crate::response::{Reply, Response};
    use crate::router::Params;

    type Trace = Arc<Mutex<Vec<String>>>;

    fn ctx() -> Context {
        Context {
            app: Arc::new(Application::new("/api", Resources::new())),
            request: Arc::new(Request::new(Method::GET, "/", HeaderMap::new(), Bytes::new())),
            params: Params::new(),
        }
    }

    fn recording(name: &'static str, trace: &Trace) -> Link {
        let trace = Arc::clone(trace);
        Link::middleware(name, move |inj: Injected| {
            let trace = Arc::clone(&trace);
            async move {
                trace.lock().push(format!("{name} before"));
                let out = inj.next()?.run().await;
                trace.lock().push(format!("{name} after"));
                out
            }
        })
        .next()
    }

    fn recording_handler(trace: &Trace) -> Link {
        let trace = Arc::clone(trace);
        Link::handler("handler", move |_inj: Injected| {
            let trace = Arc::clone(&trace);
            async move {
                trace.lock().push("handler".to_owned());
                Ok::<_, Error>(json!("done"))
            }
        })
    }

    fn value(out: Outcome) -> Value {
        match out {
            Ok(Reply::Value(v)) => v,
            other => panic!("expected a plain value, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn runs_onion_order() {
        let trace: Trace = Arc::default();
        let chain = Chain::compose(vec![
            recording("A", &trace),
            recording("B", &trace),
            recording_handler(&trace),
        ]);

        assert_eq!(value(chain.invoke(ctx()).await), json!("done"));
        assert_eq!(
            *trace.lock(),
            ["A before", "B before", "handler", "B after", "A after"]
        );
    }

    #[tokio::test]
    async fn each_invocation_gets_a_fresh_cursor() {
        let trace: Trace = Arc::default();
        let chain = Chain::compose(vec![recording("A", &trace), recording_handler(&trace)]);

        assert!(chain.invoke(ctx()).await.is_ok());
        assert!(chain.invoke(ctx()).await.is_ok());
        assert_eq!(trace.lock().iter().filter(|s| *s == "handler").count(), 2);
    }

    #[tokio::test]
    async fn next_twice_is_a_chain_error() {
        let trace: Trace = Arc::default();
        let twice = Link::middleware("twice", |inj: Injected| async move {
            let next = inj.next()?;
            let _ = next.run().await;
            next.run().await
        })
        .next();
        let chain = Chain::compose(vec![twice, recording_handler(&trace)]);

        match chain.invoke(ctx()).await {
            Err(Error::Chain(ChainError::NextCalledMultipleTimes { link })) => {
                assert_eq!(link, "twice")
            }
            other => panic!("expected NextCalledMultipleTimes, got {other:?}"),
        }
        assert_eq!(trace.lock().as_slice(), ["handler"]);
    }

    #[tokio::test]
    async fn outer_rerun_after_inner_advance_is_a_chain_error() {
        let trace: Trace = Arc::default();
        let outer = Link::middleware("outer", |inj: Injected| async move {
            let next = inj.next()?;
            let _ = next.run().await;
            next.run().await
        })
        .next();
        let chain = Chain::compose(vec![
            outer,
            recording("B", &trace),
            recording_handler(&trace),
        ]);

        assert!(matches!(
            chain.invoke(ctx()).await,
            Err(Error::Chain(ChainError::NextCalledMultipleTimes { .. }))
        ));
    }

    #[tokio::test]
    async fn next_from_terminal_is_a_chain_error() {
        // The last link is a middleware, so its continuation points past the end.
        let last = Link::middleware("last", |inj: Injected| async move { inj.next()?.run().await })
            .next();
        let chain = Chain::compose(vec![last]);

        match chain.invoke(ctx()).await {
            Err(Error::Chain(ChainError::NextFromTerminal { link })) => assert_eq!(link, "last"),
            other => panic!("expected NextFromTerminal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn middleware_can_short_circuit() {
        let trace: Trace = Arc::default();
        let gate = Link::middleware("gate", |_inj: Injected| async move {
            Ok(Reply::Response(Response::status(StatusCode::FORBIDDEN)))
        });
        let chain = Chain::compose(vec![gate, recording_handler(&trace)]);

        match chain.invoke(ctx()).await {
            Ok(Reply::Response(res)) => assert_eq!(res.status_code(), StatusCode::FORBIDDEN),
            other => panic!("expected a response, got {other:?}"),
        }
        assert!(trace.lock().is_empty());
    }

    #[tokio::test]
    async fn errors_unwind_and_can_be_caught() {
        let catcher = Link::middleware("catcher", |inj: Injected| async move {
            match inj.next()?.run().await {
                Err(Error::Http(e)) => Ok(Reply::Value(json!({ "caught": e.code() }))),
                other => other,
            }
        })
        .next();
        let thrower = Link::handler("thrower", |_inj: Injected| async move {
            Err::<Value, _>(HttpError::bad_request("nope").into())
        });
        let chain = Chain::compose(vec![catcher, thrower]);

        assert_eq!(value(chain.invoke(ctx()).await), json!({ "caught": 400 }));
    }

    #[tokio::test]
    async fn undeclared_dependency_is_unresolved() {
        let sneaky = Link::handler("sneaky", |inj: Injected| async move {
            inj.request()?;
            Ok::<_, Error>("unreachable")
        });
        let chain = Chain::compose(vec![sneaky]);

        match chain.invoke(ctx()).await {
            Err(Error::Chain(ChainError::Unresolved { link, dependency })) => {
                assert_eq!(link, "sneaky");
                assert_eq!(dependency, Dep::Request.to_string());
            }
            other => panic!("expected Unresolved, got {other:?}"),
        }
    }
}
