//! Middleware layer.
//!
//! Middleware intercepts requests and responses; it is the place for
//! cross-cutting concerns: structured tracing, auth checks, response
//! filters.
//!
//! # Shape and ordering
//!
//! A middleware is a [`Transform`]: a function from the next handler to a
//! wrapping handler. A [`Chain`] holds transforms in registration order
//! and composes them around a final handler with **first registered =
//! outermost** semantics. Because each transform only knows how to wrap a
//! single inner handler, composition iterates the list in *reverse*:
//! starting from the final handler, wrap with the last-registered
//! transform, then the second-to-last, and so on, finishing with the
//! first-registered transform on the outside. The observable result is
//! pre-dispatch effects in registration order and post-dispatch effects in
//! the exact reverse; that asymmetry is the chain's contract.
//!
//! Chains are composed once, when serving starts. There is no way to grow
//! a chain already in use: composition consumes nothing but runs on a
//! frozen list.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::context::Context;
use crate::handler::{BoxFuture, BoxedHandler, Endpoint};

/// A request-pipeline transform: given the next handler, produce the
/// handler that wraps it.
pub type Transform = Arc<dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static>;

/// An ordered sequence of transforms.
#[derive(Clone, Default)]
pub struct Chain {
    transforms: Vec<Transform>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a transform. Registration order is outermost-first.
    pub fn append(&mut self, transform: Transform) {
        self.transforms.push(transform);
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Composes the chain around `handler`. Reverse iteration keeps the
    /// first-registered transform outermost; see the module docs.
    pub fn apply(&self, handler: BoxedHandler) -> BoxedHandler {
        let mut wrapped = handler;
        for transform in self.transforms.iter().rev() {
            wrapped = transform(wrapped);
        }
        wrapped
    }
}

// ── Writing middleware as async closures ──────────────────────────────────────

/// Builds a [`Transform`] from an async function over `(Context, next)`.
///
/// The function decides if and when to call `next`, and may act on the
/// context before and after:
///
/// ```rust
/// use hearth::{middleware, BoxedHandler, Context, StatusCode};
///
/// let guard = middleware::around(|ctx: Context, next: BoxedHandler| async move {
///     if ctx.request().header("x-token").is_none() {
///         let mut ctx = ctx;
///         ctx.set_status(StatusCode::UNAUTHORIZED);
///         return ctx;
///     }
///     next.call(ctx).await
/// });
/// ```
pub fn around<F, Fut>(f: F) -> Transform
where
    F: Fn(Context, BoxedHandler) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Context> + Send + 'static,
{
    Arc::new(move |next: BoxedHandler| Arc::new(Around { f: f.clone(), next }) as BoxedHandler)
}

struct Around<F> {
    f: F,
    next: BoxedHandler,
}

impl<F, Fut> Endpoint for Around<F>
where
    F: Fn(Context, BoxedHandler) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Context> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture {
        Box::pin((self.f)(ctx, Arc::clone(&self.next)))
    }
}

// ── Built-in middleware ───────────────────────────────────────────────────────

/// Per-request access log: method, path, status, latency.
pub fn trace() -> Transform {
    around(|ctx: Context, next: BoxedHandler| async move {
        let method = ctx.request().method();
        let path = ctx.request().path().to_owned();
        let start = Instant::now();

        let ctx = next.call(ctx).await;

        info!(
            method = %method,
            path = %path,
            status = ctx.status().as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "request"
        );
        ctx
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use crate::request::Request;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn ctx() -> Context {
        Context::new(Request::builder().build())
    }

    fn recording(tag: &'static str, log: Log) -> Transform {
        around(move |ctx: Context, next: BoxedHandler| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(format!("{tag} in"));
                let ctx = next.call(ctx).await;
                log.lock().unwrap().push(format!("{tag} out"));
                ctx
            }
        })
    }

    fn final_handler(log: Log) -> BoxedHandler {
        let handler = move |mut ctx: Context| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push("handler".to_owned());
                ctx.string("done");
                ctx
            }
        };
        handler.into_boxed_handler()
    }

    #[tokio::test]
    async fn first_registered_runs_outermost() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        let mut chain = Chain::new();
        chain.append(recording("a", Arc::clone(&log)));
        chain.append(recording("b", Arc::clone(&log)));
        chain.append(recording("c", Arc::clone(&log)));
        assert_eq!(chain.len(), 3);

        let composed = chain.apply(final_handler(Arc::clone(&log)));
        let ctx = composed.call(ctx()).await;

        assert_eq!(ctx.body(), b"done");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a in", "b in", "c in", "handler", "c out", "b out", "a out"]
        );
    }

    #[tokio::test]
    async fn empty_chain_is_the_identity() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::new();
        assert!(chain.is_empty());

        let ctx = chain.apply(final_handler(Arc::clone(&log))).call(ctx()).await;
        assert_eq!(ctx.body(), b"done");
        assert_eq!(*log.lock().unwrap(), vec!["handler"]);
    }

    #[tokio::test]
    async fn around_can_short_circuit() {
        let guard = around(|mut ctx: Context, _next: BoxedHandler| async move {
            ctx.set_status(http::StatusCode::UNAUTHORIZED);
            ctx
        });

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = Chain::new();
        chain.append(guard);

        let ctx = chain.apply(final_handler(Arc::clone(&log))).call(ctx()).await;
        assert_eq!(ctx.status(), http::StatusCode::UNAUTHORIZED);
        // The final handler never ran.
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn trace_leaves_the_response_alone() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = Chain::new();
        chain.append(trace());

        let ctx = chain.apply(final_handler(Arc::clone(&log))).call(ctx()).await;
        assert_eq!(ctx.status(), http::StatusCode::OK);
        assert_eq!(ctx.body(), b"done");
    }
}
