//! Handler shapes and type erasure.
//!
//! # The three handler shapes
//!
//! The router stores every handler behind one dispatch contract, but
//! accepts three shapes at registration:
//!
//! 1. **Endpoint objects** — any type implementing [`Endpoint`], the
//!    native handler capability. Use this for handlers that carry state
//!    (a database pool, a template engine, ...).
//! 2. **Raw functions** — `async fn(Request) -> impl IntoResponse`. The
//!    adapter builds the [`Context`], hands the function the request
//!    snapshot, and applies the returned response.
//! 3. **Context functions** — `async fn(Context) -> Context`. The context
//!    flows through the function, which renders into it and returns it.
//!
//! The set is closed: the [`Handler`] trait is sealed, so a value of any
//! other shape is rejected by the compiler at the registration call site,
//! never at request time.
//!
//! # How handlers are stored
//!
//! Rust collections hold one concrete type, so registration erases the
//! concrete shape behind `Arc<dyn Endpoint>`:
//!
//! ```text
//! async fn hello(ctx: Context) -> Context { … }    ← user writes this
//!        ↓ router.get("/", hello)
//! hello.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! Arc::new(ScopedFn(hello))                        ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn Endpoint>
//! handler.call(ctx)  at request time               ← one vtable dispatch
//! ```
//!
//! The per-request cost is one `Arc` clone plus one virtual call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::request::Request;
use crate::response::IntoResponse;

// ── Dispatch contract ─────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that resolves to the request's
/// [`Context`]. `Pin<Box<…>>` because the runtime polls futures in place;
/// `Send + 'static` so tokio may move them across threads.
pub type BoxFuture = Pin<Box<dyn Future<Output = Context> + Send + 'static>>;

/// The native handler capability: take the request's [`Context`], produce
/// the finished one.
///
/// Middleware, the router's dispatch nodes, and stateful user handlers all
/// implement this. Plain `async fn` handlers never do so directly; the
/// [`Handler`] blanket impls wrap them.
pub trait Endpoint: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Endpoint>;

// ── Registration-time adaptation ──────────────────────────────────────────────

/// Markers distinguishing the accepted handler shapes. These only steer
/// trait resolution; user code never names them.
pub mod shape {
    /// Marker for [`Endpoint`] objects.
    pub struct Native;
    /// Marker for `async fn(Request) -> impl IntoResponse`.
    pub struct Raw;
    /// Marker for `async fn(Context) -> Context`.
    pub struct Scoped;
}

/// Implemented for every registrable handler shape.
///
/// You never implement this yourself; the blanket impls below cover the
/// closed shape set. The trait is sealed so the set stays closed across
/// versions.
pub trait Handler<M>: private::Sealed<M> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// The sealing module. `Sealed` is private, so external crates cannot add
/// handler shapes.
mod private {
    pub trait Sealed<M> {}
}

// Shape 1: endpoint objects pass through unchanged.
impl<E: Endpoint> private::Sealed<shape::Native> for E {}

impl<E: Endpoint> Handler<shape::Native> for E {
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

// Shape 2: raw functions over the request snapshot.
impl<F, Fut, R> private::Sealed<shape::Raw> for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler<shape::Raw> for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(RawFn(self))
    }
}

// Shape 3: context functions.
impl<F, Fut> private::Sealed<shape::Scoped> for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Context> + Send + 'static,
{
}

impl<F, Fut> Handler<shape::Scoped> for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Context> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(ScopedFn(self))
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

/// Bridges a raw function to the dispatch contract: clone the request
/// snapshot out of the context (an `Arc` bump), run the function, apply
/// its response to the context.
struct RawFn<F>(F);

impl<F, Fut, R> Endpoint for RawFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, mut ctx: Context) -> BoxFuture {
        let fut = (self.0)(ctx.request().clone());
        Box::pin(async move {
            let response = fut.await.into_response();
            ctx.apply(response);
            ctx
        })
    }
}

/// Bridges a context function to the dispatch contract.
struct ScopedFn<F>(F);

impl<F, Fut> Endpoint for ScopedFn<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Context> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture {
        Box::pin((self.0)(ctx))
    }
}
