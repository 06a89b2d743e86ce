//! # hearth
//!
//! A minimal HTTP application toolkit with a dev-mode live reload.
//!
//! ## The contract
//!
//! hearth covers the part of a web application that actually changes
//! between projects: routing, middleware, per-request state, and the
//! development loop. Everything else stays a collaborator you plug in:
//! template engines render markup, a watcher decides when a rebuild
//! finished, a secret store signs cookies, the transport (hyper) owns the
//! protocol. hearth's pieces:
//!
//! - Radix-tree routing with prefix groups — O(path-length) lookup via
//!   [`matchit`], distinct 404/405 answers, per-group middleware chains
//! - Three handler shapes, one dispatch contract — context functions,
//!   raw request functions, and [`Endpoint`] objects, normalized at
//!   registration (an unknown shape fails to compile)
//! - A per-request [`Context`] — typed request-scoped data, renderers,
//!   cookies, and a write-once status guard
//! - Dev-mode live reload — a response filter that injects the reload
//!   script into outgoing HTML, decoding and re-encoding gzip and deflate
//!   bodies so compressed pages reload too
//! - Graceful shutdown — SIGTERM / Ctrl-C, drains in-flight requests
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use hearth::{livereload, middleware, Context, Notifier, Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let reload = Notifier::new();
//!     // The rebuild watcher calls `reload.broadcast()` when done.
//!
//!     let app = Router::new()
//!         .get("/", home)
//!         .get("/users/{id}", get_user)
//!         .group("/admin", |admin| admin.get("/", dashboard));
//!
//!     Server::bind("0.0.0.0:3000")
//!         .wrap(middleware::trace())
//!         .wrap(livereload::filter(reload))
//!         .serve(app)
//!         .await
//!         .unwrap();
//! }
//!
//! async fn home(mut ctx: Context) -> Context {
//!     ctx.html("<html><head><title>hi</title></head><body>hello</body></html>");
//!     ctx
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
//! }
//!
//! async fn dashboard(mut ctx: Context) -> Context {
//!     ctx.string("admin");
//!     ctx
//! }
//! ```

mod context;
mod cookie;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;

pub mod livereload;
pub mod middleware;

pub use context::Context;
pub use cookie::Cookie;
pub use error::Error;
pub use handler::{BoxFuture, BoxedHandler, Endpoint, Handler};
pub use http::StatusCode;
pub use livereload::{Listener, Notifier};
pub use method::Method;
pub use request::{Request, RequestBuilder};
pub use response::{IntoResponse, Response};
pub use router::Router;
pub use server::Server;
