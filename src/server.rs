//! HTTP server and graceful shutdown.
//!
//! The server owns the serving phase: it freezes the router into one
//! composed dispatch handler, then accepts connections until the process
//! receives SIGTERM or Ctrl-C, at which point it stops accepting and
//! drains every in-flight connection before returning.
//!
//! Transport-level filters (the live-reload rewrite filter, access
//! logging) install here via [`Server::wrap`]; unlike a router's chain
//! they wrap the whole application, groups included, and run before any
//! route is consulted.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::context::Context;
use crate::error::Error;
use crate::handler::BoxedHandler;
use crate::method::Method;
use crate::middleware::{Chain, Transform};
use crate::request::Request;
use crate::router::Router;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    chain: Chain,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr, chain: Chain::new() }
    }

    /// Installs a transport-level filter around the whole application.
    /// First wrapped is outermost, same as a router chain.
    pub fn wrap(mut self, transform: Transform) -> Self {
        self.chain.append(transform);
        self
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Consuming the router here is the build-phase/serve-phase boundary:
    /// after this call no route or middleware registration can exist.
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;

        // Freeze: compose every chain exactly once, then share the entry
        // across connection tasks.
        let app = self.chain.apply(router.into_service());

        info!(addr = %self.addr, "hearth listening");

        // JoinSet tracks every spawned connection task so shutdown can
        // wait for them all.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // `biased` checks arms top-to-bottom: a shutdown signal
                // stops the accept loop even with connections queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection, not
                        // once per connection.
                        let svc = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move { dispatch(app, req).await }
                        });

                        // Serves whichever of HTTP/1.1 and HTTP/2 the
                        // client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished tasks so the JoinSet stays bounded on
                // long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("hearth stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Transport edge: snapshots one hyper request, runs it through the
/// composed pipeline, converts the finished context back.
///
/// The error type is [`Infallible`]: every failure becomes a response
/// (405, 400, ...), hyper never sees an error.
async fn dispatch(
    app: BoxedHandler,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let method = match Method::try_from(req.method()) {
        Ok(method) => method,
        // Not a registrable method, so no route could ever serve it.
        Err(()) => return Ok(status_response(StatusCode::METHOD_NOT_ALLOWED)),
    };

    let path = req.uri().path().to_owned();
    let host = req
        .headers()
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default();

    let headers: Vec<(String, String)> = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|v| (name.as_str().to_owned(), v.to_owned()))
        })
        .collect();

    // Handlers see a complete body snapshot, never a partial stream.
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes().to_vec(),
        Err(e) => {
            error!("failed to read request body: {e}");
            return Ok(status_response(StatusCode::BAD_REQUEST));
        }
    };

    let mut builder = Request::builder()
        .method(method)
        .path(&path)
        .host(&host)
        .body(body);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }

    let ctx = app.call(Context::new(builder.build())).await;
    Ok(ctx.into_http())
}

fn status_response(status: StatusCode) -> http::Response<Full<Bytes>> {
    let mut response = http::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives: SIGTERM or
/// SIGINT (Ctrl-C) on Unix, Ctrl-C elsewhere.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    // `pending()` never resolves, which disables the SIGTERM arm on
    // non-Unix platforms.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
