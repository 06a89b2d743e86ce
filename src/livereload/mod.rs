//! Dev-mode live reload.
//!
//! [`filter`] builds the response rewrite filter: a middleware transform
//! that injects a reload script into outgoing HTML pages, including pages
//! the handler already compressed, and owns the two reserved paths the
//! injected script talks to. Install it on the server (outermost, so it
//! sees every response and its reserved paths shadow nothing the router
//! could do about anyway):
//!
//! ```rust,no_run
//! use hearth::{livereload, Notifier, Router, Server};
//!
//! # async fn run() -> Result<(), hearth::Error> {
//! let reload = Notifier::new();
//! // hand `reload.clone()` to the rebuild watcher, which calls
//! // `reload.broadcast()` after every successful rebuild.
//!
//! Server::bind("127.0.0.1:3000")
//!     .wrap(livereload::filter(reload))
//!     .serve(Router::new())
//!     .await
//! # }
//! ```
//!
//! # The rewrite
//!
//! Only responses whose content-type indicates HTML are touched. Plain
//! bodies get one `<script>` tag spliced in before the first `</head>`;
//! gzip- and deflate-encoded bodies are decoded, spliced, and re-encoded
//! with the same codec so the declared encoding stays truthful. A body
//! without `</head>`, any other content-encoding, and any body that fails
//! to decode all pass through byte-identical. The whole body is buffered
//! for the compressed cases: splicing markup into the middle of a
//! compressed stream is not a well-defined operation.

mod notifier;

pub use notifier::{Listener, Notifier};

use std::io::{Read, Write};
use std::sync::Arc;

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use http::StatusCode;
use tracing::debug;

use crate::context::Context;
use crate::handler::{BoxFuture, BoxedHandler, Endpoint};
use crate::middleware::Transform;

/// Reserved path serving the reload client script.
pub const SCRIPT_PATH: &str = "/livereload.js";

/// Reserved path the client script long-polls for reload signals.
pub const LISTENER_PATH: &str = "/livereload";

/// The browser side: long-poll the listener path, reload the page on a
/// signal, back off and retry on anything else.
const CLIENT_SCRIPT: &str = r#"(function () {
  function poll() {
    fetch("/livereload", { cache: "no-store" })
      .then(function (response) {
        if (response.status === 200) {
          location.reload();
        } else {
          setTimeout(poll, 1000);
        }
      })
      .catch(function () {
        setTimeout(poll, 1000);
      });
  }
  poll();
})();
"#;

/// Builds the live-reload filter around `notifier`.
pub fn filter(notifier: Notifier) -> Transform {
    Arc::new(move |next: BoxedHandler| {
        Arc::new(Filter { next, notifier: notifier.clone() }) as BoxedHandler
    })
}

struct Filter {
    next: BoxedHandler,
    notifier: Notifier,
}

impl Endpoint for Filter {
    fn call(&self, ctx: Context) -> BoxFuture {
        if ctx.request().path() == SCRIPT_PATH {
            let mut ctx = ctx;
            return Box::pin(async move {
                ctx.set_header("content-type", "application/javascript; charset=utf-8");
                ctx.set_header("cache-control", "no-store");
                ctx.write(CLIENT_SCRIPT.as_bytes());
                ctx
            });
        }

        if ctx.request().path() == LISTENER_PATH {
            // Subscribe before parking so a broadcast racing this request
            // is buffered, not missed.
            let mut listener = self.notifier.connect();
            let mut ctx = ctx;
            return Box::pin(async move {
                ctx.set_header("cache-control", "no-store");
                if listener.recv().await {
                    ctx.string("reload");
                } else {
                    ctx.set_status(StatusCode::NO_CONTENT);
                }
                ctx
            });
        }

        let fut = self.next.call(ctx);
        Box::pin(async move {
            let mut ctx = fut.await;
            rewrite(&mut ctx);
            ctx
        })
    }
}

// ── Body rewriting ────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Codec {
    Gzip,
    Deflate,
}

impl Codec {
    fn name(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
        }
    }
}

/// Applies the injection rules to a finished response.
fn rewrite(ctx: &mut Context) {
    let is_html = ctx
        .response_header("content-type")
        .is_some_and(|v| v.contains("html"));
    if !is_html {
        return;
    }

    let tag = script_tag(ctx.request().host());
    let encoding = ctx.response_header("content-encoding").map(str::to_owned);
    match encoding.as_deref() {
        None => {
            if let Some(body) = inject(ctx.body(), &tag) {
                ctx.replace_body(body);
            }
        }
        Some("gzip") => recode(ctx, &tag, Codec::Gzip),
        Some("deflate") => recode(ctx, &tag, Codec::Deflate),
        // Anything else (br, zstd, identity, ...) is not ours to touch.
        Some(_) => {}
    }
}

/// The markup spliced in: a script reference resolved against the host
/// the browser used for the page itself.
fn script_tag(host: &str) -> Vec<u8> {
    format!(r#"<script src="//{host}{SCRIPT_PATH}"></script>"#).into_bytes()
}

/// Splices `tag` immediately before the first `</head>`. `None` when the
/// document has no head to close, in which case the body stays as-is.
fn inject(body: &[u8], tag: &[u8]) -> Option<Vec<u8>> {
    let at = find(body, b"</head>")?;
    let mut out = Vec::with_capacity(body.len() + tag.len());
    out.extend_from_slice(&body[..at]);
    out.extend_from_slice(tag);
    out.extend_from_slice(&body[at..]);
    Some(out)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Decode, splice, re-encode with the same codec. Every failure path
/// forwards the original bytes: a page without live reload beats a page
/// the browser cannot decompress.
fn recode(ctx: &mut Context, tag: &[u8], codec: Codec) {
    let decoded = match decode(ctx.body(), codec) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(codec = codec.name(), "decode failed, forwarding original body: {e}");
            return;
        }
    };
    let Some(spliced) = inject(&decoded, tag) else {
        return;
    };
    match encode(&spliced, codec) {
        Ok(bytes) => ctx.replace_body(bytes),
        Err(e) => {
            debug!(codec = codec.name(), "re-encode failed, forwarding original body: {e}");
        }
    }
}

fn decode(data: &[u8], codec: Codec) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    match codec {
        Codec::Gzip => {
            GzDecoder::new(data).read_to_end(&mut out)?;
        }
        Codec::Deflate => {
            ZlibDecoder::new(data).read_to_end(&mut out)?;
        }
    }
    Ok(out)
}

fn encode(data: &[u8], codec: Codec) -> std::io::Result<Vec<u8>> {
    match codec {
        Codec::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
        Codec::Deflate => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use crate::request::Request;

    const PAGE: &str =
        "<html><head><title>t</title></head><body>hello</body></html>";

    fn ctx_for(path: &str) -> Context {
        Context::new(
            Request::builder().path(path).host("localhost:3000").build(),
        )
    }

    fn tag() -> Vec<u8> {
        script_tag("localhost:3000")
    }

    fn count(haystack: &[u8], needle: &[u8]) -> usize {
        (0..haystack.len())
            .filter(|&i| haystack[i..].starts_with(needle))
            .count()
    }

    // ── Plain injection ───────────────────────────────────────────────────────

    #[test]
    fn injects_before_the_first_head_close() {
        let out = inject(PAGE.as_bytes(), &tag()).unwrap();
        let expected = PAGE.replacen(
            "</head>",
            r#"<script src="//localhost:3000/livereload.js"></script></head>"#,
            1,
        );
        assert_eq!(out, expected.as_bytes());
    }

    #[test]
    fn injects_exactly_once_with_repeated_head_close() {
        let page = "<head></head><head></head>";
        let out = inject(page.as_bytes(), &tag()).unwrap();
        assert_eq!(count(&out, &tag()), 1);
        // Only the first occurrence moved.
        assert!(out.ends_with(b"<head></head>"));
    }

    #[test]
    fn document_without_head_close_is_untouched() {
        assert!(inject(b"<body>no head here</body>", &tag()).is_none());

        let mut ctx = ctx_for("/");
        ctx.set_header("content-type", "text/html; charset=utf-8");
        ctx.write(b"<body>no head here</body>");
        rewrite(&mut ctx);
        assert_eq!(ctx.body(), b"<body>no head here</body>");
    }

    // ── Encoding-aware rewrites ───────────────────────────────────────────────

    #[test]
    fn gzip_body_round_trips_with_one_injected_tag() {
        let compressed = encode(PAGE.as_bytes(), Codec::Gzip).unwrap();

        let mut ctx = ctx_for("/");
        ctx.set_header("content-type", "text/html; charset=utf-8");
        ctx.set_header("content-encoding", "gzip");
        ctx.write(&compressed);
        rewrite(&mut ctx);

        // The output must still be valid gzip data.
        let plain = decode(ctx.body(), Codec::Gzip).unwrap();
        assert_eq!(count(&plain, &tag()), 1);
        assert_eq!(plain, inject(PAGE.as_bytes(), &tag()).unwrap());
    }

    #[test]
    fn deflate_body_round_trips_with_one_injected_tag() {
        let compressed = encode(PAGE.as_bytes(), Codec::Deflate).unwrap();

        let mut ctx = ctx_for("/");
        ctx.set_header("content-type", "text/html");
        ctx.set_header("content-encoding", "deflate");
        ctx.write(&compressed);
        rewrite(&mut ctx);

        let plain = decode(ctx.body(), Codec::Deflate).unwrap();
        assert_eq!(count(&plain, &tag()), 1);
        assert_eq!(plain, inject(PAGE.as_bytes(), &tag()).unwrap());
    }

    #[test]
    fn undecodable_body_is_forwarded_unmodified() {
        let garbage = b"this is not gzip data".to_vec();

        let mut ctx = ctx_for("/");
        ctx.set_header("content-type", "text/html");
        ctx.set_header("content-encoding", "gzip");
        ctx.write(&garbage);
        rewrite(&mut ctx);
        assert_eq!(ctx.body(), garbage.as_slice());
    }

    #[test]
    fn unknown_encoding_is_untouched() {
        let mut ctx = ctx_for("/");
        ctx.set_header("content-type", "text/html");
        ctx.set_header("content-encoding", "br");
        ctx.write(PAGE.as_bytes());
        rewrite(&mut ctx);
        assert_eq!(ctx.body(), PAGE.as_bytes());
    }

    #[test]
    fn non_html_bodies_are_never_altered() {
        let body = br#"{"head":"</head>"}"#;

        let mut ctx = ctx_for("/");
        ctx.set_header("content-type", "application/json");
        ctx.write(body);
        rewrite(&mut ctx);
        assert_eq!(ctx.body(), body);

        // Same with a declared encoding: the content-type check comes first.
        let mut ctx = ctx_for("/");
        ctx.set_header("content-type", "application/json");
        ctx.set_header("content-encoding", "gzip");
        ctx.write(body);
        rewrite(&mut ctx);
        assert_eq!(ctx.body(), body);
    }

    #[test]
    fn response_without_content_type_is_untouched() {
        let mut ctx = ctx_for("/");
        ctx.write(PAGE.as_bytes());
        rewrite(&mut ctx);
        assert_eq!(ctx.body(), PAGE.as_bytes());
    }

    // ── The filter as a whole ─────────────────────────────────────────────────

    async fn html_page(mut ctx: Context) -> Context {
        ctx.html(PAGE);
        ctx
    }

    fn filtered(notifier: Notifier) -> BoxedHandler {
        filter(notifier)(html_page.into_boxed_handler())
    }

    #[tokio::test]
    async fn rewrites_handler_responses_in_flight() {
        let entry = filtered(Notifier::new());
        let ctx = entry.call(ctx_for("/")).await;
        assert_eq!(count(ctx.body(), &tag()), 1);
    }

    #[tokio::test]
    async fn serves_the_client_script() {
        let entry = filtered(Notifier::new());
        let ctx = entry.call(ctx_for(SCRIPT_PATH)).await;
        assert_eq!(ctx.body(), CLIENT_SCRIPT.as_bytes());
        assert_eq!(
            ctx.response_header("content-type"),
            Some("application/javascript; charset=utf-8")
        );
    }

    #[tokio::test]
    async fn listener_path_completes_on_broadcast() {
        let notifier = Notifier::new();
        let entry = filtered(notifier.clone());

        // The subscription happens synchronously in `call`, so a
        // broadcast after this line is buffered for the parked request.
        let parked = entry.call(ctx_for(LISTENER_PATH));
        notifier.broadcast();

        let ctx = parked.await;
        assert_eq!(ctx.status(), StatusCode::OK);
        assert_eq!(ctx.body(), b"reload");
    }

    #[tokio::test]
    async fn listener_path_ends_quietly_when_the_notifier_is_gone() {
        let notifier = Notifier::new();
        let entry = filtered(notifier.clone());

        let parked = entry.call(ctx_for(LISTENER_PATH));
        // The filter holds its own notifier clone; both must go for the
        // channel to close.
        drop(entry);
        drop(notifier);

        let ctx = parked.await;
        assert_eq!(ctx.status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn client_script_polls_the_listener_path() {
        assert!(CLIENT_SCRIPT.contains(LISTENER_PATH));
    }
}
