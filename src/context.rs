//! Per-request context.
//!
//! One [`Context`] exists per inbound request. It owns the request
//! snapshot, a lazily allocated attribute map for request-scoped data, and
//! the response being built: status, headers, body buffer. Handlers and
//! middleware take it by value and hand it back, so exclusive ownership
//! for the request's lifetime is a compile-time fact rather than a
//! convention.
//!
//! # The write-once guard
//!
//! The first render, body write, or explicit status send flips
//! [`written`](Context::written) for the rest of the request. After the
//! flip, further status changes are silent no-ops: headers conceptually
//! left the building with the first write. Body writes always append.

use std::any::Any;
use std::collections::HashMap;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::cookie::{self, Cookie};
use crate::request::Request;
use crate::response::Response;

/// Per-request scoped state and response-writing helpers.
pub struct Context {
    request: Request,
    data: Option<HashMap<String, Box<dyn Any + Send + Sync>>>,
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    written: bool,
    size: usize,
}

impl Context {
    /// Wraps a request snapshot in a fresh context. The server does this
    /// once per request; tests do it to exercise handlers directly.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            data: None,
            status: StatusCode::OK,
            headers: Vec::new(),
            body: Vec::new(),
            written: false,
            size: 0,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Shortcut for [`Request::param`].
    pub fn param(&self, key: &str) -> Option<&str> {
        self.request.param(key)
    }

    pub(crate) fn set_params<I>(&mut self, params: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.request.set_params(params);
    }

    // ── Request-scoped data ───────────────────────────────────────────────────

    /// Stores a value under `key`. The map is allocated on first use;
    /// requests that never touch it pay nothing.
    pub fn set(&mut self, key: impl Into<String>, value: impl Any + Send + Sync) {
        self.data
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), Box::new(value));
    }

    /// Retrieves the value stored under `key`, downcast to `T`. Absent
    /// keys and type mismatches both yield `None`.
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.data.as_ref()?.get(key)?.downcast_ref()
    }

    /// Removes the value stored under `key`, leaving other entries alone.
    pub fn delete(&mut self, key: &str) {
        if let Some(data) = self.data.as_mut() {
            data.remove(key);
        }
    }

    /// Removes every entry in one call.
    pub fn clear(&mut self) {
        if let Some(data) = self.data.as_mut() {
            data.clear();
        }
    }

    // ── Response state ────────────────────────────────────────────────────────

    /// True once any status code or body byte has been sent.
    pub fn written(&self) -> bool {
        self.written
    }

    /// Total body bytes written so far.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Sends the response status. The first send (or the first body write)
    /// flips [`written`](Context::written); later attempts are no-ops.
    pub fn set_status(&mut self, code: StatusCode) {
        if self.written {
            debug!(sent = %self.status, ignored = %code, "status already sent");
            return;
        }
        self.status = code;
        self.written = true;
    }

    /// Sets a response header, replacing any existing value under the same
    /// name (case-insensitive).
    pub fn set_header(&mut self, name: &str, value: &str) {
        match self.headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value.to_owned(),
            None => self.headers.push((name.to_owned(), value.to_owned())),
        }
    }

    /// Appends a response header without touching existing values under
    /// the same name. `Set-Cookie` is the canonical user.
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_owned(), value.to_owned()));
    }

    /// Case-insensitive response header lookup (first value wins).
    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The response body accumulated so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Appends raw bytes to the response body and returns the count
    /// written. Flips [`written`](Context::written).
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.written = true;
        self.body.extend_from_slice(data);
        self.size += data.len();
        data.len()
    }

    /// Swaps the accumulated body for transport-level rewriting. Leaves
    /// the size counter at what the handler wrote.
    pub(crate) fn replace_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    // ── Renderers ─────────────────────────────────────────────────────────────

    /// Renders plain text (`text/plain; charset=utf-8`).
    pub fn string(&mut self, body: impl AsRef<str>) {
        self.render("text/plain; charset=utf-8", body.as_ref().as_bytes());
    }

    /// Renders pre-built HTML markup (`text/html; charset=utf-8`).
    /// Template resolution is the caller's collaborator; hearth takes the
    /// finished markup.
    pub fn html(&mut self, markup: impl AsRef<str>) {
        self.render("text/html; charset=utf-8", markup.as_ref().as_bytes());
    }

    /// Serialises `value` as JSON (`application/json`). A serialisation
    /// failure is logged and answered 500; it never aborts the request.
    pub fn json<T: Serialize>(&mut self, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.render("application/json", &bytes),
            Err(e) => self.render_failed("json", &e),
        }
    }

    /// Serialises `value` as XML (`application/xml; charset=utf-8`), with
    /// the same failure policy as [`json`](Context::json).
    pub fn xml<T: Serialize>(&mut self, value: &T) {
        match quick_xml::se::to_string(value) {
            Ok(body) => self.render("application/xml; charset=utf-8", body.as_bytes()),
            Err(e) => self.render_failed("xml", &e),
        }
    }

    /// Sets the content-type unless the handler already chose one, then
    /// writes the payload.
    fn render(&mut self, content_type: &str, bytes: &[u8]) {
        if self.response_header("content-type").is_none() {
            self.headers.push(("content-type".to_owned(), content_type.to_owned()));
        }
        self.write(bytes);
    }

    fn render_failed(&mut self, renderer: &str, err: &dyn std::fmt::Display) {
        error!(renderer, "serialisation failed: {err}");
        self.set_status(StatusCode::INTERNAL_SERVER_ERROR);
    }

    // ── Cookies ───────────────────────────────────────────────────────────────

    /// Returns the named request cookie's value, if present.
    pub fn cookie(&self, name: &str) -> Option<String> {
        cookie::find(self.request.header("cookie")?, name)
    }

    /// Queues a `Set-Cookie` directive. Previously queued cookies are left
    /// untouched.
    pub fn set_cookie(&mut self, cookie: Cookie) {
        self.add_header("set-cookie", &cookie.to_string());
    }

    // ── Transport boundary ────────────────────────────────────────────────────

    /// Applies a [`Response`] value onto this context: status via the
    /// write-once guard, headers, then the body bytes.
    pub(crate) fn apply(&mut self, response: Response) {
        self.set_status(response.status);
        for (name, value) in response.headers {
            if name.eq_ignore_ascii_case("set-cookie") {
                self.add_header(&name, &value);
            } else {
                self.set_header(&name, &value);
            }
        }
        self.write(&response.body);
    }

    /// Converts the finished context into the transport response. Headers
    /// that do not survive the transport's validation are dropped with a
    /// warning rather than failing the request.
    pub(crate) fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut response = http::Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => warn!(header = %name, "dropping invalid response header"),
            }
        }
        response
    }
}
