//! Incoming HTTP request snapshot.
//!
//! The server collects the full request body before dispatch, so handlers
//! see an immutable snapshot: method, path, host, headers, body bytes, and
//! the path parameters the router matched. The snapshot sits behind an
//! `Arc`, making [`Request::clone`] a reference-count bump; that is what
//! lets the raw-function handler shape receive the request by value while
//! the [`Context`](crate::Context) keeps its own copy.

use std::collections::HashMap;
use std::sync::Arc;

use crate::method::Method;

/// An incoming HTTP request, collected from the transport before dispatch.
#[derive(Clone)]
pub struct Request {
    parts: Arc<Parts>,
}

#[derive(Clone)]
struct Parts {
    method: Method,
    path: String,
    host: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    params: HashMap<String, String>,
}

impl Request {
    /// Starts building a request snapshot.
    ///
    /// The server uses this at the transport edge; it is public so handler
    /// unit tests can construct synthetic requests:
    ///
    /// ```rust
    /// use hearth::{Method, Request};
    ///
    /// let req = Request::builder()
    ///     .method(Method::Post)
    ///     .path("/users")
    ///     .header("content-type", "application/json")
    ///     .body(br#"{"name":"alice"}"#.to_vec())
    ///     .build();
    ///
    /// assert_eq!(req.path(), "/users");
    /// ```
    pub fn builder() -> RequestBuilder {
        RequestBuilder {
            method: Method::Get,
            path: "/".to_owned(),
            host: String::new(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn method(&self) -> Method {
        self.parts.method
    }

    pub fn path(&self) -> &str {
        &self.parts.path
    }

    /// The host the client addressed, taken from the `Host` header.
    pub fn host(&self) -> &str {
        &self.parts.host
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.parts.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.parts.body
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.parts.params.get(key).map(String::as_str)
    }

    /// Records the parameters the router matched. Copy-on-write: if a
    /// middleware already cloned the request, the pre-routing clone keeps
    /// its empty parameter map.
    pub(crate) fn set_params<I>(&mut self, params: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Arc::make_mut(&mut self.parts).params.extend(params);
    }
}

/// Builder for [`Request`]. Obtain via [`Request::builder`].
pub struct RequestBuilder {
    method: Method,
    path: String,
    host: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl RequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_owned();
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_owned();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn build(self) -> Request {
        Request {
            parts: Arc::new(Parts {
                method: self.method,
                path: self.path,
                host: self.host,
                headers: self.headers,
                body: self.body,
                params: HashMap::new(),
            }),
        }
    }
}
