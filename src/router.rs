//! Radix-tree request router with prefix groups.
//!
//! One matchit tree per HTTP method, O(path-length) lookup. Routes are
//! registered during a single-threaded build phase;
//! [`Server::serve`](crate::Server::serve) consumes the router, and after
//! that move the compiler guarantees nothing can register routes or
//! middleware against a serving table.
//!
//! # Dispatch outcomes
//!
//! A lookup distinguishes three outcomes: a matched route, `404 Not
//! Found` when no pattern matches the path, and `405 Method Not Allowed`
//! when some pattern matches the path but not under the request's method.
//!
//! # Groups
//!
//! [`Router::group`] mounts a child router under a path prefix. The child
//! carries its own middleware chain; it inherits nothing from the parent
//! and the parent's chain does not run for the child's subtree. Dispatch
//! precedence at each router is fixed: group delegation on a prefix
//! match, then the router's own routes, then the 405 probe, then 404.

use std::collections::HashMap;
use std::future::ready;
use std::sync::Arc;

use http::StatusCode;
use tracing::debug;

use crate::context::Context;
use crate::handler::{BoxFuture, BoxedHandler, Endpoint, Handler};
use crate::method::Method;
use crate::middleware::{Chain, Transform};

/// A registered route: (pattern, method) bound to a handler and a
/// symbolic name. The name is diagnostics-only and carries no routing
/// semantics.
struct Route {
    name: String,
    method: Method,
    pattern: String,
    handler: BoxedHandler,
}

/// The application router.
///
/// Build it once at startup, then hand it to
/// [`Server::serve`](crate::Server::serve). Every registration method
/// returns `self`, so routers chain naturally:
///
/// ```rust,no_run
/// # use hearth::{Context, Router};
/// # async fn list(ctx: Context) -> Context { ctx }
/// # async fn show(ctx: Context) -> Context { ctx }
/// # async fn audit(ctx: Context) -> Context { ctx }
/// let app = Router::new()
///     .get("/users", list)
///     .get("/users/{id}", show).name("users.show")
///     .group("/admin", |admin| admin.get("/audit", audit));
/// ```
///
/// # Panics
///
/// Registration panics on a malformed pattern and on a duplicate
/// (pattern, method) pair. Both denote a programming mistake, so they
/// surface during the build phase, never under live traffic.
pub struct Router {
    prefix: String,
    trees: HashMap<Method, matchit::Router<usize>>,
    routes: Vec<Route>,
    children: Vec<Router>,
    chain: Chain,
}

impl Router {
    pub fn new() -> Self {
        Self::with_prefix(String::new())
    }

    fn with_prefix(prefix: String) -> Self {
        Self {
            prefix,
            trees: HashMap::new(),
            routes: Vec::new(),
            children: Vec::new(),
            chain: Chain::new(),
        }
    }

    /// Registers a handler for a method + pattern pair.
    ///
    /// Patterns are matched per-segment; `{name}` segments capture path
    /// parameters retrievable via `ctx.param("name")`. The route's
    /// generated name is `"METHOD pattern"`; override it with
    /// [`name`](Router::name) right after registering.
    pub fn on<H, M>(mut self, method: Method, pattern: &str, handler: H) -> Self
    where
        H: Handler<M>,
    {
        let index = self.routes.len();
        self.trees
            .entry(method)
            .or_default()
            .insert(pattern, index)
            .unwrap_or_else(|e| panic!("invalid route `{method} {pattern}`: {e}"));

        let name = format!("{method} {pattern}");
        debug!(route = %name, "route registered");
        self.routes.push(Route {
            name,
            method,
            pattern: pattern.to_owned(),
            handler: handler.into_boxed_handler(),
        });
        self
    }

    pub fn get<H: Handler<M>, M>(self, pattern: &str, handler: H) -> Self {
        self.on(Method::Get, pattern, handler)
    }

    pub fn post<H: Handler<M>, M>(self, pattern: &str, handler: H) -> Self {
        self.on(Method::Post, pattern, handler)
    }

    pub fn put<H: Handler<M>, M>(self, pattern: &str, handler: H) -> Self {
        self.on(Method::Put, pattern, handler)
    }

    pub fn patch<H: Handler<M>, M>(self, pattern: &str, handler: H) -> Self {
        self.on(Method::Patch, pattern, handler)
    }

    pub fn delete<H: Handler<M>, M>(self, pattern: &str, handler: H) -> Self {
        self.on(Method::Delete, pattern, handler)
    }

    pub fn head<H: Handler<M>, M>(self, pattern: &str, handler: H) -> Self {
        self.on(Method::Head, pattern, handler)
    }

    pub fn options<H: Handler<M>, M>(self, pattern: &str, handler: H) -> Self {
        self.on(Method::Options, pattern, handler)
    }

    /// Overrides the generated name of the most recently registered
    /// route.
    ///
    /// # Panics
    ///
    /// Panics if no route has been registered on this router yet.
    pub fn name(mut self, name: &str) -> Self {
        let route = self
            .routes
            .last_mut()
            .expect("name() must follow a route registration");
        route.name = name.to_owned();
        self
    }

    /// Appends a middleware transform to this router's chain. The chain
    /// wraps this router's own dispatch (including its 404/405 answers)
    /// but not any group's subtree.
    pub fn wrap(mut self, transform: Transform) -> Self {
        self.chain.append(transform);
        self
    }

    /// Mounts a child router under `prefix`, with its own routes and its
    /// own, initially empty, middleware chain:
    ///
    /// ```rust,no_run
    /// # use hearth::{middleware, Context, Router};
    /// # async fn dashboard(ctx: Context) -> Context { ctx }
    /// # let auth = middleware::trace();
    /// let app = Router::new().group("/admin", |admin| {
    ///     admin.wrap(auth).get("/", dashboard)
    /// });
    /// ```
    ///
    /// # Panics
    ///
    /// Panics unless `prefix` starts with `/` and does not end with one.
    pub fn group(mut self, prefix: &str, build: impl FnOnce(Router) -> Router) -> Self {
        assert!(
            prefix.starts_with('/') && !prefix.ends_with('/'),
            "group prefix `{prefix}` must start with '/' and not end with one"
        );
        let child = build(Router::with_prefix(prefix.to_owned()));
        self.children.push(child);
        self
    }

    /// The (name, method, pattern) rows of every route in this router and
    /// its groups, for diagnostics and reverse lookup.
    pub fn route_table(&self) -> Vec<(String, Method, String)> {
        let mut rows: Vec<_> = self
            .routes
            .iter()
            .map(|r| (r.name.clone(), r.method, r.pattern.clone()))
            .collect();
        for child in &self.children {
            rows.extend(child.route_table());
        }
        rows
    }

    /// Freezes the router into its composed dispatch entry. Each router's
    /// chain is applied exactly once, around its own dispatch node; group
    /// entries sit in front so a prefix match bypasses the parent's chain
    /// entirely.
    pub(crate) fn into_service(self) -> BoxedHandler {
        self.into_entry("")
    }

    fn into_entry(self, mount: &str) -> BoxedHandler {
        let mount = format!("{mount}{}", self.prefix);

        let children: Vec<(String, BoxedHandler)> = self
            .children
            .into_iter()
            .map(|child| (child.prefix.clone(), child.into_entry(&mount)))
            .collect();

        let own = self.chain.apply(Arc::new(Dispatch {
            mount: mount.clone(),
            trees: self.trees,
            routes: self.routes,
        }));

        if children.is_empty() {
            own
        } else {
            Arc::new(PrefixGate { mount, children, fallback: own })
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

// ── Frozen dispatch nodes ─────────────────────────────────────────────────────

/// Routes a prefix-matched request to the owning child entry, or falls
/// back to the router's own (chain-wrapped) dispatch.
struct PrefixGate {
    mount: String,
    children: Vec<(String, BoxedHandler)>,
    fallback: BoxedHandler,
}

impl Endpoint for PrefixGate {
    fn call(&self, ctx: Context) -> BoxFuture {
        let delegate = {
            let rel = relative(ctx.request().path(), &self.mount);
            self.children
                .iter()
                .find(|(prefix, _)| prefix_matches(rel, prefix))
                .map(|(_, entry)| Arc::clone(entry))
        };
        match delegate {
            Some(entry) => entry.call(ctx),
            None => self.fallback.call(ctx),
        }
    }
}

/// A frozen router's own route tables.
struct Dispatch {
    mount: String,
    trees: HashMap<Method, matchit::Router<usize>>,
    routes: Vec<Route>,
}

enum Outcome {
    Found(usize, Vec<(String, String)>),
    MethodNotAllowed,
    NotFound,
}

impl Dispatch {
    fn resolve(&self, method: Method, rel: &str) -> Outcome {
        if let Some(matched) = self.trees.get(&method).and_then(|tree| tree.at(rel).ok()) {
            let params = matched
                .params
                .iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            return Outcome::Found(*matched.value, params);
        }

        // The path may be served under another method: 405, not 404.
        let allowed_elsewhere = self
            .trees
            .iter()
            .any(|(other, tree)| *other != method && tree.at(rel).is_ok());
        if allowed_elsewhere {
            Outcome::MethodNotAllowed
        } else {
            Outcome::NotFound
        }
    }
}

impl Endpoint for Dispatch {
    fn call(&self, mut ctx: Context) -> BoxFuture {
        let outcome = {
            let rel = relative(ctx.request().path(), &self.mount);
            self.resolve(ctx.request().method(), rel)
        };
        match outcome {
            Outcome::Found(index, params) => {
                ctx.set_params(params);
                let route = &self.routes[index];
                debug!(route = %route.name, "dispatch");
                route.handler.call(ctx)
            }
            Outcome::MethodNotAllowed => {
                ctx.set_status(StatusCode::METHOD_NOT_ALLOWED);
                Box::pin(ready(ctx))
            }
            Outcome::NotFound => {
                ctx.set_status(StatusCode::NOT_FOUND);
                Box::pin(ready(ctx))
            }
        }
    }
}

/// Strips a node's mount prefix off the request path. The root mounts at
/// `""`; a fully consumed path reads as `"/"`.
fn relative<'a>(path: &'a str, mount: &str) -> &'a str {
    let rel = path.strip_prefix(mount).unwrap_or(path);
    if rel.is_empty() { "/" } else { rel }
}

/// Prefix match on a segment boundary: `/admin` owns `/admin` and
/// `/admin/users`, never `/administrator`.
fn prefix_matches(rel: &str, prefix: &str) -> bool {
    rel.starts_with(prefix)
        && (rel.len() == prefix.len() || rel.as_bytes()[prefix.len()] == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::around;
    use crate::request::Request;

    fn request(method: Method, path: &str) -> Context {
        Context::new(Request::builder().method(method).path(path).build())
    }

    async fn list(mut ctx: Context) -> Context {
        ctx.string("list");
        ctx
    }

    async fn show(mut ctx: Context) -> Context {
        let id = ctx.param("id").unwrap_or("unknown").to_owned();
        ctx.string(&id);
        ctx
    }

    async fn create(mut ctx: Context) -> Context {
        ctx.set_status(StatusCode::CREATED);
        ctx
    }

    /// Middleware that stamps a response header after dispatch.
    fn stamp(header: &'static str) -> Transform {
        around(move |ctx: Context, next: BoxedHandler| async move {
            let mut ctx = next.call(ctx).await;
            ctx.add_header(header, "1");
            ctx
        })
    }

    #[tokio::test]
    async fn dispatches_static_and_param_routes() {
        let app = Router::new()
            .get("/users", list)
            .get("/users/{id}", show)
            .into_service();

        let ctx = app.call(request(Method::Get, "/users")).await;
        assert_eq!(ctx.body(), b"list");

        let ctx = app.call(request(Method::Get, "/users/42")).await;
        assert_eq!(ctx.body(), b"42");
    }

    #[tokio::test]
    async fn distinguishes_not_found_from_method_not_allowed() {
        let app = Router::new()
            .get("/users/{id}", show)
            .post("/users", create)
            .into_service();

        let ctx = app.call(request(Method::Get, "/nowhere")).await;
        assert_eq!(ctx.status(), StatusCode::NOT_FOUND);

        // The path exists under POST, so GET earns a 405.
        let ctx = app.call(request(Method::Get, "/users")).await;
        assert_eq!(ctx.status(), StatusCode::METHOD_NOT_ALLOWED);

        let ctx = app.call(request(Method::Post, "/users")).await;
        assert_eq!(ctx.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn supports_all_seven_methods() {
        let app = Router::new()
            .get("/r", list)
            .post("/r", list)
            .put("/r", list)
            .patch("/r", list)
            .delete("/r", list)
            .head("/r", list)
            .options("/r", list)
            .into_service();

        for method in [
            Method::Get,
            Method::Post,
            Method::Put,
            Method::Patch,
            Method::Delete,
            Method::Head,
            Method::Options,
        ] {
            let ctx = app.call(request(method, "/r")).await;
            assert_eq!(ctx.status(), StatusCode::OK, "{method}");
        }
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn duplicate_registration_panics() {
        let _ = Router::new().get("/users", list).get("/users", list);
    }

    #[tokio::test]
    async fn group_middleware_stays_inside_the_group() {
        let app = Router::new()
            .wrap(stamp("x-parent"))
            .get("/", list)
            .group("/admin", |admin| admin.wrap(stamp("x-admin")).get("/", list))
            .into_service();

        // Outside the group: parent chain only.
        let ctx = app.call(request(Method::Get, "/")).await;
        assert_eq!(ctx.response_header("x-parent"), Some("1"));
        assert_eq!(ctx.response_header("x-admin"), None);

        // Inside the group: group chain only, no parent inheritance.
        let ctx = app.call(request(Method::Get, "/admin")).await;
        assert_eq!(ctx.response_header("x-admin"), Some("1"));
        assert_eq!(ctx.response_header("x-parent"), None);

        let ctx = app.call(request(Method::Get, "/admin/")).await;
        assert_eq!(ctx.response_header("x-admin"), Some("1"));
    }

    #[tokio::test]
    async fn group_handles_its_own_not_found() {
        let app = Router::new()
            .get("/", list)
            .group("/admin", |admin| admin.wrap(stamp("x-admin")).get("/", list))
            .into_service();

        // An unknown path under the prefix 404s inside the group's chain.
        let ctx = app.call(request(Method::Get, "/admin/nowhere")).await;
        assert_eq!(ctx.status(), StatusCode::NOT_FOUND);
        assert_eq!(ctx.response_header("x-admin"), Some("1"));

        // A prefix-like path outside the group falls back to the parent.
        let ctx = app.call(request(Method::Get, "/administrator")).await;
        assert_eq!(ctx.status(), StatusCode::NOT_FOUND);
        assert_eq!(ctx.response_header("x-admin"), None);
    }

    #[tokio::test]
    async fn groups_nest() {
        let app = Router::new()
            .group("/api", |api| {
                api.group("/v1", |v1| v1.get("/users/{id}", show))
            })
            .into_service();

        let ctx = app.call(request(Method::Get, "/api/v1/users/7")).await;
        assert_eq!(ctx.body(), b"7");
    }

    #[test]
    fn route_names_are_generated_and_overridable() {
        let app = Router::new()
            .get("/users", list)
            .get("/users/{id}", show)
            .name("users.show")
            .group("/admin", |admin| admin.get("/", list));

        let table = app.route_table();
        let names: Vec<&str> = table.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, vec!["GET /users", "users.show", "GET /"]);
        assert_eq!(table[1].1, Method::Get);
        assert_eq!(table[1].2, "/users/{id}");
    }

    #[test]
    #[should_panic(expected = "must start with '/'")]
    fn group_prefix_is_validated() {
        let _ = Router::new().group("admin", |admin| admin);
    }
}
