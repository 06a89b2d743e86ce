//! Minimal hearth example: HTML pages with live reload, JSON endpoints,
//! a guarded admin group, and cookies.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/
//!   curl http://localhost:3000/users/42
//!   curl -X DELETE http://localhost:3000/users/42        # 405
//!   curl http://localhost:3000/admin/                    # 401
//!   curl -H 'x-admin-token: hunter2' http://localhost:3000/admin/
//!
//! Open http://localhost:3000/ in a browser: the page reloads every time
//! the stand-in watcher below broadcasts.

use std::time::Duration;

use hearth::{
    livereload, middleware, BoxedHandler, Context, Cookie, Notifier, Request, Response, Router,
    Server, StatusCode,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let reload = Notifier::new();

    let app = Router::new()
        .get("/", home)
        .get("/users/{id}", get_user).name("users.show")
        .post("/users", create_user)
        .group("/admin", |admin| {
            admin
                .wrap(middleware::around(require_token))
                .get("/", dashboard)
        });

    // Stand-in for the external rebuild watcher: in a real setup the
    // watcher calls `broadcast()` after each successful rebuild.
    tokio::spawn({
        let reload = reload.clone();
        async move {
            loop {
                tokio::time::sleep(Duration::from_secs(30)).await;
                reload.broadcast();
            }
        }
    });

    Server::bind("0.0.0.0:3000")
        .wrap(middleware::trace())
        .wrap(livereload::filter(reload))
        .serve(app)
        .await
        .expect("server error");
}

// GET / — an HTML page; the livereload filter injects its script tag
// before </head> on the way out.
async fn home(mut ctx: Context) -> Context {
    let visits: u64 = ctx
        .cookie("visits")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
        + 1;
    ctx.set_cookie(Cookie::new("visits", visits.to_string()).path("/").http_only(true));
    ctx.html(format!(
        "<html><head><title>hearth</title></head>\
         <body><h1>hello</h1><p>visit #{visits}</p></body></html>"
    ));
    ctx
}

// GET /users/{id} — the raw-function handler shape.
async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#).into_bytes())
}

// POST /users
async fn create_user(req: Request) -> Response {
    if req.body().is_empty() {
        return Response::status(StatusCode::BAD_REQUEST);
    }
    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/users/99")
        .json(br#"{"id":"99"}"#.to_vec())
}

// GET /admin/ — behind the group's token check.
async fn dashboard(mut ctx: Context) -> Context {
    ctx.string("admin dashboard");
    ctx
}

// Group middleware: reject requests without the admin token.
async fn require_token(ctx: Context, next: BoxedHandler) -> Context {
    if ctx.request().header("x-admin-token").is_none() {
        let mut ctx = ctx;
        ctx.set_status(StatusCode::UNAUTHORIZED);
        return ctx;
    }
    next.call(ctx).await
}
