//! Route Guard
//!
//! Cookie-based access control in front of the router. Paths are matched
//! against a route table; unlisted paths pass through untouched.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use reqwest::Url;
use tracing::debug;

pub const AUTH_COOKIE: &str = "auth-token";
pub const ROLE_COOKIE: &str = "user-role";
pub const ADMIN_ROLE: &str = "admin";
pub const LOGIN_PATH: &str = "/login";
pub const DASHBOARD_PATH: &str = "/dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    /// Requires an auth token
    Private,
    /// Requires an auth token and the admin role
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub path: String,
    pub access: Access,
    /// Also covers every path below `path`
    pub prefix: bool,
}

// == Route Table ==
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exact(mut self, path: &str, access: Access) -> Self {
        self.rules.push(RouteRule {
            path: path.to_string(),
            access,
            prefix: false,
        });
        self
    }

    pub fn prefix(mut self, path: &str, access: Access) -> Self {
        self.rules.push(RouteRule {
            path: path.to_string(),
            access,
            prefix: true,
        });
        self
    }

    /// Access level for `path`; exact rules win over prefixes, longer prefixes
    /// over shorter ones.
    pub fn access_for(&self, path: &str) -> Option<Access> {
        if let Some(rule) = self.rules.iter().find(|r| !r.prefix && r.path == path) {
            return Some(rule.access);
        }
        self.rules
            .iter()
            .filter(|r| r.prefix && under(path, &r.path))
            .max_by_key(|r| r.path.len())
            .map(|r| r.access)
    }

    /// Table guarding this server's endpoints.
    pub fn api_default() -> Self {
        Self::new()
            .exact("/health", Access::Public)
            .exact(LOGIN_PATH, Access::Public)
            .prefix("/documents", Access::Private)
            .prefix("/query", Access::Private)
            .exact("/batch", Access::Private)
            .prefix("/selection", Access::Private)
            .prefix("/analysis", Access::Private)
            .prefix("/errors", Access::Private)
            .exact(DASHBOARD_PATH, Access::Private)
            .prefix("/cache", Access::Admin)
            .prefix("/admin", Access::Admin)
    }
}

fn under(path: &str, base: &str) -> bool {
    path == base
        || path
            .strip_prefix(base)
            .map_or(false, |rest| rest.starts_with('/'))
}

/// Outcome of checking a request against the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Redirect(String),
}

/// Decides whether a request may proceed given its cookies.
pub fn evaluate(table: &RouteTable, path: &str, headers: &HeaderMap) -> Verdict {
    let access = match table.access_for(path) {
        None | Some(Access::Public) => return Verdict::Allow,
        Some(access) => access,
    };

    if cookie(headers, AUTH_COOKIE).map_or(true, |token| token.is_empty()) {
        return Verdict::Redirect(login_redirect(path));
    }

    if access == Access::Admin && cookie(headers, ROLE_COOKIE).as_deref() != Some(ADMIN_ROLE) {
        return Verdict::Redirect(DASHBOARD_PATH.to_string());
    }

    Verdict::Allow
}

/// Axum middleware applying `evaluate`.
pub async fn route_guard(
    State(table): State<Arc<RouteTable>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    match evaluate(&table, &path, req.headers()) {
        Verdict::Allow => next.run(req).await,
        Verdict::Redirect(target) => {
            debug!("Route guard redirecting {} to {}", path, target);
            Redirect::temporary(&target).into_response()
        }
    }
}

fn login_redirect(path: &str) -> String {
    let mut url = match Url::parse("http://localhost/") {
        Ok(url) => url,
        Err(_) => return LOGIN_PATH.to_string(),
    };
    url.set_path(LOGIN_PATH);
    url.query_pairs_mut().append_pair("redirect", path);
    match url.query() {
        Some(query) => format!("{}?{}", LOGIN_PATH, query),
        None => LOGIN_PATH.to_string(),
    }
}

/// Reads one cookie value from the `Cookie` headers.
pub fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
}
