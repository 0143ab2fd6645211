// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Route Table
//!
//! Maps `(HTTP method, URL pattern)` to an RPC method name and a body
//! transcoding rule, in the style of grpc-gateway `google.api.http`
//! annotations:
//!
//! ```yaml
//! - method: POST
//!   pattern: /v1/ping
//!   rpc: proto.Ping/SayHello
//!   body: "*"
//! - method: GET
//!   pattern: /v1/ping/{greeting}
//!   rpc: proto.Ping/SayHello
//! ```
//!
//! Patterns are made of literal segments, `{name}` parameters and a final
//! `{name=**}` catch-all. When several patterns match, the one whose
//! segments rank highest wins, compared left to right: a literal beats a
//! parameter, which beats a catch-all. An all-literal pattern therefore
//! always beats a parameterized one.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** REST-to-RPC method resolution

use http::Method;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::registry::method_from_path;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),

    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid RPC method name {0:?}")]
    InvalidRpcMethod(String),

    #[error("route {method} {pattern} conflicts with an existing route")]
    Conflict { method: String, pattern: String },
}

/// How the HTTP body maps onto the request message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BodyRule {
    /// The whole body is the request message (`body: "*"`).
    Whole,
    /// The body is bound to one top-level field.
    Field(String),
    /// No body; the message is built from path and query parameters.
    #[default]
    None,
}

impl BodyRule {
    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::None,
            Some("*") => Self::Whole,
            Some(field) => Self::Field(field.to_string()),
        }
    }

    fn as_config(&self) -> Option<String> {
        match self {
            Self::Whole => Some("*".to_string()),
            Self::Field(field) => Some(field.clone()),
            Self::None => None,
        }
    }
}

/// Declarative form of a route, as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub method: String,
    pub pattern: String,
    pub rpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl RouteSpec {
    pub fn new(method: &str, pattern: &str, rpc: &str, body: Option<&str>) -> Self {
        Self {
            method: method.to_string(),
            pattern: pattern.to_string(),
            rpc: rpc.to_string(),
            body: body.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    CatchAll(String),
}

impl Segment {
    fn rank(&self) -> u8 {
        match self {
            Self::Literal(_) => 2,
            Self::Param(_) => 1,
            Self::CatchAll(_) => 0,
        }
    }

    /// Shape used for conflict detection; parameter names do not matter.
    fn shape(&self) -> Option<&str> {
        match self {
            Self::Literal(text) => Some(text),
            Self::Param(_) => Some("{}"),
            Self::CatchAll(_) => Some("{**}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let rest = pattern
            .strip_prefix('/')
            .ok_or_else(|| invalid("must start with '/'"))?;
        if rest.is_empty() {
            return Ok(Self {
                raw: pattern.to_string(),
                segments: Vec::new(),
            });
        }

        let parts: Vec<&str> = rest.split('/').collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut names: Vec<&str> = Vec::new();
        for (index, part) in parts.iter().enumerate() {
            if part.is_empty() {
                return Err(invalid("empty path segment"));
            }
            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(inner) => {
                    let (name, catch_all) = match inner.split_once('=') {
                        Some((name, "**")) => (name, true),
                        Some(_) => return Err(invalid("only `=**` is supported in parameters")),
                        None => (inner, false),
                    };
                    if name.is_empty()
                        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                    {
                        return Err(invalid("parameter names must be [A-Za-z0-9_]+"));
                    }
                    if names.contains(&name) {
                        return Err(invalid("duplicate parameter name"));
                    }
                    names.push(name);
                    if catch_all {
                        if index + 1 != parts.len() {
                            return Err(invalid("catch-all must be the last segment"));
                        }
                        Segment::CatchAll(name.to_string())
                    } else {
                        Segment::Param(name.to_string())
                    }
                }
                None if part.contains('{') || part.contains('}') => {
                    return Err(invalid("braces must enclose a whole segment"));
                }
                None => Segment::Literal(part.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn ranks(&self) -> Vec<u8> {
        self.segments.iter().map(Segment::rank).collect()
    }

    fn same_shape(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a.shape() == b.shape())
    }

    /// Match a request path, returning the decoded parameter bindings.
    fn matches(&self, path: &[&str]) -> Option<Vec<(String, String)>> {
        let mut params = Vec::new();
        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::CatchAll(name) => {
                    let tail = &path[index.min(path.len())..];
                    if tail.is_empty() || tail.iter().any(|s| s.is_empty()) {
                        return None;
                    }
                    let decoded = tail
                        .iter()
                        .map(|s| decode_segment(s))
                        .collect::<Option<Vec<_>>>()?;
                    params.push((name.clone(), decoded.join("/")));
                    return Some(params);
                }
                Segment::Literal(text) => {
                    if path.get(index).map(|s| decode_segment(s)) != Some(Some(text.clone())) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = path.get(index).filter(|s| !s.is_empty())?;
                    params.push((name.clone(), decode_segment(value)?));
                }
            }
        }
        (path.len() == self.segments.len()).then_some(params)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn decode_segment(segment: &str) -> Option<String> {
    percent_decode_str(segment)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

fn split_path(path: &str) -> Vec<&str> {
    match path.strip_prefix('/') {
        Some("") | None => Vec::new(),
        Some(rest) => rest.split('/').collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    pub pattern: PathPattern,
    pub rpc_method: String,
    pub body: BodyRule,
}

impl Route {
    pub fn from_spec(spec: &RouteSpec) -> Result<Self, RouteError> {
        let method = Method::from_bytes(spec.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| RouteError::InvalidMethod(spec.method.clone()))?;
        let pattern = PathPattern::parse(spec.pattern.trim())?;
        let rpc_method = spec.rpc.trim().to_string();
        if method_from_path(&format!("/{rpc_method}")).is_none() {
            return Err(RouteError::InvalidRpcMethod(spec.rpc.clone()));
        }
        Ok(Self {
            method,
            pattern,
            rpc_method,
            body: BodyRule::parse(spec.body.as_deref()),
        })
    }

    pub fn to_spec(&self) -> RouteSpec {
        RouteSpec {
            method: self.method.to_string(),
            pattern: self.pattern.to_string(),
            rpc: self.rpc_method.clone(),
            body: self.body.as_config(),
        }
    }
}

/// A resolved route plus its path parameter bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(specs: &[RouteSpec]) -> Result<Self, RouteError> {
        let mut routes: Vec<Route> = Vec::with_capacity(specs.len());
        for spec in specs {
            let route = Route::from_spec(spec)?;
            let conflict = routes
                .iter()
                .any(|r| r.method == route.method && r.pattern.same_shape(&route.pattern));
            if conflict {
                return Err(RouteError::Conflict {
                    method: route.method.to_string(),
                    pattern: route.pattern.to_string(),
                });
            }
            routes.push(route);
        }
        Ok(Self { routes })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Resolve a request. `path` must not include the query string.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        let segments = split_path(path);
        self.routes
            .iter()
            .filter(|route| &route.method == method)
            .filter_map(|route| {
                route
                    .pattern
                    .matches(&segments)
                    .map(|params| (route.pattern.ranks(), RouteMatch { route, params }))
            })
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, matched)| matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(specs: &[(&str, &str, &str)]) -> RouteTable {
        let specs: Vec<RouteSpec> = specs
            .iter()
            .map(|(m, p, rpc)| RouteSpec::new(m, p, rpc, Some("*")))
            .collect();
        RouteTable::new(&specs).unwrap()
    }

    #[test]
    fn test_exact_match_beats_parameter() {
        let routes = table(&[
            ("GET", "/v1/users/{id}", "svc.Users/Get"),
            ("GET", "/v1/users/me", "svc.Users/Me"),
        ]);
        let matched = routes.resolve(&Method::GET, "/v1/users/me").unwrap();
        assert_eq!(matched.route.rpc_method, "svc.Users/Me");
        assert!(matched.params.is_empty());

        let matched = routes.resolve(&Method::GET, "/v1/users/42").unwrap();
        assert_eq!(matched.route.rpc_method, "svc.Users/Get");
        assert_eq!(matched.params, vec![("id".to_string(), "42".to_string())]);
    }

    #[test]
    fn test_concrete_segment_outranks_wildcard_at_same_position() {
        let routes = table(&[
            ("GET", "/v1/{kind}/items/{id}", "svc.Items/Any"),
            ("GET", "/v1/books/{shelf}/{id}", "svc.Items/Book"),
        ]);
        let matched = routes.resolve(&Method::GET, "/v1/books/items/7").unwrap();
        assert_eq!(matched.route.rpc_method, "svc.Items/Book");
    }

    #[test]
    fn test_catch_all_ranks_below_parameters() {
        let routes = table(&[
            ("GET", "/v1/files/{path=**}", "svc.Files/Read"),
            ("GET", "/v1/files/{dir}/meta", "svc.Files/Meta"),
        ]);
        let meta = routes.resolve(&Method::GET, "/v1/files/docs/meta").unwrap();
        assert_eq!(meta.route.rpc_method, "svc.Files/Meta");

        let read = routes.resolve(&Method::GET, "/v1/files/docs/a%20b.txt").unwrap();
        assert_eq!(read.route.rpc_method, "svc.Files/Read");
        assert_eq!(read.params, vec![("path".to_string(), "docs/a b.txt".to_string())]);

        assert!(routes.resolve(&Method::GET, "/v1/files").is_none());
    }

    #[test]
    fn test_method_and_length_must_match() {
        let routes = table(&[("POST", "/v1/ping", "proto.Ping/SayHello")]);
        assert!(routes.resolve(&Method::POST, "/v1/ping").is_some());
        assert!(routes.resolve(&Method::GET, "/v1/ping").is_none());
        assert!(routes.resolve(&Method::POST, "/v1/ping/extra").is_none());
        assert!(routes.resolve(&Method::POST, "/v1/nonexistent").is_none());
        assert!(routes.resolve(&Method::POST, "/v1/ping/").is_none());
    }

    #[test]
    fn test_conflicting_shapes_rejected() {
        let specs = vec![
            RouteSpec::new("GET", "/v1/users/{id}", "svc.Users/Get", None),
            RouteSpec::new("get", "/v1/users/{name}", "svc.Users/ByName", None),
        ];
        assert!(matches!(
            RouteTable::new(&specs),
            Err(RouteError::Conflict { .. })
        ));
    }

    #[test]
    fn test_invalid_specs_rejected() {
        let bad = [
            RouteSpec::new("GET", "v1/users", "svc.Users/Get", None),
            RouteSpec::new("GET", "/v1//users", "svc.Users/Get", None),
            RouteSpec::new("GET", "/v1/{a=**}/x", "svc.Users/Get", None),
            RouteSpec::new("GET", "/v1/{a}/{a}", "svc.Users/Get", None),
            RouteSpec::new("GET", "/v1/us{er}", "svc.Users/Get", None),
            RouteSpec::new("GET", "/v1/users", "Get", None),
            RouteSpec::new("BAD METHOD", "/v1/users", "svc.Users/Get", None),
        ];
        for spec in bad {
            assert!(RouteTable::new(&[spec.clone()]).is_err(), "{spec:?}");
        }
    }

    #[test]
    fn test_body_rule_round_trip() {
        let spec = RouteSpec::new("PUT", "/v1/notes/{id}", "svc.Notes/Update", Some("note"));
        let route = Route::from_spec(&spec).unwrap();
        assert_eq!(route.body, BodyRule::Field("note".to_string()));
        assert_eq!(route.to_spec(), spec);
        let none = Route::from_spec(&RouteSpec::new("GET", "/", "svc.Root/Get", None)).unwrap();
        assert_eq!(none.body, BodyRule::None);
    }
}
