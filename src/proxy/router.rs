//! Prefix-based route matching.

use std::fmt;

use crate::config::RouteConfig;

/// A single prefix route.
#[derive(Debug, Clone)]
pub struct Route {
    /// Path prefix, compared by literal string prefix match.
    pub prefix: String,
    /// Upstream base URL the stripped suffix is appended to.
    pub upstream: String,
}

/// Ordered, immutable table of prefix routes, built once from
/// configuration. Prefixes are opaque strings; nothing about them is
/// validated beyond the string comparison done at match time.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(configs: Vec<RouteConfig>) -> Self {
        let routes = configs
            .into_iter()
            .map(|c| Route {
                prefix: c.prefix,
                upstream: c.upstream,
            })
            .collect();

        Self { routes }
    }
}

/// Route resolution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    /// Zero or more than one prefix matched. The two cases are
    /// deliberately indistinguishable to the caller; overlapping prefixes
    /// are a configuration problem that only shows up at request time.
    NotUnique,
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::NotUnique => write!(f, "no unique route for path"),
        }
    }
}

impl std::error::Error for RouteError {}

/// Decides whether a request path is proxy-bound and resolves its route.
///
/// Pure functions of the route table and the input path; no side effects.
#[derive(Debug, Clone)]
pub struct Router {
    table: RouteTable,
}

impl Router {
    pub fn new(table: RouteTable) -> Self {
        Self { table }
    }

    /// Normalize path components: join with `/` and prefix with `/`.
    ///
    /// Note that `/example/api/` decomposes to `["example", "api"]` and
    /// normalizes to `/example/api`, which does not match a prefix that
    /// ends in a slash.
    pub fn normalize_path(components: &[&str]) -> String {
        format!("/{}", components.join("/"))
    }

    /// True iff exactly one configured prefix matches the normalized path.
    pub fn is_routable(&self, components: &[&str]) -> bool {
        self.matched(&Self::normalize_path(components)).len() == 1
    }

    /// Resolve the unique matching route for the path.
    ///
    /// Zero matches and overlapping matches both yield `NotUnique`; there
    /// is no longest-prefix tie-break.
    pub fn resolve(&self, components: &[&str]) -> Result<&Route, RouteError> {
        let path = Self::normalize_path(components);
        let matched = self.matched(&path);

        if matched.len() != 1 {
            tracing::warn!(
                path = %path,
                matched = matched.len(),
                "Invalid number of proxy prefixes for path"
            );
            return Err(RouteError::NotUnique);
        }

        Ok(matched[0])
    }

    fn matched(&self, path: &str) -> Vec<&Route> {
        self.table
            .routes
            .iter()
            .filter(|r| path.starts_with(&r.prefix))
            .collect()
    }
}
