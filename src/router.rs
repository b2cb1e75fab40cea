use std::iter::FromIterator;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// An ordered, immutable table of `(pattern, service)` entries.
///
/// Patterns are tried against the path component of a URL in the order they
/// were given and the first one to match wins. The service type is never
/// inspected by the router.
#[derive(Debug, Clone)]
pub struct Router<S> {
    entries: Vec<(Regex, S)>,
}

/// The result of a successful [`Router::find`].
#[derive(Debug)]
pub struct Match<'r, 'u, S> {
    /// The service of the matching entry.
    pub service: &'r S,
    /// The captures produced by the matching pattern against the path.
    pub captures: Captures<'u>,
    /// The path following the match (or `/` if nothing follows it), with the
    /// original query string appended.
    pub url: String,
}

impl<S> Router<S> {
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Regex, S)>,
    {
        Router {
            entries: entries.into_iter().collect(),
        }
    }

    /// Compiles every pattern up front, failing on the first invalid one.
    pub fn from_patterns<I, P>(entries: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = (P, S)>,
        P: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .map(|(pattern, service)| Ok((Regex::new(pattern.as_ref())?, service)))
            .collect::<Result<_, regex::Error>>()?;
        Ok(Router { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Regex, &S)> {
        self.entries.iter().map(|(regex, service)| (regex, service))
    }

    /// Finds the first entry whose pattern matches the path of `url`.
    ///
    /// The rewritten URL is everything in the path after the *end* of the
    /// match. An unanchored pattern that matches part way through the path
    /// therefore drops the text before the match as well: `b/c` against
    /// `/a/b/c/d` rewrites to `/d`. Older JavaScript routers of this shape
    /// sliced by the match *length* instead, which would give `b/c/d` here;
    /// the end offset is intentional.
    pub fn find<'u>(&self, url: &'u str) -> Option<Match<'_, 'u, S>> {
        let (path, query) = split_url(url);

        let (captures, service) = match self
            .entries
            .iter()
            .find_map(|(regex, service)| regex.captures(path).map(|captures| (captures, service)))
        {
            Some(found) => found,
            None => {
                log::trace!("Path `{}` did not match any route", path);
                return None;
            }
        };

        let end = captures.get(0).map_or(0, |m| m.end());
        let remainder = match &path[end..] {
            "" => "/",
            remainder => remainder,
        };

        let query = query.unwrap_or("");
        let mut url = String::with_capacity(remainder.len() + query.len());
        url.push_str(remainder);
        url.push_str(query);

        log::trace!("Path `{}` matched, rewritten to `{}`", path, url);
        Some(Match {
            service,
            captures,
            url,
        })
    }
}

impl<S> FromIterator<(Regex, S)> for Router<S> {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = (Regex, S)>,
    {
        Router::new(iter)
    }
}

/// Splits a URL into its path and its query string (including the `?`).
fn split_url(url: &str) -> (&str, Option<&str>) {
    let url = match url.find('#') {
        Some(index) => &url[..index],
        None => url,
    };

    let (path, query) = match url.find('?') {
        Some(index) => (&url[..index], Some(&url[index..])),
        None => (url, None),
    };

    (strip_origin(path), query)
}

/// Reduces an absolute-form URL to its path. An origin with no path at all
/// has the root path.
fn strip_origin(url: &str) -> &str {
    static SCHEME_REGEX: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").unwrap());

    match SCHEME_REGEX.find(url) {
        Some(scheme) => {
            let rest = &url[scheme.end()..];
            match rest.find('/') {
                Some(index) => &rest[index..],
                None => "/",
            }
        }
        None => url,
    }
}
