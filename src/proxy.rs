use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use http::uri::{InvalidUri, PathAndQuery, Uri};
use hyper::client::{Client, HttpConnector};
use hyper::Body;
use hyper_rustls::HttpsConnector;
use once_cell::sync::Lazy;

use crate::response;
use crate::service::Upstream;

#[derive(Debug)]
pub struct ProxyHandler {
    uri: Uri,
    client: Arc<Client<HttpsConnector<HttpConnector>>>,
}

impl ProxyHandler {
    pub fn new(uri: Uri) -> Self {
        static CLIENT: Lazy<Arc<Client<HttpsConnector<HttpConnector>>>> =
            Lazy::new(|| Arc::new(Client::builder().build(HttpsConnector::new())));

        ProxyHandler {
            uri,
            client: CLIENT.clone(),
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub async fn handle(
        &self,
        mut request: http::Request<Body>,
        url: &str,
    ) -> http::Response<Body> {
        if let Err(err) = rewrite_request(&self.uri, &mut request, url) {
            log::info!("url `{}` produced invalid uri: {}", url, err);
            return response::from_status(http::StatusCode::NOT_FOUND);
        }
        log::debug!("Forwarding request to `{}`", request.uri());

        match self.client.request(request).await {
            Ok(response) => response,
            Err(err) => {
                log::error!("Error making request to `{}`: {}", self.uri, err);
                response::from_status(http::StatusCode::BAD_GATEWAY)
            }
        }
    }
}

impl Upstream for ProxyHandler {
    fn forward<'a>(
        &'a self,
        request: http::Request<Body>,
        url: &'a str,
    ) -> BoxFuture<'a, http::Response<Body>> {
        self.handle(request, url).boxed()
    }
}

/// Points the request at the upstream and sets `Host` to its authority.
fn rewrite_request(
    base: &Uri,
    request: &mut http::Request<Body>,
    url: &str,
) -> http::Result<()> {
    let uri = upstream_uri(base, url)?;
    if let Some(authority) = uri.authority() {
        let host = http::HeaderValue::from_str(authority.as_str())?;
        request.headers_mut().insert(http::header::HOST, host);
    }
    *request.uri_mut() = uri;
    Ok(())
}

fn upstream_uri(base: &Uri, url: &str) -> http::Result<Uri> {
    let mut parts = base.clone().into_parts();
    parts.path_and_query = Some(append_path(base.path_and_query(), url)?);
    Ok(Uri::from_parts(parts)?)
}

/// Joins a rewritten url onto the upstream path. Both query strings are kept,
/// the upstream's first.
fn append_path(base: Option<&PathAndQuery>, url: &str) -> Result<PathAndQuery, InvalidUri> {
    let (path, query) = match url.find('?') {
        Some(index) => (&url[..index], Some(&url[index + 1..])),
        None => (url, None),
    };
    let base_path = base.map_or("", PathAndQuery::path);
    let base_query = base.and_then(PathAndQuery::query);

    let mut result = String::with_capacity(base_path.len() + 2 + url.len());
    result.push_str(base_path);
    if result.ends_with('/') && path.starts_with('/') {
        result.pop();
    } else if !result.ends_with('/') && !path.starts_with('/') {
        result.push('/');
    }
    result.push_str(path);

    match (base_query, query) {
        (Some(base_query), Some(query)) if !query.is_empty() => {
            result.push('?');
            result.push_str(base_query);
            result.push('&');
            result.push_str(query);
        }
        (Some(query), _) | (None, Some(query)) => {
            result.push('?');
            result.push_str(query);
        }
        (None, None) => {}
    }

    result.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(base: &str, url: &str) -> String {
        let base: PathAndQuery = base.parse().unwrap();
        append_path(Some(&base), url).unwrap().as_str().to_owned()
    }

    #[test]
    fn joins_paths() {
        assert_eq!(join("/", "/"), "/");
        assert_eq!(join("/", "/api"), "/api");
        assert_eq!(join("/v1", "/api"), "/v1/api");
        assert_eq!(join("/v1/", "/api"), "/v1/api");
        assert_eq!(join("/v1", "inger/api"), "/v1/inger/api");
        assert_eq!(append_path(None, "inger").unwrap().as_str(), "/inger");
    }

    #[test]
    fn joins_queries() {
        assert_eq!(join("/v1", "/api?foo=bar"), "/v1/api?foo=bar");
        assert_eq!(join("/v1?key=1", "/api"), "/v1/api?key=1");
        assert_eq!(join("/v1?key=1", "/api?foo=bar"), "/v1/api?key=1&foo=bar");
        assert_eq!(join("/v1?key=1", "/?"), "/v1/?key=1");
        assert_eq!(join("/v1", "/?"), "/v1/?");
    }

    #[test]
    fn builds_upstream_uri() {
        let base: Uri = "https://example.com:8443/base".parse().unwrap();
        let uri = upstream_uri(&base, "/users?id=3").unwrap();
        assert_eq!(uri.to_string(), "https://example.com:8443/base/users?id=3");
    }

    #[test]
    fn rewrites_host_and_uri() {
        let base: Uri = "https://example.com:8443/base?key=1".parse().unwrap();
        let mut request = http::Request::get("/api/users?id=3")
            .header(http::header::HOST, "gateway.local")
            .body(Body::empty())
            .unwrap();

        rewrite_request(&base, &mut request, "/users?id=3").unwrap();

        assert_eq!(
            request.uri().to_string(),
            "https://example.com:8443/base/users?key=1&id=3"
        );
        assert_eq!(request.headers()[http::header::HOST], "example.com:8443");
        assert_eq!(request.headers().get_all(http::header::HOST).iter().count(), 1);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_bad_gateway() {
        let handler = ProxyHandler::new("http://127.0.0.1:1/v1".parse().unwrap());
        let request = http::Request::get("/x").body(Body::empty()).unwrap();
        let response = handler.handle(request, "/y?z").await;
        assert_eq!(response.status(), http::StatusCode::BAD_GATEWAY);
    }
}
