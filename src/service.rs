use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use hyper::Body;
use path_router::Router;

use crate::config::Config;
use crate::proxy::ProxyHandler;
use crate::response;

/// Where a matched request is sent, given the url the router rewrote it to.
pub trait Upstream: Send + Sync + 'static {
    fn forward<'a>(
        &'a self,
        request: http::Request<Body>,
        url: &'a str,
    ) -> BoxFuture<'a, http::Response<Body>>;
}

impl Config {
    pub fn into_router(self) -> Router<ProxyHandler> {
        self.routes
            .into_iter()
            .map(|route| (route.path.into_regex(), ProxyHandler::new(route.uri)))
            .collect()
    }
}

/// Routes one request. Unmatched paths get a 404 and a panicking upstream
/// gets a 500.
pub async fn handle<U: Upstream>(
    router: Arc<Router<U>>,
    request: http::Request<Body>,
) -> http::Response<Body> {
    let url = match request.uri().path_and_query() {
        Some(path_and_query) => path_and_query.as_str().to_owned(),
        None => request.uri().path().to_owned(),
    };

    let found = match router.find(&url) {
        Some(found) => found,
        None => {
            log::info!("Path `{}` did not match any route", request.uri().path());
            return response::from_status(http::StatusCode::NOT_FOUND);
        }
    };

    let forwarded = async move { found.service.forward(request, &found.url).await };
    match AssertUnwindSafe(forwarded).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            log::error!(
                "Panic while forwarding `{}`: {}",
                url,
                panic_message(&*payload)
            );
            response::from_status(http::StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    match payload.downcast_ref::<&'static str>() {
        Some(message) => *message,
        None => payload
            .downcast_ref::<String>()
            .map_or("<non-string panic payload>", String::as_str),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Panicking;

    impl Upstream for Panicking {
        fn forward<'a>(
            &'a self,
            _: http::Request<Body>,
            _: &'a str,
        ) -> BoxFuture<'a, http::Response<Body>> {
            panic!("upstream exploded")
        }
    }

    struct Teapot;

    impl Upstream for Teapot {
        fn forward<'a>(
            &'a self,
            request: http::Request<Body>,
            url: &'a str,
        ) -> BoxFuture<'a, http::Response<Body>> {
            assert_eq!(request.uri().path(), "/tea/green");
            assert_eq!(url, "/green?cups=2");
            let response = response::from_status(http::StatusCode::IM_A_TEAPOT);
            futures::future::ready(response).boxed()
        }
    }

    fn get(uri: &str) -> http::Request<Body> {
        http::Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn unmatched_path_is_not_found() {
        let router: Arc<Router<Teapot>> = Arc::new(Router::new(vec![]));
        let response = handle(router, get("/missing?x=1")).await;
        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn matched_path_is_forwarded_with_rewritten_url() {
        let router = Arc::new(Router::from_patterns(vec![("^/tea", Teapot)]).unwrap());
        let response = handle(router, get("/tea/green?cups=2")).await;
        assert_eq!(response.status(), http::StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn panicking_upstream_is_internal_server_error() {
        let router = Arc::new(Router::from_patterns(vec![("^/", Panicking)]).unwrap());
        let response = handle(router, get("/boom")).await;
        assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn panic_messages() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");

        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*payload), "<non-string panic payload>");
    }
}
