use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use http::Request as HttpRequest;
use http::Response as HttpResponse;
use tower::{Layer, Service};

/// Paths polled often enough that logging them is noise.
const QUIET_PATHS: &[&str] = &["/health"];

#[derive(Debug, Clone, Default)]
pub struct RequestLogLayer;

impl RequestLogLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestLogLayer {
    type Service = RequestLog<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLog { inner }
    }
}

/// Logs method, path, status and duration of every completed request.
#[derive(Debug, Clone)]
pub struct RequestLog<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<HttpRequest<ReqBody>> for RequestLog<S>
where
    S: Service<HttpRequest<ReqBody>, Response = HttpResponse<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = HttpResponse<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: HttpRequest<ReqBody>) -> Self::Future {
        let mut inner = self.inner.clone();
        std::mem::swap(&mut self.inner, &mut inner);

        Box::pin(async move {
            let path = req.uri().path().to_string();
            if QUIET_PATHS.iter().any(|p| path == *p) {
                return inner.call(req).await;
            }

            let method = req.method().clone();
            let started = Instant::now();
            let response = inner.call(req).await?;
            let duration_ms = (started.elapsed().as_secs_f64() * 100_000.0).round() / 100.0;

            tracing::info!(
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                duration_ms,
                "request"
            );

            Ok(response)
        })
    }
}
