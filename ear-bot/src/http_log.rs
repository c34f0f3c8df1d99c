//! Request logging for outgoing HTTP calls.

use std::time::Instant;

use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result as MiddlewareResult};
use tracing::{info, warn};
use uuid::Uuid;

/// Header carrying the per-request correlation id.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";

/// Stamps every request with a correlation id and logs its outcome.
#[derive(Debug, Default)]
pub struct LoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        let correlation_id = match req.headers().get(CORRELATION_ID_HEADER) {
            Some(existing) => existing
                .to_str()
                .map(str::to_string)
                .unwrap_or_else(|_| Uuid::new_v4().to_string()),
            None => Uuid::new_v4().to_string(),
        };
        if let Ok(value) = correlation_id.parse() {
            req.headers_mut().insert(CORRELATION_ID_HEADER, value);
        }

        let method = req.method().clone();
        let url = req.url().clone();
        let started = Instant::now();

        let response = next.run(req, extensions).await;
        let elapsed_ms = started.elapsed().as_millis();

        match &response {
            Ok(resp) if resp.status().is_success() => {
                info!(
                    correlation_id = %correlation_id,
                    "{} {} -> {} ({} ms)",
                    method,
                    url,
                    resp.status(),
                    elapsed_ms
                );
            }
            Ok(resp) => {
                warn!(
                    correlation_id = %correlation_id,
                    "{} {} -> {} ({} ms)",
                    method,
                    url,
                    resp.status(),
                    elapsed_ms
                );
            }
            Err(err) => {
                warn!(
                    correlation_id = %correlation_id,
                    "{} {} failed after {} ms: {}",
                    method,
                    url,
                    elapsed_ms,
                    err
                );
            }
        }

        response
    }
}
