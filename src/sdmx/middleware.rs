//! HTTP middleware for registry requests.

use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};
use std::time::Instant;
use tracing::{trace, warn};

use crate::utils::fmt_duration;

/// Logs every outbound request with its status and latency.
pub struct TransparentMiddleware;

#[async_trait::async_trait]
impl Middleware for TransparentMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let method = req.method().to_string();
        let url = req.url().to_string();
        let start = Instant::now();

        trace!(method, url, "Registry request started");
        let result = next.run(req, extensions).await;
        let duration = fmt_duration(start.elapsed());

        match &result {
            Ok(response) if response.status().is_success() => {
                trace!(method, url, status = response.status().as_u16(), duration, "Registry request finished");
            }
            Ok(response) => {
                warn!(method, url, status = response.status().as_u16(), duration, "Registry request returned an error status");
            }
            Err(e) => {
                warn!(method, url, duration, error = ?e, "Registry request failed");
            }
        }

        result
    }
}
