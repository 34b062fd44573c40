//! HTTP upstream used by `mirrorfs fetch`

use crate::config::UpstreamConfig;
use crate::error::{MirrorError, MirrorResult};
use crate::mirror::{Handler, ResponseWriter};
use std::io::Read;
use std::time::Duration;
use tracing::debug;
use ureq::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use ureq::http::{Method, Request};
use ureq::Agent;

/// Headers copied from the upstream response
const FORWARDED_HEADERS: [ureq::http::HeaderName; 5] =
    [CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED, CACHE_CONTROL];

const CHUNK_SIZE: usize = 64 * 1024;

/// Forwards requests to `base_url` + request path
pub struct UpstreamHandler {
    agent: Agent,
    base_url: String,
}

impl UpstreamHandler {
    pub fn new(config: &UpstreamConfig) -> MirrorResult<Self> {
        let base_url = config.base_url.trim_end_matches('/');
        if base_url.is_empty() {
            return Err(MirrorError::NoUpstream);
        }

        // Non-2xx responses are passed on, not turned into errors.
        // Without compression features the body arrives byte for byte.
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build()
            .new_agent();

        Ok(Self {
            agent,
            base_url: base_url.to_string(),
        })
    }

    /// Full upstream URL for a request
    pub fn url_for(&self, req: &Request<()>) -> String {
        let path = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!("{}{}", self.base_url, path)
    }
}

impl Handler for UpstreamHandler {
    fn serve(&self, req: &Request<()>, w: &mut dyn ResponseWriter) -> MirrorResult<()> {
        let url = self.url_for(req);
        let upstream_err = |reason: String| MirrorError::Upstream {
            url: url.clone(),
            reason,
        };

        debug!(method = %req.method(), url = %url, "Requesting upstream");
        let response = if req.method() == Method::GET {
            self.agent.get(&url).call()
        } else if req.method() == Method::HEAD {
            self.agent.head(&url).call()
        } else {
            return Err(upstream_err(format!(
                "method {} is not supported",
                req.method()
            )));
        }
        .map_err(|e| upstream_err(e.to_string()))?;

        let status = response.status();
        debug!(status = %status, "Upstream responded");
        for name in FORWARDED_HEADERS {
            if let Some(value) = response.headers().get(&name) {
                w.headers_mut().insert(name, value.clone());
            }
        }
        w.write_header(status);

        let mut body = response.into_body().into_reader();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = body
                .read(&mut buf)
                .map_err(|e| upstream_err(e.to_string()))?;
            if n == 0 {
                break;
            }
            w.write(&buf[..n])
                .map_err(|e| MirrorError::io("writing response body", e))?;
        }
        Ok(())
    }
}
