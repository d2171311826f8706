// HTTP client configuration for ICY streams

use airwave_core::{AudioError, Result};
use std::time::Duration;

/// HTTP options for opening a radio stream
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub user_agent: String,
    pub connect_timeout: Duration,
    /// Timeout of a single blocking socket read in the pump thread
    pub read_timeout: Duration,
    pub redirects: u32,
    /// Extra attempts when the initial request fails
    pub retries: u32,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (compatible; Airwave/0.2)".to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            redirects: 10,
            retries: 0,
        }
    }
}

/// Create a configured HTTP agent
pub fn create_http_agent(options: &HttpOptions) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(options.connect_timeout)
        .timeout_read(options.read_timeout)
        .user_agent(&options.user_agent)
        .redirects(options.redirects)
        .build()
}

/// GET a stream with in-band metadata requested, retrying with exponential backoff
pub fn request_stream(agent: &ureq::Agent, url: &str, retries: u32) -> Result<ureq::Response> {
    let mut last_error = None;

    for attempt in 0..=retries {
        match agent.get(url).set("Icy-MetaData", "1").call() {
            Ok(response) => return Ok(response),
            Err(ureq::Error::Status(code, _)) => {
                return Err(AudioError::NetworkError(format!(
                    "HTTP status {} from {}",
                    code, url
                )));
            }
            Err(e) => {
                last_error = Some(e);
                if attempt < retries {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    log::warn!(
                        "Stream request failed (attempt {}), retrying after {:?}",
                        attempt + 1,
                        delay
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }

    Err(AudioError::NetworkError(format!(
        "Request failed after {} attempts: {:?}",
        retries + 1,
        last_error
    )))
}
