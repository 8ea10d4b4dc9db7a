//! Station health prober
//!
//! Issues a single liveness check against one stream endpoint. Probing never
//! returns an error to the caller: DNS failures, refused connections, TLS
//! problems and non-2xx responses all collapse into `reachable = false`, and
//! a probe that has not returned by the deadline is reported as unreachable
//! with the timeout as its latency.

use reqwest::Client;
use std::time::{Duration, Instant};

/// Result of one liveness check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeOutcome {
    pub reachable: bool,
    pub latency: Duration,
}

impl ProbeOutcome {
    pub fn latency_secs(&self) -> f64 {
        self.latency.as_secs_f64()
    }
}

#[derive(Debug, Clone)]
pub struct HealthProber {
    client: Client,
}

impl HealthProber {
    pub fn new() -> Self {
        // Per-request timeouts only; redirects are followed so stations
        // behind load balancers still count as reachable.
        let client = Client::builder()
            .user_agent(concat!("radio-recorder/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    /// Check whether a stream endpoint answers within `timeout`.
    pub async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        let started = Instant::now();
        let request = self.client.head(url).timeout(timeout).send();

        match tokio::time::timeout(timeout, request).await {
            // Probe still in flight at the deadline
            Err(_) => ProbeOutcome {
                reachable: false,
                latency: timeout,
            },
            Ok(Err(_)) => ProbeOutcome {
                reachable: false,
                latency: started.elapsed().min(timeout),
            },
            Ok(Ok(response)) => ProbeOutcome {
                reachable: response.status().is_success(),
                latency: started.elapsed(),
            },
        }
    }
}

impl Default for HealthProber {
    fn default() -> Self {
        Self::new()
    }
}
