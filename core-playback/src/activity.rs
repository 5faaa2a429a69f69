//! Fire-and-forget "a play happened" ping.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::PlaybackError;

#[derive(Serialize)]
struct PlayPing<'a> {
    song: &'a str,
}

/// Sends at most one play ping per session.
///
/// Delivery problems are swallowed: the ping is analytics, not state.
pub struct ActivityReporter {
    target: Option<(Arc<dyn HttpClient>, String)>,
    timeout: Duration,
    reported: AtomicBool,
}

impl ActivityReporter {
    pub fn new(http: Arc<dyn HttpClient>, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: Some((http, endpoint.into())),
            timeout,
            reported: AtomicBool::new(false),
        }
    }

    /// Reporter that never sends anything.
    pub fn disabled() -> Self {
        Self {
            target: None,
            timeout: Duration::ZERO,
            reported: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    pub fn has_reported(&self) -> bool {
        self.reported.load(Ordering::SeqCst)
    }

    /// Spawn the ping for `item_id` unless one was already sent.
    ///
    /// Returns the task handle so callers may await delivery in tests.
    pub fn report_play(&self, item_id: &str) -> Option<JoinHandle<()>> {
        let (http, endpoint) = self.target.as_ref()?;
        if self.reported.swap(true, Ordering::SeqCst) {
            return None;
        }

        let request = match HttpRequest::new(HttpMethod::Post, endpoint.as_str())
            .timeout(self.timeout)
            .json(&PlayPing { song: item_id })
        {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Could not build play ping");
                return None;
            }
        };

        let http = Arc::clone(http);
        let item_id = item_id.to_string();
        Some(tokio::spawn(async move {
            let failure = match http.execute(request).await {
                Ok(response) if response.is_success() => None,
                Ok(response) => Some(format!("status {}", response.status)),
                Err(e) => Some(e.to_string()),
            };
            match failure {
                None => debug!(item_id = %item_id, "Play ping delivered"),
                Some(reason) => {
                    let err = PlaybackError::LoggingDeliveryFailure(reason);
                    debug!(item_id = %item_id, error = %err, "Play ping dropped");
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::{HttpResponse, RetryPolicy};
    use std::collections::HashMap;

    mockall::mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn execute_with_retry(&self, request: HttpRequest, policy: RetryPolicy) -> BridgeResult<HttpResponse>;
        }
    }

    fn ok_response() -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Default::default(),
        }
    }

    #[tokio::test]
    async fn sends_song_once_per_session() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|request| {
                request.url == "https://caliph.example/api/activity/play"
                    && request.body.as_deref() == Some(&br#"{"song":"polygamy"}"#[..])
            })
            .times(1)
            .returning(|_| Ok(ok_response()));

        let reporter = ActivityReporter::new(
            Arc::new(http),
            "https://caliph.example/api/activity/play",
            Duration::from_secs(5),
        );

        reporter.report_play("polygamy").unwrap().await.unwrap();
        assert!(reporter.report_play("polygamy").is_none());
        assert!(reporter.has_reported());
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Err(BridgeError::OperationFailed("connection refused".to_string())));

        let reporter = ActivityReporter::new(Arc::new(http), "http://localhost/ping", Duration::from_secs(1));
        reporter.report_play("polygamy").unwrap().await.unwrap();
        assert!(reporter.has_reported());
    }

    #[test]
    fn disabled_reporter_never_spawns() {
        let reporter = ActivityReporter::disabled();
        assert!(!reporter.is_enabled());
        assert!(reporter.report_play("polygamy").is_none());
        assert!(!reporter.has_reported());
    }
}
