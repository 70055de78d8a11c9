use std::io::Read;
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::payload::EventPayload;
use super::EventSink;
use crate::error::PipelineError;

pub const EVENTS_PATH: &str = "/api/events/from-python";
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_LOGGED_BODY: u64 = 1024;

/// Best-effort HTTP client for the event collector.
///
/// One POST per event, no retry, no queue. Anything but HTTP 200 drops the
/// event.
pub struct EventDispatcher {
    base_url: String,
    agent: ureq::Agent,
    send_timeout: Duration,
    health_timeout: Duration,
}

impl EventDispatcher {
    pub fn new(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(&format!("scene-watch/{}", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            agent,
            send_timeout: SEND_TIMEOUT,
            health_timeout: HEALTH_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, send: Duration, health: Duration) -> Self {
        self.send_timeout = send;
        self.health_timeout = health;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn events_url(&self) -> String {
        format!("{}{}", self.base_url, EVENTS_PATH)
    }

    /// POST `payload` once. `Ok` only on HTTP 200.
    pub fn post(&self, payload: &EventPayload) -> Result<(), PipelineError> {
        let body = serde_json::to_string(payload).map_err(PipelineError::dispatch)?;
        let url = self.events_url();
        let result = self
            .agent
            .post(&url)
            .timeout(self.send_timeout)
            .set("Content-Type", "application/json")
            .send_string(&body);
        match result {
            Ok(response) if response.status() == 200 => Ok(()),
            Ok(response) => {
                let status = response.status();
                Err(PipelineError::dispatch(format!(
                    "collector returned status {}: {}",
                    status,
                    read_body(response)
                )))
            }
            Err(ureq::Error::Status(status, response)) => Err(PipelineError::dispatch(format!(
                "collector returned status {}: {}",
                status,
                read_body(response)
            ))),
            Err(ureq::Error::Transport(err)) => Err(PipelineError::dispatch(format!(
                "network error posting to {}: {}",
                url, err
            ))),
        }
    }

    /// `GET {base}/` with the short timeout. Up only on HTTP 200.
    pub fn check_health(&self) -> Result<(), PipelineError> {
        let url = format!("{}/", self.base_url);
        match self.agent.get(&url).timeout(self.health_timeout).call() {
            Ok(response) if response.status() == 200 => Ok(()),
            Ok(response) => Err(PipelineError::dispatch(format!(
                "collector health returned status {}",
                response.status()
            ))),
            Err(ureq::Error::Status(status, _)) => Err(PipelineError::dispatch(format!(
                "collector health returned status {}",
                status
            ))),
            Err(ureq::Error::Transport(err)) => Err(PipelineError::dispatch(format!(
                "cannot reach collector at {}: {}",
                url, err
            ))),
        }
    }
}

impl EventSink for EventDispatcher {
    fn send(&self, mut payload: EventPayload, image_path: Option<&Path>) -> bool {
        if let Some(path) = image_path {
            match std::fs::read(path) {
                Ok(bytes) => {
                    payload.image_base64 = Some(STANDARD.encode(bytes));
                    payload.image_path = Some(path.display().to_string());
                }
                Err(err) => {
                    log::warn!(
                        "could not read event image {}, sending without it: {}",
                        path.display(),
                        err
                    );
                }
            }
        }

        match self.post(&payload) {
            Ok(()) => {
                log::info!("event sent: {}", payload.event_type);
                true
            }
            Err(err) => {
                log::warn!("event {} dropped: {}", payload.event_type, err);
                false
            }
        }
    }

    fn health_check(&self) -> bool {
        match self.check_health() {
            Ok(()) => {
                log::info!("collector at {} is reachable", self.base_url);
                true
            }
            Err(err) => {
                log::warn!("{}", err);
                false
            }
        }
    }
}

fn read_body(response: ureq::Response) -> String {
    let mut text = String::new();
    if response
        .into_reader()
        .take(MAX_LOGGED_BODY)
        .read_to_string(&mut text)
        .is_err()
    {
        return "<unreadable body>".to_string();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let dispatcher = EventDispatcher::new(" http://collector:5000// ");
        assert_eq!(dispatcher.base_url(), "http://collector:5000");
        assert_eq!(
            dispatcher.events_url(),
            "http://collector:5000/api/events/from-python"
        );
    }
}
