use std::collections::VecDeque;
use std::time::{Duration, Instant};

use hashbrown::HashMap;

use chromiumoxide_cdp::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestServedFromCache,
    EventRequestWillBeSent, EventResponseReceived, RequestId, ResourceType,
};
use chromiumoxide_cdp::cdp::browser_protocol::page::EventFrameStoppedLoading;
use chromiumoxide_cdp::cdp::browser_protocol::security::SetIgnoreCertificateErrorsParams;
use chromiumoxide_cdp::cdp::browser_protocol::target::SessionId;
use chromiumoxide_types::{Command, Method, MethodId};

use crate::cmd::CommandChain;
use crate::handler::http::HttpRequest;

/// How long the page's traffic must stay at zero in-flight requests before it
/// counts as idle
pub const NETWORK_QUIET_WINDOW: Duration = Duration::from_millis(500);

/// In-flight requests older than this are force-completed by the sweep.
/// Stalled iframe documents are common on ad networks and would otherwise
/// hold network idleness forever.
pub const REQUEST_STALL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub enum NetworkEvent {
    SendCdpRequest((MethodId, serde_json::Value)),
}

/// Tracks in-flight requests across all sessions of one page (the page's own
/// session and any adopted OOPIF sessions) and derives network idleness.
///
/// WebSocket and EventSource requests never enter tracking; they are
/// long-lived by design and must not block idleness.
#[derive(Debug)]
pub struct NetworkTracker {
    queued_events: VecDeque<NetworkEvent>,
    ignore_https_errors: bool,
    /// Requests currently in flight
    requests: HashMap<RequestId, HttpRequest>,
    /// When the in-flight count last dropped to zero
    idle_since: Option<Instant>,
    request_timeout: Duration,
}

impl NetworkTracker {
    pub fn new(ignore_https_errors: bool, request_timeout: Duration) -> Self {
        Self {
            queued_events: Default::default(),
            ignore_https_errors,
            requests: Default::default(),
            idle_since: Some(Instant::now()),
            request_timeout,
        }
    }

    pub fn init_commands(&self) -> CommandChain {
        let enable = EnableParams::default();
        let mut v = vec![];

        if let Ok(c) = serde_json::to_value(&enable) {
            v.push((enable.identifier(), c));
        }

        if self.ignore_https_errors {
            let ignore = SetIgnoreCertificateErrorsParams::new(true);
            if let Ok(ignored) = serde_json::to_value(&ignore) {
                v.push((ignore.identifier(), ignored));
            }
        }

        CommandChain::new(v, self.request_timeout)
    }

    #[allow(unused)]
    fn push_cdp_request<T: Command>(&mut self, cmd: T) {
        let method = cmd.identifier();
        if let Ok(params) = serde_json::to_value(cmd) {
            self.queued_events
                .push_back(NetworkEvent::SendCdpRequest((method, params)));
        }
    }

    pub fn poll(&mut self) -> Option<NetworkEvent> {
        self.queued_events.pop_front()
    }

    /// Number of requests currently counted towards busyness
    pub fn inflight(&self) -> usize {
        self.requests.len()
    }

    /// Whether traffic has been at zero in-flight requests for at least
    /// `window`
    pub fn quiet_for(&self, window: Duration, now: Instant) -> bool {
        match self.idle_since {
            Some(since) if self.requests.is_empty() => now.duration_since(since) >= window,
            _ => false,
        }
    }

    fn update_idle(&mut self, now: Instant) {
        if self.requests.is_empty() {
            if self.idle_since.is_none() {
                self.idle_since = Some(now);
            }
        } else {
            self.idle_since = None;
        }
    }

    fn complete(&mut self, request_id: &RequestId, now: Instant) -> Option<HttpRequest> {
        let removed = self.requests.remove(request_id);
        self.update_idle(now);
        removed
    }

    /// Force-complete any request older than the stall timeout
    pub fn sweep_stalled(&mut self, now: Instant) {
        let stalled: Vec<RequestId> = self
            .requests
            .iter()
            .filter(|(_, req)| now.duration_since(req.started) >= REQUEST_STALL_TIMEOUT)
            .map(|(id, _)| id.clone())
            .collect();
        for id in stalled {
            tracing::debug!(request_id = ?id, "force-completing stalled request");
            self.complete(&id, now);
        }
    }

    /// Remove every request observed on `session`, e.g. when an adopted OOPIF
    /// session detaches
    pub fn remove_session(&mut self, session: &SessionId) {
        self.requests
            .retain(|_, req| req.session_id.as_ref() != Some(session));
        self.update_idle(Instant::now());
    }

    pub fn on_request_will_be_sent(
        &mut self,
        event: &EventRequestWillBeSent,
        session: Option<&SessionId>,
    ) {
        // long-lived channels never count toward idleness
        if matches!(
            event.r#type,
            Some(ResourceType::WebSocket) | Some(ResourceType::EventSource)
        ) {
            return;
        }

        let now = Instant::now();

        // a redirect reuses the request id; the previous hop is done
        let redirect_chain = if event.redirect_response.is_some() {
            self.complete(&event.request_id, now)
                .map(|mut prev| {
                    let mut chain = std::mem::take(&mut prev.redirect_chain);
                    chain.push(prev);
                    chain
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let mut request = HttpRequest::new(
            event.request_id.clone(),
            session.cloned(),
            event.frame_id.clone(),
            redirect_chain,
        );
        request.url = Some(event.request.url.clone());
        request.method = Some(event.request.method.clone());
        request.resource_type = event.r#type.clone();
        request.started = now;
        // for document loads the request id doubles as the loader id
        request.is_navigation_request =
            event.request_id.inner() == event.loader_id.inner();

        self.requests.insert(event.request_id.clone(), request);
        self.update_idle(now);
    }

    pub fn on_request_served_from_cache(&mut self, event: &EventRequestServedFromCache) {
        let now = Instant::now();
        if let Some(req) = self.requests.get_mut(&event.request_id) {
            req.from_memory_cache = true;
        }
        self.complete(&event.request_id, now);
    }

    pub fn on_response_received(&mut self, event: &EventResponseReceived) {
        let now = Instant::now();
        let data_url = event.response.url.starts_with("data:");
        if let Some(req) = self.requests.get_mut(&event.request_id) {
            req.set_response(event.response.clone());
        }
        // data: URLs produce no loadingFinished
        if data_url {
            self.complete(&event.request_id, now);
        }
    }

    pub fn on_network_loading_finished(&mut self, event: &EventLoadingFinished) {
        self.complete(&event.request_id, Instant::now());
    }

    pub fn on_network_loading_failed(&mut self, event: &EventLoadingFailed) {
        let now = Instant::now();
        if let Some(req) = self.requests.get_mut(&event.request_id) {
            req.failure_text = Some(event.error_text.clone());
        }
        self.complete(&event.request_id, now);
    }

    /// A frame finished loading; anything still pending for it will not make
    /// progress anymore
    pub fn on_frame_stopped_loading(&mut self, event: &EventFrameStoppedLoading) {
        let now = Instant::now();
        let pending: Vec<RequestId> = self
            .requests
            .iter()
            .filter(|(_, req)| {
                req.frame.as_ref() == Some(&event.frame_id) && req.is_navigation_request
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in pending {
            self.complete(&id, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_event(id: &str, url: &str, resource: &str) -> EventRequestWillBeSent {
        serde_json::from_value(json!({
            "requestId": id,
            "loaderId": "L1",
            "documentURL": "https://a.test/",
            "request": {
                "url": url,
                "method": "GET",
                "headers": {},
                "initialPriority": "High",
                "referrerPolicy": "origin",
            },
            "timestamp": 1.0,
            "wallTime": 1.0,
            "initiator": { "type": "other" },
            "redirectHasExtraInfo": false,
            "type": resource,
        }))
        .unwrap()
    }

    fn finished(id: &str) -> EventLoadingFinished {
        serde_json::from_value(json!({
            "requestId": id,
            "timestamp": 2.0,
            "encodedDataLength": 100.0,
        }))
        .unwrap()
    }

    #[test]
    fn idle_requires_quiet_window() {
        let mut tracker = NetworkTracker::new(true, Duration::from_secs(30));
        let start = Instant::now();

        tracker.on_request_will_be_sent(&request_event("R1", "https://a.test/x", "Fetch"), None);
        assert_eq!(tracker.inflight(), 1);
        assert!(!tracker.quiet_for(NETWORK_QUIET_WINDOW, start + Duration::from_secs(10)));

        tracker.on_network_loading_finished(&finished("R1"));
        assert_eq!(tracker.inflight(), 0);
        // quiet only once the window has elapsed after completion
        assert!(!tracker.quiet_for(NETWORK_QUIET_WINDOW, Instant::now()));
        assert!(tracker.quiet_for(
            NETWORK_QUIET_WINDOW,
            Instant::now() + NETWORK_QUIET_WINDOW
        ));
    }

    #[test]
    fn websockets_and_event_sources_never_count() {
        let mut tracker = NetworkTracker::new(true, Duration::from_secs(30));
        tracker.on_request_will_be_sent(
            &request_event("W1", "wss://a.test/socket", "WebSocket"),
            None,
        );
        tracker.on_request_will_be_sent(
            &request_event("E1", "https://a.test/events", "EventSource"),
            None,
        );
        assert_eq!(tracker.inflight(), 0);
    }

    #[test]
    fn stall_sweep_force_completes_old_requests() {
        let mut tracker = NetworkTracker::new(true, Duration::from_secs(30));
        tracker.on_request_will_be_sent(&request_event("R1", "https://ads.test/slow", "Document"), None);
        assert_eq!(tracker.inflight(), 1);

        // too young to sweep
        tracker.sweep_stalled(Instant::now());
        assert_eq!(tracker.inflight(), 1);

        tracker.sweep_stalled(Instant::now() + REQUEST_STALL_TIMEOUT);
        assert_eq!(tracker.inflight(), 0);
    }

    #[test]
    fn session_removal_drops_its_requests() {
        let mut tracker = NetworkTracker::new(true, Duration::from_secs(30));
        let child = SessionId::from("S-oopif".to_string());
        tracker.on_request_will_be_sent(
            &request_event("R1", "https://a.test/x", "Fetch"),
            Some(&child),
        );
        tracker.on_request_will_be_sent(&request_event("R2", "https://a.test/y", "Fetch"), None);
        assert_eq!(tracker.inflight(), 2);

        tracker.remove_session(&child);
        assert_eq!(tracker.inflight(), 1);
    }

    #[test]
    fn data_urls_complete_on_response() {
        let mut tracker = NetworkTracker::new(true, Duration::from_secs(30));
        tracker.on_request_will_be_sent(&request_event("R1", "data:text/html,x", "Document"), None);
        assert_eq!(tracker.inflight(), 1);

        let response: EventResponseReceived = serde_json::from_value(json!({
            "requestId": "R1",
            "loaderId": "L1",
            "timestamp": 2.0,
            "type": "Document",
            "hasExtraInfo": false,
            "response": {
                "url": "data:text/html,x",
                "status": 200,
                "statusText": "OK",
                "headers": {},
                "mimeType": "text/html",
                "charset": "",
                "connectionReused": false,
                "connectionId": 0.0,
                "encodedDataLength": 10.0,
                "securityState": "neutral",
            },
        }))
        .unwrap();
        tracker.on_response_received(&response);
        assert_eq!(tracker.inflight(), 0);
    }
}
