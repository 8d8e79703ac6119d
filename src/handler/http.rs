use std::time::Instant;

use chromiumoxide_cdp::cdp::browser_protocol::network::{RequestId, ResourceType, Response};
use chromiumoxide_cdp::cdp::browser_protocol::page::FrameId;
use chromiumoxide_cdp::cdp::browser_protocol::target::SessionId;

/// One tracked network request.
///
/// The record exists from `Network.requestWillBeSent` until the request
/// finishes, fails, is served from cache, or is force-completed by the stall
/// sweep. Only in-flight records count towards network idleness.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    request_id: RequestId,
    /// The session the request was observed on (OOPIF child sessions track
    /// their own traffic)
    pub session_id: Option<SessionId>,
    pub url: Option<String>,
    /// When the request entered tracking, used by the stall sweep
    pub started: Instant,
    pub resource_type: Option<ResourceType>,
    pub frame: Option<FrameId>,
    pub is_navigation_request: bool,
    pub from_memory_cache: bool,
    pub failure_text: Option<String>,
    pub response: Option<Response>,
    pub method: Option<String>,
    pub redirect_chain: Vec<HttpRequest>,
}

impl HttpRequest {
    pub fn new(
        request_id: RequestId,
        session_id: Option<SessionId>,
        frame: Option<FrameId>,
        redirect_chain: Vec<HttpRequest>,
    ) -> Self {
        Self {
            request_id,
            session_id,
            url: None,
            started: Instant::now(),
            resource_type: None,
            frame,
            is_navigation_request: false,
            from_memory_cache: false,
            failure_text: None,
            response: None,
            method: None,
            redirect_chain,
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub(crate) fn set_response(&mut self, response: Response) {
        self.response = Some(response)
    }
}
