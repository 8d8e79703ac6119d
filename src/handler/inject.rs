use std::collections::VecDeque;
use std::time::Duration;

use hashbrown::HashMap;

use chromiumoxide_cdp::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FulfillRequestParams, GetResponseBodyParams, HeaderEntry, RequestId as FetchRequestId,
    RequestPattern, RequestStage,
};
use chromiumoxide_cdp::cdp::browser_protocol::network::ResourceType;
use chromiumoxide_cdp::cdp::browser_protocol::target::SessionId;
use chromiumoxide_types::{Method, MethodId, Response};

use crate::cmd::CommandChain;
use crate::javascript::{INIT_SCRIPT_CLASS, PIERCER_JS};
use crate::utils;

/// A CDP call the injector wants issued, on a specific session
pub type InjectorRequest = (MethodId, serde_json::Value, Option<SessionId>);

/// Splices the page-side helper into the first Document response of every
/// frame by pausing Document responses via the `Fetch` domain.
///
/// Only HTML bodies with a 2xx/3xx status are touched; everything else is
/// continued unmodified. Interception is one of two delivery paths: targets
/// additionally install the same source via
/// `Page.addScriptToEvaluateOnNewDocument` for about:blank documents, attach
/// races, and OOPIFs that bypass interception.
#[derive(Debug, Default)]
pub struct ScriptInjector {
    queued: VecDeque<InjectorRequest>,
    /// Paused documents awaiting their body, in submission order per session.
    /// The server answers same-session same-method calls in order, which is
    /// what the FIFO correlation relies on.
    awaiting_body: HashMap<Option<String>, VecDeque<PausedDocument>>,
}

#[derive(Debug)]
struct PausedDocument {
    request_id: FetchRequestId,
    status: i64,
    headers: Vec<HeaderEntry>,
}

impl ScriptInjector {
    /// Commands enabling response-stage interception for documents
    pub fn init_commands(timeout: Duration) -> CommandChain {
        let pattern = RequestPattern::builder()
            .url_pattern("*")
            .resource_type(ResourceType::Document)
            .request_stage(RequestStage::Response)
            .build();
        let enable = FetchEnableParams::builder().pattern(pattern).build();

        let mut cmds = Vec::with_capacity(1);
        let id = enable.identifier();
        if let Ok(params) = serde_json::to_value(enable) {
            cmds.push((id, params));
        }
        CommandChain::new(cmds, timeout)
    }

    pub fn poll(&mut self) -> Option<InjectorRequest> {
        self.queued.pop_front()
    }

    fn queue<T: Method + serde::Serialize>(&mut self, cmd: T, session: Option<&SessionId>) {
        let method = cmd.identifier();
        if let Ok(params) = serde_json::to_value(cmd) {
            self.queued.push_back((method, params, session.cloned()));
        }
    }

    fn continue_request(&mut self, request_id: FetchRequestId, session: Option<&SessionId>) {
        self.queue(
            ContinueRequestParams::builder()
                .request_id(request_id)
                .build()
                .expect("request id is set"),
            session,
        );
    }

    /// A response-stage pause for some request on `session`
    pub fn on_fetch_request_paused(
        &mut self,
        event: &EventRequestPaused,
        session: Option<&SessionId>,
    ) {
        let status = event.response_status_code.unwrap_or_default();
        let headers = event.response_headers.clone().unwrap_or_default();

        let html = headers.iter().any(|h| {
            h.name.eq_ignore_ascii_case("content-type")
                && h.value.to_ascii_lowercase().contains("text/html")
        });

        if event.resource_type != ResourceType::Document
            || !(200..400).contains(&status)
            || !html
        {
            self.continue_request(event.request_id.clone(), session);
            return;
        }

        self.queue(
            GetResponseBodyParams::new(event.request_id.clone()),
            session,
        );
        self.awaiting_body
            .entry(session.map(|s| s.inner().clone()))
            .or_default()
            .push_back(PausedDocument {
                request_id: event.request_id.clone(),
                status,
                headers,
            });
    }

    /// The reply to a `Fetch.getResponseBody` issued by this injector
    pub fn on_body_response(&mut self, resp: &Response, session: Option<&SessionId>) {
        let Some(paused) = self
            .awaiting_body
            .get_mut(&session.map(|s| s.inner().clone()))
            .and_then(|q| q.pop_front())
        else {
            return;
        };

        let body = resp
            .result
            .as_ref()
            .and_then(|v| {
                let encoded = v["base64Encoded"].as_bool().unwrap_or_default();
                let body = v["body"].as_str()?;
                if encoded {
                    utils::base64::decode(body)
                        .ok()
                        .and_then(|raw| String::from_utf8(raw).ok())
                } else {
                    Some(body.to_string())
                }
            });

        let Some(body) = body else {
            // body unavailable (cached, detached, not utf-8): hand the
            // response back untouched
            self.continue_request(paused.request_id, session);
            return;
        };

        let nonce = random_nonce();
        let reuse_nonce = csp_uses_nonce(&paused.headers);
        let spliced = splice_html(
            &body,
            PIERCER_JS,
            if reuse_nonce { Some(&nonce) } else { None },
        );
        let headers = rewrite_csp_headers(paused.headers, &nonce, reuse_nonce);

        let fulfill = FulfillRequestParams::builder()
            .request_id(paused.request_id)
            .response_code(paused.status)
            .response_headers(headers)
            .body(utils::base64::encode(spliced.as_bytes()))
            .build()
            .expect("request id and response code are set");
        self.queue(fulfill, session);
    }

    /// Drop pending state for a detached session
    pub fn remove_session(&mut self, session: &SessionId) {
        self.awaiting_body
            .remove(&Some(session.inner().clone()));
    }
}

fn random_nonce() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    (0..16)
        .map(|_| std::char::from_digit(rng.random_range(0..36), 36).unwrap_or('0'))
        .collect()
}

/// The tag removes itself so the document the page scripts observe stays
/// clean
fn init_script_tag(source: &str, nonce: Option<&str>) -> String {
    let nonce_attr = nonce
        .map(|n| format!(" nonce=\"{n}\""))
        .unwrap_or_default();
    format!(
        "<script class=\"{INIT_SCRIPT_CLASS}\"{nonce_attr}>{source};\
         document.currentScript && document.currentScript.remove();</script>"
    )
}

/// Insert the init script as early as possible: before `</head>`, after
/// `<head>`, before `</body>`, or prepended when the document has neither.
pub(crate) fn splice_html(body: &str, source: &str, nonce: Option<&str>) -> String {
    let tag = init_script_tag(source, nonce);
    let lower = body.to_ascii_lowercase();

    if let Some(idx) = lower.find("</head>") {
        let mut out = String::with_capacity(body.len() + tag.len());
        out.push_str(&body[..idx]);
        out.push_str(&tag);
        out.push_str(&body[idx..]);
        return out;
    }
    if let Some(idx) = lower.find("<head") {
        if let Some(end) = lower[idx..].find('>') {
            let at = idx + end + 1;
            let mut out = String::with_capacity(body.len() + tag.len());
            out.push_str(&body[..at]);
            out.push_str(&tag);
            out.push_str(&body[at..]);
            return out;
        }
    }
    if let Some(idx) = lower.find("</body>") {
        let mut out = String::with_capacity(body.len() + tag.len());
        out.push_str(&body[..idx]);
        out.push_str(&tag);
        out.push_str(&body[idx..]);
        return out;
    }
    format!("{tag}{body}")
}

fn csp_uses_nonce(headers: &[HeaderEntry]) -> bool {
    headers.iter().any(|h| {
        h.name.eq_ignore_ascii_case("content-security-policy") && h.value.contains("'nonce-")
    })
}

/// Loosen script directives just enough for the injected helper to run:
/// `'unsafe-eval'` always, plus either our nonce (when the policy already
/// works with nonces) or `'unsafe-inline'`.
pub(crate) fn rewrite_csp_headers(
    headers: Vec<HeaderEntry>,
    nonce: &str,
    reuse_nonce: bool,
) -> Vec<HeaderEntry> {
    headers
        .into_iter()
        .map(|mut h| {
            if h.name.eq_ignore_ascii_case("content-security-policy") {
                h.value = rewrite_csp_value(&h.value, nonce, reuse_nonce);
            }
            h
        })
        .collect()
}

fn rewrite_csp_value(value: &str, nonce: &str, reuse_nonce: bool) -> String {
    value
        .split(';')
        .map(|directive| {
            let trimmed = directive.trim();
            let name = trimmed.split_whitespace().next().unwrap_or_default();
            if matches!(name, "script-src" | "script-src-elem" | "default-src") {
                let mut out = trimmed.to_string();
                if !out.contains("'unsafe-eval'") {
                    out.push_str(" 'unsafe-eval'");
                }
                if reuse_nonce {
                    out.push_str(&format!(" 'nonce-{nonce}'"));
                } else if !out.contains("'unsafe-inline'") {
                    out.push_str(" 'unsafe-inline'");
                }
                out
            } else {
                trimmed.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splices_before_head_close() {
        let body = "<html><head><title>t</title></head><body></body></html>";
        let out = splice_html(body, "X()", None);
        let script_at = out.find("<script").unwrap();
        assert!(script_at < out.find("</head>").unwrap());
        assert!(out.contains("X();document.currentScript"));
    }

    #[test]
    fn splices_into_headless_documents() {
        let body = "<html><body><p>hi</p></body></html>";
        let out = splice_html(body, "X()", None);
        assert!(out.find("<script").unwrap() < out.find("</body>").unwrap());

        let bare = "<p>hi</p>";
        let out = splice_html(bare, "X()", None);
        assert!(out.starts_with("<script"));
    }

    #[test]
    fn nonce_attached_only_when_requested() {
        let with = splice_html("<head></head>", "X()", Some("abc"));
        assert!(with.contains("nonce=\"abc\""));
        let without = splice_html("<head></head>", "X()", None);
        assert!(!without.contains("nonce="));
    }

    #[test]
    fn csp_gets_unsafe_eval_and_inline() {
        let headers = vec![HeaderEntry {
            name: "Content-Security-Policy".into(),
            value: "default-src 'self'; img-src *".into(),
        }];
        let out = rewrite_csp_headers(headers, "abc", false);
        assert_eq!(
            out[0].value,
            "default-src 'self' 'unsafe-eval' 'unsafe-inline'; img-src *"
        );
    }

    #[test]
    fn csp_with_nonces_gets_our_nonce() {
        let headers = vec![HeaderEntry {
            name: "content-security-policy".into(),
            value: "script-src 'nonce-orig'".into(),
        }];
        let out = rewrite_csp_headers(headers, "abc", true);
        assert!(out[0].value.contains("'nonce-orig'"));
        assert!(out[0].value.contains("'nonce-abc'"));
        assert!(out[0].value.contains("'unsafe-eval'"));
        assert!(!out[0].value.contains("'unsafe-inline'"));
    }
}
