use std::collections::VecDeque;
use std::iter::FromIterator;
use std::time::{Duration, Instant};

use futures::channel::oneshot::Sender as OneshotSender;
use futures::task::Poll;
use serde::Serialize;

use chromiumoxide_cdp::cdp::browser_protocol::page::{
    NavigateParams, NavigateToHistoryEntryParams, ReloadParams,
};
use chromiumoxide_cdp::cdp::browser_protocol::target::SessionId;
use chromiumoxide_types::{Command, CommandResponse, Method, MethodId, Request, Response};

use crate::error::{CdpError, DeadlineExceeded, Result};
use crate::handler::frame::NavigationOptions;
use crate::handler::REQUEST_TIMEOUT;

/// Deserialize a response
pub(crate) fn to_command_response<T: Command>(
    resp: Response,
    method: MethodId,
) -> Result<CommandResponse<T::Response>> {
    if let Some(res) = resp.result {
        let result = serde_json::from_value(res)?;
        Ok(CommandResponse {
            id: resp.id,
            result,
            method,
        })
    } else if let Some(err) = resp.error {
        Err(err.into())
    } else {
        Err(CdpError::NoResponse)
    }
}

/// Messages used internally to communicate with the connection, which is
/// executed in the the background task.
#[derive(Debug, Serialize)]
pub struct CommandMessage<T = Result<Response>> {
    pub method: MethodId,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub params: serde_json::Value,
    /// Lifecycle gating for commands that start a navigation
    #[serde(skip_serializing)]
    pub navigation: Option<NavigationOptions>,
    #[serde(skip_serializing)]
    pub sender: OneshotSender<T>,
}

impl<T> CommandMessage<T> {
    pub fn new<C: Command>(cmd: C, sender: OneshotSender<T>) -> serde_json::Result<Self> {
        Ok(Self {
            method: cmd.identifier(),
            session_id: None,
            params: serde_json::to_value(cmd)?,
            navigation: None,
            sender,
        })
    }

    /// Whether this command starts a navigation that must be gated on
    /// lifecycle completion
    pub fn is_navigation(&self) -> bool {
        matches!(
            self.method.as_ref(),
            NavigateParams::IDENTIFIER
                | ReloadParams::IDENTIFIER
                | NavigateToHistoryEntryParams::IDENTIFIER
        )
    }

    pub fn with_session<C: Command>(
        cmd: C,
        sender: OneshotSender<T>,
        session_id: Option<SessionId>,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            method: cmd.identifier(),
            session_id,
            params: serde_json::to_value(cmd)?,
            navigation: None,
            sender,
        })
    }

    pub fn with_navigation<C: Command>(
        cmd: C,
        sender: OneshotSender<T>,
        session_id: Option<SessionId>,
        opts: NavigationOptions,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            method: cmd.identifier(),
            session_id,
            params: serde_json::to_value(cmd)?,
            navigation: Some(opts),
            sender,
        })
    }

    pub fn split(self) -> (Request, NavigationOptions, OneshotSender<T>) {
        (
            Request {
                method: self.method,
                session_id: self.session_id.map(Into::into),
                params: self.params,
            },
            self.navigation.unwrap_or_default(),
            self.sender,
        )
    }
}

impl Method for CommandMessage {
    fn identifier(&self) -> MethodId {
        self.method.clone()
    }
}

/// A sequence of initialization commands issued one at a time, each gated on
/// the previous response
#[derive(Debug, PartialEq)]
pub struct CommandChain {
    /// The commands to process: (method identifier, params)
    cmds: VecDeque<(MethodId, serde_json::Value)>,
    /// The last issued command we currently waiting for its completion
    waiting: Option<(MethodId, Instant)>,
    /// The window a response after issuing a request must arrive
    timeout: Duration,
}

pub type NextCommand = Poll<Option<Result<(MethodId, serde_json::Value), DeadlineExceeded>>>;

impl CommandChain {
    /// Creates a new `CommandChain` from an `Iterator`.
    ///
    /// The order of the commands corresponds to the iterator's
    pub fn new<I>(cmds: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = (MethodId, serde_json::Value)>,
    {
        Self {
            cmds: VecDeque::from_iter(cmds),
            waiting: None,
            timeout,
        }
    }

    /// queue in another request
    pub fn push_back(&mut self, method: MethodId, params: serde_json::Value) {
        self.cmds.push_back((method, params))
    }

    /// Removes the waiting state if the identifier matches that of the last
    /// issued command
    pub fn received_response(&mut self, identifier: &str) -> bool {
        if self.waiting.as_ref().map(|(c, _)| c.as_ref()) == Some(identifier) {
            self.waiting.take();
            true
        } else {
            false
        }
    }

    /// Return the next command to process or `None` if done.
    /// If the response timeout an error is returned instead
    pub fn poll(&mut self, now: Instant) -> NextCommand {
        if let Some((cmd, deadline)) = self.waiting.as_ref() {
            if now > *deadline {
                tracing::error!(
                    "Command {:?} exceeded deadline by {:?}",
                    cmd,
                    now - *deadline
                );
                Poll::Ready(Some(Err(DeadlineExceeded::new(now, *deadline))))
            } else {
                Poll::Pending
            }
        } else if let Some((method, val)) = self.cmds.pop_front() {
            self.waiting = Some((method.clone(), now + self.timeout));
            Poll::Ready(Some(Ok((method, val))))
        } else {
            Poll::Ready(None)
        }
    }
}

impl Default for CommandChain {
    fn default() -> Self {
        Self {
            cmds: Default::default(),
            waiting: None,
            timeout: Duration::from_millis(REQUEST_TIMEOUT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chromiumoxide_cdp::cdp::browser_protocol::page::EnableParams;

    #[test]
    fn chain_issues_commands_in_order() {
        let now = Instant::now();
        let mut chain = CommandChain::new(
            vec![
                ("Page.enable".into(), serde_json::json!({})),
                ("Page.getFrameTree".into(), serde_json::json!({})),
            ],
            Duration::from_secs(1),
        );

        let first = chain.poll(now);
        assert!(matches!(first, Poll::Ready(Some(Ok((ref m, _)))) if m == "Page.enable"));
        // waiting on the response, nothing new is issued
        assert!(chain.poll(now).is_pending());
        assert!(chain.received_response("Page.enable"));
        let second = chain.poll(now);
        assert!(matches!(second, Poll::Ready(Some(Ok((ref m, _)))) if m == "Page.getFrameTree"));
        assert!(chain.received_response("Page.getFrameTree"));
        assert!(matches!(chain.poll(now), Poll::Ready(None)));
    }

    #[test]
    fn chain_times_out_waiting() {
        let now = Instant::now();
        let mut chain = CommandChain::new(
            vec![("Page.enable".into(), serde_json::json!({}))],
            Duration::from_millis(10),
        );
        let _ = chain.poll(now);
        let later = now + Duration::from_millis(50);
        assert!(matches!(chain.poll(later), Poll::Ready(Some(Err(_)))));
    }

    #[test]
    fn navigation_methods_are_classified() {
        let (tx, _rx) = futures::channel::oneshot::channel::<Result<Response>>();
        let msg = CommandMessage::new(NavigateParams::new("about:blank"), tx).unwrap();
        assert!(msg.is_navigation());

        let (tx, _rx) = futures::channel::oneshot::channel::<Result<Response>>();
        let msg = CommandMessage::new(EnableParams::default(), tx).unwrap();
        assert!(!msg.is_navigation());
    }
}
