use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide_cdp::cdp::browser_protocol::dom::GetFrameOwnerParams;
use chromiumoxide_cdp::cdp::browser_protocol::page::{CaptureScreenshotFormat, FrameId};
use chromiumoxide_cdp::cdp::browser_protocol::target::SessionId;
use chromiumoxide_cdp::cdp::js_protocol::runtime::{CallFunctionOnParams, EvaluateParams};

use crate::element::Element;
use crate::error::{CdpError, Result};
use crate::handler::frame::LifecycleEvent;
use crate::handler::PageInner;
use crate::js::{Evaluation, EvaluationResult};
use crate::locator::Locator;

/// Entry point for operations scoped to a single frame.
///
/// Every protocol call is routed to the frame's owning session, which for
/// out-of-process iframes differs from the page's main session.
#[derive(Debug, Clone)]
pub struct Frame {
    inner: Arc<PageInner>,
    frame_id: FrameId,
}

impl Frame {
    pub(crate) fn new(inner: Arc<PageInner>, frame_id: FrameId) -> Self {
        Self { inner, frame_id }
    }

    pub fn id(&self) -> &FrameId {
        &self.frame_id
    }

    /// The session owning this frame right now
    pub async fn owner_session(&self) -> Result<Option<SessionId>> {
        self.inner.owner_session(Some(self.frame_id.clone())).await
    }

    /// The frame's current url, if a navigation has been observed
    pub async fn url(&self) -> Result<Option<String>> {
        let view = self.inner.tree_view().await?;
        Ok(view.get(&self.frame_id).and_then(|f| f.url.clone()))
    }

    /// Evaluate in the engine's isolated world of this frame
    pub async fn evaluate(&self, evaluate: impl Into<Evaluation>) -> Result<EvaluationResult> {
        let session = self.owner_session().await?;
        let ctx = self
            .inner
            .isolated_context(Some(self.frame_id.clone()))
            .await?;
        self.evaluate_with(evaluate, ctx, session).await
    }

    /// Evaluate in the frame's default (page-visible) context, which is where
    /// the injected helper lives
    pub async fn evaluate_in_page(
        &self,
        evaluate: impl Into<Evaluation>,
    ) -> Result<EvaluationResult> {
        let session = self.owner_session().await?;
        let ctx = self
            .inner
            .frame_execution_context(self.frame_id.clone())
            .await?;
        self.evaluate_with(evaluate, ctx, session).await
    }

    async fn evaluate_with(
        &self,
        evaluate: impl Into<Evaluation>,
        ctx: Option<chromiumoxide_cdp::cdp::js_protocol::runtime::ExecutionContextId>,
        session: Option<SessionId>,
    ) -> Result<EvaluationResult> {
        match evaluate.into() {
            Evaluation::Expression(expr) => {
                self.inner.evaluate_expression_on(expr, ctx, session).await
            }
            Evaluation::Function(call) => {
                self.inner.evaluate_function_on(call, ctx, session).await
            }
        }
    }

    /// Evaluate a raw expression builder in this frame
    pub async fn evaluate_expression(
        &self,
        params: impl Into<EvaluateParams>,
    ) -> Result<EvaluationResult> {
        self.evaluate_in_page(Evaluation::Expression(params.into()))
            .await
    }

    /// Evaluate a function call in this frame
    pub async fn evaluate_function(
        &self,
        params: impl Into<CallFunctionOnParams>,
    ) -> Result<EvaluationResult> {
        self.evaluate_in_page(Evaluation::Function(params.into()))
            .await
    }

    /// A lazy selector handle rooted at this frame
    pub fn locator(&self, selector: impl Into<String>) -> Locator {
        Locator::new(
            Arc::clone(&self.inner),
            Some(self.frame_id.clone()),
            selector.into(),
        )
    }

    /// Wait until this frame's document reaches `state`, polling its
    /// readyState (frames do not carry their own main-frame lifecycle
    /// waiters).
    pub async fn wait_for_load_state(
        &self,
        state: LifecycleEvent,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let ready: Option<String> = self
                .evaluate_in_page("document.readyState")
                .await
                .ok()
                .and_then(|res| res.into_value().ok());
            let reached = matches!(
                (state, ready.as_deref()),
                (LifecycleEvent::Load, Some("complete"))
                    | (LifecycleEvent::NetworkIdle, Some("complete"))
                    | (
                        LifecycleEvent::DomContentLoaded,
                        Some("interactive") | Some("complete")
                    )
            );
            if reached {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CdpError::LifecycleTimeout(
                    state.event_name().to_string(),
                ));
            }
            futures_timer::Delay::new(Duration::from_millis(50)).await;
        }
    }

    /// Screenshot of this frame: the host iframe element for child frames,
    /// the page viewport for the main frame.
    pub async fn screenshot(&self, format: CaptureScreenshotFormat) -> Result<Vec<u8>> {
        let main = self.inner.main_frame().await?;
        if main.as_ref() == Some(&self.frame_id) {
            return self
                .inner
                .screenshot(crate::page::ScreenshotParams::builder().format(format).build())
                .await;
        }

        // child frames are clipped via their host <iframe> element, resolved
        // in the parent document
        let view = self.inner.tree_view().await?;
        let parent = view
            .get(&self.frame_id)
            .and_then(|f| f.parent.clone())
            .ok_or(CdpError::NotFound)?;
        let parent_session = self.inner.owner_session(Some(parent)).await?;

        let owner = self
            .inner
            .execute_on(
                GetFrameOwnerParams::new(self.frame_id.clone()),
                parent_session.clone(),
            )
            .await?;

        let host = Element::from_backend_id(
            Arc::clone(&self.inner),
            owner.result.backend_node_id,
            parent_session,
        )
        .await?;
        host.screenshot(format).await
    }
}
