use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc::unbounded;
use futures::channel::oneshot::channel as oneshot_channel;
use futures::SinkExt;

use chromiumoxide_cdp::cdp::browser_protocol::dom::*;
use chromiumoxide_cdp::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide_cdp::cdp::browser_protocol::input::MouseButton;
use chromiumoxide_cdp::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide_cdp::cdp::browser_protocol::page::*;
use chromiumoxide_cdp::cdp::browser_protocol::target::{
    CloseTargetParams, SessionId, TargetId,
};
use chromiumoxide_cdp::cdp::js_protocol::runtime::{
    CallArgument, CallFunctionOnParams, EvaluateParams, ExecutionContextId, RemoteObjectType,
};
use chromiumoxide_cdp::cdp::IntoEventKind;
use chromiumoxide_types::*;

use crate::element::Element;
use crate::error::{CdpError, Result};
use crate::frame::Frame;
use crate::handler::commandfuture::CommandFuture;
use crate::handler::domworld::DOMWorldKind;
use crate::handler::frame::{LifecycleEvent, NavigationOptions};
use crate::handler::target::{GetName, GetParent, GetUrl, TargetMessage};
use crate::handler::PageInner;
use crate::js::{Evaluation, EvaluationResult};
use crate::layout::{Delta, Point};
use crate::listeners::{EventListenerRequest, EventStream};
use crate::locator::{self, Locator};
use crate::snapshot::{self, HybridSnapshot, SnapshotOptions};
use crate::utils;

/// Options for a coordinate click
#[derive(Debug, Clone)]
pub struct ClickOptions {
    pub button: MouseButton,
    pub click_count: i64,
    /// Also resolve the absolute XPath of the deepest node under the point,
    /// descending into iframes
    pub return_xpath: bool,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            button: MouseButton::Left,
            click_count: 1,
            return_xpath: false,
        }
    }
}

/// Options for a drag gesture
#[derive(Debug, Clone)]
pub struct DragOptions {
    /// Number of interpolated move events between the endpoints
    pub steps: usize,
    /// Pause between interpolated moves
    pub delay: Option<Duration>,
    pub button: MouseButton,
    pub return_xpath: bool,
}

impl Default for DragOptions {
    fn default() -> Self {
        Self {
            steps: 10,
            delay: None,
            button: MouseButton::Left,
            return_xpath: false,
        }
    }
}

/// Options for typing into the focused element
#[derive(Debug, Clone, Default)]
pub struct TypeOptions {
    /// Pause between keystrokes
    pub delay: Option<Duration>,
    /// Occasionally type a neighboring character and correct it with
    /// Backspace
    pub with_mistakes: bool,
}

#[derive(Debug, Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

impl Page {
    /// Execute a command and return the `Command::Response`
    pub async fn execute<T: Command>(&self, cmd: T) -> Result<CommandResponse<T::Response>> {
        self.command_future(cmd)?.await
    }

    /// Execute a command and return the `Command::Response`
    pub fn command_future<T: Command>(&self, cmd: T) -> Result<CommandFuture<T>> {
        self.inner.command_future(cmd)
    }

    /// Adds an event listener to the `Target` and returns the receiver part
    /// as `EventStream`.
    ///
    /// All event listeners get notified with the same event, so registering
    /// multiple listeners for the same event is possible.
    pub async fn event_listener<T: IntoEventKind>(&self) -> Result<EventStream<T>> {
        let (tx, rx) = unbounded();

        self.inner
            .sender()
            .clone()
            .send(TargetMessage::AddEventListener(
                EventListenerRequest::new::<T>(tx),
            ))
            .await?;

        Ok(EventStream::new(rx))
    }

    /// Navigate directly to the given URL and wait for the default lifecycle
    /// state (DOMContentLoaded).
    pub async fn goto(&self, params: impl Into<NavigateParams>) -> Result<&Self> {
        self.goto_with(params, NavigationOptions::default()).await
    }

    /// Navigate and wait for the chosen lifecycle state under the deadline.
    ///
    /// Fails with [`CdpError::NavigationSuperseded`] when a newer navigation
    /// replaces this one, with [`CdpError::MainFrameDetached`] when the main
    /// frame is removed, and with [`CdpError::Timeout`] past the deadline.
    pub async fn goto_with(
        &self,
        params: impl Into<NavigateParams>,
        opts: NavigationOptions,
    ) -> Result<&Self> {
        let res = self.inner.execute_navigation(params.into(), opts).await?;

        if let Some(err) = res.result.error_text {
            if !err.is_empty() {
                return Err(CdpError::ChromeMessage(err));
            }
        }

        Ok(self)
    }

    /// Reloads the page, waiting like [`goto_with`](Self::goto_with)
    pub async fn reload(&self, opts: NavigationOptions) -> Result<&Self> {
        self.inner
            .execute_navigation(ReloadParams::default(), opts)
            .await?;
        Ok(self)
    }

    /// Navigate one entry back in the session history. Returns silently when
    /// the history has no earlier entry.
    pub async fn go_back(&self, opts: NavigationOptions) -> Result<&Self> {
        self.navigate_history(-1, opts).await
    }

    /// Navigate one entry forward in the session history. Returns silently
    /// when the history has no later entry.
    pub async fn go_forward(&self, opts: NavigationOptions) -> Result<&Self> {
        self.navigate_history(1, opts).await
    }

    async fn navigate_history(&self, delta: i64, opts: NavigationOptions) -> Result<&Self> {
        let history = self
            .execute(GetNavigationHistoryParams::default())
            .await?
            .result;
        let index = history.current_index + delta;
        if index < 0 || index as usize >= history.entries.len() {
            // nothing in that direction
            return Ok(self);
        }
        let entry_id = history.entries[index as usize].id;

        self.inner
            .execute_navigation(NavigateToHistoryEntryParams::new(entry_id), opts)
            .await?;
        Ok(self)
    }

    /// Resolves once the current main frame reaches `state`.
    ///
    /// The main frame id is re-read at event time, so a cross-site root swap
    /// while waiting is followed instead of waited out.
    pub async fn wait_for_load_state(
        &self,
        state: LifecycleEvent,
        timeout: Duration,
    ) -> Result<()> {
        // readyState answers load/DCL without an event round-trip
        if state != LifecycleEvent::NetworkIdle {
            if let Ok(res) = self.evaluate_expression("document.readyState").await {
                let ready: Option<String> = res.into_value().ok();
                let reached = match (state, ready.as_deref()) {
                    (LifecycleEvent::Load, Some("complete")) => true,
                    (
                        LifecycleEvent::DomContentLoaded,
                        Some("interactive") | Some("complete"),
                    ) => true,
                    _ => false,
                };
                if reached {
                    return Ok(());
                }
            }
        }

        self.inner.wait_for_load_state(state, timeout).await?
    }

    /// Plain sleep, for callers pacing scripted interactions
    pub async fn wait_for_timeout(&self, duration: Duration) -> &Self {
        tokio::time::sleep(duration).await;
        self
    }

    /// The identifier of the `Target` this page belongs to
    pub fn target_id(&self) -> &TargetId {
        self.inner.target_id()
    }

    /// The identifier of the `Session` target of this page is attached to
    pub fn session_id(&self) -> &SessionId {
        self.inner.session_id()
    }

    /// The identifier of this page's opener target, if it was opened as a
    /// popup
    pub fn opener_id(&self) -> &Option<TargetId> {
        self.inner.opener_id()
    }

    /// Returns the current url of the page
    pub async fn url(&self) -> Result<Option<String>> {
        let (tx, rx) = oneshot_channel();
        self.inner
            .sender()
            .clone()
            .send(TargetMessage::Url(GetUrl::new(tx)))
            .await?;
        Ok(rx.await?)
    }

    /// Returns the current url of the frame
    pub async fn frame_url(&self, frame_id: FrameId) -> Result<Option<String>> {
        let (tx, rx) = oneshot_channel();
        self.inner
            .sender()
            .clone()
            .send(TargetMessage::Url(GetUrl {
                frame_id: Some(frame_id),
                tx,
            }))
            .await?;
        Ok(rx.await?)
    }

    /// Returns the name of the frame
    pub async fn frame_name(&self, frame_id: FrameId) -> Result<Option<String>> {
        let (tx, rx) = oneshot_channel();
        self.inner
            .sender()
            .clone()
            .send(TargetMessage::Name(GetName {
                frame_id: Some(frame_id),
                tx,
            }))
            .await?;
        Ok(rx.await?)
    }

    /// Returns the parent id of the frame
    pub async fn frame_parent(&self, frame_id: FrameId) -> Result<Option<FrameId>> {
        let (tx, rx) = oneshot_channel();
        self.inner
            .sender()
            .clone()
            .send(TargetMessage::Parent(GetParent { frame_id, tx }))
            .await?;
        Ok(rx.await?)
    }

    /// Return the id of the main frame of the page
    pub async fn mainframe(&self) -> Result<Option<FrameId>> {
        let (tx, rx) = oneshot_channel();
        self.inner
            .sender()
            .clone()
            .send(TargetMessage::MainFrame(tx))
            .await?;
        Ok(rx.await?)
    }

    /// Return the ids of all frames of the page
    pub async fn frames(&self) -> Result<Vec<FrameId>> {
        let (tx, rx) = oneshot_channel();
        self.inner
            .sender()
            .clone()
            .send(TargetMessage::AllFrames(tx))
            .await?;
        Ok(rx.await?)
    }

    /// The main frame as an operation target
    pub async fn main_frame(&self) -> Result<Frame> {
        let frame_id = self.mainframe().await?.ok_or(CdpError::NotFound)?;
        Ok(Frame::new(Arc::clone(&self.inner), frame_id))
    }

    /// A specific frame as an operation target
    pub fn frame_for(&self, frame_id: FrameId) -> Frame {
        Frame::new(Arc::clone(&self.inner), frame_id)
    }

    /// A lazy selector handle rooted at the main frame. Supports CSS, XPath
    /// (`/`, `(`, `xpath=`), `text=`, and `>>` iframe hops.
    pub fn locator(&self, selector: impl Into<String>) -> Locator {
        Locator::new(Arc::clone(&self.inner), None, selector.into())
    }

    /// Produce the cross-frame hybrid snapshot: one merged accessibility
    /// outline plus EncodedId→XPath and EncodedId→URL maps.
    pub async fn capture_hybrid_snapshot(
        &self,
        options: SnapshotOptions,
    ) -> Result<HybridSnapshot> {
        snapshot::capture(&self.inner, options).await
    }

    /// Allows overriding the user agent with the given string.
    pub async fn set_user_agent(
        &self,
        params: impl Into<SetUserAgentOverrideParams>,
    ) -> Result<&Self> {
        self.execute(params.into()).await?;
        Ok(self)
    }

    /// Returns the user agent of the browser
    pub async fn user_agent(&self) -> Result<String> {
        Ok(self.inner.version().await?.user_agent)
    }

    /// Override the viewport size (CSS pixels) and device scale factor
    pub async fn set_viewport_size(
        &self,
        width: u32,
        height: u32,
        device_scale_factor: Option<f64>,
    ) -> Result<&Self> {
        self.execute(SetDeviceMetricsOverrideParams::new(
            width as i64,
            height as i64,
            device_scale_factor.unwrap_or(1.),
            false,
        ))
        .await?;
        Ok(self)
    }

    /// Returns the root DOM node (and optionally the subtree) of the page.
    ///
    /// # Note: This does not return the actual HTML document of the page. To
    /// retrieve the HTML content of the page see `Page::content`.
    pub async fn get_document(&self) -> Result<Node> {
        let mut cmd = GetDocumentParams::default();
        cmd.depth = Some(-1);
        cmd.pierce = Some(true);

        let resp = self.execute(cmd).await?;

        Ok(resp.result.root)
    }

    /// Returns the first element in the document which matches the given CSS
    /// selector.
    pub async fn find_element(&self, selector: impl Into<String>) -> Result<Element> {
        let root = self.get_document().await?.node_id;
        let node_id = self.inner.find_element(selector, root).await?;
        Element::new(Arc::clone(&self.inner), node_id).await
    }

    /// Return all `Element`s in the document that match the given selector
    pub async fn find_elements(&self, selector: impl Into<String>) -> Result<Vec<Element>> {
        let root = self.get_document().await?.node_id;
        let node_ids = self.inner.find_elements(selector, root).await?;
        Element::from_nodes(&self.inner, &node_ids).await
    }

    /// Describes node given its id
    pub async fn describe_node(&self, node_id: NodeId) -> Result<Node> {
        let resp = self
            .execute(DescribeNodeParams::builder().node_id(node_id).build())
            .await?;
        Ok(resp.result.node)
    }

    /// Close the page's target and wait (bounded, best effort) for the
    /// browser to report it gone.
    pub async fn close(self) -> Result<()> {
        self.inner
            .execute_root(CloseTargetParams::new(self.inner.target_id().clone()))
            .await?;

        // once the target is destroyed the channel to it is dropped
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if self.inner.main_frame().await.is_err() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Ok(())
    }

    /// Performs a single mouse click event at the point's location.
    pub async fn click(&self, point: Point) -> Result<&Self> {
        self.inner.click(point).await?;
        Ok(self)
    }

    /// Click with an explicit button and click count; optionally resolve the
    /// absolute XPath of the deepest node under the point across frame
    /// boundaries.
    pub async fn click_with(&self, point: Point, opts: ClickOptions) -> Result<Option<String>> {
        let xpath = if opts.return_xpath {
            self.xpath_at_point(point).await.ok().flatten()
        } else {
            None
        };
        self.inner
            .click_with(point, opts.button, opts.click_count)
            .await?;
        Ok(xpath)
    }

    /// Dispatches a `mouseMoved` event moving the mouse to `point`
    pub async fn move_mouse(&self, point: Point) -> Result<&Self> {
        self.inner.move_mouse(point).await?;
        Ok(self)
    }

    /// Dispatches a single `mouseWheel` event at `point`
    pub async fn scroll(&self, point: Point, delta: Delta) -> Result<&Self> {
        self.inner.scroll(point, delta).await?;
        Ok(self)
    }

    /// Scroll and optionally resolve the XPath of the deepest node under the
    /// wheel position
    pub async fn scroll_with(
        &self,
        point: Point,
        delta: Delta,
        return_xpath: bool,
    ) -> Result<Option<String>> {
        let xpath = if return_xpath {
            self.xpath_at_point(point).await.ok().flatten()
        } else {
            None
        };
        self.inner.scroll(point, delta).await?;
        Ok(xpath)
    }

    /// Drag from one point to another with interpolated moves
    pub async fn drag_and_drop(
        &self,
        from: Point,
        to: Point,
        opts: DragOptions,
    ) -> Result<Option<String>> {
        let xpath = if opts.return_xpath {
            self.xpath_at_point(from).await.ok().flatten()
        } else {
            None
        };
        self.inner
            .drag_and_drop(from, to, opts.steps, opts.delay, opts.button)
            .await?;
        Ok(xpath)
    }

    /// Type into the focused element as individual keystrokes
    pub async fn type_str(&self, input: impl AsRef<str>, opts: TypeOptions) -> Result<&Self> {
        self.inner
            .type_str(input, opts.delay, opts.with_mistakes)
            .await?;
        Ok(self)
    }

    /// Press a key or a `+`-separated combination such as `"Cmd+Shift+A"`.
    /// The `+` key itself is accepted both alone and as a combo tail.
    pub async fn key_press(&self, input: impl AsRef<str>) -> Result<&Self> {
        self.inner.press_key_combo(input.as_ref()).await?;
        Ok(self)
    }

    /// Insert text into the focused element in one protocol call
    pub async fn insert_text(&self, text: impl Into<String>) -> Result<&Self> {
        self.inner.insert_text(text).await?;
        Ok(self)
    }

    /// The absolute XPath of the deepest element under a viewport point,
    /// crossing shadow roots and same- and cross-process iframes. The iframe
    /// chain contributes its host-element XPaths as prefixes.
    pub async fn xpath_at_point(&self, point: Point) -> Result<Option<String>> {
        let mut frame_id = match self.mainframe().await? {
            Some(id) => id,
            None => return Ok(None),
        };
        let mut point = point;
        let mut prefix = String::new();

        // one hop per nested iframe, bounded against pathological nesting
        for _ in 0..16 {
            let session = self.inner.owner_session(Some(frame_id.clone())).await?;
            let call = CallFunctionOnParams::builder()
                .function_declaration(
                    "(x, y) => {\
                       const h = window.__deepdriver__;\
                       const el = h ? h.deepElementFromPoint(x, y) : document.elementFromPoint(x, y);\
                       if (!el) return null;\
                       const rect = el.getBoundingClientRect();\
                       return {\
                         xpath: h ? h.xpathOfNode(el) : '',\
                         tag: el.localName,\
                         left: rect.left,\
                         top: rect.top,\
                         frame: el.localName === 'iframe' || el.localName === 'frame'\
                       };\
                     }",
                )
                .argument(CallArgument::builder().value(serde_json::json!(point.x)).build())
                .argument(CallArgument::builder().value(serde_json::json!(point.y)).build())
                .build()
                .map_err(CdpError::msg)?;

            let ctx = self.frame_main_context(&frame_id).await?;
            let res = self
                .inner
                .evaluate_function_on(call, ctx, session.clone())
                .await?;
            let Some(value) = res.value().cloned() else {
                return Ok(None);
            };
            let xpath = value["xpath"].as_str().unwrap_or_default().to_string();
            let is_frame = value["frame"].as_bool().unwrap_or_default();

            if !is_frame {
                return Ok(Some(format!("{prefix}{xpath}")));
            }

            // descend: locate the child frame hosted by this iframe element
            let child = locator::child_frame_at(
                &self.inner,
                &frame_id,
                &xpath,
                session.clone(),
                ctx,
            )
            .await?;
            let Some(child) = child else {
                return Ok(Some(format!("{prefix}{xpath}")));
            };

            prefix.push_str(&xpath);
            frame_id = child;
            point = Point::new(
                point.x - value["left"].as_f64().unwrap_or_default(),
                point.y - value["top"].as_f64().unwrap_or_default(),
            );
        }

        Ok(None)
    }

    async fn frame_main_context(
        &self,
        frame_id: &FrameId,
    ) -> Result<Option<ExecutionContextId>> {
        self.inner
            .execution_context_for_world(Some(frame_id.clone()), DOMWorldKind::Main)
            .await
    }

    /// Returns the title of the document.
    pub async fn get_title(&self) -> Result<Option<String>> {
        let result = self.evaluate("document.title").await?;

        let title: String = result.into_value()?;

        if title.is_empty() {
            Ok(None)
        } else {
            Ok(Some(title))
        }
    }

    /// Returns the HTML content of the page.
    pub async fn content(&self) -> Result<String> {
        Ok(self
            .evaluate(
                "{let rv = ''; if(document.doctype){rv+=new XMLSerializer().serializeToString(document.doctype);} if(document.documentElement){rv+=document.documentElement.outerHTML;} rv}",
            )
            .await?
            .into_value()?)
    }

    /// Evaluate an expression or function in the engine's isolated world on
    /// the current main frame, with an optional JSON-serializable argument.
    ///
    /// The result is what survives `JSON.parse(JSON.stringify(value))`;
    /// exceptions surface as [`CdpError::JavascriptException`].
    pub async fn evaluate_with_arg(
        &self,
        evaluate: impl Into<Evaluation>,
        arg: Option<serde_json::Value>,
    ) -> Result<EvaluationResult> {
        let ctx = self.inner.isolated_context(None).await?;
        match evaluate.into() {
            Evaluation::Expression(expr) => {
                self.inner.evaluate_expression_on(expr, ctx, None).await
            }
            Evaluation::Function(mut call) => {
                if let Some(arg) = arg {
                    let mut arguments = call.arguments.take().unwrap_or_default();
                    arguments.push(CallArgument::builder().value(arg).build());
                    call.arguments = Some(arguments);
                }
                self.inner.evaluate_function_on(call, ctx, None).await
            }
        }
    }

    /// Evaluates an expression or function in the page's default context.
    ///
    /// When passing a `String` or `str`, this will try to detect whether it
    /// is a function or an expression.
    pub async fn evaluate(&self, evaluate: impl Into<Evaluation>) -> Result<EvaluationResult> {
        match evaluate.into() {
            Evaluation::Expression(mut expr) => {
                if expr.context_id.is_none() {
                    expr.context_id = self.execution_context().await?;
                }
                let fallback = expr.eval_as_function_fallback.and_then(|p| {
                    if p {
                        Some(expr.clone())
                    } else {
                        None
                    }
                });
                let res = self.evaluate_expression(expr).await?;

                if res.object().r#type == RemoteObjectType::Function {
                    // expression was actually a function
                    if let Some(fallback) = fallback {
                        return self.evaluate_function(fallback).await;
                    }
                }
                Ok(res)
            }
            Evaluation::Function(fun) => Ok(self.evaluate_function(fun).await?),
        }
    }

    /// This evaluates strictly as expression.
    pub async fn evaluate_expression(
        &self,
        evaluate: impl Into<EvaluateParams>,
    ) -> Result<EvaluationResult> {
        self.inner.evaluate_expression(evaluate).await
    }

    /// Executes a function within the page's context and returns the result.
    pub async fn evaluate_function(
        &self,
        evaluate: impl Into<CallFunctionOnParams>,
    ) -> Result<EvaluationResult> {
        self.inner.evaluate_function(evaluate).await
    }

    /// Returns the default execution context identifier of this page that
    /// represents the context for JavaScript execution.
    pub async fn execution_context(&self) -> Result<Option<ExecutionContextId>> {
        self.inner.execution_context().await
    }

    pub async fn frame_execution_context(
        &self,
        frame_id: FrameId,
    ) -> Result<Option<ExecutionContextId>> {
        self.inner.frame_execution_context(frame_id).await
    }

    /// Evaluates given script in every frame upon creation (before loading
    /// frame's scripts)
    pub async fn evaluate_on_new_document(
        &self,
        script: impl Into<AddScriptToEvaluateOnNewDocumentParams>,
    ) -> Result<ScriptIdentifier> {
        Ok(self.execute(script.into()).await?.result.identifier)
    }

    /// Returns metrics relating to the layout of the page
    pub async fn layout_metrics(&self) -> Result<GetLayoutMetricsReturns> {
        self.inner.layout_metrics().await
    }

    /// Activates (focuses) the target.
    pub async fn activate(&self) -> Result<&Self> {
        self.inner.activate().await?;
        Ok(self)
    }

    /// Brings page to front (activates tab)
    pub async fn bring_to_front(&self) -> Result<&Self> {
        self.execute(BringToFrontParams::default()).await?;
        Ok(self)
    }

    /// Take a screenshot of the current page
    pub async fn screenshot(&self, params: impl Into<ScreenshotParams>) -> Result<Vec<u8>> {
        self.inner.screenshot(params).await
    }

    /// Save a screenshot of the page to the given path
    pub async fn save_screenshot(
        &self,
        params: impl Into<ScreenshotParams>,
        output: impl AsRef<Path>,
    ) -> Result<Vec<u8>> {
        let img = self.screenshot(params).await?;
        utils::write(output.as_ref(), &img).await?;
        Ok(img)
    }
}

impl From<Arc<PageInner>> for Page {
    fn from(inner: Arc<PageInner>) -> Self {
        Self { inner }
    }
}

impl Page {
    pub(crate) fn inner(&self) -> &Arc<PageInner> {
        &self.inner
    }
}

/// Page screenshot parameters with extra options.
#[derive(Debug, Default)]
pub struct ScreenshotParams {
    /// Chrome DevTools Protocol screenshot options.
    pub cdp_params: CaptureScreenshotParams,
    /// Take full page screenshot.
    pub full_page: Option<bool>,
    /// Make the background transparent (png only).
    pub omit_background: Option<bool>,
}

impl ScreenshotParams {
    pub fn builder() -> ScreenshotParamsBuilder {
        Default::default()
    }

    pub(crate) fn full_page(&self) -> bool {
        self.full_page.unwrap_or(false)
    }

    pub(crate) fn omit_background(&self) -> bool {
        self.omit_background.unwrap_or(false)
            && self
                .cdp_params
                .format
                .as_ref()
                .map_or(true, |f| f == &CaptureScreenshotFormat::Png)
    }
}

/// Page screenshot parameters builder with extra options.
#[derive(Debug, Default)]
pub struct ScreenshotParamsBuilder {
    cdp_params: CaptureScreenshotParams,
    full_page: Option<bool>,
    omit_background: Option<bool>,
}

impl ScreenshotParamsBuilder {
    /// Image compression format (defaults to png).
    pub fn format(mut self, format: impl Into<CaptureScreenshotFormat>) -> Self {
        self.cdp_params.format = Some(format.into());
        self
    }

    /// Compression quality from range [0..100] (jpeg only).
    pub fn quality(mut self, quality: impl Into<i64>) -> Self {
        self.cdp_params.quality = Some(quality.into());
        self
    }

    /// Capture the screenshot of a given region only.
    pub fn clip(mut self, clip: impl Into<Viewport>) -> Self {
        self.cdp_params.clip = Some(clip.into());
        self
    }

    /// Capture the screenshot from the surface, rather than the view (defaults to true).
    pub fn from_surface(mut self, from_surface: impl Into<bool>) -> Self {
        self.cdp_params.from_surface = Some(from_surface.into());
        self
    }

    /// Capture the screenshot beyond the viewport (defaults to false).
    pub fn capture_beyond_viewport(mut self, capture_beyond_viewport: impl Into<bool>) -> Self {
        self.cdp_params.capture_beyond_viewport = Some(capture_beyond_viewport.into());
        self
    }

    /// Full page screen capture.
    pub fn full_page(mut self, full_page: impl Into<bool>) -> Self {
        self.full_page = Some(full_page.into());
        self
    }

    /// Make the background transparent (png only)
    pub fn omit_background(mut self, omit_background: impl Into<bool>) -> Self {
        self.omit_background = Some(omit_background.into());
        self
    }

    pub fn build(self) -> ScreenshotParams {
        ScreenshotParams {
            cdp_params: self.cdp_params,
            full_page: self.full_page,
            omit_background: self.omit_background,
        }
    }
}

impl From<CaptureScreenshotParams> for ScreenshotParams {
    fn from(cdp_params: CaptureScreenshotParams) -> Self {
        Self {
            cdp_params,
            ..Default::default()
        }
    }
}
