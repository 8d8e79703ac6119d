use std::sync::Arc;

use chromiumoxide_cdp::cdp::browser_protocol::dom::{
    BackendNodeId, GetDocumentParams, GetFrameOwnerParams, Node, SetFileInputFilesParams,
};
use chromiumoxide_cdp::cdp::browser_protocol::input::MouseButton;
use chromiumoxide_cdp::cdp::browser_protocol::network::LoaderId;
use chromiumoxide_cdp::cdp::browser_protocol::overlay::{
    EnableParams as OverlayEnableParams, HighlightConfig, HighlightNodeParams,
};
use chromiumoxide_cdp::cdp::browser_protocol::page::FrameId;
use chromiumoxide_cdp::cdp::browser_protocol::target::SessionId;
use chromiumoxide_cdp::cdp::js_protocol::runtime::{
    CallArgument, CallFunctionOnParams, ExecutionContextId,
};

use crate::element::Element;
use crate::error::{CdpError, Result};
use crate::handler::PageInner;
use crate::layout::Point;
use crate::utils;

/// What a selector string asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorKind {
    Css(String),
    XPath(String),
    Text(String),
}

/// Classify one selector segment: explicit `css=`/`xpath=`/`text=` prefixes,
/// a leading `/` or `(` for XPath, CSS otherwise.
pub(crate) fn classify(selector: &str) -> SelectorKind {
    let trimmed = selector.trim();
    if let Some(rest) = trimmed.strip_prefix("xpath=") {
        SelectorKind::XPath(rest.trim().to_string())
    } else if let Some(rest) = trimmed.strip_prefix("text=") {
        SelectorKind::Text(rest.trim().to_string())
    } else if let Some(rest) = trimmed.strip_prefix("css=") {
        SelectorKind::Css(rest.trim().to_string())
    } else if trimmed.starts_with('/') || trimmed.starts_with('(') {
        SelectorKind::XPath(trimmed.to_string())
    } else {
        SelectorKind::Css(trimmed.to_string())
    }
}

/// Split on the `>>` hop operator
pub(crate) fn split_hops(selector: &str) -> Vec<String> {
    selector
        .split(">>")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// One parsed XPath location step
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct XPathStep {
    pub tag: String,
    pub index: Option<usize>,
    /// Preceded by `//`
    pub deep: bool,
}

/// Parse an absolute XPath of `tag[n]` steps; anything fancier is left to the
/// browser-side evaluator.
pub(crate) fn parse_xpath_steps(xpath: &str) -> Option<Vec<XPathStep>> {
    let mut steps = Vec::new();
    let bytes = xpath.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'/' {
            return None;
        }
        i += 1;
        let deep = i < bytes.len() && bytes[i] == b'/';
        if deep {
            i += 1;
        }
        let start = i;
        while i < bytes.len() && bytes[i] != b'/' {
            i += 1;
        }
        let raw = &xpath[start..i];
        if raw.is_empty() {
            continue;
        }
        let (tag, index) = match raw.find('[') {
            Some(open) => {
                let close = raw.rfind(']')?;
                let idx: usize = raw.get(open + 1..close)?.parse().ok()?;
                (&raw[..open], Some(idx))
            }
            None => (raw, None),
        };
        steps.push(XPathStep {
            tag: tag.to_ascii_lowercase(),
            index,
            deep,
        });
    }
    Some(steps)
}

/// Split an XPath at `iframe[n]` / `frame[n]` steps into per-frame segments,
/// each segment an XPath local to its frame. Returns `None` when the
/// selector never crosses a frame boundary.
pub(crate) fn split_xpath_frame_hops(xpath: &str) -> Option<Vec<String>> {
    let steps = parse_xpath_steps(xpath)?;
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut crossed = false;

    for step in &steps {
        current.push('/');
        if step.deep {
            current.push('/');
        }
        current.push_str(&step.tag);
        if let Some(idx) = step.index {
            current.push_str(&format!("[{idx}]"));
        }
        if matches!(step.tag.as_str(), "iframe" | "frame") {
            segments.push(std::mem::take(&mut current));
            crossed = true;
        }
    }
    if !crossed {
        return None;
    }
    if !current.is_empty() {
        segments.push(current);
    }
    Some(segments)
}

/// A lazy handle to the element(s) a selector resolves to.
///
/// Nothing is resolved at construction; every action resolves fresh so a
/// re-rendered element is picked up rather than a stale handle reused.
#[derive(Debug, Clone)]
pub struct Locator {
    inner: Arc<PageInner>,
    /// The frame the selector is rooted at, main frame when `None`
    frame_id: Option<FrameId>,
    selector: String,
    /// Match index in document order; first match when unset
    nth: Option<usize>,
}

/// Options for [`Locator::click`]
#[derive(Debug, Clone)]
pub struct LocatorClickOptions {
    pub button: MouseButton,
    pub click_count: i64,
}

impl Default for LocatorClickOptions {
    fn default() -> Self {
        Self {
            button: MouseButton::Left,
            click_count: 1,
        }
    }
}

/// Where a hop walk ended up: the final frame, plus the shadow host whose
/// root scopes the tail when the chain stepped through one
#[derive(Debug)]
pub(crate) struct TailScope {
    pub frame_id: Option<FrameId>,
    pub host: Option<Element>,
    pub tail: String,
}

/// What probing a would-be shadow host found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShadowRootState {
    /// Connected and carrying an open or registered-closed root
    Attached,
    /// Connected but no shadow root to step into
    NoRoot,
    /// The host element left the document mid-walk
    HostDetached,
}

pub(crate) fn shadow_state_from_probe(probe: Option<&str>) -> ShadowRootState {
    match probe {
        Some("root") => ShadowRootState::Attached,
        Some("detached") => ShadowRootState::HostDetached,
        _ => ShadowRootState::NoRoot,
    }
}

/// Probe the resolved hop element for a shadow root, distinguishing a host
/// that detached mid-walk from one that simply has no root
async fn shadow_root_state(element: &Element) -> Result<ShadowRootState> {
    let res = element
        .call_js_fn(
            "function() {\
               if (!this.isConnected) return 'detached';\
               const h = window.__deepdriver__;\
               const root = this.shadowRoot || (h && h.getClosedRoot(this)) || null;\
               return root ? 'root' : 'none';\
             }",
            false,
        )
        .await?;
    Ok(shadow_state_from_probe(
        res.result.value.as_ref().and_then(|v| v.as_str()),
    ))
}

impl Locator {
    pub(crate) fn new(inner: Arc<PageInner>, frame_id: Option<FrameId>, selector: String) -> Self {
        Self {
            inner,
            frame_id,
            selector,
            nth: None,
        }
    }

    /// Select the nth match (0-based, document order) instead of the first
    pub fn nth(mut self, index: usize) -> Self {
        self.nth = Some(index);
        self
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Resolve the selector to a single element, crossing iframe and shadow
    /// boundaries.
    ///
    /// A resolution cut short by a navigation (the root frame's loader
    /// changed while resolving) is retried once; a second interruption
    /// surfaces as [`CdpError::NavigationOccurredDuringResolve`].
    pub async fn resolve(&self) -> Result<Element> {
        let loader_before = self.current_loader().await;

        let first = match self.resolve_once().await {
            Ok(element) => return Ok(element),
            Err(err) => err,
        };

        let loader_mid = self.current_loader().await;
        if loader_mid == loader_before {
            // nothing navigated underneath us; the failure is real
            return Err(first);
        }

        tracing::debug!(selector = %self.selector, "navigation during resolution, retrying once");
        match self.resolve_once().await {
            Ok(element) => Ok(element),
            Err(second) => {
                if self.current_loader().await != loader_mid {
                    Err(CdpError::NavigationOccurredDuringResolve)
                } else {
                    Err(second)
                }
            }
        }
    }

    /// The loader the selector's root frame currently runs under
    async fn current_loader(&self) -> Option<LoaderId> {
        let view = self.inner.tree_view().await.ok()?;
        let frame_id = match &self.frame_id {
            Some(id) => id.clone(),
            None => view.main_frame.clone()?,
        };
        view.get(&frame_id).and_then(|f| f.loader.clone())
    }

    async fn resolve_once(&self) -> Result<Element> {
        let scope = self.walk_to_tail().await?;
        let kind = classify(&scope.tail);
        let resolved = match scope.host.as_ref() {
            Some(host) => resolve_in_shadow(&self.inner, host, &kind, self.nth.unwrap_or(0)).await,
            None => {
                resolve_in_frame(
                    &self.inner,
                    scope.frame_id.clone(),
                    &kind,
                    self.nth.unwrap_or(0),
                )
                .await
            }
        };
        if let Some(host) = scope.host {
            host.release().await;
        }
        resolved?.ok_or_else(|| CdpError::ElementNotFound(self.selector.clone()))
    }

    /// Number of elements the selector matches inside its final scope
    pub async fn count(&self) -> Result<usize> {
        let scope = self.walk_to_tail().await?;
        let kind = classify(&scope.tail);
        let counted = match scope.host.as_ref() {
            Some(host) => count_in_shadow(&self.inner, host, &kind).await,
            None => count_in_frame(&self.inner, scope.frame_id.clone(), &kind).await,
        };
        if let Some(host) = scope.host {
            host.release().await;
        }
        counted
    }

    fn hop_segments(&self) -> Option<Vec<String>> {
        match classify(&self.selector) {
            SelectorKind::XPath(xp) => split_xpath_frame_hops(&xp),
            _ => {
                let hops = split_hops(&self.selector);
                if hops.len() <= 1 {
                    None
                } else {
                    Some(hops)
                }
            }
        }
    }

    /// Walk every `>>` segment and XPath iframe step up to the tail.
    ///
    /// An `<iframe>`/`<frame>` segment switches the walk into the hosted
    /// frame; any other segment is a shadow host, and the remaining chain
    /// resolves inside its (open or closed) shadow root. The returned scope
    /// owns the final shadow host handle when one is active; callers release
    /// it after resolving the tail.
    pub(crate) async fn walk_to_tail(&self) -> Result<TailScope> {
        let Some(segments) = self.hop_segments() else {
            return Ok(TailScope {
                frame_id: self.frame_id.clone(),
                host: None,
                tail: self.selector.clone(),
            });
        };

        let mut frame_id = self.frame_id.clone();
        let mut host: Option<Element> = None;
        let mut idx = 0;

        while idx + 1 < segments.len() {
            let segment = &segments[idx];
            let element = match host.as_ref() {
                Some(scope) => {
                    resolve_in_shadow(&self.inner, scope, &classify(segment), 0).await?
                }
                None => resolve_in_frame(&self.inner, frame_id.clone(), &classify(segment), 0).await?,
            }
            .ok_or_else(|| CdpError::ElementNotFound(segment.clone()))?;
            if let Some(previous) = host.take() {
                previous.release().await;
            }

            let tag: Option<String> = element
                .call_js_fn("function() { return this.localName; }", false)
                .await
                .ok()
                .and_then(|r| r.result.value)
                .and_then(|v| v.as_str().map(str::to_string));

            if matches!(tag.as_deref(), Some("iframe") | Some("frame")) {
                let parent = match frame_id.clone() {
                    Some(id) => id,
                    None => self
                        .inner
                        .main_frame()
                        .await?
                        .ok_or(CdpError::NotFound)?,
                };
                let child = child_frame_for_backend_id(
                    &self.inner,
                    &parent,
                    element.backend_node_id,
                    element.session().cloned(),
                )
                .await?;
                element.release().await;
                let child = child.ok_or_else(|| {
                    CdpError::msg(format!("No frame mounted at `{segment}`"))
                })?;
                frame_id = Some(child);
            } else {
                // a shadow host: the next segment resolves inside its root
                match shadow_root_state(&element).await? {
                    ShadowRootState::Attached => host = Some(element),
                    ShadowRootState::HostDetached => {
                        element.release().await;
                        return Err(CdpError::ShadowHostDetached(segment.clone()));
                    }
                    ShadowRootState::NoRoot => {
                        element.release().await;
                        return Err(CdpError::ElementNotFound(self.selector.clone()));
                    }
                }
            }
            idx += 1;
        }

        Ok(TailScope {
            frame_id,
            host,
            tail: segments[segments.len() - 1].clone(),
        })
    }

    /// Scroll into view, compute the center of the content quad, and click it
    pub async fn click(&self) -> Result<()> {
        self.click_with(LocatorClickOptions::default()).await
    }

    pub async fn click_with(&self, opts: LocatorClickOptions) -> Result<()> {
        let element = self.resolve().await?;
        let result = async {
            element.scroll_into_view().await?;
            let point = element.clickable_point().await?;
            self.dispatch_click(point, &opts, element.session().cloned())
                .await
        }
        .await;
        element.release().await;
        result
    }

    async fn dispatch_click(
        &self,
        point: Point,
        opts: &LocatorClickOptions,
        session: Option<SessionId>,
    ) -> Result<()> {
        use chromiumoxide_cdp::cdp::browser_protocol::input::{
            DispatchMouseEventParams, DispatchMouseEventType,
        };

        let buttons = match opts.button {
            MouseButton::Left => 1,
            MouseButton::Right => 2,
            MouseButton::Middle => 4,
            _ => 0,
        };

        let mut moved =
            DispatchMouseEventParams::new(DispatchMouseEventType::MouseMoved, point.x, point.y);
        moved.modifiers = Some(self.inner.modifiers_mask());
        self.inner.execute_on(moved, session.clone()).await?;

        let base = DispatchMouseEventParams::builder()
            .x(point.x)
            .y(point.y)
            .button(opts.button.clone())
            .click_count(opts.click_count)
            .modifiers(self.inner.modifiers_mask());

        let press = base
            .clone()
            .buttons(buttons)
            .r#type(DispatchMouseEventType::MousePressed)
            .build()
            .map_err(CdpError::msg)?;
        self.inner.execute_on(press, session.clone()).await?;

        let release = base
            .buttons(0)
            .r#type(DispatchMouseEventType::MouseReleased)
            .build()
            .map_err(CdpError::msg)?;
        self.inner.execute_on(release, session).await?;
        Ok(())
    }

    /// Scroll the element into view and park the mouse on its center
    pub async fn hover(&self) -> Result<()> {
        let element = self.resolve().await?;
        let result = async {
            element.scroll_into_view().await?;
            let point = element.clickable_point().await?;
            use chromiumoxide_cdp::cdp::browser_protocol::input::{
                DispatchMouseEventParams, DispatchMouseEventType,
            };
            let mut moved =
                DispatchMouseEventParams::new(DispatchMouseEventType::MouseMoved, point.x, point.y);
            moved.modifiers = Some(self.inner.modifiers_mask());
            self.inner
                .execute_on(moved, element.session().cloned())
                .await?;
            Ok(())
        }
        .await;
        element.release().await;
        result
    }

    /// Write `value` into the element (`value` for form controls,
    /// `textContent` otherwise) and fire input + change events
    pub async fn fill(&self, value: impl AsRef<str>) -> Result<()> {
        let element = self.resolve().await?;
        let result = async {
            let call = CallFunctionOnParams::builder()
                .function_declaration(
                    "function(value) {\
                       if ('value' in this) { this.value = value; }\
                       else { this.textContent = value; }\
                       this.dispatchEvent(new Event('input', { bubbles: true }));\
                       this.dispatchEvent(new Event('change', { bubbles: true }));\
                     }",
                )
                .object_id(element.remote_object_id.clone())
                .argument(
                    CallArgument::builder()
                        .value(serde_json::json!(value.as_ref()))
                        .build(),
                )
                .build()
                .map_err(CdpError::msg)?;
            self.inner
                .evaluate_function_on(call, None, element.session().cloned())
                .await?;
            Ok(())
        }
        .await;
        element.release().await;
        result
    }

    /// Focus the element, then deliver text: one `Input.insertText` without a
    /// delay, per-character key events with one
    pub async fn type_str(
        &self,
        text: impl AsRef<str>,
        delay: Option<std::time::Duration>,
    ) -> Result<()> {
        let element = self.resolve().await?;
        let result = async {
            element
                .call_js_fn("function() { this.focus(); }", true)
                .await?;
            match delay {
                None => {
                    self.inner.insert_text(text.as_ref()).await?;
                }
                Some(delay) => {
                    self.inner.type_str(text.as_ref(), Some(delay), false).await?;
                }
            }
            Ok(())
        }
        .await;
        element.release().await;
        result
    }

    /// Select `<option>`s by label or value; returns the values actually
    /// selected after the update
    pub async fn select_option(&self, values: Vec<String>) -> Result<Vec<String>> {
        let element = self.resolve().await?;
        let result = async {
            let call = CallFunctionOnParams::builder()
                .function_declaration(
                    "function(wanted) {\
                       if (this.localName !== 'select') return [];\
                       const picked = [];\
                       for (const option of this.options) {\
                         const hit = wanted.includes(option.label)\
                           || wanted.includes(option.value)\
                           || wanted.includes(option.textContent.trim());\
                         option.selected = hit;\
                         if (hit) picked.push(option.value);\
                         if (hit && !this.multiple) break;\
                       }\
                       this.dispatchEvent(new Event('input', { bubbles: true }));\
                       this.dispatchEvent(new Event('change', { bubbles: true }));\
                       return picked;\
                     }",
                )
                .object_id(element.remote_object_id.clone())
                .argument(
                    CallArgument::builder()
                        .value(serde_json::json!(values))
                        .build(),
                )
                .build()
                .map_err(CdpError::msg)?;
            let res = self
                .inner
                .evaluate_function_on(call, None, element.session().cloned())
                .await?;
            Ok(res.into_value().unwrap_or_default())
        }
        .await;
        element.release().await;
        result
    }

    /// Whether the element takes up layout space and is not `visibility:
    /// hidden`
    pub async fn is_visible(&self) -> Result<bool> {
        self.bool_predicate(
            "function() {\
               if (!this.isConnected) return false;\
               const style = window.getComputedStyle(this);\
               if (style.visibility === 'hidden' || style.display === 'none') return false;\
               const rect = this.getBoundingClientRect();\
               return rect.width > 0 && rect.height > 0;\
             }",
        )
        .await
    }

    pub async fn is_checked(&self) -> Result<bool> {
        self.bool_predicate("function() { return this.checked === true; }")
            .await
    }

    async fn bool_predicate(&self, predicate: &str) -> Result<bool> {
        let element = self.resolve().await?;
        let result = async {
            let res = element.call_js_fn(predicate, false).await?;
            Ok(res
                .result
                .value
                .and_then(|v| v.as_bool())
                .unwrap_or_default())
        }
        .await;
        element.release().await;
        result
    }

    async fn string_fn(&self, declaration: &str) -> Result<Option<String>> {
        let element = self.resolve().await?;
        let result = async {
            let res = element.call_js_fn(declaration, false).await?;
            Ok(res
                .result
                .value
                .and_then(|v| v.as_str().map(str::to_string)))
        }
        .await;
        element.release().await;
        result
    }

    /// The `value` property of the resolved form control
    pub async fn input_value(&self) -> Result<Option<String>> {
        self.string_fn("function() { return this.value; }").await
    }

    pub async fn text_content(&self) -> Result<Option<String>> {
        self.string_fn("function() { return this.textContent; }")
            .await
    }

    pub async fn inner_text(&self) -> Result<Option<String>> {
        self.string_fn("function() { return this.innerText; }")
            .await
    }

    pub async fn inner_html(&self) -> Result<Option<String>> {
        self.string_fn("function() { return this.innerHTML; }")
            .await
    }

    /// Center of the element's content quad in viewport coordinates
    pub async fn centroid(&self) -> Result<Point> {
        let element = self.resolve().await?;
        let result = element.clickable_point().await;
        element.release().await;
        result
    }

    /// The stable backend node id of the resolved element
    pub async fn backend_node_id(&self) -> Result<BackendNodeId> {
        let element = self.resolve().await?;
        let id = element.backend_node_id;
        element.release().await;
        Ok(id)
    }

    /// Flash the browser's node highlight over the element
    pub async fn highlight(&self) -> Result<()> {
        let element = self.resolve().await?;
        let result = async {
            let session = element.session().cloned();
            self.inner
                .execute_on(OverlayEnableParams::default(), session.clone())
                .await?;
            let config = HighlightConfig {
                content_color: Some(
                    chromiumoxide_cdp::cdp::browser_protocol::dom::Rgba {
                        r: 111,
                        g: 168,
                        b: 220,
                        a: Some(0.66),
                    },
                ),
                ..Default::default()
            };
            let params = HighlightNodeParams::builder()
                .highlight_config(config)
                .backend_node_id(element.backend_node_id)
                .build()
                .map_err(CdpError::msg)?;
            self.inner.execute_on(params, session).await?;
            Ok(())
        }
        .await;
        element.release().await;
        result
    }

    /// Make a file input carry the given paths.
    ///
    /// In-memory payloads are written to temp files that are removed on all
    /// exit paths.
    pub async fn set_input_files(&self, files: Vec<InputFile>) -> Result<()> {
        let mut paths = Vec::with_capacity(files.len());
        let mut temp_paths = Vec::new();

        for file in files {
            match file {
                InputFile::Path(path) => paths.push(path),
                InputFile::Buffer { name, data } => {
                    let path = std::env::temp_dir().join(format!(
                        "deepdriver-upload-{}-{}",
                        std::process::id(),
                        name
                    ));
                    utils::write(&path, &data).await?;
                    paths.push(path.to_string_lossy().to_string());
                    temp_paths.push(path);
                }
            }
        }

        let result = async {
            let element = self.resolve().await?;
            let session = element.session().cloned();
            let params = SetFileInputFilesParams::builder()
                .files(paths.clone())
                .backend_node_id(element.backend_node_id)
                .build()
                .map_err(CdpError::msg)?;
            let out = self.inner.execute_on(params, session).await.map(|_| ());
            element.release().await;
            out
        }
        .await;

        for path in temp_paths {
            let _ = tokio::fs::remove_file(path).await;
        }

        result
    }
}

/// A file handed to [`Locator::set_input_files`]
#[derive(Debug, Clone)]
pub enum InputFile {
    /// An existing file on disk
    Path(String),
    /// An in-memory payload, staged through a temp file
    Buffer { name: String, data: Vec<u8> },
}

/// Resolve one selector segment inside one frame, piercing open and closed
/// shadow roots. Returns `None` when nothing matches.
pub(crate) async fn resolve_in_frame(
    inner: &Arc<PageInner>,
    frame_id: Option<FrameId>,
    kind: &SelectorKind,
    nth: usize,
) -> Result<Option<Element>> {
    let session = inner.owner_session(frame_id.clone()).await?;
    let main_ctx = match &frame_id {
        Some(id) => inner.frame_execution_context(id.clone()).await?,
        None => inner.execution_context().await?,
    };

    match kind {
        SelectorKind::XPath(xpath) => {
            // the page helper understands shadow boundaries, including
            // closed roots captured at creation time
            if let Some(element) = evaluate_to_element(
                inner,
                "(xp, nth) => {\
                   const h = window.__deepdriver__;\
                   if (h && !nth) {\
                     const hit = h.resolveSimpleXPath(xp);\
                     if (hit) return hit;\
                   }\
                   try {\
                     const r = document.evaluate(xp, document, null,\
                       XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);\
                     return r.snapshotItem(nth);\
                   } catch (e) { return null; }\
                 }",
                vec![serde_json::json!(xpath), serde_json::json!(nth)],
                main_ctx,
                session.clone(),
            )
            .await?
            {
                return Ok(Some(element));
            }

            // protocol-side fallback: walk the pierced document
            pierce_xpath_fallback(inner, xpath, session).await
        }
        SelectorKind::Css(css) => {
            // isolated world first: self-contained walker over open shadow
            // roots, unaffected by page globals
            let isolated_ctx = inner.isolated_context(frame_id.clone()).await?;
            if let Some(element) = evaluate_to_element(
                inner,
                "(sel, nth) => {\
                   const out = [];\
                   const walk = (root) => {\
                     try { out.push(...root.querySelectorAll(sel)); } catch (e) { return; }\
                     for (const el of root.querySelectorAll('*')) {\
                       if (el.shadowRoot) walk(el.shadowRoot);\
                     }\
                   };\
                   walk(document);\
                   return out[nth] || null;\
                 }",
                vec![serde_json::json!(css), serde_json::json!(nth)],
                isolated_ctx,
                session.clone(),
            )
            .await?
            {
                return Ok(Some(element));
            }

            // main world consults the closed-root registry too
            evaluate_to_element(
                inner,
                "(sel, nth) => {\
                   const h = window.__deepdriver__;\
                   if (!h) { return document.querySelectorAll(sel)[nth] || null; }\
                   const all = h.queryDeepAll(sel);\
                   return all[nth] || null;\
                 }",
                vec![serde_json::json!(css), serde_json::json!(nth)],
                main_ctx,
                session,
            )
            .await
        }
        SelectorKind::Text(text) => {
            evaluate_to_element(
                inner,
                "(needle, nth) => {\
                   const h = window.__deepdriver__;\
                   if (h) { const all = h.textSearchAll(needle); return all[nth] || null; }\
                   const matches = [];\
                   for (const el of document.querySelectorAll('*')) {\
                     if (el.textContent && el.textContent.includes(needle)) matches.push(el);\
                   }\
                   const inner = matches.filter(m => !matches.some(o => o !== m && m.contains(o)));\
                   const pool = inner.length ? inner : matches.slice(-1);\
                   return pool[nth] || null;\
                 }",
                vec![serde_json::json!(text), serde_json::json!(nth)],
                main_ctx,
                session,
            )
            .await
        }
    }
}

/// Count matches for one selector segment inside one frame
pub(crate) async fn count_in_frame(
    inner: &Arc<PageInner>,
    frame_id: Option<FrameId>,
    kind: &SelectorKind,
) -> Result<usize> {
    let session = inner.owner_session(frame_id.clone()).await?;
    let main_ctx = match &frame_id {
        Some(id) => inner.frame_execution_context(id.clone()).await?,
        None => inner.execution_context().await?,
    };

    let (declaration, arg) = match kind {
        SelectorKind::Css(css) => (
            "(sel) => {\
               const h = window.__deepdriver__;\
               if (h) { return h.queryDeepAll(sel).length; }\
               return document.querySelectorAll(sel).length;\
             }",
            serde_json::json!(css),
        ),
        SelectorKind::XPath(xp) => (
            "(xp) => {\
               try {\
                 const r = document.evaluate(xp, document, null,\
                   XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);\
                 return r.snapshotLength;\
               } catch (e) { return 0; }\
             }",
            serde_json::json!(xp),
        ),
        SelectorKind::Text(text) => (
            "(needle) => {\
               const h = window.__deepdriver__;\
               if (h) { return h.textSearchAll(needle).length; }\
               let n = 0;\
               for (const el of document.querySelectorAll('*')) {\
                 if (el.textContent && el.textContent.includes(needle)) n += 1;\
               }\
               return n;\
             }",
            serde_json::json!(text),
        ),
    };

    let mut call = CallFunctionOnParams::builder()
        .function_declaration(declaration)
        .argument(CallArgument::builder().value(arg).build())
        .build()
        .map_err(CdpError::msg)?;
    call.return_by_value = Some(true);
    call.execution_context_id = main_ctx;
    call.await_promise = Some(true);
    let resp = inner.execute_on(call, session).await?.result;
    if let Some(exception) = resp.exception_details {
        return Err(CdpError::JavascriptException(Box::new(exception)));
    }
    Ok(resp
        .result
        .value
        .as_ref()
        .and_then(|v| v.as_u64())
        .unwrap_or_default() as usize)
}

/// Run a function expected to return an element and wrap the resulting
/// remote object into an [`Element`]
async fn evaluate_to_element(
    inner: &Arc<PageInner>,
    declaration: &str,
    args: Vec<serde_json::Value>,
    ctx: Option<ExecutionContextId>,
    session: Option<SessionId>,
) -> Result<Option<Element>> {
    let mut builder = CallFunctionOnParams::builder().function_declaration(declaration);
    for arg in args {
        builder = builder.argument(CallArgument::builder().value(arg).build());
    }
    let mut call = builder.build().map_err(CdpError::msg)?;
    call.return_by_value = Some(false);
    // a None context evaluates in the session's own default context, which
    // is what adopted OOPIF sessions need
    call.execution_context_id = ctx;
    call.await_promise = Some(true);

    let resp = inner.execute_on(call, session.clone()).await?.result;
    if resp.exception_details.is_some() {
        // treated as not-found, callers fall back to the next strategy
        return Ok(None);
    }

    let Some(object_id) = resp.result.object_id.clone() else {
        return Ok(None);
    };
    Ok(Some(
        Element::from_object_id(Arc::clone(inner), object_id, session).await?,
    ))
}

/// Resolve one selector segment inside the shadow root of `host`, descending
/// into nested open and registered-closed roots. The host itself is never a
/// candidate; a shadow tree does not contain its own host.
pub(crate) async fn resolve_in_shadow(
    inner: &Arc<PageInner>,
    host: &Element,
    kind: &SelectorKind,
    nth: usize,
) -> Result<Option<Element>> {
    let (declaration, arg) = match kind {
        SelectorKind::Css(css) => (
            "function(sel, nth) {\
               const h = window.__deepdriver__;\
               const rootOf = (el) => el.shadowRoot || (h && h.getClosedRoot(el)) || null;\
               const root = rootOf(this);\
               if (!root) return null;\
               const out = [];\
               const walk = (scope) => {\
                 try { out.push(...scope.querySelectorAll(sel)); } catch (e) { return; }\
                 for (const el of scope.querySelectorAll('*')) {\
                   const sr = rootOf(el);\
                   if (sr) walk(sr);\
                 }\
               };\
               walk(root);\
               return out[nth] || null;\
             }",
            serde_json::json!(css),
        ),
        SelectorKind::Text(text) => (
            "function(needle, nth) {\
               const h = window.__deepdriver__;\
               const rootOf = (el) => el.shadowRoot || (h && h.getClosedRoot(el)) || null;\
               const root = rootOf(this);\
               if (!root) return null;\
               const matches = [];\
               const walk = (scope) => {\
                 for (const el of scope.querySelectorAll('*')) {\
                   const sr = rootOf(el);\
                   if (sr) walk(sr);\
                   if (el.textContent && el.textContent.includes(needle)) matches.push(el);\
                 }\
               };\
               walk(root);\
               const inner = matches.filter(m => !matches.some(o => o !== m && m.contains(o)));\
               const pool = inner.length ? inner : matches.slice(-1);\
               return pool[nth] || null;\
             }",
            serde_json::json!(text),
        ),
        SelectorKind::XPath(xp) => (
            "function(xp, nth) {\
               const h = window.__deepdriver__;\
               const root = this.shadowRoot || (h && h.getClosedRoot(this)) || null;\
               if (!root) return null;\
               try {\
                 const r = document.evaluate(xp, root, null,\
                   XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);\
                 return r.snapshotItem(nth);\
               } catch (e) { return null; }\
             }",
            serde_json::json!(xp),
        ),
    };

    call_on_host_to_element(
        inner,
        host,
        declaration,
        vec![arg, serde_json::json!(nth)],
    )
    .await
}

/// Count matches for one selector segment inside the shadow root of `host`
pub(crate) async fn count_in_shadow(
    inner: &Arc<PageInner>,
    host: &Element,
    kind: &SelectorKind,
) -> Result<usize> {
    let (declaration, arg) = match kind {
        SelectorKind::Css(css) => (
            "function(sel) {\
               const h = window.__deepdriver__;\
               const rootOf = (el) => el.shadowRoot || (h && h.getClosedRoot(el)) || null;\
               const root = rootOf(this);\
               if (!root) return 0;\
               let n = 0;\
               const walk = (scope) => {\
                 try { n += scope.querySelectorAll(sel).length; } catch (e) { return; }\
                 for (const el of scope.querySelectorAll('*')) {\
                   const sr = rootOf(el);\
                   if (sr) walk(sr);\
                 }\
               };\
               walk(root);\
               return n;\
             }",
            serde_json::json!(css),
        ),
        SelectorKind::Text(text) => (
            "function(needle) {\
               const h = window.__deepdriver__;\
               const rootOf = (el) => el.shadowRoot || (h && h.getClosedRoot(el)) || null;\
               const root = rootOf(this);\
               if (!root) return 0;\
               let n = 0;\
               const walk = (scope) => {\
                 for (const el of scope.querySelectorAll('*')) {\
                   const sr = rootOf(el);\
                   if (sr) walk(sr);\
                   if (el.textContent && el.textContent.includes(needle)) n += 1;\
                 }\
               };\
               walk(root);\
               return n;\
             }",
            serde_json::json!(text),
        ),
        SelectorKind::XPath(xp) => (
            "function(xp) {\
               const root = this.shadowRoot ||\
                 (window.__deepdriver__ && window.__deepdriver__.getClosedRoot(this)) || null;\
               if (!root) return 0;\
               try {\
                 const r = document.evaluate(xp, root, null,\
                   XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);\
                 return r.snapshotLength;\
               } catch (e) { return 0; }\
             }",
            serde_json::json!(xp),
        ),
    };

    let mut builder = CallFunctionOnParams::builder()
        .function_declaration(declaration)
        .object_id(host.remote_object_id.clone());
    builder = builder.argument(CallArgument::builder().value(arg).build());
    let mut call = builder.build().map_err(CdpError::msg)?;
    call.return_by_value = Some(true);
    call.await_promise = Some(true);

    let resp = inner
        .execute_on(call, host.session().cloned())
        .await?
        .result;
    if let Some(exception) = resp.exception_details {
        return Err(CdpError::JavascriptException(Box::new(exception)));
    }
    Ok(resp
        .result
        .value
        .as_ref()
        .and_then(|v| v.as_u64())
        .unwrap_or_default() as usize)
}

/// Call a function on the host element and wrap the returned element, if any
async fn call_on_host_to_element(
    inner: &Arc<PageInner>,
    host: &Element,
    declaration: &str,
    args: Vec<serde_json::Value>,
) -> Result<Option<Element>> {
    let mut builder = CallFunctionOnParams::builder()
        .function_declaration(declaration)
        .object_id(host.remote_object_id.clone());
    for arg in args {
        builder = builder.argument(CallArgument::builder().value(arg).build());
    }
    let mut call = builder.build().map_err(CdpError::msg)?;
    call.return_by_value = Some(false);
    call.await_promise = Some(true);

    let session = host.session().cloned();
    let resp = inner.execute_on(call, session.clone()).await?.result;
    if resp.exception_details.is_some() {
        return Ok(None);
    }

    let Some(object_id) = resp.result.object_id.clone() else {
        return Ok(None);
    };
    Ok(Some(
        Element::from_object_id(Arc::clone(inner), object_id, session).await?,
    ))
}

/// Walk the pierced protocol DOM for an absolute `tag[n]` XPath, supporting
/// `/`, `//`, `*`, and positional indexes across shadow roots and same
/// session content documents.
async fn pierce_xpath_fallback(
    inner: &Arc<PageInner>,
    xpath: &str,
    session: Option<SessionId>,
) -> Result<Option<Element>> {
    let Some(steps) = parse_xpath_steps(xpath) else {
        return Ok(None);
    };

    let mut params = GetDocumentParams::default();
    params.depth = Some(-1);
    params.pierce = Some(true);
    let root = inner.execute_on(params, session.clone()).await?.result.root;

    let Some(backend_id) = match_steps(&root, &steps) else {
        return Ok(None);
    };
    Ok(Some(
        Element::from_backend_id(Arc::clone(inner), backend_id, session).await?,
    ))
}

fn element_children(node: &Node) -> Vec<&Node> {
    let mut out = Vec::new();
    if let Some(shadow_roots) = node.shadow_roots.as_ref() {
        for root in shadow_roots {
            out.extend(root.children.iter().flatten());
        }
    }
    if let Some(content) = node.content_document.as_ref() {
        out.extend(content.children.iter().flatten());
    }
    out.extend(node.children.iter().flatten());
    // element nodes only (nodeType 1)
    out.retain(|n| n.node_type == 1);
    out
}

fn collect_descendants<'a>(node: &'a Node, out: &mut Vec<&'a Node>) {
    for child in element_children(node) {
        out.push(child);
        collect_descendants(child, out);
    }
}

pub(crate) fn match_steps(root: &Node, steps: &[XPathStep]) -> Option<BackendNodeId> {
    let mut contexts: Vec<&Node> = vec![root];
    for step in steps {
        let mut next = Vec::new();
        for ctx in &contexts {
            let candidates: Vec<&Node> = if step.deep {
                let mut all = Vec::new();
                collect_descendants(ctx, &mut all);
                all
            } else {
                element_children(ctx)
            };
            let mut matched: Vec<&Node> = candidates
                .into_iter()
                .filter(|n| step.tag == "*" || n.local_name.eq_ignore_ascii_case(&step.tag))
                .collect();
            if let Some(index) = step.index {
                if index >= 1 && index <= matched.len() {
                    matched = vec![matched[index - 1]];
                } else {
                    matched.clear();
                }
            }
            next.extend(matched);
        }
        if next.is_empty() {
            return None;
        }
        contexts = next;
    }
    contexts.first().map(|n| n.backend_node_id)
}

/// Map the backend node id of an `<iframe>` element to the frame it hosts by
/// checking `DOM.getFrameOwner` for each child of the parent frame.
pub(crate) async fn child_frame_for_backend_id(
    inner: &Arc<PageInner>,
    parent_frame: &FrameId,
    backend_id: BackendNodeId,
    parent_session: Option<SessionId>,
) -> Result<Option<FrameId>> {
    for child in inner.child_frames(parent_frame.clone()).await? {
        match inner
            .execute_on(GetFrameOwnerParams::new(child.clone()), parent_session.clone())
            .await
        {
            Ok(owner) => {
                if owner.result.backend_node_id == backend_id {
                    return Ok(Some(child));
                }
            }
            Err(err) => {
                // short-lived frames race their own owner lookup
                tracing::debug!(frame = ?child, "getFrameOwner failed: {err}");
            }
        }
    }
    Ok(None)
}

/// Resolve the iframe element at `iframe_xpath` within `frame` and map it to
/// the frame it hosts. Used when descending through frames point by point.
pub(crate) async fn child_frame_at(
    inner: &Arc<PageInner>,
    frame: &FrameId,
    iframe_xpath: &str,
    session: Option<SessionId>,
    ctx: Option<ExecutionContextId>,
) -> Result<Option<FrameId>> {
    let Some(element) = evaluate_to_element(
        inner,
        "(xp) => {\
           const h = window.__deepdriver__;\
           if (h) { return h.resolveSimpleXPath(xp); }\
           const r = document.evaluate(xp, document, null,\
             XPathResult.FIRST_ORDERED_NODE_TYPE, null);\
           return r.singleNodeValue;\
         }",
        vec![serde_json::json!(iframe_xpath)],
        ctx,
        session.clone(),
    )
    .await?
    else {
        return Ok(None);
    };

    let backend_id = element.backend_node_id;
    element.release().await;
    child_frame_for_backend_id(inner, frame, backend_id, session).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_follows_prefixes() {
        assert_eq!(
            classify("div.foo > span"),
            SelectorKind::Css("div.foo > span".into())
        );
        assert_eq!(
            classify("css=.item"),
            SelectorKind::Css(".item".into())
        );
        assert_eq!(
            classify("/html/body/div[2]"),
            SelectorKind::XPath("/html/body/div[2]".into())
        );
        assert_eq!(
            classify("(//button)[2]"),
            SelectorKind::XPath("(//button)[2]".into())
        );
        assert_eq!(
            classify("xpath=//a[@href]"),
            SelectorKind::XPath("//a[@href]".into())
        );
        assert_eq!(
            classify("text=Sign in"),
            SelectorKind::Text("Sign in".into())
        );
    }

    #[test]
    fn hops_split_and_trim() {
        assert_eq!(
            split_hops("iframe#a >> #x"),
            vec!["iframe#a".to_string(), "#x".to_string()]
        );
        assert_eq!(split_hops("#solo"), vec!["#solo".to_string()]);
        // every hop stays its own segment; a shadow-host chain is walked
        // root by root, never re-joined into one selector string
        assert_eq!(
            split_hops("shadow-host >> nested-host >> #b"),
            vec![
                "shadow-host".to_string(),
                "nested-host".to_string(),
                "#b".to_string()
            ]
        );
    }

    #[test]
    fn shadow_probe_states_map() {
        assert_eq!(
            shadow_state_from_probe(Some("root")),
            ShadowRootState::Attached
        );
        assert_eq!(
            shadow_state_from_probe(Some("detached")),
            ShadowRootState::HostDetached
        );
        assert_eq!(shadow_state_from_probe(Some("none")), ShadowRootState::NoRoot);
        assert_eq!(shadow_state_from_probe(None), ShadowRootState::NoRoot);
    }

    #[test]
    fn xpath_steps_parse() {
        let steps = parse_xpath_steps("/html/body//div[3]/*").unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].tag, "html");
        assert!(!steps[0].deep);
        assert!(steps[2].deep);
        assert_eq!(steps[2].index, Some(3));
        assert_eq!(steps[3].tag, "*");
    }

    #[test]
    fn xpath_frame_hops_split_at_iframe_steps() {
        let segments =
            split_xpath_frame_hops("/html/body/iframe[1]/html/body/button[1]").unwrap();
        assert_eq!(
            segments,
            vec![
                "/html/body/iframe[1]".to_string(),
                "/html/body/button[1]".to_string()
            ]
        );

        // case-insensitive FRAME steps hop too
        let segments = split_xpath_frame_hops("/HTML/BODY/FRAME[2]/div[1]");
        assert!(segments.is_some());

        // no frame step, no hop
        assert!(split_xpath_frame_hops("/html/body/div[1]").is_none());
    }

    #[test]
    fn pierced_xpath_walks_shadow_roots() {
        use serde_json::json;

        // html > body > host(#shadow-root > button)
        let doc: Node = serde_json::from_value(json!({
            "nodeId": 1,
            "backendNodeId": 1,
            "nodeType": 9,
            "nodeName": "#document",
            "localName": "",
            "nodeValue": "",
            "childNodeCount": 1,
            "children": [{
                "nodeId": 2,
                "backendNodeId": 2,
                "nodeType": 1,
                "nodeName": "HTML",
                "localName": "html",
                "nodeValue": "",
                "children": [{
                    "nodeId": 3,
                    "backendNodeId": 3,
                    "nodeType": 1,
                    "nodeName": "BODY",
                    "localName": "body",
                    "nodeValue": "",
                    "children": [{
                        "nodeId": 4,
                        "backendNodeId": 4,
                        "nodeType": 1,
                        "nodeName": "SHADOW-HOST",
                        "localName": "shadow-host",
                        "nodeValue": "",
                        "shadowRoots": [{
                            "nodeId": 5,
                            "backendNodeId": 5,
                            "nodeType": 11,
                            "nodeName": "#document-fragment",
                            "localName": "",
                            "nodeValue": "",
                            "children": [{
                                "nodeId": 6,
                                "backendNodeId": 6,
                                "nodeType": 1,
                                "nodeName": "BUTTON",
                                "localName": "button",
                                "nodeValue": ""
                            }]
                        }]
                    }]
                }]
            }]
        }))
        .unwrap();

        let steps = parse_xpath_steps("/html/body/shadow-host//button[1]").unwrap();
        let hit = match_steps(&doc, &steps).unwrap();
        assert_eq!(serde_json::to_value(hit).unwrap(), json!(6));

        let missing = parse_xpath_steps("/html/body/video[1]").unwrap();
        assert!(match_steps(&doc, &missing).is_none());
    }
}
