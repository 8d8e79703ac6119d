use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::mpsc::{channel, Receiver, Sender};
use futures::channel::oneshot::channel as oneshot_channel;
use futures::stream::Fuse;
use futures::{SinkExt, StreamExt};

use chromiumoxide_cdp::cdp::browser_protocol::browser::{GetVersionParams, GetVersionReturns};
use chromiumoxide_cdp::cdp::browser_protocol::dom::{
    NodeId, QuerySelectorAllParams, QuerySelectorParams, Rgba,
};
use chromiumoxide_cdp::cdp::browser_protocol::emulation::{
    ClearDeviceMetricsOverrideParams, SetDefaultBackgroundColorOverrideParams,
    SetDeviceMetricsOverrideParams,
};
use chromiumoxide_cdp::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide_cdp::cdp::browser_protocol::page::{
    CreateIsolatedWorldParams, FrameId, GetLayoutMetricsParams, GetLayoutMetricsReturns, Viewport,
};
use chromiumoxide_cdp::cdp::browser_protocol::target::{ActivateTargetParams, SessionId, TargetId};
use chromiumoxide_cdp::cdp::js_protocol::runtime::{
    CallFunctionOnParams, CallFunctionOnReturns, EvaluateParams, ExecutionContextId,
    RemoteObjectId,
};
use chromiumoxide_types::{Command, CommandResponse};

use crate::cmd::{to_command_response, CommandMessage};
use crate::error::{CdpError, Result};
use crate::handler::commandfuture::CommandFuture;
use crate::handler::domworld::DOMWorldKind;
use crate::handler::frame::{random_world_name, FrameTreeView, LifecycleEvent};
use crate::handler::target::{GetExecutionContext, TargetMessage};
use crate::handler::target_message_future::TargetMessageFuture;
use crate::js::EvaluationResult;
use crate::keys::{self, Key, Modifier};
use crate::layout::{Delta, Point};
use crate::page::ScreenshotParams;
use crate::utils;

#[derive(Debug)]
pub struct PageHandle {
    pub(crate) rx: Fuse<Receiver<TargetMessage>>,
    page: Arc<PageInner>,
}

impl PageHandle {
    pub fn new(target_id: TargetId, session_id: SessionId, opener_id: Option<TargetId>) -> Self {
        let (commands, rx) = channel(100);
        let page = PageInner {
            target_id,
            session_id,
            opener_id,
            sender: commands,
            pressed_modifiers: Mutex::new(Vec::new()),
        };
        Self {
            rx: rx.fuse(),
            page: Arc::new(page),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<PageInner> {
        &self.page
    }
}

#[derive(Debug)]
pub(crate) struct PageInner {
    target_id: TargetId,
    session_id: SessionId,
    opener_id: Option<TargetId>,
    sender: Sender<TargetMessage>,
    /// Modifier keys currently held down by synthesized input. Mutated only
    /// while a single key/mouse command is executing; the lock is
    /// uncontended and never held across an await.
    pressed_modifiers: Mutex<Vec<Modifier>>,
}

impl PageInner {
    /// Execute a command on this page's main session
    pub(crate) async fn execute<T: Command>(&self, cmd: T) -> Result<CommandResponse<T::Response>> {
        execute(cmd, self.sender.clone(), Some(self.session_id.clone())).await
    }

    /// Execute a browser-level command that takes no session, e.g.
    /// `Target.closeTarget`
    pub(crate) async fn execute_root<T: Command>(
        &self,
        cmd: T,
    ) -> Result<CommandResponse<T::Response>> {
        execute(cmd, self.sender.clone(), None).await
    }

    /// Execute a command on a specific session of this page, e.g. the session
    /// owning an OOPIF
    pub(crate) async fn execute_on<T: Command>(
        &self,
        cmd: T,
        session: Option<SessionId>,
    ) -> Result<CommandResponse<T::Response>> {
        let session = session.unwrap_or_else(|| self.session_id.clone());
        execute(cmd, self.sender.clone(), Some(session)).await
    }

    /// Create a command future on the main session
    pub(crate) fn command_future<T: Command>(&self, cmd: T) -> Result<CommandFuture<T>> {
        CommandFuture::new(cmd, self.sender.clone(), Some(self.session_id.clone()))
    }

    /// Execute a command that starts a navigation; the reply arrives once the
    /// requested lifecycle state is reached (or the navigation fails, is
    /// superseded, or times out).
    pub(crate) async fn execute_navigation<T: Command>(
        &self,
        cmd: T,
        opts: crate::handler::frame::NavigationOptions,
    ) -> Result<CommandResponse<T::Response>> {
        let (tx, rx) = oneshot_channel();
        let method = cmd.identifier();
        let msg = CommandMessage::with_navigation(cmd, tx, Some(self.session_id.clone()), opts)?;
        self.sender.clone().send(TargetMessage::Command(msg)).await?;
        let resp = rx.await??;
        to_command_response::<T>(resp, method)
    }

    /// Resolves when the current main frame reaches `state`
    pub(crate) fn wait_for_load_state(
        &self,
        state: LifecycleEvent,
        timeout: Duration,
    ) -> TargetMessageFuture<Result<()>> {
        TargetMessageFuture::<Result<()>>::wait_for_load_state(
            self.sender.clone(),
            state,
            timeout,
        )
    }

    /// The identifier of this page's target
    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    /// The identifier of this page's target's session
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The identifier of this page's target's opener target
    pub fn opener_id(&self) -> &Option<TargetId> {
        &self.opener_id
    }

    pub(crate) fn sender(&self) -> &Sender<TargetMessage> {
        &self.sender
    }

    /// The session owning `frame_id` (None = main frame)
    pub(crate) async fn owner_session(
        &self,
        frame_id: Option<FrameId>,
    ) -> Result<Option<SessionId>> {
        let (tx, rx) = oneshot_channel();
        self.sender
            .clone()
            .send(TargetMessage::OwnerSession { frame_id, tx })
            .await?;
        Ok(rx.await?)
    }

    /// The direct child frames of `frame_id`
    pub(crate) async fn child_frames(&self, frame_id: FrameId) -> Result<Vec<FrameId>> {
        let (tx, rx) = oneshot_channel();
        self.sender
            .clone()
            .send(TargetMessage::ChildFrames { frame_id, tx })
            .await?;
        Ok(rx.await?)
    }

    /// An owned snapshot of the frame graph
    pub(crate) async fn tree_view(&self) -> Result<FrameTreeView> {
        let (tx, rx) = oneshot_channel();
        self.sender
            .clone()
            .send(TargetMessage::FrameTreeView(tx))
            .await?;
        Ok(rx.await?)
    }

    pub(crate) async fn main_frame(&self) -> Result<Option<FrameId>> {
        let (tx, rx) = oneshot_channel();
        self.sender.clone().send(TargetMessage::MainFrame(tx)).await?;
        Ok(rx.await?)
    }

    /// Returns the first element node id matching the given CSS selector
    pub async fn find_element(&self, selector: impl Into<String>, node: NodeId) -> Result<NodeId> {
        Ok(self
            .execute(QuerySelectorParams::new(node, selector))
            .await?
            .node_id)
    }

    /// Return all element node ids inside `node` that match the selector
    pub(crate) async fn find_elements(
        &self,
        selector: impl Into<String>,
        node: NodeId,
    ) -> Result<Vec<NodeId>> {
        Ok(self
            .execute(QuerySelectorAllParams::new(node, selector))
            .await?
            .result
            .node_ids)
    }

    /// Activates (focuses) the target.
    pub async fn activate(&self) -> Result<&Self> {
        self.execute(ActivateTargetParams::new(self.target_id().clone()))
            .await?;
        Ok(self)
    }

    /// Version information about the browser
    pub async fn version(&self) -> Result<GetVersionReturns> {
        Ok(self.execute(GetVersionParams::default()).await?.result)
    }

    /// The CDP modifiers bitmask of the currently held modifier keys
    pub(crate) fn modifiers_mask(&self) -> i64 {
        let held = self.pressed_modifiers.lock().expect("modifier lock");
        keys::modifier_bits(&held)
    }

    fn push_modifier(&self, modifier: Modifier) -> i64 {
        let mut held = self.pressed_modifiers.lock().expect("modifier lock");
        if !held.contains(&modifier) {
            held.push(modifier);
        }
        keys::modifier_bits(&held)
    }

    fn release_modifier(&self, modifier: Modifier) -> i64 {
        let mut held = self.pressed_modifiers.lock().expect("modifier lock");
        held.retain(|m| *m != modifier);
        keys::modifier_bits(&held)
    }

    /// Forget all held modifiers, e.g. after a failed key sequence, so state
    /// never leaks into the next input command
    pub(crate) fn clear_modifiers(&self) {
        self.pressed_modifiers
            .lock()
            .expect("modifier lock")
            .clear();
    }

    fn held_modifiers(&self) -> Vec<Modifier> {
        self.pressed_modifiers
            .lock()
            .expect("modifier lock")
            .clone()
    }

    /// Moves the mouse to this point (dispatches a mouseMoved event)
    pub async fn move_mouse(&self, point: Point) -> Result<&Self> {
        self.move_mouse_with_buttons(point, None).await
    }

    async fn move_mouse_with_buttons(&self, point: Point, buttons: Option<i64>) -> Result<&Self> {
        let mut params =
            DispatchMouseEventParams::new(DispatchMouseEventType::MouseMoved, point.x, point.y);
        params.modifiers = Some(self.modifiers_mask());
        params.buttons = buttons;
        self.execute(params).await?;
        self.update_cursor_overlay(point).await;
        Ok(self)
    }

    /// Best effort; pages without the overlay installed ignore the call
    async fn update_cursor_overlay(&self, point: Point) {
        let expr = format!(
            "window.__deepdriver_cursor__ && window.__deepdriver_cursor__.move({}, {})",
            point.x, point.y
        );
        if let Ok(params) = EvaluateParams::builder().expression(expr).build() {
            let _ = self.execute(params).await;
        }
    }

    /// Dispatches a mouseWheel event at the point's location
    pub async fn scroll(&self, point: Point, delta: Delta) -> Result<&Self> {
        let mut params =
            DispatchMouseEventParams::new(DispatchMouseEventType::MouseWheel, point.x, point.y);
        params.delta_x = Some(delta.delta_x);
        params.delta_y = Some(delta.delta_y);
        params.modifiers = Some(self.modifiers_mask());
        self.execute(params).await?;
        Ok(self)
    }

    /// move → press → release at the point's location
    pub async fn click_with(
        &self,
        point: Point,
        button: MouseButton,
        click_count: i64,
    ) -> Result<&Self> {
        let modifiers = self.modifiers_mask();
        let buttons = button_mask(&button);

        self.move_mouse(point).await?;

        let cmd = DispatchMouseEventParams::builder()
            .x(point.x)
            .y(point.y)
            .button(button)
            .click_count(click_count)
            .modifiers(modifiers);

        if let Ok(press) = cmd
            .clone()
            .buttons(buttons)
            .r#type(DispatchMouseEventType::MousePressed)
            .build()
        {
            self.execute(press).await?;
        }
        if let Ok(release) = cmd
            .buttons(0)
            .r#type(DispatchMouseEventType::MouseReleased)
            .build()
        {
            self.execute(release).await?;
        }

        Ok(self)
    }

    /// Performs a mouse click event at the point's location
    pub async fn click(&self, point: Point) -> Result<&Self> {
        self.click_with(point, MouseButton::Left, 1).await
    }

    /// press → interpolated moves → release
    pub async fn drag_and_drop(
        &self,
        from: Point,
        to: Point,
        steps: usize,
        step_delay: Option<Duration>,
        button: MouseButton,
    ) -> Result<&Self> {
        let modifiers = self.modifiers_mask();
        let buttons = button_mask(&button);

        self.move_mouse(from).await?;

        let press = DispatchMouseEventParams::builder()
            .x(from.x)
            .y(from.y)
            .button(button.clone())
            .buttons(buttons)
            .click_count(1)
            .modifiers(modifiers)
            .r#type(DispatchMouseEventType::MousePressed)
            .build();
        if let Ok(press) = press {
            self.execute(press).await?;
        }

        let steps = steps.max(1);
        for step in 1..=steps {
            let fraction = step as f64 / steps as f64;
            let point = from.lerp(&to, fraction);
            self.move_mouse_with_buttons(point, Some(buttons)).await?;
            if let Some(delay) = step_delay {
                futures_timer::Delay::new(delay).await;
            }
        }

        let release = DispatchMouseEventParams::builder()
            .x(to.x)
            .y(to.y)
            .button(button)
            .buttons(0)
            .click_count(1)
            .modifiers(modifiers)
            .r#type(DispatchMouseEventType::MouseReleased)
            .build();
        if let Ok(release) = release {
            self.execute(release).await?;
        }

        Ok(self)
    }

    fn key_event(
        &self,
        r#type: DispatchKeyEventType,
        key: &Key,
        modifiers: i64,
        text: bool,
        commands: Vec<String>,
    ) -> DispatchKeyEventParams {
        let mut params = DispatchKeyEventParams::builder()
            .r#type(r#type)
            .key(key.key.clone())
            .code(key.code.clone())
            .windows_virtual_key_code(key.key_code)
            .native_virtual_key_code(key.key_code)
            .modifiers(modifiers)
            .build()
            .expect("type is set");
        if text {
            params.text = key.text.clone();
        }
        if !commands.is_empty() {
            params.commands = Some(commands);
        }
        params
    }

    /// Press and release a single key, no combo handling
    pub async fn press_key(&self, key: &Key) -> Result<&Self> {
        let modifiers = self.modifiers_mask();
        // printable keys deliver their text, others stay raw
        let down_type = if key.text.is_some() {
            DispatchKeyEventType::KeyDown
        } else {
            DispatchKeyEventType::RawKeyDown
        };
        self.execute(self.key_event(down_type, key, modifiers, true, Vec::new()))
            .await?;
        self.execute(self.key_event(
            DispatchKeyEventType::KeyUp,
            key,
            modifiers,
            false,
            Vec::new(),
        ))
        .await?;
        Ok(self)
    }

    /// Press a `"Mod+Mod+Key"` combination: modifiers down in order, main
    /// key, then releases in reverse order. Any failure clears the held
    /// modifier set so nothing leaks into the next input command.
    pub async fn press_key_combo(&self, input: &str) -> Result<&Self> {
        let combo = keys::parse_combo(input)
            .ok_or_else(|| CdpError::msg(format!("Unknown key combination: {input}")))?;

        let result = self.dispatch_combo(&combo).await;
        if result.is_err() {
            self.clear_modifiers();
        }
        result?;
        Ok(self)
    }

    async fn dispatch_combo(&self, combo: &keys::KeyCombo) -> Result<()> {
        // modifiers down, cumulative mask includes the key going down
        for modifier in &combo.modifiers {
            let mask = self.push_modifier(*modifier);
            let def = modifier.key_definition();
            self.execute(self.key_event(
                DispatchKeyEventType::RawKeyDown,
                &def,
                mask,
                false,
                Vec::new(),
            ))
            .await?;
        }

        let held = self.held_modifiers();
        let mask = keys::modifier_bits(&held);
        let non_shift_held = held.iter().any(|m| *m != Modifier::Shift);
        let commands = keys::editing_commands(&held, &combo.key);

        // a printable key under a real modifier must not produce text input,
        // so accelerators like Ctrl+A stay accelerators
        let down_type = if combo.key.is_printable() && !non_shift_held {
            DispatchKeyEventType::KeyDown
        } else if combo.key.text.is_some() && !non_shift_held {
            DispatchKeyEventType::KeyDown
        } else {
            DispatchKeyEventType::RawKeyDown
        };
        let with_text = matches!(down_type, DispatchKeyEventType::KeyDown);

        self.execute(self.key_event(down_type, &combo.key, mask, with_text, commands))
            .await?;
        self.execute(self.key_event(
            DispatchKeyEventType::KeyUp,
            &combo.key,
            mask,
            false,
            Vec::new(),
        ))
        .await?;

        // modifiers up in reverse order, mask shrinking as they release
        for modifier in combo.modifiers.iter().rev() {
            let mask = self.release_modifier(*modifier);
            let def = modifier.key_definition();
            self.execute(self.key_event(
                DispatchKeyEventType::KeyUp,
                &def,
                mask,
                false,
                Vec::new(),
            ))
            .await?;
        }
        Ok(())
    }

    /// Type text as individual keystrokes.
    ///
    /// `mistakes` injects an occasional wrong character followed by a
    /// Backspace, for flows that watch typing cadence.
    pub async fn type_str(
        &self,
        input: impl AsRef<str>,
        delay: Option<Duration>,
        mistakes: bool,
    ) -> Result<&Self> {
        use rand::Rng;

        for c in input.as_ref().chars() {
            if mistakes && rand::rng().random_bool(0.04) {
                let wrong = wrong_char_for(c);
                self.press_key(&keys::char_definition(wrong)).await?;
                if let Some(backspace) = keys::key_definition("Backspace") {
                    self.press_key(&backspace).await?;
                }
            }
            self.press_key(&keys::char_definition(c)).await?;
            if let Some(delay) = delay {
                futures_timer::Delay::new(delay).await;
            }
        }
        Ok(self)
    }

    /// Insert text into the focused element without per-character key events
    pub async fn insert_text(&self, text: impl Into<String>) -> Result<&Self> {
        self.execute(InsertTextParams::new(text)).await?;
        Ok(self)
    }

    /// Calls function with given declaration on the remote object with the
    /// matching id
    pub async fn call_js_fn(
        &self,
        function_declaration: impl Into<String>,
        await_promise: bool,
        remote_object_id: RemoteObjectId,
    ) -> Result<CallFunctionOnReturns> {
        self.call_js_fn_on(function_declaration, await_promise, remote_object_id, None)
            .await
    }

    /// Same as [`call_js_fn`](Self::call_js_fn) but on a specific session
    pub async fn call_js_fn_on(
        &self,
        function_declaration: impl Into<String>,
        await_promise: bool,
        remote_object_id: RemoteObjectId,
        session: Option<SessionId>,
    ) -> Result<CallFunctionOnReturns> {
        let resp = self
            .execute_on(
                CallFunctionOnParams::builder()
                    .object_id(remote_object_id)
                    .function_declaration(function_declaration)
                    .generate_preview(true)
                    .await_promise(await_promise)
                    .build()
                    .unwrap(),
                session,
            )
            .await?;

        Ok(resp.result)
    }

    pub async fn evaluate_expression(
        &self,
        evaluate: impl Into<EvaluateParams>,
    ) -> Result<EvaluationResult> {
        self.evaluate_expression_on(evaluate, None, None).await
    }

    pub async fn evaluate_expression_on(
        &self,
        evaluate: impl Into<EvaluateParams>,
        context: Option<ExecutionContextId>,
        session: Option<SessionId>,
    ) -> Result<EvaluationResult> {
        let mut evaluate = evaluate.into();
        if evaluate.context_id.is_none() {
            evaluate.context_id = match context {
                Some(ctx) => Some(ctx),
                None => self.execution_context().await?,
            };
        }
        if evaluate.await_promise.is_none() {
            evaluate.await_promise = Some(true);
        }
        if evaluate.return_by_value.is_none() {
            evaluate.return_by_value = Some(true);
        }

        let resp = self.execute_on(evaluate, session).await?.result;

        if let Some(exception) = resp.exception_details {
            return Err(CdpError::JavascriptException(Box::new(exception)));
        }

        Ok(EvaluationResult::new(resp.result))
    }

    pub async fn evaluate_function(
        &self,
        evaluate: impl Into<CallFunctionOnParams>,
    ) -> Result<EvaluationResult> {
        self.evaluate_function_on(evaluate, None, None).await
    }

    pub async fn evaluate_function_on(
        &self,
        evaluate: impl Into<CallFunctionOnParams>,
        context: Option<ExecutionContextId>,
        session: Option<SessionId>,
    ) -> Result<EvaluationResult> {
        let mut evaluate = evaluate.into();
        if evaluate.execution_context_id.is_none() {
            evaluate.execution_context_id = match context {
                Some(ctx) => Some(ctx),
                None => self.execution_context().await?,
            };
        }
        if evaluate.await_promise.is_none() {
            evaluate.await_promise = Some(true);
        }
        if evaluate.return_by_value.is_none() {
            evaluate.return_by_value = Some(true);
        }

        let resp = self.execute_on(evaluate, session).await?.result;
        if let Some(exception) = resp.exception_details {
            return Err(CdpError::JavascriptException(Box::new(exception)));
        }
        Ok(EvaluationResult::new(resp.result))
    }

    pub async fn execution_context(&self) -> Result<Option<ExecutionContextId>> {
        self.execution_context_for_world(None, DOMWorldKind::Main)
            .await
    }

    pub async fn frame_execution_context(
        &self,
        frame_id: FrameId,
    ) -> Result<Option<ExecutionContextId>> {
        self.execution_context_for_world(Some(frame_id), DOMWorldKind::Main)
            .await
    }

    pub async fn execution_context_for_world(
        &self,
        frame_id: Option<FrameId>,
        dom_world: DOMWorldKind,
    ) -> Result<Option<ExecutionContextId>> {
        let (tx, rx) = oneshot_channel();
        self.sender
            .clone()
            .send(TargetMessage::GetExecutionContext(GetExecutionContext {
                dom_world,
                frame_id,
                tx,
            }))
            .await?;
        Ok(rx.await?)
    }

    /// The engine's isolated execution context for `frame_id`, created via
    /// `Page.createIsolatedWorld` on the frame's owning session when the
    /// frame does not have one yet. Cached per frame by the registry for the
    /// frame's lifetime.
    pub(crate) async fn isolated_context(
        &self,
        frame_id: Option<FrameId>,
    ) -> Result<Option<ExecutionContextId>> {
        if let Some(ctx) = self
            .execution_context_for_world(frame_id.clone(), DOMWorldKind::Secondary)
            .await?
        {
            return Ok(Some(ctx));
        }

        let frame_id = match frame_id {
            Some(frame_id) => frame_id,
            None => match self.main_frame().await? {
                Some(frame_id) => frame_id,
                None => return Ok(None),
            },
        };
        let session = self.owner_session(Some(frame_id.clone())).await?;

        let world_name = {
            let (tx, rx) = oneshot_channel();
            self.sender
                .clone()
                .send(TargetMessage::IsolatedWorldName(tx))
                .await?;
            rx.await?
                .unwrap_or_else(|| random_world_name(frame_id.inner()))
        };

        let params = CreateIsolatedWorldParams::builder()
            .frame_id(frame_id)
            .world_name(world_name)
            .grant_univeral_access(true)
            .build()
            .map_err(CdpError::msg)?;
        let resp = self.execute_on(params, session).await?;
        Ok(Some(resp.result.execution_context_id))
    }

    /// Returns metrics relating to the layout of the page
    pub async fn layout_metrics(&self) -> Result<GetLayoutMetricsReturns> {
        Ok(self
            .execute(GetLayoutMetricsParams::default())
            .await?
            .result)
    }

    /// Take a screenshot of the page.
    pub async fn screenshot(&self, params: impl Into<ScreenshotParams>) -> Result<Vec<u8>> {
        self.activate().await?;
        let params = params.into();
        let full_page = params.full_page();
        let omit_background = params.omit_background();

        let mut cdp_params = params.cdp_params;

        if full_page {
            let metrics = self.layout_metrics().await?;
            let width = metrics.css_content_size.width;
            let height = metrics.css_content_size.height;

            cdp_params.clip = Some(Viewport {
                x: 0.,
                y: 0.,
                width,
                height,
                scale: 1.,
            });

            self.execute(SetDeviceMetricsOverrideParams::new(
                width as i64,
                height as i64,
                1.,
                false,
            ))
            .await?;
        }

        if omit_background {
            self.execute(SetDefaultBackgroundColorOverrideParams {
                color: Some(Rgba {
                    r: 0,
                    g: 0,
                    b: 0,
                    a: Some(0.),
                }),
            })
            .await?;
        }

        let res = self.execute(cdp_params).await?.result;

        if omit_background {
            self.execute(SetDefaultBackgroundColorOverrideParams { color: None })
                .await?;
        }

        if full_page {
            self.execute(ClearDeviceMetricsOverrideParams {}).await?;
        }

        Ok(utils::base64::decode(&res.data)?)
    }
}

/// The CDP `buttons` bitmask for a button: left=1, right=2, middle=4
fn button_mask(button: &MouseButton) -> i64 {
    match button {
        MouseButton::Left => 1,
        MouseButton::Right => 2,
        MouseButton::Middle => 4,
        _ => 0,
    }
}

/// A plausible neighboring character for simulated typos
fn wrong_char_for(c: char) -> char {
    const ROWS: [&str; 3] = ["qwertyuiop", "asdfghjkl", "zxcvbnm"];
    let lower = c.to_ascii_lowercase();
    for row in ROWS {
        if let Some(idx) = row.find(lower) {
            let neighbor = if idx + 1 < row.len() { idx + 1 } else { idx.saturating_sub(1) };
            return row.as_bytes()[neighbor] as char;
        }
    }
    c
}

pub(crate) async fn execute<T: Command>(
    cmd: T,
    mut sender: Sender<TargetMessage>,
    session: Option<SessionId>,
) -> Result<CommandResponse<T::Response>> {
    let (tx, rx) = oneshot_channel();
    let method = cmd.identifier();
    let msg = CommandMessage::with_session(cmd, tx, session)?;

    sender.send(TargetMessage::Command(msg)).await?;
    let resp = rx.await??;
    to_command_response::<T>(resp, method)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_masks_match_protocol() {
        assert_eq!(button_mask(&MouseButton::Left), 1);
        assert_eq!(button_mask(&MouseButton::Right), 2);
        assert_eq!(button_mask(&MouseButton::Middle), 4);
    }

    #[test]
    fn wrong_chars_stay_on_the_keyboard_row() {
        assert_eq!(wrong_char_for('a'), 's');
        assert_eq!(wrong_char_for('p'), 'o');
        // characters off the letter rows come back unchanged
        assert_eq!(wrong_char_for('!'), '!');
    }
}
