use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::channel::oneshot::Sender;
use futures::stream::Stream;
use futures::task::{Context, Poll};
use hashbrown::{HashMap, HashSet};

use chromiumoxide_cdp::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide_cdp::cdp::browser_protocol::network::LoaderId;
use chromiumoxide_cdp::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, FrameId, FrameTree, GetFrameTreeParams,
    SetLifecycleEventsEnabledParams,
};
use chromiumoxide_cdp::cdp::browser_protocol::target::{
    AttachToTargetParams, CloseTargetParams, DetachFromTargetParams, SessionId,
    SetAutoAttachParams, TargetId, TargetInfo,
};
use chromiumoxide_cdp::cdp::browser_protocol::{log as cdplog, page, performance};
use chromiumoxide_cdp::cdp::events::CdpEvent;
use chromiumoxide_cdp::cdp::js_protocol::runtime::{
    EvaluateParams, ExecutionContextId, RunIfWaitingForDebuggerParams,
};
use chromiumoxide_cdp::cdp::CdpEventMessage;
use chromiumoxide_types::{Command, Method, Request, Response};

use crate::cmd::{CommandChain, CommandMessage};
use crate::error::{CdpError, Result};
use crate::handler::browser::BrowserContext;
use crate::handler::domworld::DOMWorldKind;
use crate::handler::emulation::EmulationManager;
use crate::handler::frame::{
    FrameEvent, FrameRegistry, FrameRequestedNavigation, FrameTreeView, LifecycleEvent,
    NavigationError, NavigationId, NavigationOk,
};
use crate::handler::inject::ScriptInjector;
use crate::handler::job::PeriodicJob;
use crate::handler::network::{NetworkTracker, NETWORK_QUIET_WINDOW};
use crate::handler::page::PageHandle;
use crate::handler::session::Session;
use crate::handler::viewport::Viewport;
use crate::handler::{PageInner, REQUEST_TIMEOUT};
use crate::javascript::{CURSOR_OVERLAY_JS, PIERCER_JS};
use crate::listeners::{EventListenerRequest, EventListeners};
use crate::page::Page;

/// How often in-flight traffic is checked for stalled requests
const STALL_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

macro_rules! advance_state {
    ($s:ident, $cx:ident, $now:ident, $cmds: ident, $next_state:expr ) => {{
        if let Poll::Ready(poll) = $cmds.poll($now) {
            return match poll {
                None => {
                    $s.init_state = $next_state;
                    $s.poll($cx, $now)
                }
                Some(Ok((method, params))) => Some(TargetEvent::Request(Request {
                    method,
                    session_id: $s.session_id.clone().map(Into::into),
                    params,
                })),
                Some(Err(_)) => Some($s.on_initialization_failed()),
            };
        } else {
            return None;
        }
    }};
}

lazy_static::lazy_static! {
    /// Commands every page session runs after the frame layer is up:
    /// auto-attach so OOPIF children multiplex onto this connection, plus the
    /// usual domain toggles.
    static ref PAGE_INIT_COMMANDS: Vec<(chromiumoxide_types::MethodId, serde_json::Value)> = {
        let attach = SetAutoAttachParams::builder()
            .flatten(true)
            .auto_attach(true)
            .wait_for_debugger_on_start(false)
            .build()
            .unwrap();
        let enable_performance = performance::EnableParams::default();
        let disable_log = cdplog::DisableParams::default();

        vec![
            (
                attach.identifier(),
                serde_json::to_value(attach).unwrap_or_default(),
            ),
            (
                enable_performance.identifier(),
                serde_json::to_value(enable_performance).unwrap_or_default(),
            ),
            (
                disable_log.identifier(),
                serde_json::to_value(disable_log).unwrap_or_default(),
            ),
        ]
    };

    /// Resume a child target paused on attach, best effort.
    static ref RUN_IF_WAITING: (chromiumoxide_types::MethodId, serde_json::Value) = {
        let runtime_cmd = RunIfWaitingForDebuggerParams::default();
        (runtime_cmd.identifier(), serde_json::to_value(runtime_cmd).unwrap_or_default())
    };
}

#[derive(Debug)]
pub struct Target {
    /// Info about this target as returned from the chromium instance
    info: TargetInfo,
    /// The type of this target
    r#type: TargetType,
    /// Configs for this target
    config: TargetConfig,
    /// The context this target is running in
    browser_context: BrowserContext,
    /// Frame graph and frame→session ownership for this page
    registry: FrameRegistry,
    /// In-flight traffic across this page's sessions
    network: NetworkTracker,
    /// First-document script injection
    injector: ScriptInjector,
    emulation_manager: EmulationManager,
    /// The session attached to this page target
    session_id: Option<SessionId>,
    /// Adopted OOPIF child sessions
    child_sessions: HashSet<SessionId>,
    /// Child frame trees whose host frame has not shown up yet, keyed by the
    /// child session's root frame id
    staged_adoptions: HashMap<FrameId, (SessionId, FrameTree)>,
    /// The handle of the browser page of this target
    page: Option<PageHandle>,
    /// Drives this target towards initialization
    pub(crate) init_state: TargetInit,
    /// Currently queued events to report to the `Handler`
    queued_events: VecDeque<TargetEvent>,
    /// All registered event subscriptions
    event_listeners: EventListeners,
    /// Senders waiting for the main frame to reach a lifecycle state
    load_state_waiters: Vec<LoadStateWaiter>,
    /// The sender who requested the page.
    initiator: Option<Sender<Result<Page>>>,
    /// Force-completes stalled requests
    stall_sweep: PeriodicJob,
    /// When this target was created, newest wins the active-page race
    created_at: Instant,
}

#[derive(Debug)]
struct LoadStateWaiter {
    state: LifecycleEvent,
    deadline: Instant,
    tx: Sender<Result<()>>,
}

impl Target {
    /// Create a new target instance with `TargetInfo` after a
    /// `CreateTargetParams` request.
    pub fn new(info: TargetInfo, config: TargetConfig, browser_context: BrowserContext) -> Self {
        let ty = TargetType::new(&info.r#type);
        let request_timeout = config.request_timeout;
        let network = NetworkTracker::new(config.ignore_https_errors, request_timeout);

        Self {
            info,
            r#type: ty,
            config,
            browser_context,
            registry: FrameRegistry::new(request_timeout),
            network,
            injector: ScriptInjector::default(),
            emulation_manager: EmulationManager::new(request_timeout),
            session_id: None,
            child_sessions: Default::default(),
            staged_adoptions: Default::default(),
            page: None,
            init_state: TargetInit::AttachToTarget,
            queued_events: Default::default(),
            event_listeners: Default::default(),
            load_state_waiters: Default::default(),
            initiator: None,
            stall_sweep: PeriodicJob::new(STALL_SWEEP_INTERVAL),
            created_at: Instant::now(),
        }
    }

    pub fn set_session_id(&mut self, id: SessionId) {
        self.session_id = Some(id)
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn browser_context(&self) -> &BrowserContext {
        &self.browser_context
    }

    pub fn session_id_mut(&mut self) -> &mut Option<SessionId> {
        &mut self.session_id
    }

    /// The identifier for this target
    pub fn target_id(&self) -> &TargetId {
        &self.info.target_id
    }

    /// The type of this target
    pub fn r#type(&self) -> &TargetType {
        &self.r#type
    }

    /// Whether this target is already initialized
    pub fn is_initialized(&self) -> bool {
        matches!(self.init_state, TargetInit::Initialized)
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Navigate the main frame
    pub fn goto(&mut self, req: FrameRequestedNavigation) {
        self.registry.goto(req)
    }

    /// The navigate response arrived; `loader` is the loader the navigation
    /// runs under, `failed` marks a navigate that errored out immediately.
    pub fn on_navigation_response(
        &mut self,
        id: NavigationId,
        loader: Option<LoaderId>,
        failed: bool,
    ) {
        if failed {
            self.registry.cancel_navigation(id);
        } else {
            self.registry.on_navigation_response(id, loader);
        }
    }

    fn create_page(&mut self) {
        if self.page.is_none() {
            if let Some(session) = self.session_id.clone() {
                let handle =
                    PageHandle::new(self.target_id().clone(), session, self.opener_id().cloned());
                self.page = Some(handle);
            }
        }
    }

    /// Tries to create the `PageInner` if this target is already initialized
    pub(crate) fn get_or_create_page(&mut self) -> Option<&Arc<PageInner>> {
        self.create_page();
        self.page.as_ref().map(|p| p.inner())
    }

    pub fn is_page(&self) -> bool {
        self.r#type().is_page()
    }

    pub fn browser_context_id(&self) -> Option<&BrowserContextId> {
        self.info.browser_context_id.as_ref()
    }

    pub fn info(&self) -> &TargetInfo {
        &self.info
    }

    /// Get the target that opened this target. Top-level targets return `None`.
    pub fn opener_id(&self) -> Option<&TargetId> {
        self.info.opener_id.as_ref()
    }

    pub fn registry(&self) -> &FrameRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FrameRegistry {
        &mut self.registry
    }

    pub fn event_listeners_mut(&mut self) -> &mut EventListeners {
        &mut self.event_listeners
    }

    fn network_quiet(&self, now: Instant) -> bool {
        self.network.quiet_for(NETWORK_QUIET_WINDOW, now)
    }

    /// Received a response to a command issued by this target
    pub fn on_response(&mut self, resp: Response, method: &str, session: Option<&SessionId>) {
        if let Some(cmds) = self.init_state.commands_mut() {
            cmds.received_response(method);
        }

        match method {
            GetFrameTreeParams::IDENTIFIER => {
                if let Some(resp) = resp
                    .result
                    .and_then(|val| GetFrameTreeParams::response_from_value(val).ok())
                {
                    let session = session.or(self.session_id.as_ref()).cloned();
                    if let Some(session) = session {
                        self.install_frame_tree(session, resp.frame_tree);
                    }
                }
            }
            chromiumoxide_cdp::cdp::browser_protocol::fetch::GetResponseBodyParams::IDENTIFIER => {
                self.injector.on_body_response(&resp, session);
            }
            _ => {}
        }
    }

    /// Install a frame tree reported by `session`, staging it when the host
    /// frame is not known yet (OOPIF adoption racing the parent's
    /// `frameAttached`).
    fn install_frame_tree(&mut self, session: SessionId, tree: FrameTree) {
        let root = tree.frame.id.clone();
        let is_child = Some(&session) != self.session_id.as_ref();

        if is_child && tree.frame.parent_id.is_some() && self.registry.frame(&root).is_none() {
            tracing::debug!(frame = ?root, "staging OOPIF session until its host frame attaches");
            self.staged_adoptions.insert(root, (session, tree));
            return;
        }

        self.registry.seed_from_frame_tree(&session, tree);
        if is_child {
            self.registry.adopt_child_session(&session, &root);
        }
    }

    /// A frame appeared; complete any staged adoption waiting for it
    fn drain_staged_adoptions(&mut self) {
        let ready: Vec<FrameId> = self
            .staged_adoptions
            .keys()
            .filter(|root| self.registry.frame(root).is_some())
            .cloned()
            .collect();
        for root in ready {
            if let Some((session, tree)) = self.staged_adoptions.remove(&root) {
                self.registry.seed_from_frame_tree(&session, tree);
                self.registry.adopt_child_session(&session, &root);
            }
        }
    }

    /// Initialization commands for a freshly adopted OOPIF session.
    ///
    /// Fire-and-forget: a target that disappears mid-init is cleaned up by
    /// the detach events that follow.
    fn child_session_init(&mut self, session: &SessionId) {
        let mut reqs: Vec<(chromiumoxide_types::MethodId, serde_json::Value)> = Vec::new();

        let enable = page::EnableParams::default();
        if let Ok(params) = serde_json::to_value(&enable) {
            reqs.push((enable.identifier(), params));
        }
        let lifecycle = SetLifecycleEventsEnabledParams::new(true);
        if let Ok(params) = serde_json::to_value(&lifecycle) {
            reqs.push((lifecycle.identifier(), params));
        }
        let network = chromiumoxide_cdp::cdp::browser_protocol::network::EnableParams::default();
        if let Ok(params) = serde_json::to_value(&network) {
            reqs.push((network.identifier(), params));
        }
        let runtime = chromiumoxide_cdp::cdp::js_protocol::runtime::EnableParams::default();
        if let Ok(params) = serde_json::to_value(&runtime) {
            reqs.push((runtime.identifier(), params));
        }
        reqs.push(RUN_IF_WAITING.clone());
        for (method, params) in self.piercer_install_params() {
            reqs.push((method, params));
        }
        let tree = GetFrameTreeParams::default();
        if let Ok(params) = serde_json::to_value(&tree) {
            reqs.push((tree.identifier(), params));
        }

        for (method, params) in reqs {
            self.queued_events.push_back(TargetEvent::Request(Request {
                method,
                session_id: Some(session.clone().into()),
                params,
            }));
        }
    }

    /// Doc-start install of the page helper (and optional cursor overlay),
    /// plus an immediate evaluation for the document that is already there.
    fn piercer_install_params(&self) -> Vec<(chromiumoxide_types::MethodId, serde_json::Value)> {
        let mut out = Vec::new();
        if !self.config.inject_piercer {
            return out;
        }

        let mut sources = vec![PIERCER_JS];
        if self.config.visual_cursor {
            sources.push(CURSOR_OVERLAY_JS);
        }

        for source in sources {
            let add = AddScriptToEvaluateOnNewDocumentParams {
                source: source.to_string(),
                world_name: None,
                include_command_line_api: None,
                run_immediately: Some(true),
            };
            if let Ok(params) = serde_json::to_value(&add) {
                out.push((add.identifier(), params));
            }
            let eval = EvaluateParams::builder().expression(source).build();
            if let Ok(eval) = eval {
                if let Ok(params) = serde_json::to_value(&eval) {
                    out.push((eval.identifier(), params));
                }
            }
        }
        out
    }

    pub fn on_event(&mut self, event: CdpEventMessage) {
        let session: Option<SessionId> = event.session_id.clone().map(SessionId::from);
        let CdpEventMessage { params, method, .. } = event;

        match &params {
            // frame registry events; the emitting session stamps ownership
            CdpEvent::PageFrameAttached(ev) => {
                if let Some(session) = session.as_ref() {
                    self.registry.on_frame_attached(
                        ev.frame_id.clone(),
                        Some(ev.parent_frame_id.clone()),
                        session,
                    );
                    self.drain_staged_adoptions();
                }
            }
            CdpEvent::PageFrameDetached(ev) => self.registry.on_frame_detached(ev),
            CdpEvent::PageFrameNavigated(ev) => {
                if let Some(session) = session.as_ref() {
                    self.registry.on_frame_navigated(&ev.frame, session);
                }
            }
            CdpEvent::PageNavigatedWithinDocument(ev) => {
                if let Some(session) = session.as_ref() {
                    self.registry.on_frame_navigated_within_document(ev, session);
                }
            }
            CdpEvent::RuntimeExecutionContextCreated(ev) => {
                self.registry.on_frame_execution_context_created(ev)
            }
            CdpEvent::RuntimeExecutionContextDestroyed(ev) => {
                self.registry.on_frame_execution_context_destroyed(ev)
            }
            CdpEvent::RuntimeExecutionContextsCleared(_) => {
                self.registry.on_execution_contexts_cleared()
            }
            CdpEvent::PageLifecycleEvent(ev) => self.registry.on_page_lifecycle_event(ev),
            CdpEvent::PageFrameStartedLoading(ev) => {
                self.registry.on_frame_started_loading(ev);
            }
            CdpEvent::PageFrameStoppedLoading(ev) => {
                self.registry.on_frame_stopped_loading(ev);
                self.network.on_frame_stopped_loading(ev);
            }

            // targets attached below this page: adopt OOPIFs, refuse workers
            CdpEvent::TargetAttachedToTarget(ev) => {
                let child_session = ev.session_id.clone();
                let ty = ev.target_info.r#type.as_str();

                if matches!(ty, "service_worker" | "worker" | "shared_worker") {
                    let detach_command = DetachFromTargetParams::builder()
                        .session_id(child_session)
                        .build();
                    self.queued_events.push_back(TargetEvent::Request(Request {
                        method: detach_command.identifier(),
                        session_id: self.session_id.clone().map(Into::into),
                        params: serde_json::to_value(detach_command).unwrap_or_default(),
                    }));
                    return;
                }

                if ev.waiting_for_debugger {
                    let runtime_cmd = RUN_IF_WAITING.clone();
                    self.queued_events.push_back(TargetEvent::Request(Request {
                        method: runtime_cmd.0,
                        session_id: Some(child_session.clone().into()),
                        params: runtime_cmd.1,
                    }));
                }

                if ty == "iframe" {
                    // an OOPIF of this page: adopt its session and ask it for
                    // its frame tree so ownership lands in the registry
                    self.child_sessions.insert(child_session.clone());
                    let session = Session::oopif(
                        child_session.clone(),
                        ev.target_info.target_id.clone(),
                        self.target_id().clone(),
                    );
                    self.queued_events
                        .push_back(TargetEvent::SessionAdopted(session));
                    self.child_session_init(&child_session);
                }
            }
            CdpEvent::TargetDetachedFromTarget(ev) => {
                if self.child_sessions.remove(&ev.session_id) {
                    self.registry.remove_session_frames(&ev.session_id);
                    self.network.remove_session(&ev.session_id);
                    self.injector.remove_session(&ev.session_id);
                    self.queued_events
                        .push_back(TargetEvent::SessionDetached(ev.session_id.clone()));
                }
            }

            // network bookkeeping
            CdpEvent::NetworkRequestWillBeSent(ev) => {
                self.network.on_request_will_be_sent(ev, session.as_ref())
            }
            CdpEvent::NetworkRequestServedFromCache(ev) => {
                self.network.on_request_served_from_cache(ev)
            }
            CdpEvent::NetworkResponseReceived(ev) => self.network.on_response_received(ev),
            CdpEvent::NetworkLoadingFinished(ev) => self.network.on_network_loading_finished(ev),
            CdpEvent::NetworkLoadingFailed(ev) => self.network.on_network_loading_failed(ev),

            // script injection
            CdpEvent::FetchRequestPaused(ev) => {
                self.injector.on_fetch_request_paused(ev, session.as_ref())
            }
            _ => (),
        }
        chromiumoxide_cdp::consume_event!(match params {
           |ev| self.event_listeners.start_send(ev),
           |json| { let _ = self.event_listeners.try_send_custom(&method, json);}
        });
    }

    /// Called when a init command timed out
    fn on_initialization_failed(&mut self) -> TargetEvent {
        if let Some(initiator) = self.initiator.take() {
            let _ = initiator.send(Err(CdpError::Timeout));
        }
        self.init_state = TargetInit::Closing;
        let close_target = CloseTargetParams::new(self.info.target_id.clone());
        TargetEvent::Request(Request {
            method: close_target.identifier(),
            session_id: self.session_id.clone().map(Into::into),
            params: serde_json::to_value(close_target).unwrap_or_default(),
        })
    }

    /// Advance that target's state
    pub(crate) fn poll(&mut self, cx: &mut Context<'_>, now: Instant) -> Option<TargetEvent> {
        if !self.is_page() {
            // can only poll pages
            return None;
        }

        match &mut self.init_state {
            TargetInit::AttachToTarget => {
                self.init_state = TargetInit::InitializingFrame(FrameRegistry::init_commands(
                    self.config.request_timeout,
                ));

                if let Ok(params) = AttachToTargetParams::builder()
                    .target_id(self.target_id().clone())
                    .flatten(true)
                    .build()
                {
                    return Some(TargetEvent::Request(Request::new(
                        params.identifier(),
                        serde_json::to_value(params).unwrap_or_default(),
                    )));
                } else {
                    return None;
                }
            }
            TargetInit::InitializingFrame(cmds) => {
                self.session_id.as_ref()?;
                if let Poll::Ready(poll) = cmds.poll(now) {
                    return match poll {
                        None => {
                            if let Some(world_name) = self.registry.get_isolated_world_name() {
                                let world_name = world_name.clone();

                                if let Some(isolated_world_cmds) =
                                    self.registry.ensure_isolated_world(&world_name)
                                {
                                    *cmds = isolated_world_cmds;
                                } else {
                                    self.init_state = TargetInit::InitializingNetwork(
                                        self.network.init_commands(),
                                    );
                                }
                            } else {
                                self.init_state =
                                    TargetInit::InitializingNetwork(self.network.init_commands());
                            }

                            self.poll(cx, now)
                        }
                        Some(Ok((method, params))) => Some(TargetEvent::Request(Request {
                            method,
                            session_id: self.session_id.clone().map(Into::into),
                            params,
                        })),
                        Some(Err(_)) => Some(self.on_initialization_failed()),
                    };
                } else {
                    return None;
                }
            }
            TargetInit::InitializingNetwork(cmds) => {
                advance_state!(
                    self,
                    cx,
                    now,
                    cmds,
                    TargetInit::InitializingInjection(self.injection_init_commands())
                );
            }
            TargetInit::InitializingInjection(cmds) => {
                advance_state!(
                    self,
                    cx,
                    now,
                    cmds,
                    TargetInit::InitializingPage(Self::page_init_commands(
                        self.config.request_timeout
                    ))
                );
            }
            TargetInit::InitializingPage(cmds) => {
                advance_state!(
                    self,
                    cx,
                    now,
                    cmds,
                    match self.config.viewport.as_ref() {
                        Some(viewport) => TargetInit::InitializingEmulation(
                            self.emulation_manager.init_commands(viewport)
                        ),
                        None => TargetInit::Initialized,
                    }
                );
            }
            TargetInit::InitializingEmulation(cmds) => {
                advance_state!(self, cx, now, cmds, TargetInit::Initialized);
            }
            TargetInit::Initialized => {
                if let Some(initiator) = self.initiator.take() {
                    // make sure that the main frame of the page has finished loading
                    if self
                        .registry
                        .main_frame()
                        .map(|frame| frame.is_loaded())
                        .unwrap_or_default()
                    {
                        if let Some(page) = self.get_or_create_page() {
                            let _ = initiator.send(Ok(page.clone().into()));
                        } else {
                            self.initiator = Some(initiator);
                        }
                    } else {
                        self.initiator = Some(initiator);
                    }
                }
            }
            TargetInit::Closing => return None,
        };

        let network_quiet = self.network_quiet(now);

        if self.stall_sweep.poll_ready(cx) {
            self.network.sweep_stalled(now);
        }

        // settle load-state waiters against the *current* main frame, so a
        // cross-site root swap is tracked rather than waited out
        if !self.load_state_waiters.is_empty() {
            let mut remaining = Vec::new();
            for waiter in std::mem::take(&mut self.load_state_waiters) {
                if self.registry.main_frame_reached(waiter.state, network_quiet) {
                    let _ = waiter.tx.send(Ok(()));
                } else if now > waiter.deadline {
                    let _ = waiter.tx.send(Err(CdpError::LifecycleTimeout(
                        waiter.state.event_name().to_string(),
                    )));
                } else {
                    remaining.push(waiter);
                }
            }
            self.load_state_waiters = remaining;
        }

        loop {
            if self.init_state == TargetInit::Closing {
                break None;
            }

            // Drain queued messages first.
            if let Some(ev) = self.queued_events.pop_front() {
                return Some(ev);
            }

            if let Some(handle) = self.page.as_mut() {
                while let Poll::Ready(Some(msg)) = Pin::new(&mut handle.rx).poll_next(cx) {
                    if self.init_state == TargetInit::Closing {
                        break;
                    }

                    match msg {
                        TargetMessage::Command(cmd) => {
                            self.queued_events.push_back(TargetEvent::Command(cmd));
                        }
                        TargetMessage::MainFrame(tx) => {
                            let _ = tx.send(self.registry.main_frame_id().cloned());
                        }
                        TargetMessage::AllFrames(tx) => {
                            let _ = tx
                                .send(self.registry.frames().map(|f| f.id().clone()).collect());
                        }
                        TargetMessage::Url(req) => {
                            let GetUrl { frame_id, tx } = req;
                            let frame = if let Some(frame_id) = frame_id {
                                self.registry.frame(&frame_id)
                            } else {
                                self.registry.main_frame()
                            };
                            let _ = tx.send(frame.and_then(|f| f.url().map(str::to_string)));
                        }
                        TargetMessage::Name(req) => {
                            let GetName { frame_id, tx } = req;
                            let frame = if let Some(frame_id) = frame_id {
                                self.registry.frame(&frame_id)
                            } else {
                                self.registry.main_frame()
                            };
                            let _ = tx.send(frame.and_then(|f| f.name().map(str::to_string)));
                        }
                        TargetMessage::Parent(req) => {
                            let GetParent { frame_id, tx } = req;
                            let frame = self.registry.frame(&frame_id);
                            let _ = tx.send(frame.and_then(|f| f.parent_id().cloned()));
                        }
                        TargetMessage::OwnerSession { frame_id, tx } => {
                            let session = match frame_id {
                                Some(frame_id) => self.registry.owner_session(&frame_id).cloned(),
                                None => self
                                    .registry
                                    .main_frame()
                                    .and_then(|f| f.owner_session().cloned())
                                    .or_else(|| self.session_id.clone()),
                            };
                            let _ = tx.send(session);
                        }
                        TargetMessage::ChildFrames { frame_id, tx } => {
                            let children = self
                                .registry
                                .frame(&frame_id)
                                .map(|f| f.child_frames().iter().cloned().collect())
                                .unwrap_or_default();
                            let _ = tx.send(children);
                        }
                        TargetMessage::FrameTreeView(tx) => {
                            let _ = tx.send(self.registry.tree_view());
                        }
                        TargetMessage::IsolatedWorldName(tx) => {
                            let _ =
                                tx.send(self.registry.get_isolated_world_name().cloned());
                        }
                        TargetMessage::WaitForLoadState { state, timeout, tx } => {
                            if self.registry.main_frame_reached(state, network_quiet) {
                                let _ = tx.send(Ok(()));
                            } else {
                                self.load_state_waiters.push(LoadStateWaiter {
                                    state,
                                    deadline: now + timeout,
                                    tx,
                                });
                            }
                        }
                        TargetMessage::AddEventListener(req) => {
                            self.event_listeners.add_listener(req);
                        }
                        TargetMessage::GetExecutionContext(ctx) => {
                            let GetExecutionContext {
                                dom_world,
                                frame_id,
                                tx,
                            } = ctx;
                            let frame = if let Some(frame_id) = frame_id {
                                self.registry.frame(&frame_id)
                            } else {
                                self.registry.main_frame()
                            };

                            if let Some(frame) = frame {
                                match dom_world {
                                    DOMWorldKind::Main => {
                                        let _ = tx.send(frame.main_world().execution_context());
                                    }
                                    DOMWorldKind::Secondary => {
                                        let _ =
                                            tx.send(frame.secondary_world().execution_context());
                                    }
                                }
                            } else {
                                let _ = tx.send(None);
                            }
                        }
                    }
                }
            }

            while let Some(event) = self.network.poll() {
                if self.init_state == TargetInit::Closing {
                    break;
                }
                match event {
                    crate::handler::network::NetworkEvent::SendCdpRequest((method, params)) => {
                        self.queued_events.push_back(TargetEvent::Request(Request {
                            method,
                            session_id: self.session_id.clone().map(Into::into),
                            params,
                        }))
                    }
                }
            }

            while let Some((method, params, session)) = self.injector.poll() {
                if self.init_state == TargetInit::Closing {
                    break;
                }
                let session = session.or_else(|| self.session_id.clone());
                self.queued_events.push_back(TargetEvent::Request(Request {
                    method,
                    session_id: session.map(Into::into),
                    params,
                }));
            }

            while let Some(event) = self.registry.poll(now, network_quiet) {
                if self.init_state == TargetInit::Closing {
                    break;
                }
                match event {
                    FrameEvent::NavigationResult(res) => {
                        self.queued_events
                            .push_back(TargetEvent::NavigationResult(res));
                    }
                    FrameEvent::NavigationRequest(id, req) => {
                        self.queued_events
                            .push_back(TargetEvent::NavigationRequest(id, req));
                    }
                }
            }

            if self.queued_events.is_empty() {
                return None;
            }
        }
    }

    /// Set the sender half of the channel who requested the creation of this
    /// target
    pub fn set_initiator(&mut self, tx: Sender<Result<Page>>) {
        self.initiator = Some(tx);
    }

    fn injection_init_commands(&self) -> CommandChain {
        let mut chain = if self.config.inject_piercer {
            ScriptInjector::init_commands(self.config.request_timeout)
        } else {
            CommandChain::new(Vec::new(), self.config.request_timeout)
        };
        for (method, params) in self.piercer_install_params() {
            chain.push_back(method, params);
        }
        chain
    }

    pub(crate) fn page_init_commands(timeout: Duration) -> CommandChain {
        CommandChain::new(PAGE_INIT_COMMANDS.clone(), timeout)
    }
}

#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub ignore_https_errors: bool,
    ///  Request timeout to use
    pub request_timeout: Duration,
    pub viewport: Option<Viewport>,
    /// Whether to install the shadow/XPath helper via network interception
    /// and doc-start scripts
    pub inject_piercer: bool,
    /// Whether to render the synthetic cursor overlay
    pub visual_cursor: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            ignore_https_errors: true,
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT),
            viewport: Default::default(),
            inject_piercer: true,
            visual_cursor: false,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TargetType {
    Page,
    BackgroundPage,
    ServiceWorker,
    SharedWorker,
    Other,
    Browser,
    Webview,
    Unknown(String),
}

impl TargetType {
    pub fn new(ty: &str) -> Self {
        match ty {
            "page" => TargetType::Page,
            "background_page" => TargetType::BackgroundPage,
            "service_worker" => TargetType::ServiceWorker,
            "shared_worker" => TargetType::SharedWorker,
            "other" => TargetType::Other,
            "browser" => TargetType::Browser,
            "webview" => TargetType::Webview,
            s => TargetType::Unknown(s.to_string()),
        }
    }

    pub fn is_page(&self) -> bool {
        matches!(self, TargetType::Page)
    }

    pub fn is_service_worker(&self) -> bool {
        matches!(self, TargetType::ServiceWorker)
    }

    pub fn is_browser(&self) -> bool {
        matches!(self, TargetType::Browser)
    }
}

#[derive(Debug)]
pub(crate) enum TargetEvent {
    /// An internal request
    Request(Request),
    /// An internal navigation request
    NavigationRequest(NavigationId, Request),
    /// Indicates that a previous requested navigation has finished
    NavigationResult(Result<NavigationOk, NavigationError>),
    /// A new command arrived via a channel
    Command(CommandMessage),
    /// An OOPIF session was adopted; the handler must route its events here
    SessionAdopted(Session),
    /// An adopted session went away
    SessionDetached(SessionId),
}

#[derive(Debug, PartialEq)]
pub enum TargetInit {
    InitializingFrame(CommandChain),
    InitializingNetwork(CommandChain),
    InitializingInjection(CommandChain),
    InitializingPage(CommandChain),
    InitializingEmulation(CommandChain),
    AttachToTarget,
    Initialized,
    Closing,
}

impl TargetInit {
    fn commands_mut(&mut self) -> Option<&mut CommandChain> {
        match self {
            TargetInit::InitializingFrame(cmd) => Some(cmd),
            TargetInit::InitializingNetwork(cmd) => Some(cmd),
            TargetInit::InitializingInjection(cmd) => Some(cmd),
            TargetInit::InitializingPage(cmd) => Some(cmd),
            TargetInit::InitializingEmulation(cmd) => Some(cmd),
            TargetInit::AttachToTarget => None,
            TargetInit::Initialized => None,
            TargetInit::Closing => None,
        }
    }
}

#[derive(Debug)]
pub struct GetExecutionContext {
    /// For which world the execution context was requested
    pub dom_world: DOMWorldKind,
    /// The if of the frame to get the `ExecutionContext` for
    pub frame_id: Option<FrameId>,
    /// Sender half of the channel to send the response back
    pub tx: Sender<Option<ExecutionContextId>>,
}

impl GetExecutionContext {
    pub fn new(tx: Sender<Option<ExecutionContextId>>) -> Self {
        Self {
            dom_world: DOMWorldKind::Main,
            frame_id: None,
            tx,
        }
    }
}

#[derive(Debug)]
pub struct GetUrl {
    /// The id of the frame to get the url for (None = main frame)
    pub frame_id: Option<FrameId>,
    /// Sender half of the channel to send the response back
    pub tx: Sender<Option<String>>,
}

impl GetUrl {
    pub fn new(tx: Sender<Option<String>>) -> Self {
        Self { frame_id: None, tx }
    }
}

#[derive(Debug)]
pub struct GetName {
    /// The id of the frame to get the name for (None = main frame)
    pub frame_id: Option<FrameId>,
    /// Sender half of the channel to send the response back
    pub tx: Sender<Option<String>>,
}

#[derive(Debug)]
pub struct GetParent {
    /// The id of the frame to get the parent for
    pub frame_id: FrameId,
    /// Sender half of the channel to send the response back
    pub tx: Sender<Option<FrameId>>,
}

#[derive(Debug)]
pub enum TargetMessage {
    /// Execute a command within the session of this target
    Command(CommandMessage),
    /// Return the main frame of this target's page
    MainFrame(Sender<Option<FrameId>>),
    /// Return all the frames of this target's page
    AllFrames(Sender<Vec<FrameId>>),
    /// Return the url if available
    Url(GetUrl),
    /// Return the name if available
    Name(GetName),
    /// Return the parent id of a frame
    Parent(GetParent),
    /// The session owning a frame (None = main frame)
    OwnerSession {
        frame_id: Option<FrameId>,
        tx: Sender<Option<SessionId>>,
    },
    /// The direct children of a frame
    ChildFrames {
        frame_id: FrameId,
        tx: Sender<Vec<FrameId>>,
    },
    /// An owned snapshot of the frame graph
    FrameTreeView(Sender<FrameTreeView>),
    /// The name of the engine's isolated world
    IsolatedWorldName(Sender<Option<String>>),
    /// Resolves once the current main frame reaches the state
    WaitForLoadState {
        state: LifecycleEvent,
        timeout: Duration,
        tx: Sender<Result<()>>,
    },
    /// A request to submit a new listener that gets notified with every
    /// received event
    AddEventListener(EventListenerRequest),
    /// Get the `ExecutionContext` if available
    GetExecutionContext(GetExecutionContext),
}
