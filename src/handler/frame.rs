use std::collections::VecDeque;
use std::time::{Duration, Instant};

use hashbrown::{HashMap, HashSet};
use serde_json::map::Entry;

use chromiumoxide_cdp::cdp::browser_protocol::network::LoaderId;
use chromiumoxide_cdp::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CreateIsolatedWorldParams, EventFrameDetached,
    EventFrameStartedLoading, EventFrameStoppedLoading, EventLifecycleEvent,
    EventNavigatedWithinDocument, Frame as CdpFrame, FrameDetachedReason, FrameTree,
};
use chromiumoxide_cdp::cdp::browser_protocol::page::{self, FrameId};
use chromiumoxide_cdp::cdp::browser_protocol::target::SessionId;
use chromiumoxide_cdp::cdp::js_protocol::runtime::*;
use chromiumoxide_types::{Method, MethodId, Request};

use crate::cmd::CommandChain;
use crate::error::DeadlineExceeded;
use crate::handler::domworld::DOMWorld;

const EVALUATION_SCRIPT_URL: &str = "____deepdriver_utility_world___evaluation_script__";

/// Default deadline for reaching the requested lifecycle state
pub const NAVIGATION_TIMEOUT: u64 = 15_000;

/// Generate a collision-resistant world name using `id` + randomness.
pub fn random_world_name(id: &str) -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let rand_len = rng.random_range(6..=12);

    let id_part: String = id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(5)
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphabetic() {
                c
            } else {
                (b'a' + (c as u8 - b'0') % 26) as char
            }
        })
        .collect();

    let rand_part: String = (0..rand_len)
        .filter_map(|_| std::char::from_digit(rng.random_range(0..36), 36))
        .collect();

    // first char must be a letter so the name is a valid identifier
    let first = std::char::from_digit(rng.random_range(10..36), 36).unwrap_or('a');

    format!("{first}{id_part}{rand_part}")
}

/// Represents a frame on the page
#[derive(Debug)]
pub struct Frame {
    parent_frame: Option<FrameId>,
    /// Cdp identifier of this frame
    id: FrameId,
    main_world: DOMWorld,
    secondary_world: DOMWorld,
    loader_id: Option<LoaderId>,
    /// Current url of this frame
    url: Option<String>,
    /// The session that most recently emitted a navigation or attach event
    /// for this frame
    owner: Option<SessionId>,
    /// The frames contained in this frame
    child_frames: HashSet<FrameId>,
    name: Option<String>,
    /// The received lifecycle events
    lifecycle_events: HashSet<MethodId>,
    /// Detached with reason `swap`; the node survives until the replacing
    /// session navigates it
    pending_swap: bool,
    isolated_world_name: String,
}

impl Frame {
    pub fn new(id: FrameId) -> Self {
        let isolated_world_name = random_world_name(id.inner());

        Self {
            parent_frame: None,
            id,
            main_world: Default::default(),
            secondary_world: Default::default(),
            loader_id: None,
            url: None,
            owner: None,
            child_frames: Default::default(),
            name: None,
            lifecycle_events: Default::default(),
            pending_swap: false,
            isolated_world_name,
        }
    }

    pub fn with_parent(id: FrameId, parent: &mut Frame) -> Self {
        parent.child_frames.insert(id.clone());
        Self {
            parent_frame: Some(parent.id.clone()),
            isolated_world_name: parent.isolated_world_name.clone(),
            ..Self::new(id)
        }
    }

    pub fn get_isolated_world_name(&self) -> &String {
        &self.isolated_world_name
    }

    pub fn parent_id(&self) -> Option<&FrameId> {
        self.parent_frame.as_ref()
    }

    pub fn id(&self) -> &FrameId {
        &self.id
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn owner_session(&self) -> Option<&SessionId> {
        self.owner.as_ref()
    }

    pub fn loader_id(&self) -> Option<&LoaderId> {
        self.loader_id.as_ref()
    }

    pub fn main_world(&self) -> &DOMWorld {
        &self.main_world
    }

    pub fn secondary_world(&self) -> &DOMWorld {
        &self.secondary_world
    }

    pub fn child_frames(&self) -> &HashSet<FrameId> {
        &self.child_frames
    }

    pub fn lifecycle_events(&self) -> &HashSet<MethodId> {
        &self.lifecycle_events
    }

    fn navigated(&mut self, frame: &CdpFrame) {
        self.name.clone_from(&frame.name);
        let url = if let Some(ref fragment) = frame.url_fragment {
            format!("{}{fragment}", frame.url)
        } else {
            frame.url.clone()
        };
        self.url = Some(url);
        self.loader_id = Some(frame.loader_id.clone());
        self.pending_swap = false;
    }

    fn navigated_within_url(&mut self, url: String) {
        self.url = Some(url)
    }

    fn on_loading_stopped(&mut self) {
        self.lifecycle_events.insert("DOMContentLoaded".into());
        self.lifecycle_events.insert("load".into());
    }

    fn on_loading_started(&mut self) {
        self.lifecycle_events.clear();
    }

    pub fn is_loaded(&self) -> bool {
        self.lifecycle_events.contains("load")
    }

    /// Detached with reason `swap` and not yet re-navigated by the adopting
    /// session
    pub fn is_pending_swap(&self) -> bool {
        self.pending_swap
    }

    pub fn clear_contexts(&mut self) {
        self.main_world.take_context();
        self.secondary_world.take_context();
    }

    pub fn destroy_context(&mut self, ctx_unique_id: &str) {
        if self.main_world.execution_context_unique_id() == Some(ctx_unique_id) {
            self.main_world.take_context();
        } else if self.secondary_world.execution_context_unique_id() == Some(ctx_unique_id) {
            self.secondary_world.take_context();
        }
    }

    pub fn execution_context(&self) -> Option<ExecutionContextId> {
        self.main_world.execution_context()
    }
}

/// How far a navigation must progress before it counts as done
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LifecycleEvent {
    Load,
    #[default]
    DomContentLoaded,
    NetworkIdle,
}

impl LifecycleEvent {
    /// The `Page.lifecycleEvent` name this state corresponds to
    pub fn event_name(&self) -> &'static str {
        match self {
            LifecycleEvent::Load => "load",
            LifecycleEvent::DomContentLoaded => "DOMContentLoaded",
            LifecycleEvent::NetworkIdle => "networkIdle",
        }
    }

    /// Parse a user-facing state name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "load" => Some(LifecycleEvent::Load),
            "domcontentloaded" | "DOMContentLoaded" => Some(LifecycleEvent::DomContentLoaded),
            "networkidle" | "networkIdle" => Some(LifecycleEvent::NetworkIdle),
            _ => None,
        }
    }
}

impl AsRef<str> for LifecycleEvent {
    fn as_ref(&self) -> &str {
        self.event_name()
    }
}

/// Lifecycle gating for one navigation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationOptions {
    pub wait_until: LifecycleEvent,
    pub timeout: Duration,
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self {
            wait_until: LifecycleEvent::DomContentLoaded,
            timeout: Duration::from_millis(NAVIGATION_TIMEOUT),
        }
    }
}

/// Immutable view of one frame handed out to readers
#[derive(Debug, Clone)]
pub struct FrameView {
    pub id: FrameId,
    pub parent: Option<FrameId>,
    pub url: Option<String>,
    pub owner: Option<SessionId>,
    /// The loader of the frame's current document; changes on navigation
    pub loader: Option<LoaderId>,
    /// Snapshot ordinal, assigned first-seen and stable for the page lifetime
    pub ordinal: u32,
    pub children: Vec<FrameId>,
}

/// Immutable view of the whole frame graph
#[derive(Debug, Clone, Default)]
pub struct FrameTreeView {
    pub main_frame: Option<FrameId>,
    pub frames: Vec<FrameView>,
}

impl FrameTreeView {
    pub fn get(&self, id: &FrameId) -> Option<&FrameView> {
        self.frames.iter().find(|f| &f.id == id)
    }

    pub fn main(&self) -> Option<&FrameView> {
        self.main_frame.as_ref().and_then(|id| self.get(id))
    }
}

/// Single source of truth for the frame graph of one page and the
/// frame→owning-session mapping.
///
/// All registry mutation happens while one CDP event or command is being
/// processed; readers only ever get owned snapshots.
#[derive(Debug)]
pub struct FrameRegistry {
    main_frame: Option<FrameId>,
    frames: HashMap<FrameId, Frame>,
    /// The contexts mapped with their frames
    context_ids: HashMap<String, FrameId>,
    isolated_worlds: HashSet<String>,
    request_timeout: Duration,
    /// Snapshot ordinals per frame, assigned first-seen
    ordinals: HashMap<FrameId, u32>,
    next_ordinal: u32,
    /// Track currently queued navigations
    pending_navigations: VecDeque<(FrameRequestedNavigation, LifecycleWatcher)>,
    /// The currently ongoing navigation
    navigation: Option<(LifecycleWatcher, Instant)>,
}

impl FrameRegistry {
    pub fn new(request_timeout: Duration) -> Self {
        FrameRegistry {
            main_frame: None,
            frames: Default::default(),
            context_ids: Default::default(),
            isolated_worlds: Default::default(),
            request_timeout,
            ordinals: Default::default(),
            next_ordinal: 0,
            pending_navigations: Default::default(),
            navigation: None,
        }
    }

    /// The commands to execute in order to initialize this registry
    pub fn init_commands(timeout: Duration) -> CommandChain {
        let enable = page::EnableParams::default();
        let get_tree = page::GetFrameTreeParams::default();
        let set_lifecycle = page::SetLifecycleEventsEnabledParams::new(true);
        let enable_runtime = EnableParams::default();

        let mut commands = Vec::with_capacity(4);

        let enable_id = enable.identifier();
        let get_tree_id = get_tree.identifier();
        let set_lifecycle_id = set_lifecycle.identifier();
        let enable_runtime_id = enable_runtime.identifier();

        if let Ok(value) = serde_json::to_value(enable) {
            commands.push((enable_id, value));
        }
        if let Ok(value) = serde_json::to_value(get_tree) {
            commands.push((get_tree_id, value));
        }
        if let Ok(value) = serde_json::to_value(set_lifecycle) {
            commands.push((set_lifecycle_id, value));
        }
        if let Ok(value) = serde_json::to_value(enable_runtime) {
            commands.push((enable_runtime_id, value));
        }

        CommandChain::new(commands, timeout)
    }

    fn ensure_ordinal(&mut self, id: &FrameId) -> u32 {
        if let Some(ord) = self.ordinals.get(id) {
            return *ord;
        }
        let ord = self.next_ordinal;
        self.next_ordinal += 1;
        self.ordinals.insert(id.clone(), ord);
        ord
    }

    pub fn main_frame_id(&self) -> Option<&FrameId> {
        self.main_frame.as_ref()
    }

    pub fn main_frame(&self) -> Option<&Frame> {
        self.main_frame.as_ref().and_then(|id| self.frames.get(id))
    }

    pub fn main_frame_mut(&mut self) -> Option<&mut Frame> {
        if let Some(id) = self.main_frame.as_ref() {
            self.frames.get_mut(id)
        } else {
            None
        }
    }

    /// Get the main isolated world name.
    pub fn get_isolated_world_name(&self) -> Option<&String> {
        self.main_frame().map(|f| f.get_isolated_world_name())
    }

    pub fn frames(&self) -> impl Iterator<Item = &Frame> + '_ {
        self.frames.values()
    }

    pub fn frame(&self, id: &FrameId) -> Option<&Frame> {
        self.frames.get(id)
    }

    /// The session that owns `frame_id`
    pub fn owner_session(&self, frame_id: &FrameId) -> Option<&SessionId> {
        self.frames.get(frame_id).and_then(|f| f.owner_session())
    }

    /// Exactly the frames whose owner is `session`
    pub fn frames_for_session<'a>(
        &'a self,
        session: &'a SessionId,
    ) -> impl Iterator<Item = &'a Frame> + 'a {
        self.frames
            .values()
            .filter(move |f| f.owner_session() == Some(session))
    }

    /// The snapshot ordinal assigned to `frame_id`
    pub fn ordinal(&self, frame_id: &FrameId) -> Option<u32> {
        self.ordinals.get(frame_id).copied()
    }

    /// An owned snapshot of the whole graph for readers outside the event loop
    pub fn tree_view(&self) -> FrameTreeView {
        let frames = self
            .frames
            .values()
            .map(|f| FrameView {
                id: f.id.clone(),
                parent: f.parent_frame.clone(),
                url: f.url.clone(),
                owner: f.owner.clone(),
                loader: f.loader_id.clone(),
                ordinal: self.ordinals.get(&f.id).copied().unwrap_or_default(),
                children: f.child_frames.iter().cloned().collect(),
            })
            .collect();
        FrameTreeView {
            main_frame: self.main_frame.clone(),
            frames,
        }
    }

    /// Whether the current main frame has reached `state`
    pub fn main_frame_reached(&self, state: LifecycleEvent, network_quiet: bool) -> bool {
        match self.main_frame() {
            Some(frame) => match state {
                LifecycleEvent::DomContentLoaded => {
                    frame.lifecycle_events.contains("DOMContentLoaded")
                }
                LifecycleEvent::Load => frame.lifecycle_events.contains("load"),
                LifecycleEvent::NetworkIdle => {
                    frame.lifecycle_events.contains("load") && network_quiet
                }
            },
            None => false,
        }
    }

    fn check_lifecycle(&self, watcher: &LifecycleWatcher, frame: &Frame) -> bool {
        watcher.expected_lifecycle.iter().all(|ev| {
            frame.lifecycle_events.contains(ev)
                || (frame.url.is_none() && frame.lifecycle_events.contains("DOMContentLoaded"))
        }) && frame
            .child_frames
            .iter()
            .filter_map(|f| self.frames.get(f))
            .all(|f| self.check_lifecycle(watcher, f))
    }

    fn check_lifecycle_complete(
        &self,
        watcher: &LifecycleWatcher,
        frame: &Frame,
        network_quiet: bool,
    ) -> Option<NavigationOk> {
        if !self.check_lifecycle(watcher, frame) {
            return None;
        }
        if watcher.wait_until == LifecycleEvent::NetworkIdle && !network_quiet {
            return None;
        }
        if frame.loader_id == watcher.loader_id && !watcher.same_document_navigation {
            return None;
        }
        if watcher.same_document_navigation {
            return Some(NavigationOk::SameDocumentNavigation(watcher.id));
        }
        if frame.loader_id != watcher.loader_id {
            return Some(NavigationOk::NewDocumentNavigation(watcher.id));
        }
        None
    }

    /// Drive the active navigation; `network_quiet` reports whether the
    /// page's traffic has been idle for the required quiet window.
    pub fn poll(&mut self, now: Instant, network_quiet: bool) -> Option<FrameEvent> {
        if let Some((watcher, deadline)) = self.navigation.take() {
            if let Some(err) = watcher.aborted {
                return Some(FrameEvent::NavigationResult(Err(err)));
            }

            if now > deadline {
                return Some(FrameEvent::NavigationResult(Err(
                    NavigationError::Timeout {
                        err: DeadlineExceeded::new(now, deadline),
                        id: watcher.id,
                    },
                )));
            }

            if let Some(frame) = self.frames.get(&watcher.frame_id) {
                if let Some(nav) = self.check_lifecycle_complete(&watcher, frame, network_quiet) {
                    return Some(FrameEvent::NavigationResult(Ok(nav)));
                } else {
                    // not finished yet
                    self.navigation = Some((watcher, deadline));
                }
            } else {
                return Some(FrameEvent::NavigationResult(Err(
                    NavigationError::FrameNotFound {
                        frame: watcher.frame_id,
                        id: watcher.id,
                    },
                )));
            }
        } else if let Some((req, watcher)) = self.pending_navigations.pop_front() {
            // queue in the next navigation that must be fulfilled until `deadline`
            let deadline = Instant::now() + req.opts.timeout;
            self.navigation = Some((watcher, deadline));
            return Some(FrameEvent::NavigationRequest(req.id, req.req));
        }
        None
    }

    /// Entrypoint for page navigation
    pub fn goto(&mut self, req: FrameRequestedNavigation) {
        if let Some(frame_id) = &self.main_frame {
            self.navigate_frame(frame_id.clone(), req);
        }
    }

    /// Navigate a specific frame
    pub fn navigate_frame(&mut self, frame_id: FrameId, mut req: FrameRequestedNavigation) {
        // a newer navigation for the same frame supersedes the one in flight
        if let Some((watcher, _)) = self.navigation.as_mut() {
            if watcher.frame_id == frame_id && watcher.aborted.is_none() {
                watcher.aborted = Some(NavigationError::Superseded { id: watcher.id });
            }
        }

        let loader_id = self.frames.get(&frame_id).and_then(|f| f.loader_id.clone());
        let watcher = LifecycleWatcher::until(req.opts.wait_until, req.id, frame_id.clone(), loader_id);

        req.set_frame_id(frame_id);

        self.pending_navigations.push_back((req, watcher))
    }

    /// Drop the active navigation without a result, e.g. when the navigate
    /// request itself failed and the caller already has the error.
    pub fn cancel_navigation(&mut self, id: NavigationId) {
        if let Some((watcher, deadline)) = self.navigation.take() {
            if watcher.id != id {
                self.navigation = Some((watcher, deadline));
            }
        }
    }

    /// The response to the navigation request arrived; remember which loader
    /// the navigation is expected to run under so a different loader on the
    /// main frame means supersession.
    pub fn on_navigation_response(&mut self, id: NavigationId, loader_id: Option<LoaderId>) {
        if let Some((watcher, _)) = self.navigation.as_mut() {
            if watcher.id == id {
                watcher.expected_loader = loader_id;
            }
        }
    }

    /// Bulk install from a `Page.getFrameTree` result, stamping `session` as
    /// the owner of every node.
    pub fn seed_from_frame_tree(&mut self, session: &SessionId, frame_tree: FrameTree) {
        self.on_frame_attached(
            frame_tree.frame.id.clone(),
            frame_tree.frame.parent_id.clone(),
            session,
        );
        self.on_frame_navigated(&frame_tree.frame, session);
        if let Some(children) = frame_tree.child_frames {
            for child_tree in children {
                self.seed_from_frame_tree(session, child_tree);
            }
        }
    }

    /// Idempotent; re-attaching an existing frame only updates its owner
    pub fn on_frame_attached(
        &mut self,
        frame_id: FrameId,
        parent_frame_id: Option<FrameId>,
        session: &SessionId,
    ) {
        if let Some(frame) = self.frames.get_mut(&frame_id) {
            frame.owner = Some(session.clone());
            return;
        }
        if let Some(parent_frame_id) = parent_frame_id {
            if let Some(parent_frame) = self.frames.get_mut(&parent_frame_id) {
                let mut frame = Frame::with_parent(frame_id.clone(), parent_frame);
                frame.owner = Some(session.clone());
                self.ensure_ordinal(&frame_id);
                self.frames.insert(frame_id, frame);
            }
        } else if self.main_frame.is_none() {
            let mut frame = Frame::new(frame_id.clone());
            frame.owner = Some(session.clone());
            self.ensure_ordinal(&frame_id);
            self.main_frame = Some(frame_id.clone());
            self.frames.insert(frame_id, frame);
        }
    }

    pub fn on_frame_detached(&mut self, event: &EventFrameDetached) {
        if let Some((watcher, _)) = self.navigation.as_mut() {
            if watcher.frame_id == event.frame_id
                && !matches!(event.reason, FrameDetachedReason::Swap)
                && watcher.aborted.is_none()
            {
                watcher.aborted = Some(NavigationError::FrameDetached {
                    id: watcher.id,
                    frame: event.frame_id.clone(),
                });
            }
        }

        match event.reason {
            FrameDetachedReason::Swap => {
                // the frame moves to another renderer; keep the node, the
                // replacing session re-navigates it
                if let Some(frame) = self.frames.get_mut(&event.frame_id) {
                    frame.pending_swap = true;
                    frame.lifecycle_events.clear();
                    frame.clear_contexts();
                }
            }
            FrameDetachedReason::Remove => {
                self.remove_frames_recursively(&event.frame_id);
            }
        }
    }

    pub fn on_frame_navigated(&mut self, frame: &CdpFrame, session: &SessionId) {
        if frame.parent_id.is_some() {
            if let Some((id, mut f)) = self.frames.remove_entry(&frame.id) {
                for child in f.child_frames.drain() {
                    self.remove_frames_recursively(&child);
                }
                f.navigated(frame);
                f.owner = Some(session.clone());
                self.frames.insert(id, f);
            } else {
                // navigation for a frame we have not seen attach; install it
                self.on_frame_attached(frame.id.clone(), frame.parent_id.clone(), session);
                if let Some(f) = self.frames.get_mut(&frame.id) {
                    f.navigated(frame);
                }
            }
        } else {
            let mut f = if let Some(main) = self.main_frame.take() {
                if let Some(mut main_frame) = self.frames.remove(&main) {
                    for child in &main_frame.child_frames {
                        self.remove_frames_recursively(child);
                    }
                    // necessary since we can't borrow mut and then remove recursively
                    main_frame.child_frames.clear();
                    if main_frame.id != frame.id {
                        // cross-site root swap: the page identity and the old
                        // root's ordinal carry over to the new main frame id
                        let ordinal = self.ordinals.get(&main).copied().unwrap_or_default();
                        self.ordinals.insert(frame.id.clone(), ordinal);
                        main_frame.id = frame.id.clone();
                        if let Some((watcher, _)) = self.navigation.as_mut() {
                            if watcher.frame_id == main {
                                watcher.frame_id = frame.id.clone();
                            }
                        }
                    }
                    main_frame
                } else {
                    Frame::new(frame.id.clone())
                }
            } else {
                // initial main frame navigation
                Frame::new(frame.id.clone())
            };
            self.ensure_ordinal(&frame.id);
            f.navigated(frame);
            f.owner = Some(session.clone());
            self.main_frame = Some(f.id.clone());
            self.frames.insert(f.id.clone(), f);
        }

        // a different loader on the watched frame means the pending
        // navigation lost the race
        if let Some((watcher, _)) = self.navigation.as_mut() {
            if watcher.frame_id == frame.id && watcher.aborted.is_none() {
                if let Some(expected) = watcher.expected_loader.as_ref() {
                    if expected != &frame.loader_id {
                        watcher.aborted = Some(NavigationError::Superseded { id: watcher.id });
                    }
                }
            }
        }
    }

    pub fn on_frame_navigated_within_document(
        &mut self,
        event: &EventNavigatedWithinDocument,
        session: &SessionId,
    ) {
        if let Some(frame) = self.frames.get_mut(&event.frame_id) {
            frame.navigated_within_url(event.url.clone());
            frame.owner = Some(session.clone());
        }
        if let Some((watcher, _)) = self.navigation.as_mut() {
            watcher.on_frame_navigated_within_document(event);
        }
    }

    /// Seed ownership for an adopted OOPIF session ahead of its own events
    pub fn adopt_child_session(&mut self, session: &SessionId, child_root: &FrameId) {
        if let Some(frame) = self.frames.get_mut(child_root) {
            frame.owner = Some(session.clone());
            frame.pending_swap = false;
        }
    }

    /// Remove every frame owned by `session`, pruning their subtrees.
    ///
    /// Called when an adopted OOPIF session detaches; afterwards no frame in
    /// the registry references the session.
    pub fn remove_session_frames(&mut self, session: &SessionId) {
        let roots: Vec<FrameId> = self
            .frames
            .values()
            .filter(|f| f.owner_session() == Some(session))
            .filter(|f| {
                f.parent_frame
                    .as_ref()
                    .and_then(|p| self.frames.get(p))
                    .map(|p| p.owner_session() != Some(session))
                    .unwrap_or(true)
            })
            .map(|f| f.id.clone())
            .collect();
        for root in roots {
            self.remove_frames_recursively(&root);
        }
    }

    pub fn on_frame_stopped_loading(&mut self, event: &EventFrameStoppedLoading) {
        if let Some(frame) = self.frames.get_mut(&event.frame_id) {
            frame.on_loading_stopped();
        }
    }

    pub fn on_frame_started_loading(&mut self, event: &EventFrameStartedLoading) {
        if let Some(frame) = self.frames.get_mut(&event.frame_id) {
            frame.on_loading_started();
        }
    }

    /// Issued when new execution context is created
    pub fn on_frame_execution_context_created(&mut self, event: &EventExecutionContextCreated) {
        if let Some(frame_id) = event
            .context
            .aux_data
            .as_ref()
            .and_then(|v| v["frameId"].as_str())
        {
            if let Some(frame) = self.frames.get_mut(frame_id) {
                if event
                    .context
                    .aux_data
                    .as_ref()
                    .and_then(|v| v["isDefault"].as_bool())
                    .unwrap_or_default()
                {
                    frame
                        .main_world
                        .set_context(event.context.id, event.context.unique_id.clone());
                } else if event.context.name == frame.isolated_world_name
                    && frame.secondary_world.execution_context().is_none()
                {
                    frame
                        .secondary_world
                        .set_context(event.context.id, event.context.unique_id.clone());
                }
                self.context_ids
                    .insert(event.context.unique_id.clone(), frame.id.clone());
            }
        }
        if event
            .context
            .aux_data
            .as_ref()
            .filter(|v| v["type"].as_str() == Some("isolated"))
            .is_some()
        {
            self.isolated_worlds.insert(event.context.name.clone());
        }
    }

    /// Issued when execution context is destroyed
    pub fn on_frame_execution_context_destroyed(&mut self, event: &EventExecutionContextDestroyed) {
        if let Some(id) = self.context_ids.remove(&event.execution_context_unique_id) {
            if let Some(frame) = self.frames.get_mut(&id) {
                frame.destroy_context(&event.execution_context_unique_id);
            }
        }
    }

    /// Issued when all executionContexts were cleared
    pub fn on_execution_contexts_cleared(&mut self) {
        for id in self.context_ids.values() {
            if let Some(frame) = self.frames.get_mut(id) {
                frame.clear_contexts();
            }
        }
        self.context_ids.clear()
    }

    /// Fired for top level page lifecycle events (nav, load, paint, etc.)
    pub fn on_page_lifecycle_event(&mut self, event: &EventLifecycleEvent) {
        if let Some(frame) = self.frames.get_mut(&event.frame_id) {
            if event.name == "init" {
                frame.loader_id = Some(event.loader_id.clone());
                frame.lifecycle_events.clear();
            }
            frame.lifecycle_events.insert(event.name.clone().into());
        }
    }

    /// Detach all child frames
    fn remove_frames_recursively(&mut self, id: &FrameId) -> Option<Frame> {
        if let Some(mut frame) = self.frames.remove(id) {
            for child in &frame.child_frames {
                self.remove_frames_recursively(child);
            }
            if let Some(parent_id) = frame.parent_frame.take() {
                if let Some(parent) = self.frames.get_mut(&parent_id) {
                    parent.child_frames.remove(&frame.id);
                }
            }
            Some(frame)
        } else {
            None
        }
    }

    pub fn ensure_isolated_world(&mut self, world_name: &str) -> Option<CommandChain> {
        if self.isolated_worlds.contains(world_name) {
            return None;
        }

        self.isolated_worlds.insert(world_name.to_string());

        let cmd = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(format!("//# sourceURL={EVALUATION_SCRIPT_URL}"))
            .world_name(world_name)
            .build()
            .unwrap();

        let mut cmds = Vec::with_capacity(self.frames.len() + 1);

        cmds.push((cmd.identifier(), serde_json::to_value(cmd).unwrap()));

        let cm = self.frames.keys().filter_map(|id| {
            if let Ok(cmd) = CreateIsolatedWorldParams::builder()
                .frame_id(id.clone())
                .grant_univeral_access(true)
                .world_name(world_name)
                .build()
            {
                Some((
                    cmd.identifier(),
                    serde_json::to_value(cmd).unwrap_or_default(),
                ))
            } else {
                None
            }
        });

        cmds.extend(cm);

        Some(CommandChain::new(cmds, self.request_timeout))
    }
}

#[derive(Debug)]
pub enum FrameEvent {
    /// A previously submitted navigation has finished
    NavigationResult(Result<NavigationOk, NavigationError>),
    /// A new navigation request needs to be submitted
    NavigationRequest(NavigationId, Request),
}

#[derive(Debug, Clone)]
pub enum NavigationError {
    Timeout {
        id: NavigationId,
        err: DeadlineExceeded,
    },
    FrameNotFound {
        id: NavigationId,
        frame: FrameId,
    },
    /// A newer loader replaced the one this navigation was issued under
    Superseded {
        id: NavigationId,
    },
    /// The watched frame was removed (reason other than swap)
    FrameDetached {
        id: NavigationId,
        frame: FrameId,
    },
}

impl NavigationError {
    pub fn navigation_id(&self) -> &NavigationId {
        match self {
            NavigationError::Timeout { id, .. } => id,
            NavigationError::FrameNotFound { id, .. } => id,
            NavigationError::Superseded { id } => id,
            NavigationError::FrameDetached { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NavigationOk {
    SameDocumentNavigation(NavigationId),
    NewDocumentNavigation(NavigationId),
}

impl NavigationOk {
    pub fn navigation_id(&self) -> &NavigationId {
        match self {
            NavigationOk::SameDocumentNavigation(id) => id,
            NavigationOk::NewDocumentNavigation(id) => id,
        }
    }
}

/// Tracks the progress of an issued navigation request until the requested
/// lifecycle state is reached, the navigation is superseded, the frame goes
/// away, or the deadline passes.
#[derive(Debug)]
pub struct LifecycleWatcher {
    id: NavigationId,
    wait_until: LifecycleEvent,
    expected_lifecycle: HashSet<MethodId>,
    /// Follows the main frame across root swaps
    frame_id: FrameId,
    /// The frame's loader before the navigation started
    loader_id: Option<LoaderId>,
    /// The loader the accepted navigation runs under, learned from the
    /// navigate response; any other loader on this frame supersedes us
    expected_loader: Option<LoaderId>,
    same_document_navigation: bool,
    aborted: Option<NavigationError>,
}

impl LifecycleWatcher {
    pub fn until(
        wait_until: LifecycleEvent,
        id: NavigationId,
        frame: FrameId,
        loader_id: Option<LoaderId>,
    ) -> Self {
        let expected_lifecycle = match wait_until {
            LifecycleEvent::DomContentLoaded => std::iter::once("DOMContentLoaded".into()).collect(),
            // network idleness is checked against the tracker, not a
            // lifecycle event, so load is the event-side requirement
            LifecycleEvent::Load | LifecycleEvent::NetworkIdle => {
                std::iter::once("load".into()).collect()
            }
        };
        Self {
            id,
            wait_until,
            expected_lifecycle,
            loader_id,
            expected_loader: None,
            frame_id: frame,
            same_document_navigation: false,
            aborted: None,
        }
    }

    fn on_frame_navigated_within_document(&mut self, ev: &EventNavigatedWithinDocument) {
        if self.frame_id == ev.frame_id {
            self.same_document_navigation = true;
        }
    }
}

/// An identifier for an ongoing navigation
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct NavigationId(pub usize);

/// Represents a request for a navigation
#[derive(Debug)]
pub struct FrameRequestedNavigation {
    /// The internal identifier
    pub id: NavigationId,
    /// the cdp request that will trigger the navigation
    pub req: Request,
    /// Lifecycle gating for this navigation
    pub opts: NavigationOptions,
}

impl FrameRequestedNavigation {
    pub fn new(id: NavigationId, req: Request, opts: NavigationOptions) -> Self {
        Self { id, req, opts }
    }

    /// This will set the id of the frame into the `params` `frameId` field.
    pub fn set_frame_id(&mut self, frame_id: FrameId) {
        if let Some(params) = self.req.params.as_object_mut() {
            if let Entry::Vacant(entry) = params.entry("frameId") {
                entry.insert(serde_json::Value::String(frame_id.into()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session(id: &str) -> SessionId {
        SessionId::from(id.to_string())
    }

    fn fid(id: &str) -> FrameId {
        FrameId::from(id.to_string())
    }

    fn cdp_frame(id: &str, parent: Option<&str>, loader: &str, url: &str) -> CdpFrame {
        let mut value = json!({
            "id": id,
            "loaderId": loader,
            "url": url,
            "domainAndRegistry": "",
            "securityOrigin": url,
            "mimeType": "text/html",
            "secureContextType": "Secure",
            "crossOriginIsolatedContextType": "NotIsolated",
            "gatedAPIFeatures": [],
        });
        if let Some(parent) = parent {
            value["parentId"] = json!(parent);
        }
        serde_json::from_value(value).expect("valid cdp frame")
    }

    fn detached(id: &str, reason: &str) -> EventFrameDetached {
        serde_json::from_value(json!({ "frameId": id, "reason": reason })).unwrap()
    }

    fn registry_with_tree() -> FrameRegistry {
        let mut registry = FrameRegistry::new(Duration::from_secs(1));
        let root = session("S-root");
        registry.on_frame_navigated(&cdp_frame("F-main", None, "L1", "https://a.test/"), &root);
        registry.on_frame_attached(fid("F-child"), Some(fid("F-main")), &root);
        registry.on_frame_navigated(
            &cdp_frame("F-child", Some("F-main"), "L2", "https://a.test/frame"),
            &root,
        );
        registry
    }

    #[test]
    fn ownership_follows_latest_event() {
        let mut registry = registry_with_tree();
        assert_eq!(
            registry.owner_session(&fid("F-child")),
            Some(&session("S-root"))
        );

        let oopif = session("S-oopif");
        registry.adopt_child_session(&oopif, &fid("F-child"));
        assert_eq!(registry.owner_session(&fid("F-child")), Some(&oopif));

        registry.on_frame_navigated(
            &cdp_frame("F-child", Some("F-main"), "L3", "https://b.test/"),
            &oopif,
        );
        assert_eq!(registry.owner_session(&fid("F-child")), Some(&oopif));

        let owned: Vec<_> = registry.frames_for_session(&oopif).collect();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].id(), &FrameId::from("F-child".to_string()));
    }

    #[test]
    fn detached_session_owns_no_frames() {
        let mut registry = registry_with_tree();
        let oopif = session("S-oopif");
        registry.adopt_child_session(&oopif, &fid("F-child"));
        registry.on_frame_attached(fid("F-grandchild"), Some(fid("F-child")), &oopif);

        registry.remove_session_frames(&oopif);

        assert_eq!(registry.frames_for_session(&oopif).count(), 0);
        assert!(registry.frame(&fid("F-child")).is_none());
        assert!(registry.frame(&fid("F-grandchild")).is_none());
        // parent survives and no longer references the pruned child
        assert!(registry
            .main_frame()
            .unwrap()
            .child_frames()
            .is_empty());
    }

    #[test]
    fn swap_keeps_the_frame_node() {
        let mut registry = registry_with_tree();
        registry.on_frame_detached(&detached("F-child", "swap"));
        assert!(registry.frame(&fid("F-child")).is_some());

        registry.on_frame_detached(&detached("F-child", "remove"));
        assert!(registry.frame(&fid("F-child")).is_none());
    }

    #[test]
    fn root_swap_preserves_ordinal_and_main_pointer() {
        let mut registry = registry_with_tree();
        let old_ordinal = registry.ordinal(&fid("F-main")).unwrap();

        registry.on_frame_navigated(
            &cdp_frame("F-main2", None, "L9", "https://other.test/"),
            &session("S-root"),
        );

        assert_eq!(
            registry.main_frame_id(),
            Some(&FrameId::from("F-main2".to_string()))
        );
        assert!(registry.frame(&fid("F-main")).is_none());
        assert_eq!(registry.ordinal(&fid("F-main2")), Some(old_ordinal));
        // children of the old root are gone
        assert!(registry.frame(&fid("F-child")).is_none());
    }

    #[test]
    fn seed_from_frame_tree_stamps_ownership() {
        let mut registry = FrameRegistry::new(Duration::from_secs(1));
        let tree: FrameTree = serde_json::from_value(json!({
            "frame": {
                "id": "F-main",
                "loaderId": "L1",
                "url": "https://a.test/",
                "domainAndRegistry": "",
                "securityOrigin": "https://a.test",
                "mimeType": "text/html",
                "secureContextType": "Secure",
                "crossOriginIsolatedContextType": "NotIsolated",
                "gatedAPIFeatures": [],
            },
            "childFrames": [{
                "frame": {
                    "id": "F-sub",
                    "parentId": "F-main",
                    "loaderId": "L2",
                    "url": "https://a.test/sub",
                    "domainAndRegistry": "",
                    "securityOrigin": "https://a.test",
                    "mimeType": "text/html",
                    "secureContextType": "Secure",
                    "crossOriginIsolatedContextType": "NotIsolated",
                    "gatedAPIFeatures": [],
                }
            }]
        }))
        .unwrap();

        let sess = session("S-1");
        registry.seed_from_frame_tree(&sess, tree);

        assert_eq!(registry.main_frame_id(), Some(&fid("F-main")));
        assert_eq!(registry.owner_session(&fid("F-sub")), Some(&sess));
        let view = registry.tree_view();
        assert_eq!(view.frames.len(), 2);
        assert_eq!(view.main().unwrap().children, vec![FrameId::from("F-sub".to_string())]);
    }

    #[test]
    fn queued_navigation_supersedes_active_watcher() {
        let mut registry = registry_with_tree();
        let now = Instant::now();

        registry.goto(FrameRequestedNavigation::new(
            NavigationId(1),
            Request::new("Page.navigate".into(), json!({"url": "https://u1.test"})),
            NavigationOptions::default(),
        ));
        // activates the first watcher
        let first = registry.poll(now, false);
        assert!(matches!(first, Some(FrameEvent::NavigationRequest(NavigationId(1), _))));

        registry.goto(FrameRequestedNavigation::new(
            NavigationId(2),
            Request::new("Page.navigate".into(), json!({"url": "https://u2.test"})),
            NavigationOptions::default(),
        ));

        match registry.poll(now, false) {
            Some(FrameEvent::NavigationResult(Err(NavigationError::Superseded { id }))) => {
                assert_eq!(id, NavigationId(1));
            }
            other => panic!("expected superseded result, got {other:?}"),
        }
        // the second navigation is issued next
        assert!(matches!(
            registry.poll(now, false),
            Some(FrameEvent::NavigationRequest(NavigationId(2), _))
        ));
    }

    #[test]
    fn foreign_loader_supersedes_after_response() {
        let mut registry = registry_with_tree();
        let now = Instant::now();

        registry.goto(FrameRequestedNavigation::new(
            NavigationId(7),
            Request::new("Page.navigate".into(), json!({"url": "https://u1.test"})),
            NavigationOptions::default(),
        ));
        let _ = registry.poll(now, false);
        registry.on_navigation_response(NavigationId(7), Some(LoaderId::from("L-mine".to_string())));

        registry.on_frame_navigated(
            &cdp_frame("F-main", None, "L-other", "https://u2.test/"),
            &session("S-root"),
        );

        match registry.poll(now, false) {
            Some(FrameEvent::NavigationResult(Err(NavigationError::Superseded { id }))) => {
                assert_eq!(id, NavigationId(7));
            }
            other => panic!("expected superseded result, got {other:?}"),
        }
    }

    #[test]
    fn main_frame_detach_aborts_watcher() {
        let mut registry = registry_with_tree();
        let now = Instant::now();

        registry.goto(FrameRequestedNavigation::new(
            NavigationId(3),
            Request::new("Page.navigate".into(), json!({"url": "https://u1.test"})),
            NavigationOptions::default(),
        ));
        let _ = registry.poll(now, false);

        registry.on_frame_detached(&detached("F-main", "remove"));

        assert!(matches!(
            registry.poll(now, false),
            Some(FrameEvent::NavigationResult(Err(
                NavigationError::FrameDetached { id: NavigationId(3), .. }
            )))
        ));
    }

    #[test]
    fn network_idle_gates_completion() {
        let mut registry = registry_with_tree();
        let now = Instant::now();

        registry.goto(FrameRequestedNavigation::new(
            NavigationId(5),
            Request::new("Page.navigate".into(), json!({"url": "https://u1.test"})),
            NavigationOptions {
                wait_until: LifecycleEvent::NetworkIdle,
                timeout: Duration::from_secs(10),
            },
        ));
        let _ = registry.poll(now, false);

        // new loader plus load event on the main frame
        registry.on_frame_navigated(
            &cdp_frame("F-main", None, "L-new", "https://u1.test/"),
            &session("S-root"),
        );
        let lifecycle: EventLifecycleEvent = serde_json::from_value(json!({
            "frameId": "F-main",
            "loaderId": "L-new",
            "name": "load",
            "timestamp": 1.0,
        }))
        .unwrap();
        registry.on_page_lifecycle_event(&lifecycle);
        let dcl: EventLifecycleEvent = serde_json::from_value(json!({
            "frameId": "F-main",
            "loaderId": "L-new",
            "name": "DOMContentLoaded",
            "timestamp": 1.0,
        }))
        .unwrap();
        registry.on_page_lifecycle_event(&dcl);

        // loaded but traffic still in flight
        assert!(registry.poll(now, false).is_none());
        assert!(matches!(
            registry.poll(now, true),
            Some(FrameEvent::NavigationResult(Ok(
                NavigationOk::NewDocumentNavigation(NavigationId(5))
            )))
        ));
    }
}
