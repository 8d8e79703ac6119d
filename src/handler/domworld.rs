use chromiumoxide_cdp::cdp::js_protocol::runtime::ExecutionContextId;

/// Execution-context bookkeeping for one world of a frame
#[derive(Debug, Clone, Default)]
pub struct DOMWorld {
    execution_ctx: Option<ExecutionContextId>,
    execution_ctx_unique_id: Option<String>,
}

impl DOMWorld {
    pub fn execution_context(&self) -> Option<ExecutionContextId> {
        self.execution_ctx
    }

    pub fn execution_context_unique_id(&self) -> Option<&str> {
        self.execution_ctx_unique_id.as_deref()
    }

    pub fn set_context(&mut self, ctx: ExecutionContextId, unique_id: String) {
        self.execution_ctx = Some(ctx);
        self.execution_ctx_unique_id = Some(unique_id);
    }

    pub fn take_context(&mut self) -> (Option<ExecutionContextId>, Option<String>) {
        (
            self.execution_ctx.take(),
            self.execution_ctx_unique_id.take(),
        )
    }
}

/// There are two different kinds of worlds tracked for each frame that
/// represent a context for JavaScript execution: the frame's default context
/// shared with page scripts, and an isolated world with universal access the
/// engine uses so its own evaluations cannot collide with page globals.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DOMWorldKind {
    /// The default execution context of a frame
    #[default]
    Main,
    /// The engine's isolated world with universal access
    Secondary,
}
