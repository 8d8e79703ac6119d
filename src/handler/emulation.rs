use std::time::Duration;

use chromiumoxide_cdp::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetTouchEmulationEnabledParams,
};
use chromiumoxide_types::Method;

use crate::cmd::CommandChain;
use crate::handler::viewport::Viewport;

/// Issues the emulation commands a freshly attached target needs
#[derive(Debug)]
pub struct EmulationManager {
    pub emulating_mobile: bool,
    pub has_touch: bool,
    pub request_timeout: Duration,
}

impl EmulationManager {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            emulating_mobile: false,
            has_touch: false,
            request_timeout,
        }
    }

    pub fn init_commands(&self, viewport: &Viewport) -> CommandChain {
        let mut metrics = SetDeviceMetricsOverrideParams::new(
            viewport.width as i64,
            viewport.height as i64,
            viewport.device_scale_factor.unwrap_or(1.),
            viewport.emulating_mobile,
        );
        metrics.screen_orientation = None;

        let touch = SetTouchEmulationEnabledParams::new(viewport.has_touch);

        let mut cmds = Vec::with_capacity(2);
        if let Ok(params) = serde_json::to_value(&metrics) {
            cmds.push((metrics.identifier(), params));
        }
        if let Ok(params) = serde_json::to_value(&touch) {
            cmds.push((touch.identifier(), params));
        }

        CommandChain::new(cmds, self.request_timeout)
    }
}
