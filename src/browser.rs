use std::path::PathBuf;
use std::time::Duration;

use futures::channel::mpsc::{channel, Sender};
use futures::channel::oneshot::channel as oneshot_channel;
use futures::SinkExt;
use serde::Deserialize;
use tokio::process::{Child, Command as ProcessCommand};

use chromiumoxide_cdp::cdp::browser_protocol::browser::{
    CloseReturns, GetVersionParams, GetVersionReturns,
};
use chromiumoxide_cdp::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams, TargetId,
    TargetInfo,
};
use chromiumoxide_cdp::cdp::events::CdpEventMessage;
use chromiumoxide_cdp::cdp::IntoEventKind;
use chromiumoxide_types::{Command, CommandResponse, Method};

use crate::cmd::{to_command_response, CommandMessage};
use crate::conn::Connection;
use crate::detection;
use crate::error::{CdpError, Result};
use crate::handler::browser::BrowserContext;
use crate::handler::viewport::Viewport;
use crate::handler::{Handler, HandlerConfig, HandlerMessage, REQUEST_TIMEOUT};
use crate::listeners::{EventListenerRequest, EventStream};
use crate::page::Page;
use crate::utils;

lazy_static::lazy_static! {
    static ref VERSION_CLIENT: reqwest::Client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .expect("reqwest client");
}

/// The response of `GET /json/version`
#[derive(Deserialize, Debug, Default)]
struct BrowserConnection {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// Handle to one browser process (or remote endpoint) plus the sender half
/// feeding its [`Handler`].
#[derive(Debug)]
pub struct Browser {
    /// Communication channel with the `Handler`
    sender: Sender<HandlerMessage>,
    /// How the spawned chromium instance was configured, if any
    config: Option<BrowserConfig>,
    /// The spawned chromium instance
    child: Option<Child>,
    /// The debug web socket url of the chromium instance
    debug_ws_url: String,
}

impl Browser {
    /// Connect to an already running chromium instance via the given URL.
    ///
    /// An http(s) URL is resolved through its `json/version` endpoint first.
    pub async fn connect(url: impl Into<String>) -> Result<(Self, Handler)> {
        Self::connect_with_config(url, HandlerConfig::default()).await
    }

    /// Connect to an already running chromium instance with a given
    /// `HandlerConfig`.
    pub async fn connect_with_config(
        url: impl Into<String>,
        config: HandlerConfig,
    ) -> Result<(Self, Handler)> {
        let mut debug_ws_url = url.into();

        if debug_ws_url.starts_with("http") {
            debug_ws_url = ws_url_from_endpoint(&debug_ws_url).await?;
        }

        let conn = Connection::<CdpEventMessage>::connect(&debug_ws_url).await?;

        let (tx, rx) = channel(1000);

        let fut = Handler::new(conn, rx, config);

        let browser = Self {
            sender: tx,
            config: None,
            child: None,
            debug_ws_url,
        };

        Ok((browser, fut))
    }

    /// Launches a new chromium instance in the background and attaches to its
    /// debug web socket, resolved by polling `/json/version` on the debug
    /// port until the connect deadline.
    pub async fn launch(mut config: BrowserConfig) -> Result<(Self, Handler)> {
        // Canonicalize paths to reduce issues with sandboxing
        config.executable = utils::canonicalize_except_snap(config.executable).await?;

        let mut child = config.spawn()?;

        let debug_ws_url = match poll_ws_url(config.port, config.launch_timeout).await {
            Ok(url) => url,
            Err(err) => {
                // avoid zombie processes when the endpoint never came up
                if let Ok(Some(_)) = child.try_wait() {
                    // already exited, nothing to clean up
                } else {
                    let _ = child.kill().await;
                }
                return Err(err);
            }
        };

        let conn = Connection::<CdpEventMessage>::connect(&debug_ws_url).await?;

        let (tx, rx) = channel(1000);

        let handler_config = HandlerConfig {
            ignore_https_errors: config.ignore_https_errors,
            viewport: config.viewport.clone(),
            context_ids: Vec::new(),
            request_timeout: config.request_timeout,
            inject_piercer: config.inject_piercer,
            visual_cursor: config.visual_cursor,
            popup_window: config.popup_window,
        };

        let fut = Handler::new(conn, rx, handler_config);

        let browser = Self {
            sender: tx,
            config: Some(config),
            child: Some(child),
            debug_ws_url,
        };

        Ok((browser, fut))
    }

    /// The debug web socket url this browser is talking to
    pub fn websocket_address(&self) -> &String {
        &self.debug_ws_url
    }

    /// Create a new browser page and navigate it to the url, resolving once
    /// the initial load finished.
    pub async fn new_page(&self, params: impl Into<CreateTargetParams>) -> Result<Page> {
        let (tx, rx) = oneshot_channel();

        self.sender
            .clone()
            .send(HandlerMessage::CreatePage(params.into(), tx))
            .await?;

        rx.await?
    }

    /// All currently tracked pages
    pub async fn pages(&self) -> Result<Vec<Page>> {
        let (tx, rx) = oneshot_channel();
        self.sender
            .clone()
            .send(HandlerMessage::GetPages(tx))
            .await?;
        Ok(rx.await?)
    }

    /// The page of a specific target, if tracked
    pub async fn get_page(&self, target_id: TargetId) -> Result<Option<Page>> {
        let (tx, rx) = oneshot_channel();
        self.sender
            .clone()
            .send(HandlerMessage::GetPage(target_id, tx))
            .await?;
        Ok(rx.await?)
    }

    /// The most recently active page.
    ///
    /// Returns immediately unless a popup target was just created, in which
    /// case the call holds out up to `timeout` for the newer page, preferring
    /// the latest creation timestamp.
    pub async fn active_page(&self, timeout: Duration) -> Result<Page> {
        let (tx, rx) = oneshot_channel();
        self.sender
            .clone()
            .send(HandlerMessage::ActivePage(timeout, tx))
            .await?;
        rx.await?
    }

    /// Execute a browser-level command, e.g. `Browser.getVersion`
    pub async fn execute<T: Command>(&self, cmd: T) -> Result<CommandResponse<T::Response>> {
        let (tx, rx) = oneshot_channel();
        let method = cmd.identifier();
        let msg = CommandMessage::new(cmd, tx)?;

        self.sender
            .clone()
            .send(HandlerMessage::Command(msg))
            .await?;
        let resp = rx.await??;
        to_command_response::<T>(resp, method)
    }

    /// Version information about the browser
    pub async fn version(&self) -> Result<GetVersionReturns> {
        Ok(self.execute(GetVersionParams::default()).await?.result)
    }

    /// Subscribe to browser-wide events of one type
    pub async fn event_listener<T: IntoEventKind>(&self) -> Result<EventStream<T>> {
        let (tx, rx) = futures::channel::mpsc::unbounded();
        self.sender
            .clone()
            .send(HandlerMessage::AddEventListener(
                EventListenerRequest::new::<T>(tx),
            ))
            .await?;
        Ok(EventStream::new(rx))
    }

    /// Create a fresh incognito-style browser context; targets created with
    /// it do not share cookies or cache with the default context
    pub async fn start_incognito_context(&mut self) -> Result<BrowserContext> {
        let resp = self
            .execute(CreateBrowserContextParams::default())
            .await?;
        let ctx = BrowserContext::from(resp.result.browser_context_id);

        self.sender
            .clone()
            .send(HandlerMessage::InsertContext(ctx.clone()))
            .await?;
        Ok(ctx)
    }

    /// Dispose a context created with
    /// [`start_incognito_context`](Self::start_incognito_context)
    pub async fn quit_incognito_context(&mut self, ctx: BrowserContext) -> Result<()> {
        if let Some(id) = ctx.id().cloned() {
            self.execute(DisposeBrowserContextParams::new(id)).await?;
            self.sender
                .clone()
                .send(HandlerMessage::DisposeContext(ctx))
                .await?;
        }
        Ok(())
    }

    /// Fetch all existing browser targets and attach to them
    pub async fn fetch_targets(&mut self) -> Result<Vec<TargetInfo>> {
        let (tx, rx) = oneshot_channel();

        self.sender
            .clone()
            .send(HandlerMessage::FetchTargets(tx))
            .await?;

        rx.await?
    }

    /// Request the browser to close completely
    pub async fn close(&mut self) -> Result<CloseReturns> {
        let (tx, rx) = oneshot_channel();

        self.sender
            .clone()
            .send(HandlerMessage::CloseBrowser(tx))
            .await?;
        rx.await?
    }

    /// Wait for the spawned instance to exit, avoiding a zombie process.
    /// No-op when this browser only connected to an external endpoint.
    pub async fn wait(&mut self) -> Result<Option<std::process::ExitStatus>> {
        if let Some(child) = self.child.as_mut() {
            Ok(Some(child.wait().await?))
        } else {
            Ok(None)
        }
    }

    /// Forcibly kill the spawned chromium instance and wait for it
    pub async fn kill(&mut self) -> Option<Result<()>> {
        let child = self.child.as_mut()?;
        Some(child.kill().await.map_err(CdpError::from))
    }

    /// The config of the spawned chromium instance, if any
    pub fn config(&self) -> Option<&BrowserConfig> {
        self.config.as_ref()
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            // best effort: the process must not outlive the handle
            let _ = child.start_kill();
        }
    }
}

async fn ws_url_from_endpoint(endpoint: &str) -> Result<String> {
    let url = if endpoint.ends_with("/json/version") || endpoint.ends_with("/json/version/") {
        endpoint.to_string()
    } else {
        format!(
            "{}{}json/version",
            endpoint,
            if endpoint.ends_with('/') { "" } else { "/" }
        )
    };

    let resp = VERSION_CLIENT
        .get(&url)
        .send()
        .await
        .map_err(|_| CdpError::NoResponse)?;
    let connection: BrowserConnection =
        serde_json::from_slice(&resp.bytes().await.unwrap_or_default()).unwrap_or_default();
    if connection.web_socket_debugger_url.is_empty() {
        return Err(CdpError::NoResponse);
    }
    Ok(connection.web_socket_debugger_url)
}

/// Poll `http://127.0.0.1:<port>/json/version` until the endpoint answers
/// with its websocket url or the deadline passes.
async fn poll_ws_url(port: u16, timeout: Duration) -> Result<String> {
    let deadline = tokio::time::Instant::now() + timeout;
    let endpoint = format!("http://127.0.0.1:{port}/json/version");

    loop {
        if let Ok(resp) = VERSION_CLIENT.get(&endpoint).send().await {
            if let Ok(bytes) = resp.bytes().await {
                if let Ok(connection) = serde_json::from_slice::<BrowserConnection>(&bytes) {
                    if !connection.web_socket_debugger_url.is_empty() {
                        return Ok(connection.web_socket_debugger_url);
                    }
                }
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(CdpError::LaunchTimeout(crate::error::BrowserStderr::new(
                Vec::new(),
            )));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Whether and how to run the browser without a visible window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeadlessMode {
    /// A visible browser window
    False,
    /// The new unified headless mode (`--headless=new`)
    #[default]
    New,
}

/// How to launch the chromium instance
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Determines whether to run a headless version of the browser
    pub headless: HeadlessMode,
    /// The path to the chromium executable
    pub executable: PathBuf,
    /// The debugging port
    pub port: u16,
    /// Directory holding the profile; a fresh temp directory when unset
    pub user_data_dir: Option<PathBuf>,
    /// How long to poll for the websocket url after spawning
    pub launch_timeout: Duration,
    /// Additional command line arguments
    pub args: Vec<String>,
    pub ignore_https_errors: bool,
    pub viewport: Option<Viewport>,
    pub request_timeout: Duration,
    pub inject_piercer: bool,
    pub visual_cursor: bool,
    pub popup_window: Duration,
}

impl BrowserConfig {
    pub fn builder() -> BrowserConfigBuilder {
        BrowserConfigBuilder::default()
    }

    /// The flag set handed to the spawned process. Site isolation stays on
    /// so OOPIFs attach as their own targets.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", self.port),
            "--remote-allow-origins=*".to_string(),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--site-per-process".to_string(),
        ];
        if self.headless == HeadlessMode::New {
            args.push("--headless=new".to_string());
        }
        if let Some(dir) = self.user_data_dir.as_ref() {
            args.push(format!("--user-data-dir={}", dir.display()));
        }
        args.extend(self.args.iter().cloned());
        args.push("about:blank".to_string());
        args
    }

    pub(crate) fn spawn(&self) -> Result<Child> {
        let mut cmd = ProcessCommand::new(&self.executable);
        cmd.args(self.launch_args())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);
        Ok(cmd.spawn()?)
    }
}

#[derive(Debug, Clone)]
pub struct BrowserConfigBuilder {
    headless: HeadlessMode,
    executable: Option<PathBuf>,
    port: u16,
    user_data_dir: Option<PathBuf>,
    launch_timeout: Duration,
    args: Vec<String>,
    ignore_https_errors: bool,
    viewport: Option<Viewport>,
    request_timeout: Duration,
    inject_piercer: bool,
    visual_cursor: bool,
    popup_window: Duration,
}

impl Default for BrowserConfigBuilder {
    fn default() -> Self {
        Self {
            headless: HeadlessMode::New,
            executable: None,
            port: 0,
            user_data_dir: None,
            launch_timeout: Duration::from_secs(20),
            args: Vec::new(),
            ignore_https_errors: true,
            viewport: Some(Viewport::default()),
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT),
            inject_piercer: true,
            visual_cursor: false,
            popup_window: crate::handler::POPUP_SIGNAL_WINDOW,
        }
    }
}

impl BrowserConfigBuilder {
    pub fn with_head(mut self) -> Self {
        self.headless = HeadlessMode::False;
        self
    }

    pub fn headless_mode(mut self, mode: HeadlessMode) -> Self {
        self.headless = mode;
        self
    }

    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn user_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_data_dir = Some(dir.into());
        self
    }

    pub fn launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn viewport(mut self, viewport: Option<Viewport>) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn respect_https_errors(mut self) -> Self {
        self.ignore_https_errors = false;
        self
    }

    pub fn disable_script_injection(mut self) -> Self {
        self.inject_piercer = false;
        self
    }

    pub fn with_visual_cursor(mut self) -> Self {
        self.visual_cursor = true;
        self
    }

    pub fn popup_window(mut self, window: Duration) -> Self {
        self.popup_window = window;
        self
    }

    pub fn build(self) -> std::result::Result<BrowserConfig, String> {
        let executable = match self.executable {
            Some(path) => path,
            None => detection::default_executable()?,
        };

        let port = if self.port == 0 {
            pick_debug_port()
        } else {
            self.port
        };

        let user_data_dir = match self.user_data_dir {
            Some(dir) => Some(dir),
            None => {
                let dir = std::env::temp_dir().join(format!(
                    "deepdriver-profile-{}-{port}",
                    std::process::id()
                ));
                std::fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
                Some(dir)
            }
        };

        Ok(BrowserConfig {
            headless: self.headless,
            executable,
            port,
            user_data_dir,
            launch_timeout: self.launch_timeout,
            args: self.args,
            ignore_https_errors: self.ignore_https_errors,
            viewport: self.viewport,
            request_timeout: self.request_timeout,
            inject_piercer: self.inject_piercer,
            visual_cursor: self.visual_cursor,
            popup_window: self.popup_window,
        })
    }
}

/// An unprivileged port for the debugging endpoint
fn pick_debug_port() -> u16 {
    use rand::Rng;
    rand::rng().random_range(20_000..60_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_args_carry_the_required_flags() {
        let config = BrowserConfig {
            headless: HeadlessMode::New,
            executable: PathBuf::from("/usr/bin/chromium"),
            port: 9444,
            user_data_dir: Some(PathBuf::from("/tmp/profile")),
            launch_timeout: Duration::from_secs(20),
            args: vec!["--lang=en-US".to_string()],
            ignore_https_errors: true,
            viewport: None,
            request_timeout: Duration::from_secs(30),
            inject_piercer: true,
            visual_cursor: false,
            popup_window: Duration::from_millis(300),
        };

        let args = config.launch_args();
        assert!(args.contains(&"--remote-debugging-port=9444".to_string()));
        assert!(args.contains(&"--remote-allow-origins=*".to_string()));
        assert!(args.contains(&"--no-first-run".to_string()));
        assert!(args.contains(&"--no-default-browser-check".to_string()));
        assert!(args.contains(&"--disable-dev-shm-usage".to_string()));
        assert!(args.contains(&"--site-per-process".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));
        assert!(args.contains(&"--lang=en-US".to_string()));
    }

    #[test]
    fn headful_configs_omit_the_headless_flag() {
        let config = BrowserConfig {
            headless: HeadlessMode::False,
            executable: PathBuf::from("/usr/bin/chromium"),
            port: 9444,
            user_data_dir: None,
            launch_timeout: Duration::from_secs(20),
            args: Vec::new(),
            ignore_https_errors: true,
            viewport: None,
            request_timeout: Duration::from_secs(30),
            inject_piercer: true,
            visual_cursor: false,
            popup_window: Duration::from_millis(300),
        };
        assert!(!config
            .launch_args()
            .iter()
            .any(|arg| arg.starts_with("--headless")));
    }
}
