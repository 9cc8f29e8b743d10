//! Headless Chrome workers driven through the `headless_chrome` crate.
//!
//! The crate's API is synchronous, so every call runs on the blocking pool.

use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use headless_chrome::{Browser, browser::default_executable, types::PrintToPdfOptions};
use tempfile::TempDir;
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines},
    process::{Child, ChildStderr, Command},
    task::spawn_blocking,
    time::{Instant, timeout},
};
use tracing::{debug, info, trace, warn};

use crate::application::render::{BrowserWorker, WorkerError, WorkerLauncher};
use crate::domain::job::{Job, RenderOptions};

const MM_PER_INCH: f64 = 25.4;
/// headless_chrome drops a connection after this long without events; idle pool workers must outlive it.
/// Hung calls are ended by killing the process, which closes the connection.
const BROWSER_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24);
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);
const DEVTOOLS_PREFIX: &str = "DevTools listening on ";
const EMPTY_TEMPLATE: &str = "<span></span>";

#[derive(Debug, Clone, Default)]
pub struct ChromeOptions {
    pub executable: Option<PathBuf>,
    pub no_sandbox: bool,
}

#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    options: ChromeOptions,
}

impl ChromeLauncher {
    pub fn new(options: ChromeOptions) -> Self {
        Self { options }
    }

    fn executable(&self) -> Result<PathBuf, WorkerError> {
        match &self.options.executable {
            Some(path) => Ok(path.clone()),
            None => default_executable().map_err(WorkerError::launch),
        }
    }
}

fn chrome_args(no_sandbox: bool, profile: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "--headless",
        "--remote-debugging-port=0",
        "--no-first-run",
        "--no-default-browser-check",
        "--disable-gpu",
        "--disable-dev-shm-usage",
        "--hide-scrollbars",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    if no_sandbox {
        args.push(OsString::from("--no-sandbox"));
    }
    let mut profile_arg = OsString::from("--user-data-dir=");
    profile_arg.push(profile);
    args.push(profile_arg);
    args.push(OsString::from("about:blank"));
    args
}

fn devtools_url(line: &str) -> Option<&str> {
    line.split_once(DEVTOOLS_PREFIX)
        .map(|(_, url)| url.trim())
        .filter(|url| url.starts_with("ws://"))
}

/// A Chrome child owned by one worker. Killed on `kill` and on drop.
struct ChromeProcess {
    child: Child,
    _profile: Option<TempDir>,
}

impl ChromeProcess {
    /// Start `program` and wait until it announces its DevTools websocket.
    async fn spawn(
        program: &OsStr,
        args: &[OsString],
        profile: Option<TempDir>,
    ) -> Result<(Self, String), WorkerError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| WorkerError::launch(format!("failed to spawn chrome: {err}")))?;
        let stderr = child.stderr.take();
        let mut process = Self {
            child,
            _profile: profile,
        };
        let Some(stderr) = stderr else {
            process.kill().await;
            return Err(WorkerError::launch("chrome stderr was not captured"));
        };

        let mut lines = BufReader::new(stderr).lines();
        let announced = timeout(LAUNCH_TIMEOUT, async {
            while let Some(line) = lines.next_line().await? {
                if let Some(url) = devtools_url(&line) {
                    return Ok(Some(url.to_string()));
                }
            }
            Ok::<_, std::io::Error>(None)
        })
        .await;

        let failure = match announced {
            Ok(Ok(Some(url))) => {
                tokio::spawn(drain_stderr(lines));
                return Ok((process, url));
            }
            Ok(Ok(None)) => "chrome exited before opening its DevTools endpoint".to_string(),
            Ok(Err(err)) => format!("reading chrome output failed: {err}"),
            Err(_) => "chrome did not open its DevTools endpoint in time".to_string(),
        };
        process.kill().await;
        Err(WorkerError::launch(failure))
    }

    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    async fn kill(&mut self) {
        if let Err(err) = self.child.kill().await {
            debug!(
                target = "pressroom::chrome",
                op = "kill",
                error = %err,
                "chrome process already gone"
            );
        }
    }
}

async fn drain_stderr(mut lines: Lines<BufReader<ChildStderr>>) {
    while let Ok(Some(line)) = lines.next_line().await {
        trace!(target = "pressroom::chrome", line = %line, "chrome stderr");
    }
}

#[async_trait]
impl WorkerLauncher for ChromeLauncher {
    async fn launch(&self, slot: usize) -> Result<Box<dyn BrowserWorker>, WorkerError> {
        let program = self.executable()?;
        let profile = tempfile::Builder::new()
            .prefix("pressroom-chrome-")
            .tempdir()
            .map_err(|err| WorkerError::launch(format!("failed to create chrome profile: {err}")))?;
        let args = chrome_args(self.options.no_sandbox, profile.path());
        let started_at = std::time::Instant::now();

        let (mut process, ws_url) =
            ChromeProcess::spawn(program.as_os_str(), &args, Some(profile)).await?;

        let connected = spawn_blocking(move || -> anyhow::Result<(Browser, String)> {
            let browser = Browser::connect_with_timeout(ws_url, BROWSER_IDLE_TIMEOUT)
                .context("failed to connect to chrome")?;
            let version = browser
                .get_version()
                .map(|version| version.product)
                .unwrap_or_else(|_| "unknown".to_string());
            Ok((browser, version))
        })
        .await;
        let (browser, version) = match connected {
            Ok(Ok(connected)) => connected,
            Ok(Err(err)) => {
                process.kill().await;
                return Err(WorkerError::launch(format!("{err:#}")));
            }
            Err(err) => {
                process.kill().await;
                return Err(WorkerError::launch(err.to_string()));
            }
        };

        info!(
            target = "pressroom::chrome",
            op = "launch",
            slot,
            pid = process.id(),
            version = %version,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "chrome worker started"
        );
        Ok(Box::new(ChromeWorker {
            slot,
            browser: Some(browser),
            process,
        }))
    }
}

pub struct ChromeWorker {
    slot: usize,
    browser: Option<Browser>,
    process: ChromeProcess,
}

#[async_trait]
impl BrowserWorker for ChromeWorker {
    async fn print_pdf(&mut self, job: &Job) -> Result<Bytes, WorkerError> {
        let browser = self
            .browser
            .clone()
            .ok_or_else(|| WorkerError::print("browser already shut down"))?;
        let url = job.url.clone();
        let pdf_options = print_options(&job.options);
        let budget = job.deadline.saturating_duration_since(Instant::now());

        let pdf = spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
            let tab = browser.new_tab().context("failed to open tab")?;
            tab.set_default_timeout(budget);
            tab.navigate_to(&url)
                .and_then(|tab| tab.wait_until_navigated())
                .with_context(|| format!("failed to load {url}"))?;
            let pdf = tab
                .print_to_pdf(Some(pdf_options))
                .context("print to pdf failed")?;
            let _ = tab.close(true);
            Ok(pdf)
        })
        .await
        .map_err(|err| WorkerError::print(err.to_string()))?
        .map_err(|err| WorkerError::print(format!("{err:#}")))?;

        debug!(
            target = "pressroom::chrome",
            op = "print_pdf",
            slot = self.slot,
            job_id = %job.id,
            pdf_bytes = pdf.len(),
            "page printed"
        );
        Ok(Bytes::from(pdf))
    }

    async fn is_alive(&mut self) -> bool {
        if self.process.has_exited() {
            return false;
        }
        let Some(browser) = self.browser.clone() else {
            return false;
        };
        spawn_blocking(move || browser.get_version().is_ok())
            .await
            .unwrap_or(false)
    }

    async fn shutdown(&mut self) {
        // Killing the process first fails any CDP call still blocked on it.
        let pid = self.process.id();
        self.process.kill().await;
        if let Some(browser) = self.browser.take() {
            if spawn_blocking(move || drop(browser)).await.is_err() {
                warn!(
                    target = "pressroom::chrome",
                    op = "shutdown",
                    slot = self.slot,
                    "dropping the browser handle panicked"
                );
            }
        }
        debug!(
            target = "pressroom::chrome",
            op = "shutdown",
            slot = self.slot,
            pid,
            "chrome worker stopped"
        );
    }
}

fn print_options(options: &RenderOptions) -> PrintToPdfOptions {
    let (width, height) = options.paper_size_mm();
    let header_footer = options.has_header_or_footer();
    PrintToPdfOptions {
        landscape: Some(options.landscape),
        display_header_footer: Some(header_footer),
        print_background: Some(options.print_background),
        scale: Some(options.scale),
        paper_width: Some(width / MM_PER_INCH),
        paper_height: Some(height / MM_PER_INCH),
        margin_top: Some(options.margins.top / MM_PER_INCH),
        margin_bottom: Some(options.margins.bottom / MM_PER_INCH),
        margin_left: Some(options.margins.left / MM_PER_INCH),
        margin_right: Some(options.margins.right / MM_PER_INCH),
        prefer_css_page_size: Some(options.prefer_css_page_size),
        header_template: header_footer.then(|| {
            options
                .header_html
                .clone()
                .unwrap_or_else(|| EMPTY_TEMPLATE.to_string())
        }),
        footer_template: header_footer.then(|| {
            options
                .footer_html
                .clone()
                .unwrap_or_else(|| EMPTY_TEMPLATE.to_string())
        }),
        ..PrintToPdfOptions::default()
    }
}
