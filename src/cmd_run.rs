//! `run` subcommand: attach to the Whisk tab, drive a run and save images.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

use whiskpilot_cdp::{CdpClient, CdpError, CdpPage};
use whiskpilot_config::{BrowserSettings, Config, ConfigLoader, ConfigValidator};
use whiskpilot_core::{
    AutomationEvent, DownloadSaver, EventSink, RetryPolicy, RunConfig, Selectors, Sequencer,
    StatusKind, Timings,
};

/// Command-line values that take precedence over the configuration file.
#[derive(Debug, Default)]
pub(crate) struct RunOverrides {
    pub prompts_file: Option<PathBuf>,
    pub delay: Option<u64>,
    pub images_per_prompt: Option<u32>,
    pub randomize: bool,
    pub endpoint: Option<String>,
}

impl RunOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(file) = self.prompts_file {
            config.automation.prompts.clear();
            config.automation.prompts_file = Some(file);
        }
        if let Some(delay) = self.delay {
            config.automation.delay_seconds = delay;
        }
        if let Some(images) = self.images_per_prompt {
            config.automation.images_per_prompt = images;
        }
        if self.randomize {
            config.automation.randomize = true;
        }
        if let Some(endpoint) = self.endpoint {
            config.browser.endpoint = endpoint;
        }
    }
}

/// Connection kept alive for the whole run. The page's commands travel over
/// the client's socket.
struct Attached {
    _client: CdpClient,
    page: Arc<CdpPage>,
}

async fn attach(browser: &BrowserSettings) -> Result<Attached, CdpError> {
    let client = CdpClient::connect(&browser.endpoint).await?;
    let tab = client.find_page(&browser.target_url_contains).await?;
    info!("Attaching to tab {} ({})", tab.id, tab.url);
    let session = client.attach_page(&tab.id).await?;
    let page = CdpPage::attach(session).await?;
    Ok(Attached {
        _client: client,
        page: Arc::new(page),
    })
}

pub(crate) async fn run(
    config_path: &Path,
    overrides: RunOverrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = crate::cmd_config::load_config(config_path)?;
    overrides.apply(&mut config);

    let validation = ConfigValidator::validate(&config);
    for warning in &validation.warnings {
        warn!("{}: {}", warning.path, warning.message);
    }
    if !validation.is_valid() {
        for e in &validation.errors {
            error!("{}: {}", e.path, e.message);
        }
        return Err("invalid configuration".into());
    }

    let prompts = ConfigLoader::resolve_prompts(&config.automation)?;
    info!("Starting whiskpilot v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded {} prompt(s)", prompts.len());

    let policy = RetryPolicy::new(
        config.browser.attach_attempts,
        Duration::from_millis(config.browser.attach_backoff_ms),
    );
    let attached = policy
        .run("attach to Whisk tab", |_| attach(&config.browser))
        .await?;

    let timings = Timings::from(&config.timing);
    let (sink, events) = EventSink::channel();
    let sequencer = Sequencer::new(
        attached.page.clone(),
        sink,
        Selectors::from(&config.selectors),
        timings.clone(),
    );

    let saver = Arc::new(DownloadSaver::new(
        attached.page.clone(),
        config.download.clone(),
    ));
    if saver.is_enabled() {
        info!("Saving images under {}", saver.root().display());
    }

    sequencer.start(RunConfig::from_settings(prompts, &config.automation))?;

    let outcome = consume_events(&sequencer, events, &saver, timings.download_debounce).await;
    drop(attached);
    outcome
}

/// Log every event until the run ends, saving images as they are attributed.
async fn consume_events(
    sequencer: &Sequencer<CdpPage>,
    mut events: mpsc::UnboundedReceiver<AutomationEvent>,
    saver: &Arc<DownloadSaver<CdpPage>>,
    download_debounce: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let started = Instant::now();
    let mut saves = JoinSet::new();
    let mut failure = None;
    // Set once the user interrupts; pending downloads are collected until then.
    let mut drain_until: Option<Instant> = None;

    loop {
        let event = match drain_until {
            Some(deadline) => match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(event) => event,
                Err(_) => break,
            },
            None => tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    let snapshot = sequencer.snapshot();
                    info!(
                        "Interrupted at prompt {} of {}",
                        snapshot.current_index, snapshot.total_prompts
                    );
                    sequencer.stop();
                    drain_until = Some(Instant::now() + download_debounce * 2);
                    continue;
                }
                event = events.recv() => event,
            },
        };
        let Some(event) = event else { break };
        let elapsed = started.elapsed().as_secs_f64();

        match &event {
            AutomationEvent::StatusUpdate {
                message,
                kind,
                progress,
            } => {
                let progress = progress.as_deref().unwrap_or_default();
                match kind {
                    StatusKind::Warning => warn!("[{:>7.1}s] {} {}", elapsed, message, progress),
                    StatusKind::Error => error!("[{:>7.1}s] {} {}", elapsed, message, progress),
                    _ => info!("[{:>7.1}s] {} {}", elapsed, message, progress),
                }
            }
            AutomationEvent::DownloadRequested { url, prompt } => {
                info!("[{:>7.1}s] Image for \"{}\": {}", elapsed, prompt, url);
                if saver.is_enabled() {
                    let saver = saver.clone();
                    let url = url.clone();
                    let prompt = prompt.clone();
                    saves.spawn(async move {
                        match saver.save(&url, &prompt).await {
                            Ok(Some(saved)) => info!("Saved {}", saved.image.display()),
                            Ok(None) => {}
                            Err(e) => error!("Download of {} failed: {}", url, e),
                        }
                    });
                }
            }
            AutomationEvent::RunCompleted { total_prompts } => {
                info!(
                    "[{:>7.1}s] Automation completed, {} prompt(s) processed",
                    elapsed, total_prompts
                );
            }
            AutomationEvent::RunFailed { error: e } => {
                error!("[{:>7.1}s] Automation failed: {}", elapsed, e);
                failure = Some(e.clone());
            }
        }

        if event.is_terminal() {
            break;
        }
    }

    while saves.join_next().await.is_some() {}

    match failure {
        Some(e) => Err(format!("run failed: {}", e).into()),
        None => Ok(()),
    }
}
