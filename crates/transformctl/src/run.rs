use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use transform::{
    HeadlessPixelTransform, PipelineState, PixelTransformListener, Surface,
    ThreadedPixelTransform, TransformId,
};
use transformconfig::TransformConfig;

use crate::bindings::{initial_state, worker_options};
use crate::cli::{CheckConfigArgs, ReplayArgs};
use crate::paths::{resolve_config_file, AppPaths};
use crate::script::Script;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Notification observed by the replay listener.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReplayEvent {
    SetUp {
        source: TransformId,
    },
    InputSurfaceCreated {
        source: TransformId,
        surface: Surface,
    },
}

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<ReplayEvent>>,
}

impl PixelTransformListener for EventLog {
    fn on_set_up(&self, source: TransformId) {
        self.events.lock().push(ReplayEvent::SetUp { source });
    }

    fn on_input_surface_created(&self, source: TransformId, surface: Surface) {
        self.events
            .lock()
            .push(ReplayEvent::InputSurfaceCreated { source, surface });
    }
}

#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub proxy: TransformId,
    pub steps: usize,
    pub threads: usize,
    pub applied: u64,
    pub skipped: u64,
    pub events: Vec<ReplayEvent>,
    pub state: PipelineState,
}

pub fn load_config(explicit: Option<&Path>) -> Result<(TransformConfig, Option<String>)> {
    let paths = AppPaths::discover()?;
    let Some(path) = resolve_config_file(explicit, &paths)? else {
        tracing::debug!(
            config_dir = %paths.config_dir().display(),
            "no config file found; using built-in defaults"
        );
        return Ok((TransformConfig::default(), None));
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = TransformConfig::from_toml_str(&raw)
        .with_context(|| format!("invalid config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok((config, Some(path.display().to_string())))
}

pub fn replay(args: ReplayArgs) -> Result<()> {
    let (config, _) = load_config(args.config.as_deref())?;
    let script = Script::load(&args.script)?;
    let report = replay_script(&config, &script, usize::from(args.threads))?;

    if args.json {
        let rendered =
            serde_json::to_string_pretty(&report).context("failed to encode replay report")?;
        println!("{rendered}");
    } else {
        print_report(&report);
    }
    Ok(())
}

pub fn replay_script(
    config: &TransformConfig,
    script: &Script,
    threads: usize,
) -> Result<ReplayReport> {
    let delegate = HeadlessPixelTransform::with_state(initial_state(&config.defaults));
    let proxy = ThreadedPixelTransform::with_options(delegate, worker_options(config));
    let log = Arc::new(EventLog::default());
    proxy.set_listener(Some(log.clone()));

    let lanes = script.lanes(threads);
    tracing::info!(
        proxy = %proxy.id(),
        steps = script.steps.len(),
        threads = lanes.len(),
        "replaying script"
    );

    thread::scope(|scope| {
        for (lane, steps) in lanes.iter().enumerate() {
            let proxy = &proxy;
            scope.spawn(move || {
                for step in steps {
                    tracing::trace!(lane, message = step.name(), "posting step");
                    proxy.post(*step);
                }
            });
        }
    });

    let dispatcher = proxy.dispatcher();
    proxy
        .shutdown()
        .context("worker did not drain the replayed steps")?;
    let (applied, skipped) = dispatcher
        .as_ref()
        .map_or((0, 0), |dispatcher| (dispatcher.applied(), dispatcher.skipped()));

    let events = std::mem::take(&mut *log.events.lock());
    tracing::info!(applied, skipped, events = events.len(), "replay finished");

    Ok(ReplayReport {
        proxy: proxy.id(),
        steps: script.steps.len(),
        threads: lanes.len(),
        applied,
        skipped,
        events,
        state: proxy.state(),
    })
}

fn print_report(report: &ReplayReport) {
    println!(
        "proxy {} replayed {} steps from {} thread(s)",
        report.proxy, report.steps, report.threads
    );
    println!("events:");
    if report.events.is_empty() {
        println!("  (none)");
    }
    for event in &report.events {
        match event {
            ReplayEvent::SetUp { source } => println!("  set_up source={source}"),
            ReplayEvent::InputSurfaceCreated { source, surface } => {
                println!("  input_surface_created source={source} surface={surface}")
            }
        }
    }

    let state = &report.state;
    println!("state:");
    match state.surface {
        Some(surface) => println!("  surface:         {surface}"),
        None => println!("  surface:         none"),
    }
    println!("  orientation:     {:?}", state.orientation);
    println!("  rotation:        {}", state.rotation);
    println!("  video_gravity:   {:?}", state.video_gravity);
    println!("  extent:          {}", state.extent);
    println!("  resample_filter: {:?}", state.resample_filter);
    println!("applied={} skipped={}", report.applied, report.skipped);
}

pub fn check_config(args: CheckConfigArgs) -> Result<()> {
    let (config, source) = load_config(args.file.as_deref())?;
    match source {
        Some(path) => println!("# source: {path}"),
        None => println!("# source: built-in defaults"),
    }
    let rendered = config
        .to_toml_string()
        .context("failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}
