use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use palm_alert::{
    alert::{AlertSink, LogSink, MqttSink},
    config::{self, Config, LiveSource},
    gui,
    live::{self, Display, Headless},
    nn::OnnxLandmarker,
    pipeline::{Pipeline, PipelineError, INVALID_IMAGE},
    provider::LandmarkProvider,
    server, video,
};
use tokio::runtime::Runtime;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file [default: palm-alert.toml, if present]
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the `/detect-hand` HTTP endpoint.
    Serve {
        /// Address to listen on, overriding the configuration.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Run detection on a live camera feed.
    Live {
        /// `webcam`, or the URL of an MJPEG stream.
        #[arg(long)]
        source: Option<LiveSource>,
        /// Don't open a preview window.
        #[arg(long)]
        headless: bool,
    },
    /// Run detection on an image file once and print the verdict as JSON. Publishes no alert.
    Check { image: PathBuf },
}

fn main() -> anyhow::Result<()> {
    palm_alert::init_logger!();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(config::DEFAULT_PATH)?,
    };
    log::debug!("{:?}", config);

    match cli.command {
        Command::Serve { listen } => serve(config, listen),
        Command::Live { source, headless } => run_live(config, source, headless),
        Command::Check { image } => check(config, image),
    }
}

fn load_provider(config: &Config) -> anyhow::Result<Arc<dyn LandmarkProvider>> {
    let landmarker = OnnxLandmarker::load(&config.model.path, config.model.presence_threshold)
        .context("failed to load hand landmark network")?;
    Ok(Arc::new(landmarker))
}

/// Connects to the MQTT broker if enabled.
fn alert_sink(
    config: &Config,
    runtime: &Runtime,
) -> (Arc<dyn AlertSink>, Option<Arc<MqttSink>>) {
    if config.mqtt.enabled {
        let mqtt = Arc::new(MqttSink::connect(&config.mqtt, runtime.handle()));
        (mqtt.clone() as Arc<dyn AlertSink>, Some(mqtt))
    } else {
        log::warn!("MQTT is disabled, alerts will only be logged");
        (Arc::new(LogSink) as Arc<dyn AlertSink>, None)
    }
}

fn pipeline(
    config: &Config,
    provider: Arc<dyn LandmarkProvider>,
    sink: Arc<dyn AlertSink>,
) -> Pipeline {
    Pipeline::new(provider, sink)
        .with_alert_message(&config.alert.message)
        .with_response_message(&config.server.response_message)
}

fn serve(config: Config, listen: Option<SocketAddr>) -> anyhow::Result<()> {
    let provider = load_provider(&config)?;
    let runtime = Runtime::new()?;
    let (sink, mqtt) = alert_sink(&config, &runtime);
    let pipeline = Arc::new(pipeline(&config, provider, sink));

    let app = server::router(pipeline, config.server.max_upload_bytes);
    let addr = listen.unwrap_or(config.server.listen);
    runtime.block_on(async {
        let result = server::serve(addr, app, server::shutdown_signal()).await;
        if let Some(mqtt) = &mqtt {
            mqtt.shutdown().await;
        }
        result
    })
}

fn run_live(mut config: Config, source: Option<LiveSource>, headless: bool) -> anyhow::Result<()> {
    if let Some(source) = source {
        config.live.source = source;
    }
    let provider = load_provider(&config)?;
    let runtime = Runtime::new()?;
    let (sink, mqtt) = if config.live.publish_alerts {
        alert_sink(&config, &runtime)
    } else {
        (Arc::new(LogSink) as Arc<dyn AlertSink>, None)
    };
    let pipeline = pipeline(&config, provider, sink);
    let show_window = config.live.show_window && !headless;
    let live_config = config.live;

    let app = move |display: &mut dyn Display| -> anyhow::Result<()> {
        let mut source = video::open(&live_config)?;
        let result = live::run(&mut *source, &pipeline, display, live_config.publish_alerts);
        if let Some(mqtt) = &mqtt {
            runtime.block_on(mqtt.shutdown());
        }
        let stats = result?;
        log::info!(
            "{} frames, {} with a hand, {} with an open hand",
            stats.frames,
            stats.hands,
            stats.open,
        );
        Ok(())
    };

    if show_window {
        gui::run(live::WINDOW_TITLE, move |mut preview| app(&mut preview))
    } else {
        app(&mut Headless)
    }
}

fn check(config: Config, path: PathBuf) -> anyhow::Result<()> {
    let data =
        std::fs::read(&path).with_context(|| format!("failed to read '{}'", path.display()))?;
    let provider = load_provider(&config)?;
    let pipeline = pipeline(&config, provider, Arc::new(LogSink));

    let output = match pipeline.handle_upload(&data) {
        Ok(verdict) => serde_json::to_string(&verdict)?,
        Err(PipelineError::InvalidImage(e)) => {
            log::error!("'{}': {e}", path.display());
            serde_json::json!({ "status": "error", "message": INVALID_IMAGE }).to_string()
        }
        Err(e) => return Err(e.into()),
    };
    println!("{output}");
    Ok(())
}
