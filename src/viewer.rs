use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use futures_util::StreamExt;
use reqwest::Client;
use tokio_util::codec::{FramedRead, LinesCodec};

use crate::config::{Config, SignalingMode};
use crate::output::{FileSink, NoOpSink, VideoSink};
use crate::peer::WebRtcPeerFactory;
use crate::result::Result;
use crate::session::{ViewerHandle, ViewerSession, ANSWER_TIMEOUT};
use crate::signaller::{HttpSignaller, Signaller, WebSocketSignaller};
use crate::stats::{self, HttpStatsSource};
use crate::stream::{QualityTier, StreamId};
use crate::ui::{ConsoleUi, ViewerUi};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Name of the stream to watch; empty for the site's default stream
    #[arg(short, long, default_value = "")]
    pub stream: String,
    /// Initial quality tier, overrides the configured default
    #[arg(short, long)]
    pub quality: Option<String>,
    /// Config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// If provided, received video payloads are written to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Exchange descriptions over HTTP instead of a websocket
    #[arg(long, default_value = "false")]
    pub http_signaling: bool,
}

impl Args {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(crate::config::default_path)
    }
}

pub async fn start_viewer(args: Args, config: Config) -> Result<()> {
    let stream = StreamId::new(args.stream.clone());
    let quality = args
        .quality
        .as_deref()
        .map(QualityTier::from)
        .unwrap_or_else(|| config.default_quality.clone());
    let mode = if args.http_signaling {
        SignalingMode::Http
    } else {
        config.signaling_mode
    };
    let config = Config {
        signaling_mode: mode,
        ..config
    };
    if stream.is_default() {
        info!("No stream name given, watching the default stream");
    }
    let client = Client::builder().build()?;

    let sink: Box<dyn VideoSink> = match &args.output {
        Some(path) => {
            info!("Writing received video to {}", path.display());
            Box::new(FileSink::create(path)?)
        }
        None => Box::new(NoOpSink),
    };
    let factory = Arc::new(WebRtcPeerFactory::new(&config.stun_servers, sink)?);

    let signaling_url = config.signaling_url()?;
    info!("Signaling with {} ({:?})", signaling_url, mode);
    let signaller: Arc<dyn Signaller> = match mode {
        SignalingMode::Websocket => Arc::new(WebSocketSignaller::new(signaling_url)),
        SignalingMode::Http => {
            Arc::new(HttpSignaller::new(client.clone(), signaling_url, ANSWER_TIMEOUT))
        }
    };

    let ui: Arc<dyn ViewerUi> = Arc::new(ConsoleUi);
    let (handle, session) = ViewerSession::start(stream.clone(), quality, signaller, factory, ui.clone());

    // a poll may take at most one period, so a hung request cannot pile up
    let source = Arc::new(HttpStatsSource::new(
        client,
        &config.site_url()?,
        &stream,
        config.refresh_period(),
    )?);
    let poller = stats::start(source, config.refresh_period(), ui);
    let input = tokio::spawn(read_quality_changes(handle.clone()));

    info!("Type a quality name and press enter to switch, ctrl-c to quit");
    tokio::signal::ctrl_c().await?;
    input.abort();
    poller.abort();
    handle.shutdown();
    session.await?;
    Ok(())
}

/// Each non-empty line on stdin selects a quality tier.
async fn read_quality_changes(handle: ViewerHandle) {
    let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => {
                let line = line.trim();
                if !line.is_empty() {
                    handle.set_quality(QualityTier::from(line));
                }
            }
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                return;
            }
        }
    }
}
