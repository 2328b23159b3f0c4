use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use url::Url;

use crate::error::PollError;
use crate::stream::StreamId;
use crate::ui::ViewerUi;

#[derive(Debug, Deserialize)]
struct StatsBody {
    #[serde(rename = "ConnectedViewers")]
    connected_viewers: u64,
}

#[async_trait]
pub trait StatsSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<u64, PollError>;
}

/// Reads the viewer count from the server's `/_stats/` endpoint.
pub struct HttpStatsSource {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl HttpStatsSource {
    /// The `uid` identifies this viewer so the server can count it while it polls.
    /// A request still unanswered after `timeout` counts as failed.
    pub fn new(
        client: Client,
        site: &Url,
        stream: &StreamId,
        timeout: Duration,
    ) -> Result<Self, url::ParseError> {
        let mut url = Self::stats_url(site, stream)?;
        let uid = uuid::Uuid::new_v4().simple().to_string();
        url.query_pairs_mut().append_pair("uid", &uid);
        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    /// `<site>/_stats/<stream>`, or `<site>/_stats/` for the default stream.
    pub fn stats_url(site: &Url, stream: &StreamId) -> Result<Url, url::ParseError> {
        stream.url_under(site, &["_stats"])
    }
}

#[async_trait]
impl StatsSource for HttpStatsSource {
    async fn fetch(&self) -> Result<u64, PollError> {
        let response = self
            .client
            .get(self.url.clone())
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Status(status));
        }
        let body = response.bytes().await?;
        let stats: StatsBody = serde_json::from_slice(&body)?;
        Ok(stats.connected_viewers)
    }
}

/// Polls `source` every `period` and reports successes to `ui`. Failures are
/// logged and the next tick fires regardless; the poller never stops on its own.
///
/// Each tick fetches on its own task, so a slow request never holds back the
/// following ticks.
pub fn start(source: Arc<dyn StatsSource>, period: Duration, ui: Arc<dyn ViewerUi>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let source = source.clone();
            let ui = ui.clone();
            tokio::spawn(async move {
                match source.fetch().await {
                    Ok(count) => ui.on_viewer_count(count),
                    Err(e) => warn!("Failed to refresh viewer counter: {}", e),
                }
            });
        }
    })
}
