//! Refresh cycle orchestration.
//!
//! One cycle fetches and cleans the sheet, computes the summary and the
//! advisory, and lets the shedder act. The latest [`Snapshot`] is published
//! through a shared lock for the API.

pub mod view;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::alert::{Advisory, evaluate};
use crate::analytics::Summary;
use crate::config::MonitorConfig;
use crate::error::{FetchError, RelayError};
use crate::ingest::{CleanOptions, CleanReport, DataState, Fetcher, NoDataReason, Source, load_table};
use crate::reading::{Node, Table};
use crate::relay::{RelayClient, RelayReceipt, ScheduleEntry, fetch_schedule, verify_power};
use crate::shedding::{ShedAction, Shedder};

pub use view::ViewState;

/// Latest snapshot, shared between the refresh loop and readers.
pub type SharedSnapshot = Arc<RwLock<Option<Snapshot>>>;

/// Everything one refresh cycle produced.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Local wall-clock time of the cycle.
    pub fetched_at: NaiveDateTime,
    /// Set when the cycle has nothing to show.
    pub no_data: Option<NoDataReason>,
    pub report: Option<CleanReport>,
    pub summary: Option<Summary>,
    pub advisory: Option<Advisory>,
    /// Shedding command issued during this cycle, if any.
    pub shed: Option<ShedAction>,
    #[serde(skip)]
    pub table: Option<Table>,
}

impl Snapshot {
    fn from_state(state: DataState, now: NaiveDateTime, config: &MonitorConfig) -> Self {
        match state {
            DataState::Ready { table, report } => {
                let summary = Summary::from_table(&table, now.date());
                let advisory = table
                    .latest()
                    .map(|r| evaluate(r, &config.thresholds))
                    .unwrap_or_else(Advisory::healthy);
                Self {
                    fetched_at: now,
                    no_data: None,
                    report: Some(report),
                    summary: Some(summary),
                    advisory: Some(advisory),
                    shed: None,
                    table: Some(table),
                }
            }
            DataState::NoData(reason) => Self {
                fetched_at: now,
                no_data: Some(reason),
                report: None,
                summary: None,
                advisory: None,
                shed: None,
                table: None,
            },
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(reason) = &self.no_data {
            return match reason {
                NoDataReason::Syncing(msg) => write!(f, "No data (syncing): {msg}"),
                NoDataReason::ColumnMismatch(cols) => {
                    write!(f, "No data: column mismatch, missing {}", cols.join(", "))
                }
                NoDataReason::Empty => write!(f, "No data: sheet has no usable rows"),
            };
        }
        if let Some(summary) = &self.summary {
            writeln!(f, "{summary}")?;
        }
        if let Some(advisory) = &self.advisory {
            write!(f, "{advisory}")?;
        }
        if let Some(action) = &self.shed {
            write!(f, "\nLoad shedding: switched {} off", action.device)?;
        }
        Ok(())
    }
}

/// Result of a manual relay switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayOutcome {
    pub receipt: RelayReceipt,
    /// Whether the reading taken after the settle delay matches the
    /// commanded state. `None` when no reading was available.
    pub confirmed: Option<bool>,
}

/// Owns the fetchers, the relay client, and the shedding state.
#[derive(Debug)]
pub struct Monitor {
    config: MonitorConfig,
    fetcher: Fetcher,
    schedule_fetcher: Option<Fetcher>,
    relay: RelayClient,
    shedder: Mutex<Option<Shedder>>,
    latest: SharedSnapshot,
}

impl Monitor {
    /// Builds a monitor reading from `source`.
    ///
    /// # Errors
    ///
    /// Returns a `FetchError` if the HTTP client cannot be built.
    pub fn new(config: MonitorConfig, source: Source) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.source.timeout_secs))
            .build()?;
        let cache_bust = config.source.cache_bust;
        let fetcher = Fetcher::with_client(client.clone(), source, cache_bust);
        let schedule_fetcher = (!config.source.schedule_url.is_empty()).then(|| {
            Fetcher::with_client(
                client.clone(),
                Source::Url(config.source.schedule_url.clone()),
                cache_bust,
            )
        });
        let relay = RelayClient::new(
            client,
            config.relay.webhook_url.clone(),
            config.relay.retry_policy(),
        );
        let shedder = config
            .shedding
            .enabled
            .then(|| Shedder::new(config.shedding.device.clone(), Node::Main));

        Ok(Self {
            config,
            fetcher,
            schedule_fetcher,
            relay,
            shedder: Mutex::new(shedder),
            latest: Arc::new(RwLock::new(None)),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn relay(&self) -> &RelayClient {
        &self.relay
    }

    /// Handle to the published snapshot.
    pub fn shared(&self) -> SharedSnapshot {
        Arc::clone(&self.latest)
    }

    /// Clone of the most recent snapshot.
    pub async fn snapshot(&self) -> Option<Snapshot> {
        self.latest.read().await.clone()
    }

    fn clean_options(&self) -> CleanOptions {
        CleanOptions {
            layout: self.config.source.layout,
            day_first: self.config.source.day_first,
        }
    }

    /// Fetches and cleans the sheet without touching the published snapshot.
    pub async fn load(&self) -> DataState {
        load_table(&self.fetcher, self.clean_options()).await
    }

    /// Runs one cycle stamped with the local clock.
    pub async fn run_cycle(&self) -> Snapshot {
        self.run_cycle_at(Local::now().naive_local()).await
    }

    /// Runs one cycle as if the clock read `now`, then publishes the result.
    pub async fn run_cycle_at(&self, now: NaiveDateTime) -> Snapshot {
        let state = self.load().await;
        let mut snapshot = Snapshot::from_state(state, now, &self.config);

        match &snapshot.no_data {
            Some(reason) => warn!(?reason, "no data this cycle"),
            None => info!(
                readings = snapshot.table.as_ref().map_or(0, Table::len),
                advisory = ?snapshot.advisory.as_ref().map(|a| a.state),
                "refresh cycle complete"
            ),
        }

        let action = self
            .shedder
            .lock()
            .await
            .as_mut()
            .and_then(|s| s.decide(snapshot.advisory.as_ref()));
        if let Some(action) = action {
            match self.relay.control(&action.device, action.on).await {
                Ok(_) => snapshot.shed = Some(action),
                Err(e) => {
                    warn!(device = %action.device, error = %e, "load shedding command failed");
                    if let Some(s) = self.shedder.lock().await.as_mut() {
                        s.disengage();
                    }
                }
            }
        }

        *self.latest.write().await = Some(snapshot.clone());
        snapshot
    }

    /// Runs cycles on the configured interval until `shutdown` resolves,
    /// handing each snapshot to `on_cycle`.
    ///
    /// A cycle that overruns the interval delays the next one instead of
    /// queueing extra ticks, so cycles never overlap.
    pub async fn run(
        &self,
        shutdown: impl Future<Output = ()>,
        mut on_cycle: impl FnMut(&Snapshot),
    ) {
        let mut ticker = tokio::time::interval(self.config.refresh.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    let snapshot = self.run_cycle().await;
                    on_cycle(&snapshot);
                }
            }
        }
    }

    /// Switches a configured device and checks the outcome.
    ///
    /// Waits the settle delay after the webhook accepts the command, then
    /// re-reads the sheet, publishes the reloaded snapshot, and compares the
    /// device node's power against the confirmation threshold.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::UnknownDevice` for an id missing from the
    /// configuration, or the webhook error.
    pub async fn switch_relay(&self, id: &str, on: bool) -> Result<RelayOutcome, RelayError> {
        let device = self
            .config
            .relay
            .device(id)
            .ok_or_else(|| RelayError::UnknownDevice(id.to_string()))?;
        let receipt = self.relay.control(id, on).await?;

        tokio::time::sleep(self.config.relay.settle_delay()).await;
        let state = self.load().await;
        let snapshot = Snapshot::from_state(state, Local::now().naive_local(), &self.config);
        let confirmed = snapshot
            .table
            .as_ref()
            .and_then(Table::latest)
            .and_then(|r| verify_power(r, device.node, on, self.config.relay.confirm_threshold_w));
        *self.latest.write().await = Some(snapshot);
        match confirmed {
            Some(true) => info!(device = id, on, "relay state confirmed"),
            Some(false) => warn!(device = id, on, "relay state not reflected in readings"),
            None => warn!(device = id, "relay state could not be verified"),
        }
        Ok(RelayOutcome { receipt, confirmed })
    }

    /// Current schedule list; empty when no schedule tab is configured or
    /// the fetch fails.
    pub async fn schedules(&self) -> Vec<ScheduleEntry> {
        match &self.schedule_fetcher {
            Some(fetcher) => fetch_schedule(fetcher).await,
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AdvisoryState;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap()
    }

    fn monitor_for(text: &str) -> (Monitor, tempfile::NamedTempFile) {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        let monitor = Monitor::new(
            MonitorConfig::single_node(),
            Source::File(file.path().to_path_buf()),
        )
        .unwrap();
        (monitor, file)
    }

    #[tokio::test]
    async fn cycle_publishes_snapshot() {
        let (monitor, _file) = monitor_for(
            "Timestamp,Voltage,Current,Power,kWh_Interval\n\
             2025-03-01 10:00:00,230,5,1150,0.02\n\
             2025-03-01 10:01:00,150,5,1155,0.02\n",
        );
        let snap = monitor.run_cycle_at(now()).await;
        assert!(snap.no_data.is_none());
        assert_eq!(snap.advisory.as_ref().unwrap().state, AdvisoryState::Critical);
        let published = monitor.snapshot().await.unwrap();
        assert_eq!(published.table.unwrap().len(), 2);
        let shared = monitor.shared();
        let guard = shared.read().await;
        let summary = guard.as_ref().and_then(|s| s.summary.as_ref()).unwrap();
        assert!((summary.today_kwh(Node::Main) - 0.04).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_sheet_is_no_data() {
        let (monitor, _file) = monitor_for("");
        let snap = monitor.run_cycle_at(now()).await;
        assert_eq!(snap.no_data, Some(NoDataReason::Empty));
        assert!(snap.summary.is_none());
        assert!(format!("{snap}").starts_with("No data"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let (monitor, _file) = monitor_for("");
        let mut cycles = 0;
        let shutdown = tokio::time::sleep(std::time::Duration::from_secs(150));
        monitor.run(shutdown, |_| cycles += 1).await;
        // The first tick fires immediately.
        assert!(cycles >= 1);
        assert!(monitor.snapshot().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_does_not_panic() {
        let (mut monitor, _file) = monitor_for("");
        monitor.config.refresh.interval_secs = 0;
        let mut cycles = 0;
        let shutdown = tokio::time::sleep(std::time::Duration::from_millis(2500));
        monitor.run(shutdown, |_| cycles += 1).await;
        assert!(cycles >= 1);
    }

    #[tokio::test]
    async fn switch_publishes_reloaded_snapshot() {
        let mut server = mockito::Server::new_async().await;
        let webhook = server
            .mock("GET", "/exec")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .create_async()
            .await;
        let (mut monitor, file) = monitor_for(
            "Timestamp,Voltage,Current,Power,kWh_Interval\n\
             2025-03-01 10:00:00,230,5,1150,0.02\n",
        );
        monitor.config.relay.settle_delay_secs = 0;
        monitor.relay = RelayClient::new(
            reqwest::Client::new(),
            format!("{}/exec", server.url()),
            monitor.config.relay.retry_policy(),
        );
        monitor.run_cycle_at(now()).await;

        std::fs::write(
            file.path(),
            "Timestamp,Voltage,Current,Power,kWh_Interval\n\
             2025-03-01 10:00:00,230,5,1150,0.02\n\
             2025-03-01 10:01:00,230,0,0,0\n",
        )
        .unwrap();
        let outcome = monitor.switch_relay("relay_1", false).await.unwrap();
        assert_eq!(outcome.confirmed, Some(true));

        let published = monitor.snapshot().await.unwrap();
        assert_eq!(published.table.unwrap().len(), 2);
        webhook.assert_async().await;
    }

    #[tokio::test]
    async fn unknown_device_is_rejected() {
        let (monitor, _file) = monitor_for("");
        assert!(matches!(
            monitor.switch_relay("nope", true).await,
            Err(RelayError::UnknownDevice(_))
        ));
    }
}
