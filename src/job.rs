use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    cfg::Cfg,
    csv_sink::CsvSink,
    error::{Result, SyncError},
    state::CheckpointStore,
    strava::{ActivitySource, PageOutcome},
    transform::{flatten, Row},
};

pub const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct SyncResult {
    pub new_record_count: usize,
    /// `start_date` of the newest activity written this run.
    pub newest_date: Option<String>,
    /// Total records synced over the export's lifetime.
    pub total_record_count: u64,
    /// Paging stopped early because the provider answered 429.
    pub rate_limited: bool,
}

/// Incremental export: pages newest-first until it reaches an activity at or
/// before the checkpoint threshold, then appends the new rows and advances
/// the checkpoint.
pub struct Synchronizer<S> {
    source: S,
    store: CheckpointStore,
    sink: CsvSink,
    per_page: u32,
}

impl<S: ActivitySource> Synchronizer<S> {
    pub fn new(source: S, store: CheckpointStore, sink: CsvSink) -> Self {
        Self {
            source,
            store,
            sink,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    pub async fn sync(&self) -> Result<SyncResult> {
        info!("Starting activity sync");

        let checkpoint = self.store.load()?;
        let threshold = checkpoint.last_activity_date.as_deref();
        let Collected {
            activities: new_activities,
            newest_date,
            rate_limited,
        } = self.collect_new(threshold).await?;

        let Some(newest_date) = newest_date else {
            info!("No new activities, checkpoint left unchanged");
            return Ok(SyncResult {
                new_record_count: 0,
                newest_date: None,
                total_record_count: checkpoint.record_count,
                rate_limited,
            });
        };

        info!("Found {} new activities", new_activities.len());

        // Flatten the whole batch before touching the file so a bad record
        // never leaves the checkpoint behind what was written.
        let rows: Vec<Row> = new_activities.iter().map(flatten).collect();

        self.sink.append(&rows)?;

        let total = checkpoint.record_count + new_activities.len() as u64;
        self.store.save(total, Some(newest_date.clone()))?;

        info!(
            "Sync completed. Appended {} rows. Total synced: {}",
            rows.len(),
            total
        );

        Ok(SyncResult {
            new_record_count: new_activities.len(),
            newest_date: Some(newest_date),
            total_record_count: total,
            rate_limited,
        })
    }

    /// Walk pages until an already-seen activity, an empty page or a rate
    /// limit. Returns the new activities in API order.
    async fn collect_new(&self, threshold: Option<&str>) -> Result<Collected> {
        let mut collected = Collected::default();
        let mut page = 1;

        loop {
            let activities = match self.source.fetch_activities_page(page, self.per_page).await? {
                PageOutcome::RateLimited => {
                    warn!(
                        "Rate limit exceeded on page {}, keeping {} activities fetched so far",
                        page,
                        collected.activities.len()
                    );
                    collected.rate_limited = true;
                    return Ok(collected);
                }
                PageOutcome::Activities(activities) => activities,
            };

            if activities.is_empty() {
                debug!("Page {} is empty, no more activities", page);
                return Ok(collected);
            }

            for activity in activities {
                let index = collected.activities.len();
                let date = start_date(&activity).ok_or(SyncError::MissingStartDate { index })?;

                // Newest-first order: everything after this one is older still.
                if threshold.is_some_and(|t| date <= t) {
                    debug!("Reached already synced activity dated {}", date);
                    return Ok(collected);
                }
                // Positional first, not the maximum.
                if collected.newest_date.is_none() {
                    collected.newest_date = Some(date.to_string());
                }
                collected.activities.push(activity);
            }

            page += 1;
        }
    }
}

#[derive(Debug, Default)]
struct Collected {
    activities: Vec<Value>,
    /// `start_date` of the first new activity in API order.
    newest_date: Option<String>,
    rate_limited: bool,
}

/// Build the synchronizer described by `cfg` around `source` and run it once.
pub async fn run_job<S: ActivitySource>(cfg: &Cfg, source: S) -> Result<SyncResult> {
    let store = CheckpointStore::new(&cfg.checkpoint_path);
    let sink = CsvSink::new(&cfg.output_csv.path, cfg.output_csv.ensure);
    Synchronizer::new(source, store, sink)
        .with_page_size(cfg.per_page)
        .sync()
        .await
}

impl SyncResult {
    /// One-line summary printed at the end of a run.
    pub fn summary(&self) -> String {
        match &self.newest_date {
            Some(date) if self.new_record_count > 0 => format!(
                "Saved {} new activities. Last activity date: {}",
                self.new_record_count, date
            ),
            _ => "No new activities found.".to_string(),
        }
    }
}

fn start_date(activity: &Value) -> Option<&str> {
    activity.get("start_date").and_then(Value::as_str)
}
