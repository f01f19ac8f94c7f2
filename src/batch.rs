use crate::api::TimelineApi;
use crate::fetcher::{FetchOutcome, PostFetcher};
use crate::input::DateRange;
use crate::storage::StateStore;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{debug, info};

/// Outcomes of one batch, in input order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<FetchOutcome>,
    pub quota_total: u64,
}

impl BatchReport {
    pub fn total_saved(&self) -> usize {
        self.outcomes.iter().map(FetchOutcome::saved_count).sum()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "Finished fetching tweets. Total fetched this month: {}",
            self.quota_total
        )
    }
}

/// Runs the fetch loop for each username strictly in order, one at a time
pub struct BatchRunner<A: TimelineApi, S: StateStore> {
    fetcher: PostFetcher<A, S>,
    user_pause: Duration,
    show_progress: bool,
}

impl<A: TimelineApi, S: StateStore> BatchRunner<A, S> {
    pub fn new(fetcher: PostFetcher<A, S>, user_pause: Duration) -> Self {
        Self {
            fetcher,
            user_pause,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn fetcher(&self) -> &PostFetcher<A, S> {
        &self.fetcher
    }

    /// Fetch every user, pausing `user_pause` after each one
    pub async fn run(&mut self, usernames: &[String], range: &DateRange) -> BatchReport {
        info!("Starting to fetch tweets for {} users", usernames.len());
        let progress = self.progress_bar(usernames.len() as u64);

        let mut outcomes = Vec::with_capacity(usernames.len());
        for username in usernames {
            info!("Fetching tweets for user: {}", username);
            progress.set_message(username.clone());

            let outcome = self.fetcher.fetch_user(username, range).await;
            info!("{}", outcome);
            outcomes.push(outcome);
            progress.inc(1);

            debug!("Pausing {:?} before next user", self.user_pause);
            tokio::time::sleep(self.user_pause).await;
        }
        progress.finish_and_clear();

        let report = BatchReport {
            outcomes,
            quota_total: self.fetcher.quota().current(),
        };
        info!(
            "{} ({} saved this run, {} failed users)",
            report.summary(),
            report.total_saved(),
            report.failures()
        );
        report
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let progress = ProgressBar::new(len);
        if let Ok(style) =
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} users {msg}")
        {
            progress.set_style(style);
        }
        progress
    }
}
