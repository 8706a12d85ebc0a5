//! Runs every configured rule on its own interval, one instance at a time.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::errors::LocalError;
use crate::reconcile::{self, ReconcileReport, ReconcileRule};
use crate::rozetka_api::RozetkaApi;
use crate::settings::RozetkaSettings;
use crate::store::{RunRecord, Store};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("no job named {0}")]
    Unknown(String),

    #[error("job {0} is already running")]
    Busy(String),

    #[error(transparent)]
    Failed(#[from] LocalError),
}

pub struct Job {
    pub rule: ReconcileRule,
    running: Mutex<()>,
}

#[derive(Clone)]
pub struct Jobs {
    inner: Arc<Inner>,
}

struct Inner {
    jobs: Vec<Job>,
    rozetka: RozetkaSettings,
    store: Store,
}

impl Jobs {
    pub fn new(rules: Vec<ReconcileRule>, rozetka: RozetkaSettings, store: Store) -> Result<Self, LocalError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if rule.every.is_zero() {
                return Err(LocalError::InvalidRule(format!("{} has a zero interval", rule.name)));
            }
            if rule.older_than_days < 0 {
                return Err(LocalError::InvalidRule(format!(
                    "{} has a negative age threshold ({} days)",
                    rule.name, rule.older_than_days
                )));
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(LocalError::InvalidRule(format!("{} is defined twice", rule.name)));
            }
        }
        let jobs = rules
            .into_iter()
            .map(|rule| Job {
                rule,
                running: Mutex::new(()),
            })
            .collect();
        Ok(Jobs {
            inner: Arc::new(Inner {
                jobs,
                rozetka,
                store,
            }),
        })
    }

    pub fn all(&self) -> &[Job] {
        &self.inner.jobs
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    fn find(&self, name: &str) -> Result<&Job, JobError> {
        self.inner
            .jobs
            .iter()
            .find(|job| job.rule.name == name)
            .ok_or_else(|| JobError::Unknown(name.to_string()))
    }

    /// Runs `name` right now unless a run of it is already in progress.
    pub async fn run_now(&self, name: &str) -> Result<ReconcileReport, JobError> {
        let job = self.find(name)?;
        let _guard = job
            .running
            .try_lock()
            .map_err(|_| JobError::Busy(name.to_string()))?;
        Ok(self.execute(job).await?)
    }

    /// Starts one ticking task per job.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        (0..self.inner.jobs.len())
            .map(|index| {
                let jobs = self.clone();
                tokio::spawn(async move { jobs.tick(index).await })
            })
            .collect()
    }

    async fn tick(&self, index: usize) {
        let job = &self.inner.jobs[index];
        log::info!("{} - scheduled every {:?}", job.rule.name, job.rule.every);
        let mut ticker = tokio::time::interval(job.rule.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let _guard = job.running.lock().await;
            if let Err(e) = self.execute(job).await {
                log::error!("{} - run failed: {}", job.rule.name, e);
            }
        }
    }

    /// One run with a fresh client; the outcome is written to the store
    /// whether it succeeded or not.
    async fn execute(&self, job: &Job) -> Result<ReconcileReport, LocalError> {
        let result = match RozetkaApi::new(&self.inner.rozetka, self.inner.store.clone()) {
            Ok(mut api) => {
                reconcile::run(&mut api, &job.rule, Utc::now(), self.inner.rozetka.write_delay).await
            }
            Err(e) => Err(e),
        };

        let record = match &result {
            Ok(report) => RunRecord {
                finished_at: Utc::now(),
                changed: report.changed.len(),
                failed: report.failed.len(),
                error: None,
            },
            Err(e) => RunRecord {
                finished_at: Utc::now(),
                changed: 0,
                failed: 0,
                error: Some(e.to_string()),
            },
        };
        self.inner.store.record_run(&job.rule.name, &record)?;
        self.inner.store.flush().await?;
        result
    }
}
