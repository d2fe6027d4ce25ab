//! Recurring timer driving background refresh.
//!
//! Two states: disabled (initial) and enabled. The first refreshing `set`
//! enables the scheduler, `flush` disables it again.

use crate::config::CacheConfig;
use crate::error::Result;
use std::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Owns the timer task of one client.
#[derive(Default)]
pub struct RefreshScheduler {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        // Nothing panics while holding the lock, but don't wedge if it ever does
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_enabled(&self) -> bool {
        self.task()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Start the timer unless it is already running.
    ///
    /// `on_tick` runs once per `background_refresh_interval`, first one
    /// interval after enabling. Returning `false` stops the timer for good.
    ///
    /// Returns `Ok(true)` if this call started the timer.
    ///
    /// # Errors
    /// `Error::ConfigError` if `config` fails [`CacheConfig::validate`]; the
    /// scheduler stays disabled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enable<F>(&self, config: &CacheConfig, mut on_tick: F) -> Result<bool>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let mut task = self.task();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(false);
        }

        if let Err(e) = config.validate() {
            error!("Refusing to enable background refresh: {}", e);
            return Err(e);
        }

        info!(
            "Background refresh is enabled with backgroundRefreshIntervalCheck={} backgroundRefreshMinTtl={:?} backgroundRefreshInterval={:?}",
            config.background_refresh_interval_check,
            config.background_refresh_min_ttl,
            config.background_refresh_interval
        );

        let period = config.background_refresh_interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !on_tick() {
                    break;
                }
            }

            debug!("Background refresh timer stopped");
        }));

        Ok(true)
    }

    /// Stop the timer. Refreshes already started keep running.
    ///
    /// Returns `true` if the scheduler was enabled.
    pub fn disable(&self) -> bool {
        match self.task().take() {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                if was_running {
                    info!("Background refresh disabled");
                }
                was_running
            }
            None => false,
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.task().take() {
            handle.abort();
        }
    }
}
