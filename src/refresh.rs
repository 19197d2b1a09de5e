//! Background refresh of auxiliary data.
//!
//! A timer thread re-reads `blog.toml` every `serve.refresh_secs` seconds
//! and swaps the global config when its content changed. The content index
//! is not its business: every request reloads that itself.
//!
//! ```text
//! ┌──────────────┐  every N secs   ┌─────────────────┐
//! │ refresh loop │ ──────────────▶ │ reload_config() │ ──▶ CONFIG (ArcSwap)
//! └──────┬───────┘                 └─────────────────┘
//!        │ sender dropped
//!        ▼
//!      exit
//! ```

use crate::{config::reload_config, log};
use anyhow::Result;
use std::{
    sync::mpsc::{self, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::Duration,
};

/// A running refresh thread. Dropping it stops the thread.
pub struct Refresher {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Refresher {
    /// Run `task` every `interval` on a background thread.
    ///
    /// `task` returns whether anything changed. Returns `None` for a zero
    /// interval, which disables refreshing.
    pub fn spawn<F>(interval: Duration, mut task: F) -> Option<Self>
    where
        F: FnMut() -> Result<bool> + Send + 'static,
    {
        if interval.is_zero() {
            return None;
        }

        let (stop, ticks) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            loop {
                match ticks.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => match task() {
                        Ok(true) => log!("refresh"; "blog.toml changed, config replaced"),
                        Ok(false) => {}
                        Err(err) => log!("refresh"; "keeping previous config: {err:#}"),
                    },
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        Some(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it to finish its current tick.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start the config refresh configured by `serve.refresh_secs`.
pub fn spawn_config_refresh(refresh_secs: u64) -> Option<Refresher> {
    let refresher = Refresher::spawn(Duration::from_secs(refresh_secs), reload_config);
    if refresher.is_some() {
        log!("refresh"; "re-reading blog.toml every {refresh_secs}s");
    }
    refresher
}
