//! Background Jobs for the Tile Server
//!
//! - `refresh`: keeps the cache package current
//!
//! # Usage
//!
//! ```ignore
//! use tessera_tileserver::jobs::{package_refresh_task, wait_for_initial_package};
//! use tokio::sync::watch;
//!
//! let initial = wait_for_initial_package(&mut loader).await;
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(package_refresh_task(loader, config.reload_interval, shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod refresh;

pub use refresh::{next_backoff, package_refresh_task, wait_for_initial_package, RefreshMetrics};
