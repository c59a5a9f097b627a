//! # tunevisor
//!
//! **Tunevisor** is a personal Telegram automation controller: a small set of
//! long-running features that the owner starts and stops from chat, plus an
//! on-demand music download pipeline.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!              ┌──────────────────────────────────────────────────┐
//!              │                  SessionRegistry                 │
//!              │      (one authenticated Messenger, re-login)     │
//!              └───────┬──────────────┬──────────────┬────────────┘
//!                      ▼              ▼              ▼
//! ┌────────────────────────┐  ┌────────────────┐  ┌───────────────────────┐
//! │      EventRouter       │  │   Supervisor   │  │       LogSink         │
//! │  long poll ─► matchers │  │ auto_reply     │  │ bounded queue, worker │
//! │  command / link /      │─►│ bio_sync       │─►│ ─► log chat / topics  │
//! │  trigger phrase        │  │ (start / stop) │  └───────────────────────┘
//! └──────┬───────────┬─────┘  └───────┬────────┘              ▲
//!        │           │                │ events                │
//!        │           ▼                ▼                       │
//!        │     TriggerHub ──► Animator     Bus ─► SubscriberSet ─┘
//!        ▼
//!   Pipeline: resolve ─► download ─► tag ─► Courier: upload ─► remove file
//! ```
//!
//! ### Feature lifecycle
//! ```text
//! start(name) ─► Starting ─► init ─┬─ Ok  ─► Running ─► run(ctx) ─┬─ Ok/Canceled ─► Stopped
//!                                  └─ Err ─► Stopped (launch fail)  └─ Err/panic   ─► Crashed
//!
//! stop(name)  ─► Stopping ─► cancel ctx ─► wait grace ─► terminate ─► cleanup ─► Stopped
//! ```
//!
//! ## Modules
//! | Area            | Description                                                | Key types                                 |
//! |-----------------|------------------------------------------------------------|-------------------------------------------|
//! | **Supervision** | Named features, independent start/stop, crash isolation.   | [`Supervisor`], [`Task`], [`TaskFn`]      |
//! | **Events**      | Lifecycle events fanned out to subscribers.                | [`events::Event`], [`Subscribe`]          |
//! | **Sessions**    | One shared login, persisted between restarts.              | [`session::SessionRegistry`]              |
//! | **Pipeline**    | Track request → tagged file → upload → cleanup.            | [`pipeline::Pipeline`], [`pipeline::Courier`] |
//! | **Router**      | Inbound messages → commands, links, trigger phrases.       | [`router::EventRouter`]                   |
//! | **Features**    | Heart animation responder, now-playing bio sync.           | [`features::AutoReply`], [`features::BioSync`] |
//! | **Clients**     | Telegram Bot API, Yandex Music, Ynison, ID3.               | [`clients`]                               |
//! | **Errors**      | Typed errors with stable labels.                           | [`TaskError`], [`AuthError`], ...         |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use tunevisor::{StartOutcome, SupervisorBuilder, SupervisorConfig, TaskError, TaskFn};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ticker = TaskFn::arc("ticker", |ctx: CancellationToken| async move {
//!         while !ctx.is_cancelled() {
//!             tokio::time::sleep(Duration::from_millis(10)).await;
//!         }
//!         Ok::<_, TaskError>(())
//!     });
//!
//!     let sup = SupervisorBuilder::new(SupervisorConfig::default())
//!         .with_feature(ticker)
//!         .build();
//!
//!     assert_eq!(sup.start("ticker").await?, StartOutcome::Started);
//!     sup.stop("ticker").await?;
//!     sup.shutdown().await;
//!     Ok(())
//! }
//! ```

mod core;
mod error;
mod policies;
mod subscribers;
mod tasks;

pub mod app;
pub mod clients;
pub mod config;
pub mod events;
pub mod features;
pub mod logsink;
pub mod messenger;
pub mod pipeline;
pub mod router;
pub mod session;

#[cfg(test)]
mod testkit;

// ---- Public re-exports ----

pub use core::{
    FeatureState, FeatureStatus, StartOutcome, StopOutcome, Supervisor, SupervisorBuilder,
    SupervisorConfig, wait_for_shutdown_signal,
};
pub use error::{AcquireError, AuthError, ConfigError, DeliverError, SupervisorError, TaskError};
pub use policies::{BackoffPolicy, JitterPolicy, RetryPolicy};
pub use subscribers::{LogWriter, RemoteLogForwarder, Subscribe, SubscriberSet};
pub use tasks::{Task, TaskFn, TaskRef};
