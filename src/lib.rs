//! genbot
//!
//! Telegram front end for remote generation services. Commands submit jobs
//! to a webhook-reporting compute provider; the job engine correlates each
//! inbound callback back to its chat, throttles progress edits, and
//! delivers terminal outputs.
//!
//! ```text
//! Telegram ──► command dispatch ──► provider API
//!                                      │ (webhook callbacks)
//!                                      ▼
//!              webhook ingress ──► job engine ──► job store (SQLite)
//!                                      │
//!                                      └──► notifier (Telegram sends/edits)
//! ```

pub mod config;
pub mod jobs;
pub mod notify;
pub mod providers;
pub mod telegram;
pub mod webhook;

pub use config::Config;
pub use jobs::{CallbackEvent, JobEngine, JobRecord, JobStatus, JobStore, OutputKind};
pub use notify::{Notifier, NotifyError, TelegramNotifier};
pub use providers::ProviderClient;
