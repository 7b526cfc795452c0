pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod paths;
pub mod progress;
pub mod reconcile;
pub mod scanner;
pub mod scheduler;
pub mod storage;

pub use crate::config::AppConfig;
pub use crate::crypto::{CryptoError, CryptoErrorKind, CryptoGateway, KeyRing, SealedBoxGateway};
pub use crate::engine::{generate_keys, DecryptReport, PassReport, SyncEngine, SyncOptions, SyncOutcome};
pub use crate::error::Error;
pub use crate::progress::{ProgressReporter, SilentReporter};
pub use crate::reconcile::{Classification, DeletionReport, DetectReport};
pub use crate::scheduler::Scheduler;
pub use crate::storage::{FileRecord, Ledger};
