//! Privacy Guardian Core - data model and agent contract
//!
//! Privacy Guardian scans projects for privacy-compliance violations and runs
//! the raw findings through a staged pipeline. This crate holds what every
//! stage shares:
//!
//! - **Findings** (`finding`): the unit flowing through the pipeline
//! - **Events** (`event`): correlation-tracked records of what each unit did,
//!   kept in a per-unit append-only [`EventLog`]
//! - **Agent contract** (`agent`): identity, publish/consume bookkeeping,
//!   status snapshots and the [`Agent`] trait every stage implements
//! - **Configuration** (`config`) and **errors** (`error`)
//! - **Ports** (`ports`): injected analytics, secret and metrics side channels
//!
//! # Example
//!
//! ```
//! use guardian_core::{AgentCore, CorrelationId};
//! use guardian_core::event::payload;
//!
//! let mut core = AgentCore::new("privacy_scan_agent", "PrivacyScanAgent");
//! let cid = CorrelationId::new("run-1");
//! core.publish("FindingsReady", payload(serde_json::json!({"total_violations": 0})), &cid);
//!
//! assert_eq!(core.status().published_count, 1);
//! ```

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations)]

pub mod agent;
pub mod config;
pub mod error;
pub mod event;
pub mod finding;
pub mod ports;

pub use agent::{Agent, AgentCore, AgentStatus};
pub use config::GuardianConfig;
pub use error::{
    ConfigError, EnhancementError, ExtractionError, GuardianError, OracleError, Result, ScanError,
};
pub use event::{CorrelationId, Event, EventLog, Payload};
pub use finding::{Finding, Severity};
pub use ports::Ports;
