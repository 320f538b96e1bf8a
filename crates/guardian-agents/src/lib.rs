//! Privacy Guardian Agents - AI-augmented enhancement pipeline
//!
//! Provides the processing units of the privacy pipeline and the machinery
//! around them:
//!
//! - **Oracle** (`oracle`): the AI analysis client, Gemini over REST or disabled
//! - **Extraction** (`extraction`): best-effort structured payloads from free text
//! - **Enhancement** (`enhancement`): per-file prompting, merge and discovery
//! - **Stages** (`stages`): scan, compliance, fix-suggestion and report units
//! - **Orchestrator** (`orchestrator`): runs the stages under one correlation id
//!
//! # Example
//!
//! ```no_run
//! use guardian_agents::orchestrator::Pipeline;
//! use guardian_core::{GuardianConfig, Ports};
//!
//! # async fn example() -> Result<(), guardian_core::ConfigError> {
//! let pipeline = Pipeline::from_config(GuardianConfig::from_env()?, Ports::noop()).await?;
//! let run = pipeline.run("./my-project").await;
//! println!("{}", run.report.render_markdown());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations)]

pub mod enhancement;
pub mod extraction;
pub mod oracle;
pub mod orchestrator;
pub mod scanner;
pub mod stages;

pub use enhancement::{EnhancementAgent, EnhancementEngine};
pub use extraction::extract_structured;
pub use oracle::{build_oracle, DisabledOracle, GeminiOracle, OracleClient};
pub use orchestrator::{Pipeline, PipelineRun};
pub use scanner::{CommandScanner, Scanner, StaticScanner};
pub use stages::PrivacyReport;
