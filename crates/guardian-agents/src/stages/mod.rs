//! Pipeline stages other than enhancement
//!
//! Scan → (Enhance) → Compliance → Fix-Suggestion → Report

pub mod compliance;
pub mod fix_suggestion;
pub mod report;
pub mod scan;

pub use compliance::{ComplianceAgent, ComplianceStatus, ComplianceSummary, SeverityCounts};
pub use fix_suggestion::FixSuggestionAgent;
pub use report::{PrivacyReport, ReportAgent};
pub use scan::ScanAgent;
