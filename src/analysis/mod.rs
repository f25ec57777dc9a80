//! Branch analysis
//!
//! - `classify` - Pure status rules
//! - `BranchAnalyzer` - Per-branch analysis and request-style operations
//! - `AnalysisSession` - Interruptible batch streaming events to a client

mod analyzer;
mod classify;
mod events;
mod pipeline;

pub use analyzer::*;
pub use classify::*;
pub use events::*;
pub use pipeline::*;
