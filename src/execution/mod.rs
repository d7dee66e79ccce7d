//! Execution advice and the fill-quality feedback loop.

pub mod advisor;
pub mod quality;

pub use advisor::{
    EntryRecommendation, EntryTiming, ExecutionAdvisor, ExecutionSuggestion, OrderType, TimeInForce,
};
pub use quality::{
    analyze_fill, ExecutionQualityResult, ExecutionQualityTracker, Fill, FillRecord, SymbolExecutionProfile,
    UserExecutionStats,
};
