pub mod client;
pub mod config;
pub mod coordinator;
pub mod orchestrator;
pub mod source;
pub mod state;
pub mod testing;

pub use client::{
    ApiError, HttpPreservationClient, PackageInfo, PreservationApi, ReingestType, UnitStatus,
    UnitStatusKind,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, HttpConfig,
    SanitizedConfig, ServiceConfig,
};
pub use coordinator::{LockAcquisition, LockError, RunLock, RunSession, SessionStart};
pub use orchestrator::{
    CompletionReport, OrchestratorConfig, OrchestratorError, ReingestOrchestrator, RunSummary,
};
pub use source::{
    compare_lists, parse_package_list, read_package_list, ListComparison, SourceError, SourceMode,
    SourceSelector,
};
pub use state::{
    ReingestRecord, ReingestStatus, ReingestStore, SqliteReingestStore, StatusCounts, StoreError,
};
