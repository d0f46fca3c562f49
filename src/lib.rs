// Country Pipelines - Core Library
// Loaders, identity reconciliation, merging and wide-table emission for
// country-keyed public datasets.

pub mod source;
pub mod numeric;
pub mod entities;
pub mod reconciliation;
pub mod merge;
pub mod emit;
pub mod config;
pub mod pipeline;
pub mod logging;

// Re-export commonly used types
pub use source::{
    Cell, SourceFormat, SourceRow, SourceTable, TableLoader,
    CsvLoader, SpreadsheetLoader,
    detect_format, get_loader, load, load_detected,
};
pub use numeric::{parse_leading_number, parse_number, Value};
pub use entities::{CountryReference, CountryRegistry, NameMatch, ReferenceColumns};
pub use reconciliation::{
    build_canonical_key_space, IdentityReconciler, KeyOrigin, KeySpace, KeyStrategy,
    MatchVia, ReconciliationReport, Resolution, UnmatchedEntity, UnmatchedRow,
};
pub use merge::{
    AttachmentPolicy, Attribute, MergeOutcome, Merger, MetricField, ReconciledEntity,
    SecondaryDataset, SeriesLayout, YearRange, YearSeries,
};
pub use emit::{
    digest, emit, write_output, CodeRename, Column, ColumnSpec, RowLayout, SyntheticCodePolicy,
};
pub use config::{
    LivesSavedConfig, MalariaConfig, PipelineConfig, SyntheticEntity, TuberculosisConfig,
    CONFIG_FILE,
};
pub use pipeline::{run_all, run_family, Assembled, Family, FamilyOutput};
pub use logging::init_logging;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
