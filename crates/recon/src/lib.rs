//! `reelsync-recon`: watch-history reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded plays and log rows, returns
//! canonical export rows, overlap results and range advice. No network IO.

pub mod advisor;
pub mod bucket;
pub mod compare;
pub mod counterpart;
pub mod error;
pub mod identity;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod rating;
pub mod snapshot;
pub mod source;
pub mod summary;
pub mod window;

pub use advisor::{advise, OverlapClass, RangeAdvice};
pub use bucket::Granularity;
pub use compare::run;
pub use error::{ReconError, RowError, RowErrorKind};
pub use model::{
    CompareRow, DateSpan, LibraryItem, LibraryStatus, LogEntry, OverlapResult, RawPlay,
    RawTimestamp, WatchEvent,
};
pub use normalize::{collect, normalize, NormalizeOptions, Normalized, RewatchMode};
pub use rating::Rating;
pub use source::{Account, HistoryQuery, WatchSource};
pub use summary::library_status;
pub use window::{Precision, TimeWindow};
