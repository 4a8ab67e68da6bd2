mod core;
mod page;

pub use self::core::{Bounds, Classification, HarvestMode, MarkerCounts, WindowSize};
pub use self::page::{FetchReport, FetchedFile, PageArtifact, PageFailure};
