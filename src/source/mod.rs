//! Source document retrieval and the parsing stages that turn it into records.

pub mod columns;
pub mod extractor;
pub mod markup;
pub mod rows;
pub mod wikipedia;

use crate::ingest::IngestionError;

pub use wikipedia::WikipediaSource;

/// Provides the rendered HTML of the article holding the ranking grid.
pub trait DocumentSource: Send + Sync {
    fn fetch_markup(&self) -> Result<String, IngestionError>;
}
