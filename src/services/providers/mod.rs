/// Movie metadata provider abstraction
///
/// A provider resolves free-text searches and single-title lookups against an
/// upstream catalog. "No match" is a normal answer: an empty page or `None`.
/// Only transport and upstream failures are errors.
use crate::{
    error::AppResult,
    models::{MovieDetails, MovieKind, SearchPage},
};

pub mod omdb;

pub use omdb::OmdbProvider;

#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Search restricted to one kind of title when `kind` is set.
    /// `page` is 1-based.
    async fn search_filtered(
        &self,
        query: &str,
        page: u32,
        kind: Option<MovieKind>,
    ) -> AppResult<SearchPage>;

    /// Search across all kinds of title. `page` is 1-based.
    async fn search(&self, query: &str, page: u32) -> AppResult<SearchPage> {
        self.search_filtered(query, page, None).await
    }

    /// Full record for `id`, `None` when the upstream cannot resolve it
    async fn get_details(&self, id: &str) -> AppResult<Option<MovieDetails>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
