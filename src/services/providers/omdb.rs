/// OMDb metadata provider
///
/// API Flow:
/// 1. Search: `GET /?apikey=..&s=<query>&page=<n>[&type=<kind>]`
/// 2. Details: `GET /?apikey=..&i=<id>&plot=full`
///
/// Both answer with a `Response: "True" | "False"` discriminator; `"False"`
/// means no match and maps to an empty page or `None`.
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{MovieDetails, MovieKind, OmdbDetailsResponse, OmdbSearchResponse, SearchPage},
    services::providers::MetadataProvider,
};
use reqwest::Client as HttpClient;
use tracing::instrument;

const SEARCH_CACHE_TTL: u64 = 3600; // 1 hour
const DETAILS_CACHE_TTL: u64 = 86400; // 1 day

#[derive(Clone)]
pub struct OmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    cache: Option<Cache>,
}

impl OmdbProvider {
    pub fn new(api_key: String, api_url: String, cache: Option<Cache>) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            cache,
        }
    }

    /// Issues one GET against the API root and decodes the JSON body
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        params: &[(&str, &str)],
    ) -> AppResult<T> {
        let url = format!("{}/", self.api_url);

        let response = self
            .http_client
            .get(&url)
            .query(&[("apikey", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "OMDb API returned status {}: {}",
                status, body
            )));
        }

        let response_text = response.text().await?;
        serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(
                error = %e,
                response = %response_text,
                "Failed to deserialize OMDb response"
            );
            AppError::ExternalApi(format!("Failed to parse OMDb response: {}", e))
        })
    }
}

#[async_trait::async_trait]
impl MetadataProvider for OmdbProvider {
    #[instrument(skip(self), fields(provider = "omdb"))]
    async fn search_filtered(
        &self,
        query: &str,
        page: u32,
        kind: Option<MovieKind>,
    ) -> AppResult<SearchPage> {
        if page == 0 {
            return Err(AppError::InvalidInput("Page numbers start at 1".to_string()));
        }

        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchPage::empty());
        }

        let key = CacheKey::Search {
            query: query.to_string(),
            page,
            kind,
        };

        cached!(self.cache, key, SEARCH_CACHE_TTL, async move {
            let page_param = page.to_string();
            let mut params = vec![("s", query), ("page", page_param.as_str())];
            if let Some(kind) = kind {
                params.push(("type", kind.as_str()));
            }

            let response: OmdbSearchResponse = self.get_json(&params).await?;
            if let Some(reason) = response.error.as_deref() {
                tracing::debug!(query = %query, reason = %reason, "OMDb reported no results");
            }

            let results = SearchPage::from(response);
            tracing::info!(
                query = %query,
                page,
                results = results.results.len(),
                total = results.total_count,
                "Movie search completed"
            );

            Ok::<_, AppError>(results)
        })
    }

    #[instrument(skip(self), fields(provider = "omdb"))]
    async fn get_details(&self, id: &str) -> AppResult<Option<MovieDetails>> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(None);
        }

        cached!(
            self.cache,
            CacheKey::Details(id.to_string()),
            DETAILS_CACHE_TTL,
            async move {
                let response: OmdbDetailsResponse =
                    self.get_json(&[("i", id), ("plot", "full")]).await?;
                let details = response.into_details();

                tracing::info!(
                    movie_id = %id,
                    found = details.is_some(),
                    "Movie details fetched"
                );

                Ok::<_, AppError>(details)
            }
        )
    }

    fn name(&self) -> &'static str {
        "omdb"
    }
}
