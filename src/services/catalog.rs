use futures::future::join_all;
use serde::Serialize;

use crate::{
    models::{MovieDetails, MovieReference},
    services::providers::MetadataProvider,
};

/// A browse row backed by a fixed search query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    pub title: &'static str,
    pub query: &'static str,
}

pub const CATEGORIES: [Category; 8] = [
    Category { title: "Trending Now", query: "marvel" },
    Category { title: "Action", query: "action" },
    Category { title: "Comedy", query: "comedy" },
    Category { title: "Drama", query: "drama" },
    Category { title: "Sci-Fi", query: "space" },
    Category { title: "Thriller", query: "thriller" },
    Category { title: "Horror", query: "horror" },
    Category { title: "Adventure", query: "adventure" },
];

/// Titles featured in the hero banner
pub const HERO_MOVIES: [&str; 5] = [
    "tt4154796", // Avengers: Endgame
    "tt1375666", // Inception
    "tt0468569", // The Dark Knight
    "tt0816692", // Interstellar
    "tt0111161", // The Shawshank Redemption
];

#[derive(Debug, Clone, Serialize)]
pub struct CategoryRow {
    pub title: String,
    pub movies: Vec<MovieReference>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowsePage {
    pub hero: Vec<MovieDetails>,
    pub rows: Vec<CategoryRow>,
}

/// Builds the home page: every category row and hero title, fetched concurrently
///
/// A row or hero title whose lookup fails is left empty or skipped; the page
/// itself never fails.
pub async fn browse(provider: &dyn MetadataProvider) -> BrowsePage {
    let rows = join_all(CATEGORIES.iter().map(|category| async move {
        let movies = match provider.search(category.query, 1).await {
            Ok(page) => page.results,
            Err(e) => {
                tracing::warn!(
                    category = category.title,
                    error = %e,
                    provider = provider.name(),
                    "Category row fetch failed"
                );
                Vec::new()
            }
        };
        CategoryRow {
            title: category.title.to_string(),
            movies,
        }
    }));

    let hero = join_all(HERO_MOVIES.iter().map(|id| async move {
        match provider.get_details(id).await {
            Ok(details) => details,
            Err(e) => {
                tracing::warn!(movie_id = %id, error = %e, "Hero title fetch failed");
                None
            }
        }
    }));

    let (rows, hero) = tokio::join!(rows, hero);

    BrowsePage {
        hero: hero.into_iter().flatten().collect(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};
    use crate::models::{MovieKind, SearchPage};

    struct FlakyProvider;

    #[async_trait::async_trait]
    impl MetadataProvider for FlakyProvider {
        async fn search_filtered(
            &self,
            query: &str,
            _page: u32,
            _kind: Option<MovieKind>,
        ) -> AppResult<SearchPage> {
            if query == "horror" {
                return Err(AppError::ExternalApi("rate limited".to_string()));
            }
            Ok(SearchPage {
                results: vec![MovieReference {
                    id: format!("tt-{}", query),
                    title: query.to_string(),
                    year: "2020".to_string(),
                    poster_url: "N/A".to_string(),
                    kind: MovieKind::Movie,
                }],
                total_count: 1,
            })
        }

        async fn get_details(&self, id: &str) -> AppResult<Option<MovieDetails>> {
            if id != "tt1375666" {
                return Ok(None);
            }
            Ok(Some(MovieDetails {
                summary: MovieReference {
                    id: id.to_string(),
                    title: "Inception".to_string(),
                    year: "2010".to_string(),
                    poster_url: "N/A".to_string(),
                    kind: MovieKind::Movie,
                },
                rated: String::new(),
                released: String::new(),
                runtime: String::new(),
                genre: String::new(),
                director: String::new(),
                writer: String::new(),
                actors: String::new(),
                plot: String::new(),
                language: String::new(),
                country: String::new(),
                awards: String::new(),
                ratings: vec![],
                metascore: String::new(),
                imdb_rating: String::new(),
                imdb_votes: String::new(),
                box_office: None,
            }))
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn test_browse_keeps_category_order_and_tolerates_failures() {
        let page = browse(&FlakyProvider).await;

        let titles: Vec<_> = page.rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(
            titles,
            CATEGORIES.iter().map(|c| c.title).collect::<Vec<_>>()
        );

        let horror = page.rows.iter().find(|r| r.title == "Horror").unwrap();
        assert!(horror.movies.is_empty());

        let sci_fi = page.rows.iter().find(|r| r.title == "Sci-Fi").unwrap();
        assert_eq!(sci_fi.movies[0].id, "tt-space");
    }

    #[tokio::test]
    async fn test_browse_skips_unresolvable_hero_titles() {
        let page = browse(&FlakyProvider).await;

        assert_eq!(page.hero.len(), 1);
        assert_eq!(page.hero[0].summary.id, "tt1375666");
    }
}
