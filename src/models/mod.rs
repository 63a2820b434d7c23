use serde::Deserialize;

pub mod movie;
pub mod notification;
pub mod session;
pub mod watchlist;

pub use movie::{MovieDetails, MovieKind, MovieReference, Rating, SearchPage, NOT_AVAILABLE};
pub use notification::{feed_order, NewNotification, Notification, FEED_WINDOW};
pub use session::{Credentials, Profile, Registration, Session};
pub use watchlist::{sort_entries, WatchlistEntry};

// ============================================================================
// OMDb API Types
// ============================================================================

/// Discriminator every OMDb response carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum OmdbFlag {
    True,
    False,
}

/// Raw search hit from `?s=`
#[derive(Debug, Clone, Deserialize)]
pub struct OmdbMovie {
    #[serde(rename = "imdbID")]
    pub imdb_id: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Year", default)]
    pub year: String,
    #[serde(rename = "Poster", default = "not_available")]
    pub poster: String,
    #[serde(rename = "Type", default)]
    pub kind: String,
}

fn not_available() -> String {
    NOT_AVAILABLE.to_string()
}

impl From<OmdbMovie> for MovieReference {
    fn from(movie: OmdbMovie) -> Self {
        MovieReference {
            id: movie.imdb_id,
            title: movie.title,
            year: movie.year,
            poster_url: movie.poster,
            kind: movie.kind.parse().unwrap_or(MovieKind::Movie),
        }
    }
}

/// Raw response from `?s=<query>&page=<n>`
#[derive(Debug, Clone, Deserialize)]
pub struct OmdbSearchResponse {
    #[serde(rename = "Response")]
    pub response: OmdbFlag,
    #[serde(rename = "Search", default)]
    pub search: Vec<OmdbMovie>,
    #[serde(rename = "totalResults", default)]
    pub total_results: Option<String>,
    #[serde(rename = "Error", default)]
    pub error: Option<String>,
}

impl From<OmdbSearchResponse> for SearchPage {
    fn from(response: OmdbSearchResponse) -> Self {
        if response.response == OmdbFlag::False {
            return SearchPage::empty();
        }

        let total_count = response
            .total_results
            .as_deref()
            .and_then(|t| t.trim().parse().ok())
            .unwrap_or(response.search.len() as u32);

        SearchPage {
            results: response.search.into_iter().map(MovieReference::from).collect(),
            total_count,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OmdbRating {
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// Raw response from `?i=<id>&plot=full`
#[derive(Debug, Clone, Deserialize)]
pub struct OmdbDetailsResponse {
    #[serde(rename = "Response")]
    pub response: OmdbFlag,
    #[serde(flatten)]
    pub movie: Option<OmdbMovie>,
    #[serde(rename = "Rated", default)]
    pub rated: String,
    #[serde(rename = "Released", default)]
    pub released: String,
    #[serde(rename = "Runtime", default)]
    pub runtime: String,
    #[serde(rename = "Genre", default)]
    pub genre: String,
    #[serde(rename = "Director", default)]
    pub director: String,
    #[serde(rename = "Writer", default)]
    pub writer: String,
    #[serde(rename = "Actors", default)]
    pub actors: String,
    #[serde(rename = "Plot", default)]
    pub plot: String,
    #[serde(rename = "Language", default)]
    pub language: String,
    #[serde(rename = "Country", default)]
    pub country: String,
    #[serde(rename = "Awards", default)]
    pub awards: String,
    #[serde(rename = "Ratings", default)]
    pub ratings: Vec<OmdbRating>,
    #[serde(rename = "Metascore", default)]
    pub metascore: String,
    #[serde(rename = "imdbRating", default)]
    pub imdb_rating: String,
    #[serde(rename = "imdbVotes", default)]
    pub imdb_votes: String,
    #[serde(rename = "BoxOffice", default)]
    pub box_office: Option<String>,
}

impl OmdbDetailsResponse {
    /// `None` when the upstream could not resolve the id
    pub fn into_details(self) -> Option<MovieDetails> {
        if self.response == OmdbFlag::False {
            return None;
        }

        let summary = MovieReference::from(self.movie?);

        Some(MovieDetails {
            summary,
            rated: self.rated,
            released: self.released,
            runtime: self.runtime,
            genre: self.genre,
            director: self.director,
            writer: self.writer,
            actors: self.actors,
            plot: self.plot,
            language: self.language,
            country: self.country,
            awards: self.awards,
            ratings: self
                .ratings
                .into_iter()
                .map(|r| Rating {
                    source: r.source,
                    value: r.value,
                })
                .collect(),
            metascore: self.metascore,
            imdb_rating: self.imdb_rating,
            imdb_votes: self.imdb_votes,
            box_office: self.box_office.filter(|b| b != NOT_AVAILABLE),
        })
    }
}
