use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

/// Value the metadata API uses for absent fields, posters included
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovieKind {
    Movie,
    Series,
    Episode,
}

impl MovieKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovieKind::Movie => "movie",
            MovieKind::Series => "series",
            MovieKind::Episode => "episode",
        }
    }
}

impl Display for MovieKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MovieKind {
    type Err = std::convert::Infallible;

    /// Unknown kinds (the upstream also reports "game") fold into `Movie`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "series" => MovieKind::Series,
            "episode" => MovieKind::Episode,
            _ => MovieKind::Movie,
        })
    }
}

/// A title as returned by a metadata search. Identity is `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MovieReference {
    pub id: String,
    pub title: String,
    pub year: String,
    pub poster_url: String,
    pub kind: MovieKind,
}

impl MovieReference {
    pub fn has_poster(&self) -> bool {
        !self.poster_url.is_empty() && self.poster_url != NOT_AVAILABLE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rating {
    pub source: String,
    pub value: String,
}

/// Full detail record for a single title
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MovieDetails {
    #[serde(flatten)]
    pub summary: MovieReference,
    pub rated: String,
    pub released: String,
    pub runtime: String,
    pub genre: String,
    pub director: String,
    pub writer: String,
    pub actors: String,
    pub plot: String,
    pub language: String,
    pub country: String,
    pub awards: String,
    pub ratings: Vec<Rating>,
    pub metascore: String,
    pub imdb_rating: String,
    pub imdb_votes: String,
    pub box_office: Option<String>,
}

/// One page of search results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SearchPage {
    pub results: Vec<MovieReference>,
    pub total_count: u32,
}

impl SearchPage {
    pub fn empty() -> Self {
        Self::default()
    }
}
