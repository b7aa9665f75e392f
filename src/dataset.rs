//! Movie Dataset
//!
//! The record shape the study stores: one movie per record, keyed by its
//! normalized title. Real data arrives through an external loader; this
//! module carries the record type, a seeded synthetic generator for
//! self-contained runs, and the popularity helpers the concurrent lookup
//! workload uses.

use crate::ident::normalize_title;
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movie {
    pub id: String,
    pub title: String,
    pub genres: String,
    pub language: String,
    pub release_date: String,
    pub popularity: f64,
    pub vote_average: f64,
    pub vote_count: u64,
}

const GENRES: [&str; 7] = [
    "Action", "Comedy", "Drama", "Horror", "Sci-Fi", "Romance", "Thriller",
];
const LANGUAGES: [&str; 6] = ["en", "es", "fr", "de", "ja", "ko"];

/// Synthetic movies as `(normalized_title, record)` pairs, the same shape
/// the external CSV loader hands over.
pub fn sample_dataset(count: usize, rng: &mut StdRng) -> Vec<(String, Value)> {
    (0..count)
        .map(|i| {
            let title = format!("Movie {i}");
            let movie = Movie {
                id: i.to_string(),
                title: title.clone(),
                genres: GENRES[rng.gen_range(0..GENRES.len())].to_string(),
                language: LANGUAGES[rng.gen_range(0..LANGUAGES.len())].to_string(),
                release_date: format!(
                    "{}-{:02}-{:02}",
                    rng.gen_range(1990..=2025),
                    rng.gen_range(1..=12),
                    rng.gen_range(1..=28)
                ),
                popularity: rng.gen_range(1.0..100.0),
                vote_average: rng.gen_range(1.0..10.0),
                vote_count: rng.gen_range(100..50_000),
            };
            let value = serde_json::to_value(&movie).unwrap_or(Value::Null);
            (normalize_title(&title), value)
        })
        .collect()
}

/// The `k` most popular titles of a dataset, most popular first.
pub fn popular_titles(records: &[(String, Value)], k: usize) -> Vec<String> {
    let mut ranked: Vec<(&String, f64)> = records
        .iter()
        .map(|(title, value)| (title, popularity_of(value)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.into_iter().take(k).map(|(t, _)| t.clone()).collect()
}

/// Popularity of a stored record; absent or malformed fields count as zero.
pub fn popularity_of(value: &Value) -> f64 {
    value
        .get("popularity")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}
