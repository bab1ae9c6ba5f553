//! Advanced search: hybrid results enriched with clusters, refinement
//! suggestions and result analytics.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use livlib_core::{defaults, ScoredFragment, SearchCluster, TimeSpan};

use crate::hybrid::RetrievalMode;

/// Maximum refinement suggestions returned.
pub const MAX_SUGGESTIONS: usize = 5;

/// What to compute alongside the ranked results.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AdvancedSearchOptions {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default = "default_true")]
    pub include_clusters: bool,
    #[serde(default = "default_true")]
    pub include_suggestions: bool,
    #[serde(default = "default_true")]
    pub include_analytics: bool,
}

fn default_limit() -> i64 {
    defaults::PAGE_LIMIT_SEARCH
}

fn default_true() -> bool {
    true
}

impl Default for AdvancedSearchOptions {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            include_clusters: true,
            include_suggestions: true,
            include_analytics: true,
        }
    }
}

/// A label and how many results carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

/// Summary statistics over a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SearchAnalytics {
    pub result_count: usize,
    pub theme_distribution: Vec<LabelCount>,
    pub emotion_distribution: Vec<LabelCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<TimeSpan>,
    pub mean_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AdvancedSearchResponse {
    pub query: String,
    pub results: Vec<ScoredFragment>,
    pub clusters: Vec<SearchCluster>,
    /// Results not assigned to any cluster.
    pub individual_results: Vec<ScoredFragment>,
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics: Option<SearchAnalytics>,
    pub mode: RetrievalMode,
    pub warnings: Vec<String>,
}

/// Count labels across label lists, most frequent first, ties by first
/// appearance. Matching is case-insensitive and each list counts a label at
/// most once; the first spelling seen is reported.
pub fn label_counts<'a>(lists: impl IntoIterator<Item = &'a [String]>) -> Vec<LabelCount> {
    let mut counts: Vec<LabelCount> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for list in lists {
        let mut seen_here: Vec<String> = Vec::new();
        for label in list {
            let key = label.to_lowercase();
            if seen_here.contains(&key) {
                continue;
            }
            seen_here.push(key.clone());
            match index.get(&key) {
                Some(&slot) => counts[slot].count += 1,
                None => {
                    index.insert(key, counts.len());
                    counts.push(LabelCount {
                        label: label.clone(),
                        count: 1,
                    });
                }
            }
        }
    }
    // stable sort keeps first-appearance order among equal counts
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

pub(crate) fn theme_counts(results: &[ScoredFragment]) -> Vec<LabelCount> {
    label_counts(results.iter().map(|r| r.fragment.themes.as_slice()))
}

pub(crate) fn emotion_counts(results: &[ScoredFragment]) -> Vec<LabelCount> {
    label_counts(results.iter().map(|r| r.fragment.emotions.as_slice()))
}

/// Themes and emotions found in the results that the query does not
/// already mention.
pub fn suggest_refinements(query: &str, results: &[ScoredFragment]) -> Vec<String> {
    let query = query.to_lowercase();
    let mut suggestions: Vec<String> = Vec::new();

    let themes = theme_counts(results);
    let emotions = emotion_counts(results);

    for candidate in themes.into_iter().chain(emotions) {
        let key = candidate.label.to_lowercase();
        let already = suggestions.iter().any(|s| s.to_lowercase() == key);
        if already || query.contains(&key) {
            continue;
        }
        suggestions.push(candidate.label);
        if suggestions.len() == MAX_SUGGESTIONS {
            break;
        }
    }
    suggestions
}

pub fn compute_analytics(results: &[ScoredFragment]) -> SearchAnalytics {
    let mean_score = if results.is_empty() {
        0.0
    } else {
        results.iter().map(|r| r.score).sum::<f32>() / results.len() as f32
    };

    SearchAnalytics {
        result_count: results.len(),
        theme_distribution: theme_counts(results),
        emotion_distribution: emotion_counts(results),
        date_range: TimeSpan::covering(results.iter().map(|r| r.fragment.created_at_utc)),
        mean_score,
    }
}
