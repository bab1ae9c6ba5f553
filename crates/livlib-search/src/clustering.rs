//! Runtime grouping of search results by dominant theme.
//!
//! Clusters are computed per request and never persisted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use livlib_core::{defaults, ScoredFragment, SearchCluster, TimeSpan};

use crate::advanced::{emotion_counts, theme_counts, LabelCount};

/// Id of the cluster for results without themes. Theme slugs never contain
/// an underscore, so no theme can claim it.
const UNTHEMED_CLUSTER_ID: &str = "cluster_general";

/// Clusters plus the results that did not join one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ClusteringResult {
    pub clusters: Vec<SearchCluster>,
    /// Unclustered results, in their original ranking order.
    pub individual_results: Vec<ScoredFragment>,
}

struct Bucket {
    /// Lowercased first theme, `None` for results without themes.
    key: Option<String>,
    label: String,
    members: Vec<usize>,
}

/// Group ranked results into theme clusters.
pub fn cluster_results(results: &[ScoredFragment]) -> ClusteringResult {
    if results.len() < defaults::CLUSTER_MIN_RESULTS {
        return ClusteringResult {
            clusters: vec![],
            individual_results: results.to_vec(),
        };
    }

    let mut buckets: Vec<Bucket> = Vec::new();
    let mut index: HashMap<Option<String>, usize> = HashMap::new();
    for (i, result) in results.iter().enumerate() {
        let theme = result
            .fragment
            .themes
            .first()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let key = theme.as_ref().map(|t| t.to_lowercase());
        let label = theme.unwrap_or_else(|| defaults::GENERAL_BUCKET.to_string());
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            buckets.push(Bucket {
                key,
                label,
                members: Vec::new(),
            });
            buckets.len() - 1
        });
        buckets[slot].members.push(i);
    }

    let mut clustered = vec![false; results.len()];
    let mut clusters = Vec::new();
    for bucket in &buckets {
        if bucket.members.len() < defaults::CLUSTER_MIN_MEMBERS {
            continue;
        }
        for &i in &bucket.members {
            clustered[i] = true;
        }
        let members: Vec<ScoredFragment> =
            bucket.members.iter().map(|&i| results[i].clone()).collect();
        clusters.push(build_cluster(bucket, members));
    }

    clusters.sort_by(|a, b| {
        b.significance
            .total_cmp(&a.significance)
            .then_with(|| b.fragments.len().cmp(&a.fragments.len()))
            .then_with(|| a.id.cmp(&b.id))
    });

    let individual_results = results
        .iter()
        .zip(clustered)
        .filter(|(_, in_cluster)| !in_cluster)
        .map(|(r, _)| r.clone())
        .collect();

    ClusteringResult {
        clusters,
        individual_results,
    }
}

fn build_cluster(bucket: &Bucket, members: Vec<ScoredFragment>) -> SearchCluster {
    let n = members.len();
    let common_themes = common_labels(theme_counts(&members));
    let common_emotions = common_labels(emotion_counts(&members));

    let title = if !common_themes.is_empty() {
        let top: Vec<&str> = common_themes.iter().take(2).map(String::as_str).collect();
        format!("{} Collection ({})", top.join(" & "), n)
    } else {
        format!("{} Collection ({})", capitalize(&bucket.label), n)
    };

    let description = if bucket.key.is_none() && common_themes.is_empty() {
        format!("{} fragments without a dominant theme", n)
    } else {
        let mut text = format!(
            "{} fragments exploring {}",
            n,
            common_themes
                .iter()
                .map(|t| t.to_lowercase())
                .collect::<Vec<_>>()
                .join(", ")
        );
        if !common_emotions.is_empty() {
            text.push_str(&format!(
                ", often with {}",
                common_emotions
                    .iter()
                    .map(|e| e.to_lowercase())
                    .collect::<Vec<_>>()
                    .join(" and ")
            ));
        }
        text
    };

    SearchCluster {
        id: match &bucket.key {
            Some(key) => format!("cluster-{}", slugify(key)),
            None => UNTHEMED_CLUSTER_ID.to_string(),
        },
        title,
        description,
        time_span: TimeSpan::covering(members.iter().map(|m| m.fragment.created_at_utc)),
        significance: significance(&members),
        common_themes,
        common_emotions,
        fragments: members,
    }
}

/// Labels present in at least two members, at most
/// `CLUSTER_COMMON_LIMIT` of them.
fn common_labels(counts: Vec<LabelCount>) -> Vec<String> {
    counts
        .into_iter()
        .filter(|c| c.count >= 2)
        .take(defaults::CLUSTER_COMMON_LIMIT)
        .map(|c| c.label)
        .collect()
}

/// Mean of a size factor and a theme-coherence factor.
fn significance(members: &[ScoredFragment]) -> f32 {
    let n = members.len() as f32;
    if n == 0.0 {
        return 0.0;
    }
    let size_factor = (n / defaults::CLUSTER_SIZE_SATURATION).min(1.0);

    let mut unique: Vec<String> = Vec::new();
    let mut total = 0usize;
    for member in members {
        for theme in &member.fragment.themes {
            total += 1;
            let key = theme.to_lowercase();
            if !unique.contains(&key) {
                unique.push(key);
            }
        }
    }
    let coherence = if unique.is_empty() {
        0.0
    } else {
        total as f32 / unique.len() as f32 / n
    };

    (size_factor + coherence) / 2.0
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use livlib_db::test_fixtures::FragmentFixture;
    use uuid::Uuid;

    fn result(owner: Uuid, themes: &[&str], emotions: &[&str], score: f32) -> ScoredFragment {
        ScoredFragment {
            fragment: FragmentFixture::new(owner)
                .themes(themes)
                .emotions(emotions)
                .ready_with(vec![1.0, 0.0])
                .build(),
            score,
        }
    }

    #[test]
    fn test_fewer_than_three_results_not_clustered() {
        let owner = Uuid::new_v4();
        let results = vec![
            result(owner, &["Family"], &[], 0.9),
            result(owner, &["Family"], &[], 0.8),
        ];
        let out = cluster_results(&results);
        assert!(out.clusters.is_empty());
        assert_eq!(out.individual_results.len(), 2);
    }

    #[test]
    fn test_two_sharing_theme_plus_one_unique() {
        let owner = Uuid::new_v4();
        let results = vec![
            result(owner, &["Travel"], &[], 0.9),
            result(owner, &["Career"], &[], 0.8),
            result(owner, &["Travel"], &[], 0.7),
        ];
        let out = cluster_results(&results);
        assert_eq!(out.clusters.len(), 1);
        assert_eq!(out.clusters[0].fragments.len(), 2);
        assert_eq!(out.individual_results.len(), 1);
        assert_eq!(
            out.individual_results[0].fragment.id,
            results[1].fragment.id
        );
    }

    #[test]
    fn test_common_themes_and_title() {
        let owner = Uuid::new_v4();
        let results = vec![
            result(owner, &["Family", "Loss"], &["Grief"], 0.9),
            result(owner, &["Family", "Loss"], &["Grief", "Love"], 0.8),
            result(owner, &["family", "Hope"], &["Love"], 0.7),
            result(owner, &["Family"], &[], 0.6),
        ];
        let out = cluster_results(&results);
        assert_eq!(out.clusters.len(), 1);
        let cluster = &out.clusters[0];
        assert_eq!(cluster.common_themes, vec!["Family", "Loss"]);
        assert_eq!(cluster.common_emotions, vec!["Grief", "Love"]);
        assert_eq!(cluster.title, "Family & Loss Collection (4)");
        assert_eq!(cluster.id, "cluster-family");
        assert!(cluster.description.starts_with("4 fragments exploring family, loss"));
    }

    #[test]
    fn test_general_bucket() {
        let owner = Uuid::new_v4();
        let results = vec![
            result(owner, &[], &[], 0.9),
            result(owner, &[], &[], 0.8),
            result(owner, &["Career"], &[], 0.7),
        ];
        let out = cluster_results(&results);
        assert_eq!(out.clusters.len(), 1);
        let cluster = &out.clusters[0];
        assert_eq!(cluster.id, "cluster_general");
        assert_eq!(cluster.title, "General Collection (2)");
        assert!(cluster.common_themes.is_empty());
        assert_eq!(cluster.significance, 0.1);
    }

    #[test]
    fn test_general_theme_is_not_the_unthemed_bucket() {
        let owner = Uuid::new_v4();
        let results = vec![
            result(owner, &["General"], &[], 0.9),
            result(owner, &[], &[], 0.8),
            result(owner, &["general"], &[], 0.7),
            result(owner, &[], &[], 0.6),
        ];
        let out = cluster_results(&results);
        let mut ids: Vec<&str> = out.clusters.iter().map(|c| c.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["cluster-general", "cluster_general"]);
        assert!(out.clusters.iter().all(|c| c.fragments.len() == 2));
    }

    #[test]
    fn test_significance_formula() {
        let owner = Uuid::new_v4();
        let results = vec![
            result(owner, &["Family", "Loss"], &[], 0.9),
            result(owner, &["Family", "Hope"], &[], 0.8),
            result(owner, &["Career"], &[], 0.7),
        ];
        let out = cluster_results(&results);
        // size 2/10 = 0.2, coherence 4 / 3 / 2
        let expected = (0.2 + 4.0 / 3.0 / 2.0) / 2.0;
        assert!((out.clusters[0].significance - expected).abs() < 1e-6);
    }

    #[test]
    fn test_clusters_ordered_by_significance_then_size() {
        let owner = Uuid::new_v4();
        let results = vec![
            result(owner, &["Work"], &[], 0.9),
            result(owner, &["Work"], &[], 0.9),
            result(owner, &["Work"], &[], 0.9),
            result(owner, &["Home", "Garden"], &[], 0.8),
            result(owner, &["Home", "Kitchen"], &[], 0.8),
        ];
        let out = cluster_results(&results);
        assert_eq!(out.clusters.len(), 2);
        // Work: (0.3 + 1.0) / 2 beats Home: (0.2 + 4/3/2) / 2
        assert_eq!(out.clusters[0].id, "cluster-work");
        assert_eq!(out.clusters[1].id, "cluster-home");
        assert!(out.individual_results.is_empty());
    }

    #[test]
    fn test_time_span_covers_members() {
        let owner = Uuid::new_v4();
        let now = Utc::now();
        let make = |days: i64| ScoredFragment {
            fragment: FragmentFixture::new(owner)
                .themes(&["Travel"])
                .created_at(now - Duration::days(days))
                .ready_with(vec![1.0])
                .build(),
            score: 0.5,
        };
        let results = vec![make(1), make(10), make(4)];
        let out = cluster_results(&results);
        let span = out.clusters[0].time_span.unwrap();
        assert_eq!(span.start, now - Duration::days(10));
        assert_eq!(span.end, now - Duration::days(1));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("daily life"), "daily-life");
        assert_eq!(slugify("  work / career "), "work-career");
        assert_eq!(slugify("été"), "été");
    }
}
