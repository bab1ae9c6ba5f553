//! Deterministic link rules evaluated between a source fragment and one
//! candidate.

use std::collections::HashSet;

use chrono::Duration;

use livlib_core::{Fragment, LinkType, NewLink};

/// Every rule link the pair qualifies for, in `LinkType` order.
pub fn evaluate_rules(source: &Fragment, candidate: &Fragment, window: Duration) -> Vec<NewLink> {
    let mut links = Vec::new();
    if candidate.id == source.id {
        return links;
    }

    if let Some(link) = shared_tag(source, candidate) {
        links.push(link);
    }
    if let Some(link) = same_timewindow(source, candidate, window) {
        links.push(link);
    }
    if let Some(link) = same_location(source, candidate) {
        links.push(link);
    }
    links
}

/// SHARED_TAG scored by the Jaccard index of the two tag sets.
fn shared_tag(source: &Fragment, candidate: &Fragment) -> Option<NewLink> {
    let a: HashSet<String> = source.tags.iter().map(|t| t.to_lowercase()).collect();
    let b: HashSet<String> = candidate.tags.iter().map(|t| t.to_lowercase()).collect();

    let mut shared: Vec<&String> = a.intersection(&b).collect();
    if shared.is_empty() {
        return None;
    }
    shared.sort();
    let union = a.union(&b).count();

    Some(NewLink {
        target_id: candidate.id,
        link_type: LinkType::SharedTag,
        score: shared.len() as f32 / union as f32,
        reason: format!(
            "Shared tags: {}",
            shared
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    })
}

/// SAME_TIMEWINDOW scored `1 - delta / window`.
fn same_timewindow(source: &Fragment, candidate: &Fragment, window: Duration) -> Option<NewLink> {
    if window <= Duration::zero() {
        return None;
    }
    let delta = (candidate.event_time() - source.event_time()).abs();
    if delta > window {
        return None;
    }

    let ratio = delta.num_seconds() as f64 / window.num_seconds().max(1) as f64;
    Some(NewLink {
        target_id: candidate.id,
        link_type: LinkType::SameTimewindow,
        score: (1.0 - ratio).clamp(0.0, 1.0) as f32,
        reason: describe_gap(delta),
    })
}

/// SAME_LOCATION on a case-insensitive trimmed match.
fn same_location(source: &Fragment, candidate: &Fragment) -> Option<NewLink> {
    let a = source.location.as_deref().map(str::trim).filter(|l| !l.is_empty())?;
    let b = candidate.location.as_deref().map(str::trim).filter(|l| !l.is_empty())?;
    if a.to_lowercase() != b.to_lowercase() {
        return None;
    }
    Some(NewLink {
        target_id: candidate.id,
        link_type: LinkType::SameLocation,
        score: 1.0,
        reason: format!("Both took place at {}", a),
    })
}

fn describe_gap(delta: Duration) -> String {
    let hours = delta.num_hours();
    if hours < 1 {
        "Happened at about the same time".to_string()
    } else if hours < 48 {
        format!("Happened {} hour{} apart", hours, if hours == 1 { "" } else { "s" })
    } else {
        format!("Happened {} days apart", delta.num_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use livlib_db::test_fixtures::FragmentFixture;
    use uuid::Uuid;

    fn week() -> Duration {
        Duration::days(7)
    }

    #[test]
    fn test_shared_tag_jaccard() {
        let owner = Uuid::new_v4();
        let long_ago = Utc::now() - Duration::days(400);
        let a = FragmentFixture::new(owner)
            .tags(&["beach", "summer", "family"])
            .build();
        let b = FragmentFixture::new(owner)
            .tags(&["summer", "family", "road-trip"])
            .event_at(long_ago)
            .build();

        let links = evaluate_rules(&a, &b, week());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].link_type, LinkType::SharedTag);
        assert!((links[0].score - 0.5).abs() < 1e-6);
        assert_eq!(links[0].reason, "Shared tags: family, summer");
    }

    #[test]
    fn test_timewindow_score_decays_linearly() {
        let owner = Uuid::new_v4();
        let now = Utc::now();
        let a = FragmentFixture::new(owner).event_at(now).build();
        let b = FragmentFixture::new(owner)
            .event_at(now - Duration::hours(42))
            .build();

        let links = evaluate_rules(&a, &b, week());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].link_type, LinkType::SameTimewindow);
        // 42h of a 168h window
        assert!((links[0].score - 0.75).abs() < 1e-6);
        assert_eq!(links[0].reason, "Happened 42 hours apart");
    }

    #[test]
    fn test_outside_window_no_link() {
        let owner = Uuid::new_v4();
        let now = Utc::now();
        let a = FragmentFixture::new(owner).event_at(now).build();
        let b = FragmentFixture::new(owner)
            .event_at(now + Duration::days(8))
            .build();
        assert!(evaluate_rules(&a, &b, week()).is_empty());
    }

    #[test]
    fn test_same_location_case_insensitive() {
        let owner = Uuid::new_v4();
        let long_ago = Utc::now() - Duration::days(400);
        let a = FragmentFixture::new(owner).location("  Lisbon ").build();
        let b = FragmentFixture::new(owner)
            .location("lisbon")
            .event_at(long_ago)
            .build();

        let links = evaluate_rules(&a, &b, week());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].link_type, LinkType::SameLocation);
        assert_eq!(links[0].score, 1.0);
        assert_eq!(links[0].reason, "Both took place at Lisbon");
    }

    #[test]
    fn test_all_rules_fire_in_order() {
        let owner = Uuid::new_v4();
        let now = Utc::now();
        let a = FragmentFixture::new(owner)
            .tags(&["harbour"])
            .location("Porto")
            .event_at(now)
            .build();
        let b = FragmentFixture::new(owner)
            .tags(&["harbour"])
            .location("PORTO")
            .event_at(now)
            .build();

        let types: Vec<LinkType> = evaluate_rules(&a, &b, week())
            .into_iter()
            .map(|l| l.link_type)
            .collect();
        assert_eq!(
            types,
            vec![
                LinkType::SharedTag,
                LinkType::SameTimewindow,
                LinkType::SameLocation
            ]
        );
    }

    #[test]
    fn test_self_never_linked() {
        let a = FragmentFixture::new(Uuid::new_v4()).tags(&["x"]).build();
        assert!(evaluate_rules(&a, &a, week()).is_empty());
    }

    #[test]
    fn test_gap_descriptions() {
        assert_eq!(describe_gap(Duration::minutes(5)), "Happened at about the same time");
        assert_eq!(describe_gap(Duration::hours(1)), "Happened 1 hour apart");
        assert_eq!(describe_gap(Duration::days(3)), "Happened 3 days apart");
    }
}
