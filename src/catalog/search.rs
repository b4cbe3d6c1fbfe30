//! Component search
//!
//! Simple weighted substring matching. The catalog holds at most a few hundred
//! components, so every query scans all of them.

use serde::Serialize;

use super::models::ComponentMetadata;

const SCORE_EXACT_NAME: u32 = 100;
const SCORE_NAME: u32 = 50;
const SCORE_DESCRIPTION: u32 = 20;
const SCORE_FEATURE: u32 = 10;
const SCORE_CATEGORY: u32 = 10;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    pub name: String,
    pub category: String,
    pub description: String,
    pub score: u32,
}

pub(super) fn score(component: &ComponentMetadata, needle: &str) -> u32 {
    let name = component.name.to_lowercase();
    let mut score = 0;
    if name == needle {
        score += SCORE_EXACT_NAME;
    } else if name.contains(needle) {
        score += SCORE_NAME;
    }
    if component.description.to_lowercase().contains(needle) {
        score += SCORE_DESCRIPTION;
    }
    if component
        .features
        .iter()
        .any(|f| f.to_lowercase().contains(needle))
    {
        score += SCORE_FEATURE;
    }
    if component.category.to_lowercase().contains(needle) {
        score += SCORE_CATEGORY;
    }
    score
}

/// Ranks components by score, best first, ties broken by name.
pub(super) fn rank<'a>(
    components: impl Iterator<Item = &'a ComponentMetadata>,
    query: &str,
    limit: usize,
) -> Vec<SearchHit> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<SearchHit> = components
        .filter_map(|c| {
            let score = score(c, &needle);
            (score > 0).then(|| SearchHit {
                name: c.name.clone(),
                category: c.category.clone(),
                description: c.description.clone(),
                score,
            })
        })
        .collect();
    hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
    hits.truncate(limit);
    hits
}
