use crate::domain::catalog::{Category, CategoryId};
use std::collections::{BTreeSet, HashSet};

/// How many of the child's latest boxes count as "recent".
pub const RECENT_BOX_WINDOW: usize = 3;
/// Multiplier applied to categories the child saw recently.
pub const REPETITION_PENALTY: f64 = 0.3;

/// Overlap between a child's tags and a category's tags, in `[0, 1]`.
///
/// Each side contributes `|child ∩ category| / |category|`. A side where the
/// category has no tags is left out of the average.
pub fn score_category(
    interests: &BTreeSet<String>,
    skills: &BTreeSet<String>,
    category: &Category,
) -> f64 {
    let terms: Vec<f64> = [(interests, &category.interests), (skills, &category.skills)]
        .into_iter()
        .filter(|(_, category_tags)| !category_tags.is_empty())
        .map(|(child_tags, category_tags)| {
            let shared = child_tags.intersection(category_tags).count();
            shared as f64 / category_tags.len() as f64
        })
        .collect();

    if terms.is_empty() {
        0.0
    } else {
        terms.iter().sum::<f64>() / terms.len() as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedCategory {
    pub category_id: CategoryId,
    pub score: f64,
    pub recent: bool,
}

/// Scores every category and sorts by penalized score, best first.
///
/// Ties go to non-recent categories, then to catalog order.
pub fn rank_categories(
    interests: &BTreeSet<String>,
    skills: &BTreeSet<String>,
    categories: &[Category],
    recent: &HashSet<CategoryId>,
) -> Vec<RankedCategory> {
    let mut ranked: Vec<(usize, RankedCategory)> = categories
        .iter()
        .enumerate()
        .map(|(position, category)| {
            let is_recent = recent.contains(&category.id);
            let mut score = score_category(interests, skills, category);
            if is_recent {
                score *= REPETITION_PENALTY;
            }
            (
                position,
                RankedCategory {
                    category_id: category.id,
                    score,
                    recent: is_recent,
                },
            )
        })
        .collect();

    ranked.sort_by(|(pos_a, a), (pos_b, b)| {
        b.score
            .total_cmp(&a.score)
            .then(a.recent.cmp(&b.recent))
            .then(pos_a.cmp(pos_b))
    });

    ranked.into_iter().map(|(_, category)| category).collect()
}
