use std::collections::HashMap;

use crate::models::Passage;
use crate::search::vector::VectorHit;

/// Merge the hit lists of several query variants into one ranking.
///
/// Pipeline:
/// 1. Walk the lists in variant order, keeping the first-seen position of each
///    distinct chunk text.
/// 2. A text retrieved by more than one variant keeps its highest score.
/// 3. Stable sort by score, descending, so ties stay in first-seen order.
/// 4. Keep the top `top_k`.
pub fn merge_variant_hits(variant_hits: &[Vec<VectorHit>], top_k: usize) -> Vec<Passage> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut merged: Vec<Passage> = Vec::new();

    for hit in variant_hits.iter().flatten() {
        match positions.get(hit.text.as_str()) {
            Some(&pos) => {
                let existing = &mut merged[pos];
                if hit.score > existing.score {
                    existing.score = hit.score;
                    existing.source = hit.source.clone();
                }
            }
            None => {
                positions.insert(hit.text.as_str(), merged.len());
                merged.push(Passage {
                    text: hit.text.clone(),
                    source: hit.source.clone(),
                    score: hit.score,
                });
            }
        }
    }

    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(top_k);
    merged
}
