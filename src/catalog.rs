use crate::model::{BackendStageRecord, BoardStage, CANONICAL_STAGES};

/// Merge the fixed canonical stage list with whatever stage records the
/// backend currently reports. The output always has the canonical length and
/// order: backend records enrich existing columns with an id and a display
/// label, they never add or remove columns.
pub fn resolve_catalog(backend: &[BackendStageRecord]) -> Vec<BoardStage> {
    let mut stages: Vec<BoardStage> = CANONICAL_STAGES
        .iter()
        .map(|def| BoardStage {
            key: def.key,
            label: def.label.to_string(),
            color: def.color,
            id: None,
        })
        .collect();

    for (idx, record) in backend.iter().enumerate() {
        match match_stage_name(&record.name) {
            Some(slot) => {
                stages[slot].id = Some(record.id);
                stages[slot].label = record.name.clone();
            }
            None => {
                // Positional pairing, clamped to the canonical range. A
                // record whose clamped slot is already claimed is dropped.
                let slot = idx.min(stages.len() - 1);
                if stages[slot].id.is_none() {
                    stages[slot].id = Some(record.id);
                    stages[slot].label = record.name.clone();
                }
            }
        }
    }
    stages
}

/// Best canonical match for a free-text backend stage name: case-insensitive
/// exact equality against key or label, then substring containment in either
/// direction, then a shared-prefix stem so inflected names ("Negotiating")
/// still pair with their stage ("negotiation").
pub fn match_stage_name(name: &str) -> Option<usize> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    for (idx, def) in CANONICAL_STAGES.iter().enumerate() {
        if needle == def.key || needle == def.label.to_lowercase() {
            return Some(idx);
        }
    }

    for (idx, def) in CANONICAL_STAGES.iter().enumerate() {
        let label = def.label.to_lowercase();
        if contains_either(&needle, def.key) || contains_either(&needle, &label) {
            return Some(idx);
        }
    }

    let mut best: Option<(usize, usize)> = None;
    for (idx, def) in CANONICAL_STAGES.iter().enumerate() {
        let len = common_prefix_len(&needle, def.key)
            .max(common_prefix_len(&needle, &def.label.to_lowercase()));
        if len >= MIN_STEM_LEN && best.map_or(true, |(_, b)| len > b) {
            best = Some((idx, len));
        }
    }
    best.map(|(idx, _)| idx)
}

const MIN_STEM_LEN: usize = 4;

fn contains_either(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a)
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count()
}
