use crate::model::DropError;
use std::collections::{HashMap, HashSet};

/// Parent-link index of everything rendered on the board: stage columns are
/// roots, cards point at their column, nested elements point at their card.
/// Maintained alongside the rendered card list so drop resolution never has
/// to inspect layout geometry.
#[derive(Debug, Default, Clone)]
pub struct CardIndex {
    parents: HashMap<String, String>,
    stages: HashSet<String>,
}

const MAX_ANCESTOR_WALK: usize = 32;

impl CardIndex {
    pub fn new(stage_keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        CardIndex {
            parents: HashMap::new(),
            stages: stage_keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Register a card as living directly in a stage column.
    pub fn insert_card(&mut self, card_id: impl Into<String>, stage_key: impl Into<String>) {
        self.parents.insert(card_id.into(), stage_key.into());
    }

    /// Register an element nested inside another card (badges, handles).
    pub fn insert_child(&mut self, child_id: impl Into<String>, parent_id: impl Into<String>) {
        self.parents.insert(child_id.into(), parent_id.into());
    }

    pub fn stage_of(&self, card_id: &str) -> Option<&str> {
        let mut current = card_id;
        for _ in 0..MAX_ANCESTOR_WALK {
            if let Some(stage) = self.stages.get(current) {
                return Some(stage.as_str());
            }
            current = self.parents.get(current)?;
        }
        None
    }

    /// Interpret a completed drag gesture. `Ok(None)` means the card was
    /// dropped on itself (a no-op, not an error). Anything that does not
    /// chain up to a stage column is rejected rather than guessed at.
    pub fn resolve_drop(&self, dragged_id: &str, target_id: &str) -> Result<Option<String>, DropError> {
        if dragged_id == target_id {
            return Ok(None);
        }
        if self.stages.contains(target_id) {
            return Ok(Some(target_id.to_string()));
        }
        match self.stage_of(target_id) {
            Some(stage) => Ok(Some(stage.to_string())),
            None => Err(DropError::UnresolvedTarget(target_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CANONICAL_STAGES;

    fn board_index() -> CardIndex {
        let mut index = CardIndex::new(CANONICAL_STAGES.iter().map(|s| s.key));
        index.insert_card("lead-5", "lead");
        index.insert_card("deal-9", "negotiation");
        index.insert_card("deal-2", "qualified");
        index.insert_child("deal-9-badge", "deal-9");
        index
    }

    #[test]
    fn self_drop_is_a_noop() {
        let index = board_index();
        assert_eq!(index.resolve_drop("lead-5", "lead-5"), Ok(None));
    }

    #[test]
    fn drop_on_column_returns_its_key() {
        let index = board_index();
        assert_eq!(
            index.resolve_drop("lead-5", "qualified"),
            Ok(Some("qualified".to_string()))
        );
    }

    #[test]
    fn drop_on_card_resolves_enclosing_column() {
        let index = board_index();
        assert_eq!(
            index.resolve_drop("lead-5", "deal-9"),
            Ok(Some("negotiation".to_string()))
        );
    }

    #[test]
    fn drop_on_nested_element_walks_ancestors() {
        let index = board_index();
        assert_eq!(
            index.resolve_drop("lead-5", "deal-9-badge"),
            Ok(Some("negotiation".to_string()))
        );
    }

    #[test]
    fn unknown_target_is_rejected() {
        let index = board_index();
        assert_eq!(
            index.resolve_drop("lead-5", "garbage"),
            Err(DropError::UnresolvedTarget("garbage".to_string()))
        );
    }

    #[test]
    fn cyclic_parent_links_terminate() {
        let mut index = CardIndex::new(["lead"]);
        index.insert_child("a", "b");
        index.insert_child("b", "a");
        assert_eq!(
            index.resolve_drop("lead-5", "a"),
            Err(DropError::UnresolvedTarget("a".to_string()))
        );
    }
}
