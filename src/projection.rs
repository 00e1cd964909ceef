use crate::catalog::match_stage_name;
use crate::model::{BoardStage, Deal, Lead, StageRef, CANONICAL_STAGES};

/// Active board filters, intersected before any stage partitioning.
#[derive(Debug, Clone, Default)]
pub struct BoardFilters {
    pub search: Option<String>,
    pub owner: Option<String>,
    pub stage: Option<String>,
}

impl BoardFilters {
    fn admits_deal(&self, deal: &Deal) -> bool {
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            if !deal.title.to_lowercase().contains(&needle)
                && !deal.customer_name.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        self.admits_owner(deal.assigned_to.as_deref())
    }

    fn admits_lead(&self, lead: &Lead) -> bool {
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            if !lead.name.to_lowercase().contains(&needle) {
                return false;
            }
        }
        self.admits_owner(lead.assigned_to.as_deref())
    }

    fn admits_owner(&self, assigned_to: Option<&str>) -> bool {
        match &self.owner {
            Some(owner) => assigned_to
                .map(|a| a.to_lowercase().contains(&owner.to_lowercase()))
                .unwrap_or(false),
            None => true,
        }
    }

    fn admits_stage(&self, stage: &BoardStage) -> bool {
        match &self.stage {
            Some(filter) => filter.trim().to_lowercase() == stage.key,
            None => true,
        }
    }
}

/// The cards belonging to one stage column.
#[derive(Debug, Default)]
pub struct StageCards<'a> {
    pub deals: Vec<&'a Deal>,
    pub leads: Vec<&'a Lead>,
}

impl StageCards<'_> {
    pub fn len(&self) -> usize {
        self.deals.len() + self.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deals.is_empty() && self.leads.is_empty()
    }

    pub fn total_value(&self) -> f64 {
        self.deals.iter().map(|d| d.value).sum::<f64>()
            + self.leads.iter().map(|l| l.estimated_value).sum::<f64>()
    }
}

/// Pure projection of the entity lists onto one stage column. Rebuilt in
/// full whenever the entity lists, the catalog, or the filters change.
pub fn project<'a>(
    deals: &'a [Deal],
    leads: &'a [Lead],
    stage: &BoardStage,
    catalog: &[BoardStage],
    filters: &BoardFilters,
) -> StageCards<'a> {
    if !filters.admits_stage(stage) {
        return StageCards::default();
    }
    StageCards {
        deals: deals
            .iter()
            .filter(|d| filters.admits_deal(d) && deal_in_stage(d, stage))
            .collect(),
        leads: leads
            .iter()
            .filter(|l| filters.admits_lead(l) && lead_stage_key(l, catalog) == stage.key)
            .collect(),
    }
}

/// Whether a deal belongs to a stage column. The stored stage may be a
/// backend id or a free-text key; both are tolerated.
pub fn deal_in_stage(deal: &Deal, stage: &BoardStage) -> bool {
    match &deal.stage {
        StageRef::Id(id) => stage.id == Some(*id),
        StageRef::Key(raw) => {
            let key = raw.trim().to_lowercase();
            if key == stage.key || key.contains(stage.key) || stage.key.contains(key.as_str()) {
                return true;
            }
            // Freeform drift ("Negotiating") falls through to the shared
            // stage-name matcher.
            match_stage_name(&key)
                .map(|idx| CANONICAL_STAGES[idx].key == stage.key)
                .unwrap_or(false)
        }
    }
}

/// The single stage column a lead lives in. Stage id wins, then the
/// free-text stage name, then the canonical first stage. Always returns a
/// canonical key, so every lead is in exactly one column.
pub fn lead_stage_key(lead: &Lead, catalog: &[BoardStage]) -> &'static str {
    if let Some(id) = lead.stage_id {
        if let Some(stage) = catalog.iter().find(|s| s.id == Some(id)) {
            return stage.key;
        }
        return "lead";
    }
    if let Some(name) = lead.stage_name.as_deref() {
        let needle = name.trim().to_lowercase();
        if needle.contains("lead") || needle == "new" {
            return "lead";
        }
        for stage in catalog {
            let label = stage.label.to_lowercase();
            if needle == label || needle.contains(&label) || label.contains(&needle) {
                return stage.key;
            }
        }
        if let Some(idx) = match_stage_name(&needle) {
            return CANONICAL_STAGES[idx].key;
        }
    }
    "lead"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::resolve_catalog;
    use crate::model::BackendStageRecord;
    use chrono::Utc;

    fn deal(id: &str, stage: StageRef, title: &str, owner: Option<&str>) -> Deal {
        Deal {
            id: id.to_string(),
            title: title.to_string(),
            stage,
            value: 1000.0,
            probability: 50,
            customer_name: "Acme".to_string(),
            assigned_to: owner.map(|o| o.to_string()),
            expected_close: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn lead(id: &str, stage_id: Option<i64>, stage_name: Option<&str>) -> Lead {
        Lead {
            id: id.to_string(),
            name: format!("Lead {}", id),
            stage_id,
            stage_name: stage_name.map(|n| n.to_string()),
            estimated_value: 500.0,
            assigned_to: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn catalog_with(backend: &[(i64, &str)]) -> Vec<BoardStage> {
        let records: Vec<BackendStageRecord> = backend
            .iter()
            .map(|(id, name)| BackendStageRecord {
                id: *id,
                name: name.to_string(),
            })
            .collect();
        resolve_catalog(&records)
    }

    #[test]
    fn deal_matches_by_key_id_or_drift() {
        let catalog = catalog_with(&[(7, "Negotiating")]);
        let negotiation = &catalog[3];
        assert!(deal_in_stage(
            &deal("d1", StageRef::Key("negotiation".into()), "t", None),
            negotiation
        ));
        assert!(deal_in_stage(
            &deal("d2", StageRef::Id(7), "t", None),
            negotiation
        ));
        assert!(deal_in_stage(
            &deal("d3", StageRef::Key("Negotiating".into()), "t", None),
            negotiation
        ));
        assert!(!deal_in_stage(
            &deal("d4", StageRef::Key("qualified".into()), "t", None),
            negotiation
        ));
    }

    #[test]
    fn every_lead_lands_in_exactly_one_column() {
        let catalog = catalog_with(&[(1, "Lead"), (2, "Qualified"), (7, "Negotiating")]);
        let leads = vec![
            lead("l1", None, None),
            lead("l2", Some(2), None),
            lead("l3", Some(7), None),
            lead("l4", None, Some("New")),
            lead("l5", None, Some("Qualified")),
            lead("l6", None, Some("Negotiating")),
            lead("l7", Some(999), None),
            lead("l8", None, Some("totally unknown")),
        ];
        for l in &leads {
            let homes: Vec<&str> = catalog
                .iter()
                .filter(|s| lead_stage_key(l, &catalog) == s.key)
                .map(|s| s.key)
                .collect();
            assert_eq!(homes.len(), 1, "lead {} is in {:?}", l.id, homes);
        }
        assert_eq!(lead_stage_key(&leads[0], &catalog), "lead");
        assert_eq!(lead_stage_key(&leads[1], &catalog), "qualified");
        assert_eq!(lead_stage_key(&leads[2], &catalog), "negotiation");
        assert_eq!(lead_stage_key(&leads[3], &catalog), "lead");
        assert_eq!(lead_stage_key(&leads[6], &catalog), "lead");
        assert_eq!(lead_stage_key(&leads[7], &catalog), "lead");
    }

    #[test]
    fn filters_are_applied_before_partitioning() {
        let catalog = catalog_with(&[]);
        let deals = vec![
            deal("d1", StageRef::Key("lead".into()), "Website revamp", Some("Ana")),
            deal("d2", StageRef::Key("lead".into()), "Data platform", Some("Bo")),
        ];
        let leads = vec![lead("l1", None, None)];

        let filters = BoardFilters {
            search: Some("website".into()),
            ..Default::default()
        };
        let cards = project(&deals, &leads, &catalog[0], &catalog, &filters);
        assert_eq!(cards.deals.len(), 1);
        assert_eq!(cards.deals[0].id, "d1");
        assert!(cards.leads.is_empty());

        let filters = BoardFilters {
            owner: Some("bo".into()),
            ..Default::default()
        };
        let cards = project(&deals, &leads, &catalog[0], &catalog, &filters);
        assert_eq!(cards.deals.len(), 1);
        assert_eq!(cards.deals[0].id, "d2");
    }

    #[test]
    fn stage_filter_empties_other_columns() {
        let catalog = catalog_with(&[]);
        let deals = vec![deal("d1", StageRef::Key("qualified".into()), "t", None)];
        let leads = vec![lead("l1", None, None)];
        let filters = BoardFilters {
            stage: Some("qualified".into()),
            ..Default::default()
        };
        let qualified = project(&deals, &leads, &catalog[1], &catalog, &filters);
        assert_eq!(qualified.deals.len(), 1);
        let lead_col = project(&deals, &leads, &catalog[0], &catalog, &filters);
        assert!(lead_col.is_empty());
    }

    #[test]
    fn stage_cards_value_summary() {
        let catalog = catalog_with(&[]);
        let deals = vec![deal("d1", StageRef::Key("lead".into()), "t", None)];
        let leads = vec![lead("l1", None, None)];
        let cards = project(&deals, &leads, &catalog[0], &catalog, &BoardFilters::default());
        assert_eq!(cards.len(), 2);
        assert_eq!(cards.total_value(), 1500.0);
    }
}
