use crate::catalog::match_stage_name;
use crate::executor::{EntityCache, MoveTransport, StageSource};
use crate::model::{
    BackendStageRecord, EntityKind, StageRef, TransportError, CANONICAL_STAGES, SENTINEL_STAGE_ID,
};
use crate::storage::{load_store, save_store, CrmStore, Pipeline, StoreLocation};
use anyhow::Result;
use chrono::Utc;
use std::collections::HashSet;

/// The CRM behind the board, backed by the YAML store. Plays the role a
/// remote API plays for the executor: stage source, both move transports,
/// and the entity cache the executor invalidates.
pub struct LocalBackend {
    location: StoreLocation,
    store: CrmStore,
    stale: HashSet<EntityKind>,
}

impl LocalBackend {
    pub fn open(location: StoreLocation) -> Result<Self> {
        let store = load_store(&location)?;
        Ok(LocalBackend {
            location,
            store,
            stale: HashSet::new(),
        })
    }

    pub fn store(&self) -> &CrmStore {
        &self.store
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Refetch after an invalidation. Clears the stale marks.
    pub fn reload(&mut self) -> Result<()> {
        self.store = load_store(&self.location)?;
        self.stale.clear();
        Ok(())
    }

    pub fn is_stale(&self, kind: EntityKind) -> bool {
        self.stale.contains(&kind)
    }

    pub fn any_stale(&self) -> bool {
        !self.stale.is_empty()
    }

    fn persist(&mut self) -> Result<(), TransportError> {
        save_store(&self.location, &self.store)
            .map_err(|err| TransportError::Rejected(err.to_string()))
    }

    /// Create the default pipeline: one backend record per canonical stage.
    fn provision_pipeline(&mut self) {
        if self.store.pipeline.is_none() {
            let stages = CANONICAL_STAGES
                .iter()
                .enumerate()
                .map(|(idx, def)| BackendStageRecord {
                    id: idx as i64 + 1,
                    name: def.label.to_string(),
                })
                .collect();
            self.store.pipeline = Some(Pipeline { id: 1, stages });
        }
    }

    fn stage_by_id(&self, stage_id: i64) -> Option<&BackendStageRecord> {
        self.store
            .stage_records()
            .iter()
            .find(|r| r.id == stage_id)
    }

    fn stage_by_name(&self, name_hint: &str) -> Option<&BackendStageRecord> {
        let records = self.store.stage_records();
        records
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name_hint))
            .or_else(|| {
                let want = match_stage_name(name_hint)?;
                records
                    .iter()
                    .find(|r| match_stage_name(&r.name) == Some(want))
            })
    }
}

impl StageSource for LocalBackend {
    fn pipeline_stages(&mut self) -> Result<Vec<BackendStageRecord>, TransportError> {
        // An unconfigured CRM reports an empty stage list, not an error.
        Ok(self.store.stage_records().to_vec())
    }
}

impl MoveTransport for LocalBackend {
    fn move_lead_stage(
        &mut self,
        lead_id: &str,
        stage_id: i64,
        _key_hint: &str,
        name_hint: &str,
    ) -> Result<(), TransportError> {
        if !self.store.lead_moves_enabled {
            return Err(TransportError::EndpointMissing);
        }
        let lead_idx = self
            .store
            .leads
            .iter()
            .position(|l| l.id == lead_id)
            .ok_or_else(|| TransportError::Rejected(format!("lead {} not found", lead_id)))?;

        let record = if stage_id == SENTINEL_STAGE_ID {
            // Sentinel plus a name hint asks us to resolve or create the
            // stage by name.
            self.provision_pipeline();
            self.stage_by_name(name_hint).cloned().ok_or_else(|| {
                TransportError::Rejected(format!("unknown stage {}", name_hint))
            })?
        } else {
            if self.store.pipeline.is_none() {
                return Err(TransportError::NoPipeline);
            }
            self.stage_by_id(stage_id).cloned().ok_or_else(|| {
                TransportError::Rejected(format!("unknown stage id {}", stage_id))
            })?
        };

        let lead = &mut self.store.leads[lead_idx];
        lead.stage_id = Some(record.id);
        lead.stage_name = Some(record.name);
        lead.updated_at = Utc::now();
        self.persist()
    }

    fn update_lead_stage(&mut self, lead_id: &str, stage_id: i64) -> Result<(), TransportError> {
        let lead = self
            .store
            .leads
            .iter_mut()
            .find(|l| l.id == lead_id)
            .ok_or_else(|| TransportError::Rejected(format!("lead {} not found", lead_id)))?;
        // The generic update writes the id verbatim; a sentinel clears it.
        lead.stage_id = (stage_id != SENTINEL_STAGE_ID).then_some(stage_id);
        lead.updated_at = Utc::now();
        self.persist()
    }

    fn update_deal_stage(&mut self, deal_id: &str, stage_id: i64) -> Result<(), TransportError> {
        if self.store.pipeline.is_none() {
            return Err(TransportError::NoPipeline);
        }
        if self.stage_by_id(stage_id).is_none() {
            return Err(TransportError::Rejected(format!(
                "unknown stage id {}",
                stage_id
            )));
        }
        let deal = self
            .store
            .deals
            .iter_mut()
            .find(|d| d.id == deal_id)
            .ok_or_else(|| TransportError::Rejected(format!("deal {} not found", deal_id)))?;
        deal.stage = StageRef::Id(stage_id);
        deal.updated_at = Utc::now();
        self.persist()
    }
}

impl EntityCache for LocalBackend {
    fn invalidate(&mut self, kind: EntityKind) {
        self.stale.insert(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Lead;
    use crate::storage::StoreScope;

    fn backend_with(store: CrmStore) -> (LocalBackend, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let location = StoreLocation {
            path: tmp.path().join(".pipeboard/crm.yml"),
            scope: StoreScope::Project,
        };
        save_store(&location, &store).unwrap();
        (LocalBackend::open(location).unwrap(), tmp)
    }

    fn lead(id: &str) -> Lead {
        Lead {
            id: id.to_string(),
            name: format!("Lead {}", id),
            stage_id: None,
            stage_name: None,
            estimated_value: 100.0,
            assigned_to: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn sentinel_move_provisions_default_pipeline() {
        let (mut backend, _tmp) = backend_with(CrmStore {
            leads: vec![lead("l42")],
            ..Default::default()
        });
        backend
            .move_lead_stage("l42", SENTINEL_STAGE_ID, "qualified", "Qualified")
            .unwrap();

        let stages = backend.store().stage_records();
        assert_eq!(stages.len(), CANONICAL_STAGES.len());
        let moved = &backend.store().leads[0];
        assert_eq!(moved.stage_name.as_deref(), Some("Qualified"));
        assert!(moved.stage_id.is_some());
    }

    #[test]
    fn real_id_without_pipeline_reports_no_pipeline() {
        let (mut backend, _tmp) = backend_with(CrmStore {
            leads: vec![lead("l1")],
            ..Default::default()
        });
        assert_eq!(
            backend.move_lead_stage("l1", 3, "proposal", "Proposal"),
            Err(TransportError::NoPipeline)
        );
    }

    #[test]
    fn disabled_endpoint_reports_missing() {
        let (mut backend, _tmp) = backend_with(CrmStore {
            leads: vec![lead("l1")],
            lead_moves_enabled: false,
            ..Default::default()
        });
        assert_eq!(
            backend.move_lead_stage("l1", SENTINEL_STAGE_ID, "lead", "Lead"),
            Err(TransportError::EndpointMissing)
        );
    }

    #[test]
    fn generic_update_writes_id_and_clears_sentinel() {
        let (mut backend, _tmp) = backend_with(CrmStore {
            leads: vec![lead("l1")],
            ..Default::default()
        });
        backend.update_lead_stage("l1", 9).unwrap();
        assert_eq!(backend.store().leads[0].stage_id, Some(9));
        backend.update_lead_stage("l1", SENTINEL_STAGE_ID).unwrap();
        assert_eq!(backend.store().leads[0].stage_id, None);
    }

    #[test]
    fn deal_update_requires_known_stage() {
        let (mut backend, _tmp) = backend_with(CrmStore::default());
        assert_eq!(
            backend.update_deal_stage("d1", 3),
            Err(TransportError::NoPipeline)
        );
    }

    #[test]
    fn unprovisioned_store_move_flows_through_sentinel() {
        use crate::catalog::resolve_catalog;
        use crate::executor::{Notifier, TransitionExecutor};
        use crate::model::MoveIntent;
        use crate::projection::lead_stage_key;

        struct Collecting(Vec<String>, Vec<String>);
        impl Notifier for Collecting {
            fn success(&mut self, message: &str) {
                self.0.push(message.to_string());
            }
            fn error(&mut self, message: &str) {
                self.1.push(message.to_string());
            }
        }

        let (mut backend, _tmp) = backend_with(CrmStore {
            leads: vec![lead("42")],
            ..Default::default()
        });
        let catalog = resolve_catalog(backend.store().stage_records());
        let qualified = catalog.iter().find(|s| s.key == "qualified").unwrap();
        assert_eq!(qualified.id, None);

        let intent = MoveIntent::new(EntityKind::Lead, "42", qualified);
        let mut notify = Collecting(Vec::new(), Vec::new());
        let mut executor = TransitionExecutor::new();
        executor.execute(&intent, &mut backend, &mut notify).unwrap();

        assert!(backend.is_stale(EntityKind::Lead));
        backend.reload().unwrap();
        assert_eq!(
            backend.store().stage_records().len(),
            CANONICAL_STAGES.len()
        );
        let catalog = resolve_catalog(backend.store().stage_records());
        assert_eq!(lead_stage_key(&backend.store().leads[0], &catalog), "qualified");
        assert_eq!(notify.0, vec!["Moved lead to Qualified"]);
        assert!(notify.1.is_empty());
    }

    #[test]
    fn invalidation_marks_kind_stale_until_reload() {
        let (mut backend, _tmp) = backend_with(CrmStore::default());
        backend.invalidate(EntityKind::Lead);
        assert!(backend.is_stale(EntityKind::Lead));
        assert!(!backend.is_stale(EntityKind::Deal));
        backend.reload().unwrap();
        assert!(!backend.any_stale());
    }
}
