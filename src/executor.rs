use crate::catalog::match_stage_name;
use crate::model::{
    canonical_index, canonical_stage, BackendStageRecord, EntityId, EntityKind, MoveError,
    MoveIntent, SENTINEL_STAGE_ID,
};
use std::collections::HashSet;

/// Source of the current backend stage records.
pub trait StageSource {
    fn pipeline_stages(&mut self) -> Result<Vec<BackendStageRecord>, crate::model::TransportError>;
}

/// The two move transports plus the deal update path. The dedicated lead
/// move carries the canonical key and stage name as hints so the backend can
/// provision a missing pipeline; the update calls set the stage id directly.
pub trait MoveTransport {
    fn move_lead_stage(
        &mut self,
        lead_id: &str,
        stage_id: i64,
        key_hint: &str,
        name_hint: &str,
    ) -> Result<(), crate::model::TransportError>;

    fn update_lead_stage(
        &mut self,
        lead_id: &str,
        stage_id: i64,
    ) -> Result<(), crate::model::TransportError>;

    fn update_deal_stage(
        &mut self,
        deal_id: &str,
        stage_id: i64,
    ) -> Result<(), crate::model::TransportError>;
}

/// Owned by the surrounding data layer; the executor only ever signals
/// "refetch", it never mutates cached entities in place.
pub trait EntityCache {
    fn invalidate(&mut self, kind: EntityKind);
}

/// User-visible toast surface.
pub trait Notifier {
    fn success(&mut self, message: &str);
    fn error(&mut self, message: &str);
}

/// Executes move intents against the transports, one fallback at most,
/// with a per-entity in-flight guard. Every exit path ends in a
/// notification; the cache is invalidated exactly once on success and never
/// on failure.
#[derive(Debug, Default)]
pub struct TransitionExecutor {
    in_flight: HashSet<(EntityKind, EntityId)>,
}

impl TransitionExecutor {
    pub fn new() -> Self {
        TransitionExecutor::default()
    }

    pub fn is_in_flight(&self, kind: EntityKind, entity_id: &str) -> bool {
        self.in_flight
            .contains(&(kind, entity_id.to_string()))
    }

    pub fn execute<B, N>(
        &mut self,
        intent: &MoveIntent,
        backend: &mut B,
        notify: &mut N,
    ) -> Result<(), MoveError>
    where
        B: StageSource + MoveTransport + EntityCache,
        N: Notifier,
    {
        let guard = (intent.kind, intent.entity_id.clone());
        if !self.in_flight.insert(guard.clone()) {
            let err = MoveError::MoveInFlight(intent.kind);
            notify.error(&err.to_string());
            return Err(err);
        }
        let result = self.run(intent, backend);
        self.in_flight.remove(&guard);

        match &result {
            Ok(destination) => {
                backend.invalidate(intent.kind);
                notify.success(&format!(
                    "Moved {} to {}",
                    intent.kind.label(),
                    destination
                ));
            }
            Err(err) => notify.error(&err.to_string()),
        }
        result.map(|_| ())
    }

    fn run<B>(&mut self, intent: &MoveIntent, backend: &mut B) -> Result<String, MoveError>
    where
        B: StageSource + MoveTransport,
    {
        let stage = canonical_stage(&intent.target_key)
            .ok_or_else(|| MoveError::UnknownStage(intent.target_key.clone()))?;

        let resolved = match intent.target_id {
            Some(id) => Some(id),
            None => lookup_stage_id(&intent.target_key, backend),
        };

        match intent.kind {
            EntityKind::Deal => {
                // Deals never carry the sentinel: a move without a real
                // backend stage id would corrupt reporting aggregates.
                let stage_id = resolved
                    .ok_or_else(|| MoveError::UnresolvedStage(intent.target_key.clone()))?;
                backend
                    .update_deal_stage(&intent.entity_id, stage_id)
                    .map_err(MoveError::Transport)?;
            }
            EntityKind::Lead => {
                let stage_id = resolved.unwrap_or(SENTINEL_STAGE_ID);
                match backend.move_lead_stage(
                    &intent.entity_id,
                    stage_id,
                    &intent.target_key,
                    stage.label,
                ) {
                    Ok(()) => {}
                    Err(err) if err.is_recoverable() => {
                        backend
                            .update_lead_stage(&intent.entity_id, stage_id)
                            .map_err(MoveError::Transport)?;
                    }
                    Err(err) => return Err(MoveError::Transport(err)),
                }
            }
        }
        Ok(stage.label.to_string())
    }
}

/// Remote lookup of the target stage's backend id, using the same fuzzy
/// matcher as the catalog merge. A failed fetch resolves to nothing rather
/// than aborting the move.
fn lookup_stage_id<S: StageSource>(target_key: &str, backend: &mut S) -> Option<i64> {
    let want = canonical_index(target_key)?;
    let records = backend.pipeline_stages().ok()?;
    records
        .iter()
        .find(|r| match_stage_name(&r.name) == Some(want))
        .map(|r| r.id)
}
