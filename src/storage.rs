use crate::model::{BackendStageRecord, Deal, Lead};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScope {
    Project,
    Global,
}

#[derive(Debug, Clone)]
pub struct StoreLocation {
    pub path: PathBuf,
    pub scope: StoreScope,
}

/// On-disk CRM state. The pipeline is optional on purpose: a fresh store has
/// no stage records at all, which is exactly the unprovisioned-backend case
/// the board has to tolerate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmStore {
    pub pipeline: Option<Pipeline>,
    #[serde(default)]
    pub deals: Vec<Deal>,
    #[serde(default)]
    pub leads: Vec<Lead>,
    /// When false the dedicated lead-move endpoint reports itself missing,
    /// mimicking an older backend that only has the generic update path.
    #[serde(default = "default_true")]
    pub lead_moves_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: i64,
    pub stages: Vec<BackendStageRecord>,
}

fn default_true() -> bool {
    true
}

impl Default for CrmStore {
    fn default() -> Self {
        CrmStore {
            pipeline: None,
            deals: Vec::new(),
            leads: Vec::new(),
            lead_moves_enabled: true,
        }
    }
}

impl CrmStore {
    pub fn stage_records(&self) -> &[BackendStageRecord] {
        self.pipeline
            .as_ref()
            .map(|p| p.stages.as_slice())
            .unwrap_or(&[])
    }
}

pub fn init_project_store() -> Result<StoreLocation> {
    let cwd = env::current_dir()?;
    let dir = cwd.join(".pipeboard");
    fs::create_dir_all(&dir).context("failed to create .pipeboard directory")?;
    let path = dir.join("crm.yml");
    let location = StoreLocation {
        path: path.clone(),
        scope: StoreScope::Project,
    };
    if !path.exists() {
        save_store(&location, &CrmStore::default())?;
    }
    Ok(location)
}

pub fn locate_store(start: &Path) -> Result<StoreLocation> {
    if let Some(project_path) = find_project_store(start) {
        return Ok(StoreLocation {
            path: project_path,
            scope: StoreScope::Project,
        });
    }
    let global_path = global_store_path()?;
    Ok(StoreLocation {
        path: global_path,
        scope: StoreScope::Global,
    })
}

pub fn load_store(location: &StoreLocation) -> Result<CrmStore> {
    if location.path.exists() {
        let data = fs::read_to_string(&location.path)
            .with_context(|| format!("reading {:?}", location.path))?;
        let store: CrmStore = serde_yaml::from_str(&data).context("parsing store file")?;
        Ok(store)
    } else {
        let store = CrmStore::default();
        save_store(location, &store)?;
        Ok(store)
    }
}

pub fn save_store(location: &StoreLocation, store: &CrmStore) -> Result<()> {
    if let Some(parent) = location.path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let serialized = serde_yaml::to_string(store).context("serializing store")?;
    fs::write(&location.path, serialized)
        .with_context(|| format!("writing {:?}", location.path))?;
    Ok(())
}

fn find_project_store(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        let candidate = current.join(".pipeboard/crm.yml");
        if candidate.exists() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

fn global_store_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "pipeboard").context("locating data directory")?;
    Ok(dirs.data_dir().join("crm.yml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StageRef;
    use chrono::Utc;

    #[test]
    fn store_round_trips_through_yaml() {
        let tmp = tempfile::tempdir().unwrap();
        let location = StoreLocation {
            path: tmp.path().join(".pipeboard/crm.yml"),
            scope: StoreScope::Project,
        };
        let now = Utc::now();
        let store = CrmStore {
            pipeline: Some(Pipeline {
                id: 1,
                stages: vec![BackendStageRecord {
                    id: 7,
                    name: "Negotiating".to_string(),
                }],
            }),
            deals: vec![Deal {
                id: "d1".to_string(),
                title: "Big deal".to_string(),
                stage: StageRef::Id(7),
                value: 9000.0,
                probability: 70,
                customer_name: "Acme".to_string(),
                assigned_to: None,
                expected_close: None,
                created_at: now,
                updated_at: now,
            }],
            leads: vec![],
            lead_moves_enabled: false,
        };
        save_store(&location, &store).unwrap();
        let loaded = load_store(&location).unwrap();
        assert_eq!(loaded.stage_records().len(), 1);
        assert_eq!(loaded.deals[0].stage, StageRef::Id(7));
        assert!(!loaded.lead_moves_enabled);
    }

    #[test]
    fn missing_store_is_created_with_no_pipeline() {
        let tmp = tempfile::tempdir().unwrap();
        let location = StoreLocation {
            path: tmp.path().join(".pipeboard/crm.yml"),
            scope: StoreScope::Global,
        };
        let store = load_store(&location).unwrap();
        assert!(store.pipeline.is_none());
        assert!(store.stage_records().is_empty());
        assert!(store.lead_moves_enabled);
        assert!(location.path.exists());
    }

    #[test]
    fn locate_walks_up_to_project_store() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let nested = root.join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        let location = StoreLocation {
            path: root.join(".pipeboard/crm.yml"),
            scope: StoreScope::Project,
        };
        save_store(&location, &CrmStore::default()).unwrap();
        let found = locate_store(&nested).unwrap();
        assert_eq!(found.scope, StoreScope::Project);
        assert_eq!(found.path, root.join(".pipeboard/crm.yml"));
    }
}
