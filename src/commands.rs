use crate::backend::LocalBackend;
use crate::catalog::{match_stage_name, resolve_catalog};
use crate::executor::{Notifier, TransitionExecutor};
use crate::model::{
    BackendStageRecord, Deal, EntityKind, Lead, MoveIntent, StageRef, CANONICAL_STAGES,
};
use crate::projection::{project, BoardFilters};
use crate::storage::{
    init_project_store, load_store, locate_store, save_store, Pipeline, StoreLocation, StoreScope,
};
use crate::ui;
use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use std::env;

pub fn init() -> Result<()> {
    let location = init_project_store()?;
    println!("Initialized CRM store at {}", location.path.display());
    Ok(())
}

pub fn seed(force: bool) -> Result<()> {
    let location = current_location()?;
    let mut store = load_store(&location)?;
    if !force && (!store.deals.is_empty() || !store.leads.is_empty()) {
        bail!("store already has entities (use --force to overwrite)");
    }
    let now = Utc::now();
    // Partially provisioned pipeline: one configured stage, the rest left to
    // the catalog merge and auto-provisioning paths.
    store.pipeline = Some(Pipeline {
        id: 1,
        stages: vec![BackendStageRecord {
            id: 7,
            name: "Negotiating".to_string(),
        }],
    });
    store.deals = vec![
        Deal {
            id: generate_id(),
            title: "Website revamp".to_string(),
            stage: StageRef::Key("qualified".to_string()),
            value: 18_000.0,
            probability: 60,
            customer_name: "Acme Corp".to_string(),
            assigned_to: Some("Ana".to_string()),
            expected_close: None,
            created_at: now,
            updated_at: now,
        },
        Deal {
            id: generate_id(),
            title: "Data platform".to_string(),
            stage: StageRef::Id(7),
            value: 95_000.0,
            probability: 40,
            customer_name: "Globex".to_string(),
            assigned_to: Some("Bo".to_string()),
            expected_close: None,
            created_at: now,
            updated_at: now,
        },
        Deal {
            id: generate_id(),
            title: "Support renewal".to_string(),
            stage: StageRef::Key("closed-won".to_string()),
            value: 12_500.0,
            probability: 100,
            customer_name: "Initech".to_string(),
            assigned_to: Some("Ana".to_string()),
            expected_close: None,
            created_at: now,
            updated_at: now,
        },
    ];
    store.leads = vec![
        Lead {
            id: generate_id(),
            name: "Wayne Enterprises".to_string(),
            stage_id: None,
            stage_name: None,
            estimated_value: 40_000.0,
            assigned_to: Some("Bo".to_string()),
            created_at: now,
            updated_at: now,
        },
        Lead {
            id: generate_id(),
            name: "Stark Industries".to_string(),
            stage_id: None,
            stage_name: Some("Qualified".to_string()),
            estimated_value: 250_000.0,
            assigned_to: Some("Ana".to_string()),
            created_at: now,
            updated_at: now,
        },
        Lead {
            id: generate_id(),
            name: "Tyrell".to_string(),
            stage_id: Some(7),
            stage_name: None,
            estimated_value: 60_000.0,
            assigned_to: None,
            created_at: now,
            updated_at: now,
        },
    ];
    save_store(&location, &store)?;
    println!(
        "Seeded {} deals and {} leads at {}",
        store.deals.len(),
        store.leads.len(),
        location.path.display()
    );
    Ok(())
}

pub fn stages() -> Result<()> {
    let backend = open_backend()?;
    let catalog = resolve_catalog(backend.store().stage_records());
    println!("{:<14} {:<16} {}", "key", "label", "backend id");
    for stage in catalog {
        let id = stage
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<14} {:<16} {}", stage.key, stage.label, id);
    }
    Ok(())
}

pub fn list(search: Option<String>, owner: Option<String>, stage: Option<String>) -> Result<()> {
    let backend = open_backend()?;
    let store = backend.store();
    let catalog = resolve_catalog(store.stage_records());
    let stage = stage.map(|s| normalize_stage_key(&s)).transpose()?;
    let filters = BoardFilters {
        search,
        owner,
        stage,
    };
    print_scope(backend.location());
    for board_stage in &catalog {
        let cards = project(&store.deals, &store.leads, board_stage, &catalog, &filters);
        if filters.stage.is_some() && cards.is_empty() {
            continue;
        }
        println!("{} [{}] ({})", board_stage.label, board_stage.key, cards.len());
        if cards.is_empty() {
            println!("  (empty)");
        }
        for deal in cards.deals {
            println!(
                "  - {} deal  {}  {} ({:.0}, {}%)",
                deal.id, deal.title, deal.customer_name, deal.value, deal.probability
            );
        }
        for lead in cards.leads {
            println!("  - {} lead  {} ({:.0})", lead.id, lead.name, lead.estimated_value);
        }
        println!();
    }
    Ok(())
}

pub fn add_deal(
    title: String,
    customer: String,
    value: f64,
    probability: u8,
    owner: Option<String>,
    stage: Option<String>,
) -> Result<()> {
    let location = current_location()?;
    let mut store = load_store(&location)?;
    let stage_key = match stage {
        Some(s) => normalize_stage_key(&s)?,
        None => "lead".to_string(),
    };
    let now = Utc::now();
    let id = generate_id();
    store.deals.push(Deal {
        id: id.clone(),
        title,
        stage: StageRef::Key(stage_key.clone()),
        value,
        probability: probability.min(100),
        customer_name: customer,
        assigned_to: owner,
        expected_close: None,
        created_at: now,
        updated_at: now,
    });
    save_store(&location, &store)?;
    println!("Added deal {} in {}", id, stage_key);
    Ok(())
}

pub fn add_lead(name: String, value: f64, owner: Option<String>) -> Result<()> {
    let location = current_location()?;
    let mut store = load_store(&location)?;
    let now = Utc::now();
    let id = generate_id();
    store.leads.push(Lead {
        id: id.clone(),
        name,
        stage_id: None,
        stage_name: None,
        estimated_value: value,
        assigned_to: owner,
        created_at: now,
        updated_at: now,
    });
    save_store(&location, &store)?;
    println!("Added lead {}", id);
    Ok(())
}

pub fn move_entity(entity_id: String, stage: String) -> Result<()> {
    let mut backend = open_backend()?;
    let catalog = resolve_catalog(backend.store().stage_records());
    let stage_key = normalize_stage_key(&stage)?;
    let board_stage = catalog
        .iter()
        .find(|s| s.key == stage_key)
        .ok_or_else(|| anyhow!("unknown stage {}", stage_key))?;

    let kind = classify_entity(&backend, &entity_id)?;
    let intent = MoveIntent::new(kind, entity_id, board_stage);
    let mut notify = PrintNotifier;
    let mut executor = TransitionExecutor::new();
    if executor.execute(&intent, &mut backend, &mut notify).is_err() {
        bail!("move failed");
    }
    Ok(())
}

pub fn tui() -> Result<()> {
    let backend = open_backend()?;
    ui::run(backend)
}

struct PrintNotifier;

impl Notifier for PrintNotifier {
    fn success(&mut self, message: &str) {
        println!("{}", message);
    }

    fn error(&mut self, message: &str) {
        eprintln!("{}", message);
    }
}

fn classify_entity(backend: &LocalBackend, entity_id: &str) -> Result<EntityKind> {
    let store = backend.store();
    if store.deals.iter().any(|d| d.id == entity_id) {
        Ok(EntityKind::Deal)
    } else if store.leads.iter().any(|l| l.id == entity_id) {
        Ok(EntityKind::Lead)
    } else {
        bail!("no deal or lead with id {}", entity_id)
    }
}

/// Accept a canonical key, a display label, or a close backend spelling and
/// normalize it to the canonical key.
fn normalize_stage_key(input: &str) -> Result<String> {
    let idx = match_stage_name(input)
        .ok_or_else(|| anyhow!("unknown stage {}", input))?;
    Ok(CANONICAL_STAGES[idx].key.to_string())
}

fn current_location() -> Result<StoreLocation> {
    let cwd = env::current_dir()?;
    locate_store(&cwd)
}

fn open_backend() -> Result<LocalBackend> {
    LocalBackend::open(current_location()?)
}

fn print_scope(location: &StoreLocation) {
    let scope = match location.scope {
        StoreScope::Project => "project",
        StoreScope::Global => "global",
    };
    println!("Pipeline board ({} store: {})", scope, location.path.display());
    println!();
}

fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_input_normalizes_to_canonical_key() {
        assert_eq!(normalize_stage_key("qualified").unwrap(), "qualified");
        assert_eq!(normalize_stage_key("Closed Won").unwrap(), "closed-won");
        assert_eq!(normalize_stage_key("Negotiating").unwrap(), "negotiation");
        assert!(normalize_stage_key("archived").is_err());
    }

    #[test]
    fn generated_ids_are_short_and_distinct() {
        let a = generate_id();
        let b = generate_id();
        assert_eq!(a.len(), 6);
        assert_ne!(a, b);
    }
}
