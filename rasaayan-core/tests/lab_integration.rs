//! Integration tests for the lab session.
//!
//! These exercise search, simulation, goal planning and discovery end-to-end
//! using `MockPubChem` and `MockLlmProvider`, with a temp-dir backed store.

use pretty_assertions::assert_eq;
use rasaayan_core::brain::MockLlmProvider;
use rasaayan_core::config::{LabConfig, ResultPolicy};
use rasaayan_core::error::{LlmError, SimulationError, StoreError};
use rasaayan_core::lab::{Lab, Outcome, RequestKind, RequestPhase};
use rasaayan_core::library::Category;
use rasaayan_core::pubchem::{MockPubChem, StructureTarget};
use rasaayan_core::store::LabStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn pubchem() -> Arc<MockPubChem> {
    Arc::new(
        MockPubChem::new()
            .with_compound(702, "Ethanol", "CCO", "C2H6O")
            .with_compound(176, "Acetic Acid", "CC(=O)O", "C2H4O2")
            .with_compound(338, "Salicylic Acid", "C1=CC=C(C(=C1)C(=O)O)O", "C7H6O3")
            .with_compound(7918, "Acetic Anhydride", "CC(=O)OC(=O)C", "C4H6O3"),
    )
}

fn simulation_reply() -> String {
    json!({
        "products": [{
            "smiles": "CCOC(C)=O",
            "name": "Ethyl acetate",
            "iupacName": "ethyl acetate",
            "molecularWeight": 88.11,
            "tpsa": 26.3,
            "yieldEstimate": "65%",
            "reasoning": "Fischer esterification",
            "applications": ["solvent", "flavouring"]
        }],
        "byproducts": [{
            "smiles": "O",
            "name": "Water",
            "iupacName": "oxidane",
            "molecularWeight": 18.02,
            "yieldEstimate": "stoichiometric",
            "reasoning": "Condensation",
            "applications": []
        }],
        "feasibilityScore": 78,
        "energyTrend": "Exothermic",
        "mechanismInsight": "Acid-catalysed nucleophilic acyl substitution",
        "approxTimeRequired": "4-6 h under reflux",
        "alternativeRoute": "Acetyl chloride with ethanol",
        "safetyAssessment": [{
            "category": "Flammability",
            "severity": "High",
            "description": "Ethanol and ethyl acetate are flammable",
            "explanation": "Keep away from ignition sources"
        }],
        "mlAccuracy": {
            "confidenceScore": 91,
            "massBalanceStatus": "Verified",
            "modelConsensus": {"structural": true, "thermodynamic": true, "kinetic": true},
            "errorMargin": "±4%"
        }
    })
    .to_string()
}

fn lab_with(provider: Arc<MockLlmProvider>, dir: &TempDir, config: &LabConfig) -> Lab {
    Lab::from_config(
        config,
        pubchem(),
        provider,
        LabStore::open_dir(dir.path(), config.store.history_capacity),
    )
}

#[tokio::test]
async fn test_simulation_records_exactly_one_history_entry() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(MockLlmProvider::with_response(&simulation_reply()));
    let lab = lab_with(provider.clone(), &dir, &LabConfig::default());

    let outcome = lab.search("Ethanol, Acetic Acid").await.unwrap();
    assert!(outcome.should_clear_query());
    let input = lab.workspace().snapshot();
    assert_eq!(input.temperature, 25.0);
    assert_eq!(input.pressure, 1.0);
    let names: Vec<String> = input.reactants.iter().map(|m| m.display_name()).collect();
    assert_eq!(names, vec!["Ethanol", "Acetic Acid"]);

    let parsed = lab.simulate().await.unwrap();
    assert_eq!(parsed.result.products[0].name, "Ethyl acetate");
    assert_eq!(lab.workspace().result, Some(parsed.result.clone()));

    let history = lab.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].input, input);
    assert_eq!(history[0].result, parsed.result);
    assert_eq!(provider.request_count(), 1);
    assert_eq!(
        lab.phase(RequestKind::Simulation),
        RequestPhase::Settled(Outcome::Succeeded)
    );

    // Persisted to disk.
    let reopened = LabStore::open_dir(dir.path(), 20);
    assert_eq!(reopened.history().len(), 1);
}

#[tokio::test]
async fn test_partial_batch_failure_reports_only_failures() {
    let dir = TempDir::new().unwrap();
    let lab = lab_with(Arc::new(MockLlmProvider::new()), &dir, &LabConfig::default());

    // 161 has no property record, so it fails; "CCO" resolves to Ethanol
    // again and is deduplicated.
    let outcome = lab.search("Ethanol, 161, CCO").await.unwrap();
    assert_eq!(outcome.failed, vec!["161"]);
    assert_eq!(outcome.resolved.len(), 2);
    assert_eq!(
        outcome.failure_message().as_deref(),
        Some("Failed to resolve: 161")
    );
    assert!(!outcome.should_clear_query());
    assert_eq!(lab.workspace().reactants.len(), 1);
}

#[tokio::test]
async fn test_simulate_without_reactants_is_refused() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(MockLlmProvider::new());
    let lab = lab_with(provider.clone(), &dir, &LabConfig::default());

    let err = lab.simulate().await.unwrap_err();
    assert!(matches!(err, SimulationError::EmptyReactants));
    assert_eq!(provider.request_count(), 0);
    assert_eq!(lab.phase(RequestKind::Simulation), RequestPhase::Idle);
}

#[tokio::test]
async fn test_failed_simulation_persists_nothing() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_error(LlmError::AuthFailed {
        provider: "Gemini".into(),
    });
    let lab = lab_with(provider, &dir, &LabConfig::default());
    lab.search("Ethanol").await.unwrap();

    let err = lab.simulate().await.unwrap_err();
    assert!(matches!(err, SimulationError::Llm(LlmError::AuthFailed { .. })));
    assert!(lab.workspace().result.is_none());
    assert!(lab.history().is_empty());
    assert!(!dir.path().join("history.json").exists());
    assert!(matches!(
        lab.phase(RequestKind::Simulation),
        RequestPhase::Settled(Outcome::Failed(_))
    ));
}

#[tokio::test]
async fn test_strict_policy_rejects_reply_without_ml_accuracy() {
    let dir = TempDir::new().unwrap();
    let mut reply: serde_json::Value = serde_json::from_str(&simulation_reply()).unwrap();
    reply.as_object_mut().unwrap().remove("mlAccuracy");

    let mut config = LabConfig::default();
    config.simulation.result_policy = ResultPolicy::Strict;
    let provider = Arc::new(MockLlmProvider::with_response(&reply.to_string()));
    let lab = lab_with(provider, &dir, &config);
    lab.search("Ethanol").await.unwrap();

    let err = lab.simulate().await.unwrap_err();
    assert!(matches!(err, SimulationError::Validation { .. }));
    assert!(lab.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_simulation_timeout() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(
        MockLlmProvider::with_response(&simulation_reply()).with_delay(Duration::from_secs(600)),
    );
    let mut config = LabConfig::default();
    config.simulation.request_timeout_secs = 5;
    let lab = lab_with(provider, &dir, &config);
    lab.search("Ethanol").await.unwrap();

    let err = lab.simulate().await.unwrap_err();
    assert!(matches!(err, SimulationError::Timeout { secs: 5 }));
    assert!(lab.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_in_flight_simulation() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(
        MockLlmProvider::with_response(&simulation_reply()).with_delay(Duration::from_secs(60)),
    );
    let lab = lab_with(provider.clone(), &dir, &LabConfig::default());
    lab.search("Ethanol").await.unwrap();

    let (result, ()) = tokio::join!(lab.simulate(), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        lab.cancel();
    });
    assert!(matches!(result, Err(SimulationError::Cancelled)));
    assert_eq!(
        lab.phase(RequestKind::Simulation),
        RequestPhase::Settled(Outcome::Cancelled)
    );
    assert!(lab.history().is_empty());

    // The next request gets a fresh token.
    provider.queue_response(&simulation_reply());
    let parsed = lab.simulate().await.unwrap();
    assert_eq!(parsed.result.feasibility_score, 78.0);
}

fn slow_lab(dir: &TempDir) -> Lab {
    let slow = MockPubChem::new()
        .with_compound(702, "Ethanol", "CCO", "C2H6O")
        .with_delay(Duration::from_secs(60));
    Lab::from_config(
        &LabConfig::default(),
        Arc::new(slow),
        Arc::new(MockLlmProvider::new()),
        LabStore::open_dir(dir.path(), 20),
    )
}

#[tokio::test(start_paused = true)]
async fn test_cancel_in_flight_lookup() {
    let dir = TempDir::new().unwrap();
    let lab = slow_lab(&dir);

    let (result, ()) = tokio::join!(lab.lookup("Ethanol"), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        lab.cancel();
    });
    assert!(matches!(result, Err(SimulationError::Cancelled)));
    assert_eq!(
        lab.phase(RequestKind::Search),
        RequestPhase::Settled(Outcome::Cancelled)
    );
    assert!(lab.workspace().reactants.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_in_flight_structure_download() {
    let dir = TempDir::new().unwrap();
    let lab = slow_lab(&dir);

    let (result, ()) = tokio::join!(lab.structure("702"), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        lab.cancel();
    });
    assert!(matches!(result, Err(SimulationError::Cancelled)));

    // Without a cancel the slow download still completes.
    let (target, _) = lab.structure("702").await.unwrap().unwrap();
    assert_eq!(target, StructureTarget::Cid(702));
}

#[tokio::test]
async fn test_structure_falls_back_to_raw_smiles() {
    let dir = TempDir::new().unwrap();
    let lab = lab_with(Arc::new(MockLlmProvider::new()), &dir, &LabConfig::default());

    // The mock serves SDF only for known CIDs, so the SMILES download 404s.
    let err = lab.structure("C1=CC=CC=C1O").await.unwrap_err();
    assert!(matches!(err, SimulationError::PubChem(_)));
    assert!(lab.structure("Unobtainium").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_second_simulation_while_in_flight_is_busy() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(
        MockLlmProvider::with_response(&simulation_reply()).with_delay(Duration::from_secs(10)),
    );
    let lab = lab_with(provider.clone(), &dir, &LabConfig::default());
    lab.search("Ethanol").await.unwrap();

    let (first, second) = tokio::join!(lab.simulate(), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        lab.simulate().await
    });
    assert!(first.is_ok());
    assert!(matches!(
        second,
        Err(SimulationError::Busy { kind: "simulation" })
    ));
    assert_eq!(provider.request_count(), 1);
    assert_eq!(lab.history().len(), 1);
}

#[tokio::test]
async fn test_plan_applies_goal_and_adds_resolved_suggestions() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(MockLlmProvider::with_response(
        &json!({
            "suggestedReactants": ["Salicylic Acid", "Acetic Anhydride", "Unobtainium"],
            "suggestedTemp": 85,
            "suggestedPressure": 1.0,
            "rationale": "Acetylation of salicylic acid to aspirin"
        })
        .to_string(),
    ));
    let lab = lab_with(provider, &dir, &LabConfig::default());

    let plan = lab.plan("synthesize aspirin").await.unwrap();
    assert_eq!(plan.resolved.len(), 2);
    assert_eq!(plan.failed, vec!["Unobtainium"]);

    let ws = lab.workspace();
    assert_eq!(ws.temperature, 85.0);
    assert_eq!(ws.pressure, 1.0);
    assert_eq!(ws.objective, "Acetylation of salicylic acid to aspirin");
    let cids: Vec<Option<u64>> = ws.reactants.iter().map(|m| m.cid).collect();
    assert_eq!(cids, vec![Some(338), Some(7918)]);
    assert_eq!(
        lab.phase(RequestKind::Goal),
        RequestPhase::Settled(Outcome::Succeeded)
    );
}

#[tokio::test]
async fn test_discover_product_and_reload_history() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(MockLlmProvider::with_response(&simulation_reply()));
    let lab = lab_with(provider, &dir, &LabConfig::default());
    lab.search("Ethanol, Acetic Acid").await.unwrap();
    lab.with_workspace(|ws| ws.catalysts = "H2SO4".to_string());
    let parsed = lab.simulate().await.unwrap();
    let id = lab.history()[0].id.clone();

    assert!(lab.discover(&parsed.result.products[0]).unwrap());
    assert!(!lab.discover_from_history(&id, 0).unwrap());
    assert!(matches!(
        lab.discover_from_history(&id, 3),
        Err(StoreError::ProductOutOfRange { index: 3, len: 1 })
    ));
    assert!(matches!(
        lab.discover_from_history("NOPE", 0),
        Err(StoreError::HistoryNotFound { .. })
    ));
    let inventory = lab.inventory();
    assert_eq!(inventory.category(Category::Synthesized)[0].smiles, "CCOC(C)=O");

    // Reset the workspace, then restore it from history.
    lab.with_workspace(|ws| {
        ws.clear_reactants();
        ws.temperature = 100.0;
        ws.result = None;
    });
    let item = lab.load_history(&id).unwrap();
    let ws = lab.workspace();
    assert_eq!(ws.snapshot(), item.input);
    assert_eq!(ws.catalysts, "H2SO4");
    assert_eq!(ws.result, Some(item.result));
}

#[tokio::test]
async fn test_history_keeps_twenty_newest() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(MockLlmProvider::new());
    for _ in 0..21 {
        provider.queue_response(&simulation_reply());
    }
    let lab = lab_with(provider, &dir, &LabConfig::default());
    lab.search("Ethanol").await.unwrap();

    for i in 0..21 {
        lab.with_workspace(|ws| ws.objective = format!("run {}", i));
        lab.simulate().await.unwrap();
    }

    let history = lab.history();
    assert_eq!(history.len(), 20);
    assert_eq!(history[0].input.description, "run 20");
    assert_eq!(history[19].input.description, "run 1");
    assert!(!history.iter().any(|h| h.input.description == "run 0"));
}
