//! Lab session state and the operations driven from the CLI.
//!
//! A [`Lab`] owns the current [`Workspace`] (reactants, conditions and the
//! last result), the identifier resolver, the simulator and the persistent
//! [`LabStore`]. Every long-running request runs under a cancellation token
//! and a deadline, and at most one request of each kind is in flight.

use crate::brain::LlmProvider;
use crate::config::LabConfig;
use crate::error::{SimulationError, StoreError};
use crate::library::Inventory;
use crate::pubchem::{PubChemApi, StructureTarget};
use crate::resolver::{BatchOutcome, IdentifierKind, IdentifierResolver};
use crate::simulation::{ParsedResult, ReactionSimulator};
use crate::store::LabStore;
use crate::types::{
    GoalInterpretation, HistoryItem, Molecule, PredictedChemical, ReactionInput,
    ReactionSimulationResult,
};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_TEMPERATURE_C: f64 = 25.0;
pub const DEFAULT_PRESSURE_ATM: f64 = 1.0;

/// Editable reaction setup.
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    pub reactants: Vec<Molecule>,
    pub catalysts: String,
    /// °C
    pub temperature: f64,
    /// atm
    pub pressure: f64,
    pub objective: String,
    pub result: Option<ReactionSimulationResult>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self {
            reactants: Vec::new(),
            catalysts: String::new(),
            temperature: DEFAULT_TEMPERATURE_C,
            pressure: DEFAULT_PRESSURE_ATM,
            objective: String::new(),
            result: None,
        }
    }
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `molecule` unless an equivalent reactant is already present.
    /// Returns whether it was added.
    pub fn add_reactant(&mut self, molecule: Molecule) -> bool {
        if self.reactants.iter().any(|r| molecule.same_identity(r)) {
            return false;
        }
        self.reactants.push(molecule);
        true
    }

    /// Remove by position; the remaining reactants keep their order.
    pub fn remove_reactant(&mut self, index: usize) -> Option<Molecule> {
        (index < self.reactants.len()).then(|| self.reactants.remove(index))
    }

    pub fn clear_reactants(&mut self) {
        self.reactants.clear();
    }

    pub fn snapshot(&self) -> ReactionInput {
        ReactionInput {
            reactants: self.reactants.clone(),
            catalysts: self.catalysts.clone(),
            temperature: self.temperature,
            pressure: self.pressure,
            description: self.objective.clone(),
        }
    }

    /// Take over suggested conditions; the rationale becomes the objective.
    pub fn apply_goal(&mut self, goal: &GoalInterpretation) {
        self.temperature = goal.suggested_temp;
        self.pressure = goal.suggested_pressure;
        self.objective = goal.rationale.clone();
    }

    /// Restore the workspace exactly as it was for a past simulation.
    pub fn load_history(&mut self, item: &HistoryItem) {
        self.reactants = item.input.reactants.clone();
        self.catalysts = item.input.catalysts.clone();
        self.temperature = item.input.temperature;
        self.pressure = item.input.pressure;
        self.objective = item.input.description.clone();
        self.result = Some(item.result.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Simulation,
    Search,
    Goal,
}

impl RequestKind {
    pub fn label(&self) -> &'static str {
        match self {
            RequestKind::Simulation => "simulation",
            RequestKind::Search => "search",
            RequestKind::Goal => "goal",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed(String),
    Cancelled,
}

/// Lifecycle of the latest request of one kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestPhase {
    #[default]
    Idle,
    InFlight,
    Settled(Outcome),
}

impl RequestPhase {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, RequestPhase::InFlight)
    }
}

#[derive(Debug, Default)]
struct Phases {
    simulation: RequestPhase,
    search: RequestPhase,
    goal: RequestPhase,
}

impl Phases {
    fn get_mut(&mut self, kind: RequestKind) -> &mut RequestPhase {
        match kind {
            RequestKind::Simulation => &mut self.simulation,
            RequestKind::Search => &mut self.search,
            RequestKind::Goal => &mut self.goal,
        }
    }
}

/// Marks a request in flight; settles it on [`settle`](Self::settle) or, if
/// the request future is dropped first, as cancelled.
struct RequestGuard<'a> {
    lab: &'a Lab,
    kind: RequestKind,
    settled: bool,
}

impl RequestGuard<'_> {
    fn settle<T>(mut self, result: &Result<T, SimulationError>) {
        let outcome = match result {
            Ok(_) => Outcome::Succeeded,
            Err(SimulationError::Cancelled) => Outcome::Cancelled,
            Err(e) => Outcome::Failed(e.to_string()),
        };
        *self.lab.phases().get_mut(self.kind) = RequestPhase::Settled(outcome);
        self.settled = true;
    }
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            *self.lab.phases().get_mut(self.kind) = RequestPhase::Settled(Outcome::Cancelled);
        }
    }
}

/// Result of [`Lab::plan`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutcome {
    pub interpretation: GoalInterpretation,
    /// Suggestions that resolved, whether or not they were new reactants.
    pub resolved: Vec<Molecule>,
    pub failed: Vec<String>,
}

/// A lab session. Methods take `&self` so a cancel request can arrive while
/// another operation is awaiting.
pub struct Lab {
    resolver: IdentifierResolver,
    simulator: ReactionSimulator,
    workspace: Mutex<Workspace>,
    store: Mutex<LabStore>,
    phases: Mutex<Phases>,
    cancel: Mutex<CancellationToken>,
    request_timeout: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Lab {
    pub fn new(
        resolver: IdentifierResolver,
        simulator: ReactionSimulator,
        store: LabStore,
        request_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            simulator,
            workspace: Mutex::new(Workspace::new()),
            store: Mutex::new(store),
            phases: Mutex::new(Phases::default()),
            cancel: Mutex::new(CancellationToken::new()),
            request_timeout,
        }
    }

    /// Wire a lab from configuration and the two external seams.
    pub fn from_config(
        config: &LabConfig,
        pubchem: Arc<dyn PubChemApi>,
        provider: Arc<dyn LlmProvider>,
        store: LabStore,
    ) -> Self {
        Self::new(
            IdentifierResolver::new(pubchem, config.resolver.clone()),
            ReactionSimulator::new(provider, config),
            store,
            Duration::from_secs(config.simulation.request_timeout_secs),
        )
    }

    pub fn resolver(&self) -> &IdentifierResolver {
        &self.resolver
    }

    pub fn simulator(&self) -> &ReactionSimulator {
        &self.simulator
    }

    /// Copy of the current workspace.
    pub fn workspace(&self) -> Workspace {
        lock(&self.workspace).clone()
    }

    /// Mutate the workspace in place.
    pub fn with_workspace<R>(&self, f: impl FnOnce(&mut Workspace) -> R) -> R {
        f(&mut lock(&self.workspace))
    }

    pub fn phase(&self, kind: RequestKind) -> RequestPhase {
        self.phases().get_mut(kind).clone()
    }

    pub fn history(&self) -> Vec<HistoryItem> {
        lock(&self.store).history().items().to_vec()
    }

    pub fn history_item(&self, id: &str) -> Option<HistoryItem> {
        lock(&self.store).history().get(id).cloned()
    }

    pub fn clear_history(&self) -> Result<(), StoreError> {
        lock(&self.store).clear_history()
    }

    pub fn inventory(&self) -> Inventory {
        lock(&self.store).inventory().clone()
    }

    /// Cancel whatever is in flight. Later requests get a fresh token.
    pub fn cancel(&self) {
        let mut token = lock(&self.cancel);
        token.cancel();
        *token = CancellationToken::new();
        debug!("Cancellation requested");
    }

    fn phases(&self) -> MutexGuard<'_, Phases> {
        lock(&self.phases)
    }

    fn begin(&self, kind: RequestKind) -> Result<RequestGuard<'_>, SimulationError> {
        let mut phases = self.phases();
        let phase = phases.get_mut(kind);
        if phase.is_in_flight() {
            return Err(SimulationError::Busy { kind: kind.label() });
        }
        *phase = RequestPhase::InFlight;
        Ok(RequestGuard {
            lab: self,
            kind,
            settled: false,
        })
    }

    /// Run `fut` until it finishes, the session is cancelled, or the
    /// request deadline passes.
    async fn run_cancellable<T>(
        &self,
        fut: impl Future<Output = Result<T, SimulationError>>,
    ) -> Result<T, SimulationError> {
        let token = lock(&self.cancel).clone();
        tokio::select! {
            _ = token.cancelled() => Err(SimulationError::Cancelled),
            res = tokio::time::timeout(self.request_timeout, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(SimulationError::Timeout {
                    secs: self.request_timeout.as_secs(),
                }),
            },
        }
    }

    /// Resolve a comma-separated query without touching the workspace.
    pub async fn lookup(&self, query: &str) -> Result<BatchOutcome, SimulationError> {
        let guard = self.begin(RequestKind::Search)?;
        let result = self
            .run_cancellable(async { Ok(self.resolver.resolve_batch(query).await) })
            .await;
        guard.settle(&result);
        result
    }

    /// Resolve a comma-separated query and add every hit to the reactants.
    pub async fn search(&self, query: &str) -> Result<BatchOutcome, SimulationError> {
        let outcome = self.lookup(query).await?;

        let added = self.with_workspace(|ws| {
            outcome
                .resolved
                .iter()
                .filter(|m| ws.add_reactant((*m).clone()))
                .count()
        });
        info!(
            resolved = outcome.resolved.len(),
            added,
            failed = outcome.failed.len(),
            "Search finished"
        );
        Ok(outcome)
    }

    /// Simulate the current workspace.
    ///
    /// On success the result is stored in the workspace and exactly one
    /// history entry is recorded. On failure the workspace result stays
    /// cleared and nothing is persisted.
    pub async fn simulate(&self) -> Result<ParsedResult, SimulationError> {
        let input = self.with_workspace(|ws| ws.snapshot());
        if input.reactants.is_empty() {
            return Err(SimulationError::EmptyReactants);
        }

        let guard = self.begin(RequestKind::Simulation)?;
        self.with_workspace(|ws| ws.result = None);

        let result = self
            .run_cancellable(self.simulator.simulate(&input))
            .await;
        guard.settle(&result);
        let parsed = result?;

        self.with_workspace(|ws| ws.result = Some(parsed.result.clone()));
        match lock(&self.store).record(input, parsed.result.clone()) {
            Ok(item) => debug!(id = item.id.as_str(), "Recorded history entry"),
            Err(e) => warn!(error = %e, "Simulation succeeded but history could not be saved"),
        }
        Ok(parsed)
    }

    /// Interpret a free-text goal, apply the suggested conditions and add
    /// each suggested reactant that resolves.
    pub async fn plan(&self, goal: &str) -> Result<PlanOutcome, SimulationError> {
        if goal.trim().is_empty() {
            return Err(SimulationError::EmptyGoal);
        }
        let guard = self.begin(RequestKind::Goal)?;

        let result = self
            .run_cancellable(async {
                let interpretation = self.simulator.interpret_goal(goal).await?;
                self.with_workspace(|ws| ws.apply_goal(&interpretation));

                let mut resolved = Vec::new();
                let mut failed = Vec::new();
                for name in &interpretation.suggested_reactants {
                    match self.resolver.resolve(name).await {
                        Some(molecule) => {
                            self.with_workspace(|ws| ws.add_reactant(molecule.clone()));
                            resolved.push(molecule);
                        }
                        None => failed.push(name.clone()),
                    }
                }
                Ok(PlanOutcome {
                    interpretation,
                    resolved,
                    failed,
                })
            })
            .await;
        guard.settle(&result);

        if let Ok(plan) = &result {
            info!(
                resolved = plan.resolved.len(),
                failed = plan.failed.len(),
                "Goal applied"
            );
        }
        result
    }

    /// Download the 3-D SDF record for an identifier.
    ///
    /// The resolved compound is preferred; a SMILES that PubChem has no
    /// record for is sent as-is. `Ok(None)` when neither applies.
    pub async fn structure(
        &self,
        identifier: &str,
    ) -> Result<Option<(StructureTarget, String)>, SimulationError> {
        let guard = self.begin(RequestKind::Search)?;
        let result = self
            .run_cancellable(async {
                let target = match self.resolver.resolve(identifier).await {
                    Some(molecule) => StructureTarget::from_molecule(&molecule),
                    None => match self.resolver.classify(identifier) {
                        IdentifierKind::Smiles => {
                            Some(StructureTarget::Smiles(identifier.trim().to_string()))
                        }
                        _ => None,
                    },
                };
                let Some(target) = target else {
                    return Ok(None);
                };
                let sdf = self.resolver.api().structure_sdf(&target).await?;
                Ok(Some((target, sdf)))
            })
            .await;
        guard.settle(&result);
        result
    }

    /// Put a predicted chemical on the `Synthesized` shelf. Returns whether
    /// it was new.
    pub fn discover(&self, chemical: &PredictedChemical) -> Result<bool, StoreError> {
        let added = lock(&self.store).add_synthesized(chemical.to_molecule())?;
        if added {
            info!(name = chemical.name.as_str(), "Added to synthesized inventory");
        }
        Ok(added)
    }

    /// [`discover`](Self::discover) the `index`-th product of a history entry.
    pub fn discover_from_history(&self, id: &str, index: usize) -> Result<bool, StoreError> {
        let item = self
            .history_item(id)
            .ok_or_else(|| StoreError::HistoryNotFound { id: id.to_string() })?;
        let chemical = item
            .result
            .products
            .get(index)
            .ok_or(StoreError::ProductOutOfRange {
                index,
                len: item.result.products.len(),
            })?;
        self.discover(chemical)
    }

    /// Restore a past simulation into the workspace.
    pub fn load_history(&self, id: &str) -> Result<HistoryItem, StoreError> {
        let item = self
            .history_item(id)
            .ok_or_else(|| StoreError::HistoryNotFound { id: id.to_string() })?;
        self.with_workspace(|ws| ws.load_history(&item));
        Ok(item)
    }
}
