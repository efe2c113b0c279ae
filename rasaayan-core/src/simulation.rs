//! Reaction simulation and goal interpretation requests.
//!
//! Builds the prompt and response schema for each request kind, sends it
//! through an [`LlmProvider`], and maps the JSON reply onto the typed
//! result under the configured [`ResultPolicy`].

use crate::brain::{LlmProvider, StructuredRequest};
use crate::config::{LabConfig, ResultPolicy};
use crate::error::SimulationError;
use crate::types::{GoalInterpretation, ReactionInput, ReactionSimulationResult};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Optional result fields whose absence is tolerated under `Lenient`.
const OPTIONAL_RESULT_FIELDS: &[&str] = &["intermediates", "conditionWarnings", "mlAccuracy"];

/// Build the multi-model analysis prompt for a reaction.
pub fn reaction_prompt(input: &ReactionInput) -> String {
    let reactants = input
        .reactants
        .iter()
        .map(|r| {
            format!(
                "{} ({}) - Formula: {}",
                r.display_name(),
                r.smiles,
                r.properties.formula.as_deref().unwrap_or("unknown")
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    let catalysts = if input.catalysts.trim().is_empty() {
        "None"
    } else {
        input.catalysts.trim()
    };

    format!(
        r#"Act as an Ensemble of Senior Computational Chemists and ML Research Scientists.
Analyze this chemical reaction using a multi-model approach:

[INPUT PARAMETERS]
Reactants: {reactants}
Catalysts: {catalysts}
Conditions: {temp}°C, {pressure} atm
Goal: {goal}

[ML VERIFICATION TASKS]
1. Cross-reference Reactant SMILES for structural integrity.
2. Perform a Stoichiometric Mass Balance: Ensure the total number of atoms in reactants matches products + byproducts.
3. Simulate 3 separate predictive models:
   - A Message Passing Neural Network (MPNN) for molecular properties.
   - A DFT-approximator for thermodynamic Delta G and energy trends.
   - A Kinetic Monte Carlo (KMC) simulator for time and yield.
4. Flag any "Condition Mismatches" (e.g. Temp > Boiling point of solvent).

[OUTPUT REQUIREMENTS]
- Major Products & Byproducts (IUPAC, Exact MW, TPSA, specific applications).
- Energy Trend, Mechanism, Alternative Routes.
- ML Accuracy metrics: Confidence score and Model Consensus status.

Respond strictly in JSON."#,
        temp = input.temperature,
        pressure = input.pressure,
        goal = input.description,
    )
}

fn chemical_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "smiles": { "type": "STRING" },
            "name": { "type": "STRING" },
            "iupacName": { "type": "STRING" },
            "molecularWeight": { "type": "NUMBER" },
            "tpsa": { "type": "NUMBER", "description": "Topological Polar Surface Area in Å²" },
            "yieldEstimate": { "type": "STRING" },
            "reasoning": { "type": "STRING" },
            "applications": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": ["smiles", "name", "iupacName", "molecularWeight", "yieldEstimate", "reasoning", "applications"]
    })
}

/// Response schema for a reaction simulation.
pub fn reaction_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "products": { "type": "ARRAY", "items": chemical_schema() },
            "byproducts": { "type": "ARRAY", "items": chemical_schema() },
            "intermediates": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "smiles": { "type": "STRING" },
                        "name": { "type": "STRING" },
                        "description": { "type": "STRING" }
                    }
                }
            },
            "feasibilityScore": { "type": "NUMBER" },
            "energyTrend": { "type": "STRING", "enum": ["Exothermic", "Endothermic", "Neutral"] },
            "mechanismInsight": { "type": "STRING" },
            "approxTimeRequired": { "type": "STRING" },
            "alternativeRoute": { "type": "STRING" },
            "safetyAssessment": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "category": { "type": "STRING" },
                        "severity": { "type": "STRING" },
                        "description": { "type": "STRING" },
                        "explanation": { "type": "STRING" }
                    }
                }
            },
            "conditionWarnings": { "type": "ARRAY", "items": { "type": "STRING" } },
            "mlAccuracy": {
                "type": "OBJECT",
                "properties": {
                    "confidenceScore": { "type": "NUMBER" },
                    "massBalanceStatus": { "type": "STRING" },
                    "modelConsensus": {
                        "type": "OBJECT",
                        "properties": {
                            "structural": { "type": "BOOLEAN" },
                            "thermodynamic": { "type": "BOOLEAN" },
                            "kinetic": { "type": "BOOLEAN" }
                        }
                    },
                    "errorMargin": { "type": "STRING" }
                },
                "required": ["confidenceScore", "massBalanceStatus", "modelConsensus", "errorMargin"]
            }
        },
        "required": [
            "products", "byproducts", "feasibilityScore", "energyTrend", "mechanismInsight",
            "approxTimeRequired", "alternativeRoute", "safetyAssessment", "mlAccuracy"
        ]
    })
}

/// Prompt turning a free-text research goal into reaction parameters.
pub fn goal_prompt(goal: &str) -> String {
    format!(
        "As a reaction design specialist, convert this high-level chemistry goal into specific reaction parameters: \"{}\".\n\
         Suggest standard starting materials, temperature (C), and pressure (atm). Ensure the reactants are optimized for yield.\n\
         Return JSON with suggestedReactants, suggestedTemp, suggestedPressure, and rationale.",
        goal.trim()
    )
}

pub fn goal_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "suggestedReactants": { "type": "ARRAY", "items": { "type": "STRING" } },
            "suggestedTemp": { "type": "NUMBER" },
            "suggestedPressure": { "type": "NUMBER" },
            "rationale": { "type": "STRING" }
        },
        "required": ["suggestedReactants", "suggestedTemp", "suggestedPressure", "rationale"]
    })
}

/// Remove a surrounding Markdown code fence, if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// A simulation result plus the optional fields the model left out.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResult {
    pub result: ReactionSimulationResult,
    /// JSON paths of absent optional fields, e.g. `mlAccuracy` or
    /// `products[0].tpsa`. Empty for a complete result.
    pub missing_optional: Vec<String>,
}

impl ParsedResult {
    pub fn is_degraded(&self) -> bool {
        !self.missing_optional.is_empty()
    }
}

fn missing_optional_fields(value: &Value) -> Vec<String> {
    let mut missing: Vec<String> = OPTIONAL_RESULT_FIELDS
        .iter()
        .filter(|field| value.get(**field).is_none_or(Value::is_null))
        .map(|field| field.to_string())
        .collect();

    for list in ["products", "byproducts"] {
        if let Some(items) = value[list].as_array() {
            for (i, item) in items.iter().enumerate() {
                if item.get("tpsa").is_none_or(Value::is_null) {
                    missing.push(format!("{list}[{i}].tpsa"));
                }
            }
        }
    }
    missing
}

/// Parse and validate a simulation reply.
pub fn parse_simulation_result(
    text: &str,
    policy: ResultPolicy,
) -> Result<ParsedResult, SimulationError> {
    let value: Value =
        serde_json::from_str(strip_code_fences(text)).map_err(|e| SimulationError::Parse {
            message: format!("reply is not JSON: {}", e),
        })?;

    let missing_optional = missing_optional_fields(&value);
    let mut result: ReactionSimulationResult =
        serde_json::from_value(value).map_err(|e| SimulationError::Parse {
            message: e.to_string(),
        })?;

    let score = result.feasibility_score;
    if !(0.0..=100.0).contains(&score) {
        match policy {
            ResultPolicy::Strict => {
                return Err(SimulationError::Validation {
                    message: format!("feasibilityScore {} is outside 0-100", score),
                });
            }
            ResultPolicy::Lenient => {
                warn!(score, "feasibilityScore out of range, clamping");
                result.feasibility_score = score.clamp(0.0, 100.0);
            }
        }
    }

    match (&mut result.ml_accuracy, policy) {
        (None, ResultPolicy::Strict) => {
            return Err(SimulationError::Validation {
                message: "mlAccuracy is missing".to_string(),
            });
        }
        (Some(ml), _) if !(0.0..=100.0).contains(&ml.confidence_score) => {
            if policy == ResultPolicy::Strict {
                return Err(SimulationError::Validation {
                    message: format!(
                        "mlAccuracy.confidenceScore {} is outside 0-100",
                        ml.confidence_score
                    ),
                });
            }
            warn!(
                score = ml.confidence_score,
                "confidenceScore out of range, clamping"
            );
            ml.confidence_score = ml.confidence_score.clamp(0.0, 100.0);
        }
        _ => {}
    }

    Ok(ParsedResult {
        result,
        missing_optional,
    })
}

/// Parse a goal interpretation reply. Blank suggestions are dropped.
pub fn parse_goal_interpretation(text: &str) -> Result<GoalInterpretation, SimulationError> {
    let mut goal: GoalInterpretation = serde_json::from_str(strip_code_fences(text))
        .map_err(|e| SimulationError::Parse {
            message: e.to_string(),
        })?;
    goal.suggested_reactants = goal
        .suggested_reactants
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    Ok(goal)
}

/// Sends simulation and goal requests to the model.
pub struct ReactionSimulator {
    provider: Arc<dyn LlmProvider>,
    simulation_model: String,
    goal_model: String,
    thinking_budget: Option<u32>,
    policy: ResultPolicy,
}

impl ReactionSimulator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &LabConfig) -> Self {
        Self {
            provider,
            simulation_model: config.llm.model.clone(),
            goal_model: config.llm.goal_model.clone(),
            thinking_budget: config.llm.thinking_budget,
            policy: config.simulation.result_policy,
        }
    }

    pub fn policy(&self) -> ResultPolicy {
        self.policy
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Run one reaction simulation. A single request is made; failures are
    /// not retried here.
    pub async fn simulate(&self, input: &ReactionInput) -> Result<ParsedResult, SimulationError> {
        if input.reactants.is_empty() {
            return Err(SimulationError::EmptyReactants);
        }

        let request = StructuredRequest::new(reaction_prompt(input), reaction_schema())
            .with_model(self.simulation_model.clone())
            .with_thinking_budget(self.thinking_budget);

        info!(
            reactants = input.reactants.len(),
            model = self.simulation_model.as_str(),
            "Running reaction simulation"
        );
        let response = self.provider.complete(request).await?;
        let parsed = parse_simulation_result(&response.text, self.policy)?;

        if parsed.is_degraded() {
            debug!(missing = ?parsed.missing_optional, "Result is missing optional fields");
        }
        info!(
            products = parsed.result.products.len(),
            feasibility = parsed.result.feasibility_score,
            tokens = response.usage.total(),
            "Simulation complete"
        );
        Ok(parsed)
    }

    /// Turn a free-text goal into suggested reactants and conditions.
    pub async fn interpret_goal(&self, goal: &str) -> Result<GoalInterpretation, SimulationError> {
        if goal.trim().is_empty() {
            return Err(SimulationError::EmptyGoal);
        }

        let request = StructuredRequest::new(goal_prompt(goal), goal_schema())
            .with_model(self.goal_model.clone());

        info!(model = self.goal_model.as_str(), "Interpreting goal");
        let response = self.provider.complete(request).await?;
        let interpretation = parse_goal_interpretation(&response.text)?;
        debug!(
            suggestions = interpretation.suggested_reactants.len(),
            temp = interpretation.suggested_temp,
            pressure = interpretation.suggested_pressure,
            "Goal interpreted"
        );
        Ok(interpretation)
    }
}
