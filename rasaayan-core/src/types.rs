//! Core data types for Rasaayan.
//!
//! All types serialize with camelCase field names. The same JSON shape is
//! requested from the model, persisted in the history log and exchanged
//! with the inventory file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Descriptor bag attached to a molecule. Every field is optional because
/// PubChem omits some descriptors for inorganic or very small compounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoleculeProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub molecular_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_bond_donors: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_bond_acceptors: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotatable_bonds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// Topological polar surface area in Å².
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpsa: Option<f64>,
}

/// A molecule as held in the reactant list, the inventory and history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Molecule {
    /// PubChem compound identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub smiles: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inchi: Option<String>,
    #[serde(default)]
    pub properties: MoleculeProperties,
}

impl Molecule {
    pub fn new(smiles: impl Into<String>) -> Self {
        Self {
            cid: None,
            name: None,
            smiles: smiles.into(),
            inchi: None,
            properties: MoleculeProperties::default(),
        }
    }

    pub fn with_cid(mut self, cid: u64) -> Self {
        self.cid = Some(cid);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_properties(mut self, properties: MoleculeProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Whether `self` duplicates `existing`: same CID when `self` carries
    /// one, otherwise the same SMILES string.
    pub fn same_identity(&self, existing: &Molecule) -> bool {
        match self.cid {
            Some(cid) => existing.cid == Some(cid),
            None => existing.smiles == self.smiles,
        }
    }

    /// Human-facing label: name, then `CID n`, then the raw SMILES.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name
            && !name.is_empty()
        {
            return name.clone();
        }
        match self.cid {
            Some(cid) => format!("CID {}", cid),
            None => self.smiles.clone(),
        }
    }
}

/// Snapshot of the workspace submitted for simulation. Immutable once
/// built; stored verbatim in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionInput {
    pub reactants: Vec<Molecule>,
    /// Free-text catalyst / reagent description.
    pub catalysts: String,
    /// Temperature in °C.
    pub temperature: f64,
    /// Pressure in atm.
    pub pressure: f64,
    /// Free-text objective.
    pub description: String,
}

/// A product or byproduct predicted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictedChemical {
    pub smiles: String,
    pub name: String,
    pub iupac_name: String,
    pub molecular_weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpsa: Option<f64>,
    pub yield_estimate: String,
    pub reasoning: String,
    #[serde(default)]
    pub applications: Vec<String>,
}

impl PredictedChemical {
    /// Convert into an inventory molecule. Predicted chemicals carry no CID.
    pub fn to_molecule(&self) -> Molecule {
        Molecule::new(self.smiles.clone())
            .with_name(self.name.clone())
            .with_properties(MoleculeProperties {
                molecular_weight: Some(self.molecular_weight),
                tpsa: self.tpsa,
                ..Default::default()
            })
    }
}

/// An intermediate species along the proposed mechanism.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Intermediate {
    pub smiles: String,
    pub name: String,
    pub description: String,
}

/// Categorical energy trend of the reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EnergyTrend {
    Exothermic,
    Endothermic,
    Neutral,
}

impl From<String> for EnergyTrend {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "exothermic" => EnergyTrend::Exothermic,
            "endothermic" => EnergyTrend::Endothermic,
            _ => EnergyTrend::Neutral,
        }
    }
}

impl From<EnergyTrend> for String {
    fn from(t: EnergyTrend) -> Self {
        t.to_string()
    }
}

impl fmt::Display for EnergyTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnergyTrend::Exothermic => write!(f, "Exothermic"),
            EnergyTrend::Endothermic => write!(f, "Endothermic"),
            EnergyTrend::Neutral => write!(f, "Neutral"),
        }
    }
}

/// Hazard category of a safety warning. Categories the model invents are
/// kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SafetyCategory {
    Toxicity,
    Flammability,
    Explosiveness,
    Environmental,
    Regulatory,
    EnvironmentMismatch,
    Other(String),
}

impl From<String> for SafetyCategory {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "toxicity" => SafetyCategory::Toxicity,
            "flammability" => SafetyCategory::Flammability,
            "explosiveness" => SafetyCategory::Explosiveness,
            "environmental" => SafetyCategory::Environmental,
            "regulatory" => SafetyCategory::Regulatory,
            "environmentmismatch" | "environment mismatch" => SafetyCategory::EnvironmentMismatch,
            _ => SafetyCategory::Other(s),
        }
    }
}

impl From<SafetyCategory> for String {
    fn from(c: SafetyCategory) -> Self {
        c.to_string()
    }
}

impl fmt::Display for SafetyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyCategory::Toxicity => write!(f, "Toxicity"),
            SafetyCategory::Flammability => write!(f, "Flammability"),
            SafetyCategory::Explosiveness => write!(f, "Explosiveness"),
            SafetyCategory::Environmental => write!(f, "Environmental"),
            SafetyCategory::Regulatory => write!(f, "Regulatory"),
            SafetyCategory::EnvironmentMismatch => write!(f, "EnvironmentMismatch"),
            SafetyCategory::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Severity of a safety warning, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl From<String> for Severity {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Severity::Low,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            _ => Severity::Medium,
        }
    }
}

impl From<Severity> for String {
    fn from(s: Severity) -> Self {
        s.to_string()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyWarning {
    pub category: SafetyCategory,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MassBalanceStatus {
    Verified,
    ImbalanceDetected,
    Unknown,
}

impl From<String> for MassBalanceStatus {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "verified" => MassBalanceStatus::Verified,
            "imbalance detected" | "imbalancedetected" => MassBalanceStatus::ImbalanceDetected,
            _ => MassBalanceStatus::Unknown,
        }
    }
}

impl From<MassBalanceStatus> for String {
    fn from(s: MassBalanceStatus) -> Self {
        s.to_string()
    }
}

impl fmt::Display for MassBalanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MassBalanceStatus::Verified => write!(f, "Verified"),
            MassBalanceStatus::ImbalanceDetected => write!(f, "Imbalance Detected"),
            MassBalanceStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Per-aspect agreement of the simulated predictive models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConsensus {
    pub structural: bool,
    pub thermodynamic: bool,
    pub kinetic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MlAccuracyMetrics {
    /// 0–100.
    pub confidence_score: f64,
    pub mass_balance_status: MassBalanceStatus,
    #[serde(default)]
    pub model_consensus: ModelConsensus,
    #[serde(default)]
    pub error_margin: String,
}

/// Prediction returned by the model. Opaque to the application: it is
/// never recomputed or independently verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionSimulationResult {
    pub products: Vec<PredictedChemical>,
    pub byproducts: Vec<PredictedChemical>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediates: Option<Vec<Intermediate>>,
    /// 0–100.
    pub feasibility_score: f64,
    pub energy_trend: EnergyTrend,
    pub mechanism_insight: String,
    pub approx_time_required: String,
    pub alternative_route: String,
    pub safety_assessment: Vec<SafetyWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_warnings: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml_accuracy: Option<MlAccuracyMetrics>,
}

impl ReactionSimulationResult {
    /// Most severe safety warning, if any.
    pub fn max_severity(&self) -> Option<Severity> {
        self.safety_assessment.iter().map(|w| w.severity).max()
    }
}

/// One entry of the simulation history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub input: ReactionInput,
    pub result: ReactionSimulationResult,
}

/// Model-suggested reaction parameters for a free-text research goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalInterpretation {
    pub suggested_reactants: Vec<String>,
    pub suggested_temp: f64,
    pub suggested_pressure: f64,
    pub rationale: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_molecule_serializes_camel_case() {
        let m = Molecule::new("CCO")
            .with_cid(702)
            .with_name("Ethanol")
            .with_properties(MoleculeProperties {
                molecular_weight: Some(46.07),
                h_bond_donors: Some(1),
                log_p: Some(-0.3),
                ..Default::default()
            });
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["cid"], 702);
        assert_eq!(json["properties"]["molecularWeight"], 46.07);
        assert_eq!(json["properties"]["hBondDonors"], 1);
        assert_eq!(json["properties"]["logP"], -0.3);
        assert!(json.get("inchi").is_none());
    }

    #[test]
    fn test_same_identity_by_cid() {
        let a = Molecule::new("CCO").with_cid(702);
        let b = Molecule::new("OCC").with_cid(702);
        let c = Molecule::new("CCO").with_cid(703);
        assert!(b.same_identity(&a));
        assert!(!c.same_identity(&a));
    }

    #[test]
    fn test_same_identity_by_smiles_without_cid() {
        let existing = Molecule::new("CCO").with_cid(702);
        let candidate = Molecule::new("CCO");
        assert!(candidate.same_identity(&existing));
        assert!(!Molecule::new("CC(=O)O").same_identity(&existing));
    }

    #[test]
    fn test_display_name_fallbacks() {
        assert_eq!(Molecule::new("O").with_name("Water").display_name(), "Water");
        assert_eq!(Molecule::new("O").with_cid(962).display_name(), "CID 962");
        assert_eq!(Molecule::new("O").display_name(), "O");
    }

    #[test]
    fn test_lenient_enum_parsing() {
        let w: SafetyWarning = serde_json::from_value(serde_json::json!({
            "category": "Corrosivity",
            "severity": "HIGH",
            "description": "Burns"
        }))
        .unwrap();
        assert_eq!(w.category, SafetyCategory::Other("Corrosivity".into()));
        assert_eq!(w.severity, Severity::High);
        assert_eq!(w.explanation, "");

        let s: MassBalanceStatus = serde_json::from_str("\"Imbalance Detected\"").unwrap();
        assert_eq!(s, MassBalanceStatus::ImbalanceDetected);
        assert_eq!(
            serde_json::to_string(&s).unwrap(),
            "\"Imbalance Detected\""
        );
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_predicted_chemical_to_molecule() {
        let p = PredictedChemical {
            smiles: "CCOC(C)=O".into(),
            name: "Ethyl acetate".into(),
            iupac_name: "ethyl ethanoate".into(),
            molecular_weight: 88.11,
            tpsa: Some(26.3),
            yield_estimate: "65%".into(),
            reasoning: "Fischer esterification".into(),
            applications: vec!["Solvent".into()],
        };
        let m = p.to_molecule();
        assert_eq!(m.cid, None);
        assert_eq!(m.name.as_deref(), Some("Ethyl acetate"));
        assert_eq!(m.properties.molecular_weight, Some(88.11));
        assert_eq!(m.properties.tpsa, Some(26.3));
    }
}
