//! Plain-text rendering of molecules, results, history and inventory.
//!
//! Everything here returns a `String` so the REPL and the subcommands print
//! the same text and tests can check it without capturing stdout.

use rasaayan_core::pubchem::compound_page_url;
use rasaayan_core::types::{PredictedChemical, SafetyWarning};
use rasaayan_core::{
    BatchOutcome, Category, HistoryItem, Inventory, Molecule, ParsedResult, PlanOutcome,
    ReactionSimulationResult, Workspace,
};
use std::fmt::Write;

/// One line per molecule: name, CID, formula, weight, SMILES.
pub fn molecule_line(molecule: &Molecule) -> String {
    let mut line = molecule.display_name();
    if let Some(cid) = molecule.cid {
        let _ = write!(line, "  [CID {}]", cid);
    }
    if let Some(formula) = &molecule.properties.formula {
        let _ = write!(line, "  {}", formula);
    }
    if let Some(mw) = molecule.properties.molecular_weight {
        let _ = write!(line, "  {:.2} g/mol", mw);
    }
    if !molecule.smiles.is_empty() && molecule.smiles != molecule.display_name() {
        let _ = write!(line, "  {}", molecule.smiles);
    }
    line
}

/// Descriptor block used by `resolve`.
pub fn molecule_details(molecule: &Molecule) -> String {
    let mut out = molecule_line(molecule);
    let p = &molecule.properties;
    let mut descriptors = Vec::new();
    if let Some(v) = p.log_p {
        descriptors.push(format!("logP {:.2}", v));
    }
    if let Some(v) = p.tpsa {
        descriptors.push(format!("TPSA {:.1} Å²", v));
    }
    if let Some(v) = p.h_bond_donors {
        descriptors.push(format!("HBD {}", v));
    }
    if let Some(v) = p.h_bond_acceptors {
        descriptors.push(format!("HBA {}", v));
    }
    if let Some(v) = p.rotatable_bonds {
        descriptors.push(format!("rot. bonds {}", v));
    }
    if !descriptors.is_empty() {
        let _ = write!(out, "\n    {}", descriptors.join(" | "));
    }
    if let Some(cid) = molecule.cid {
        let _ = write!(out, "\n    {}", compound_page_url(cid));
    }
    out
}

pub fn batch_outcome(outcome: &BatchOutcome) -> String {
    let mut out = String::new();
    for molecule in &outcome.resolved {
        let _ = writeln!(out, "  + {}", molecule_line(molecule));
    }
    if let Some(message) = outcome.failure_message() {
        let _ = writeln!(out, "  {}", message);
    }
    if outcome.resolved.is_empty() && outcome.failed.is_empty() {
        out.push_str("  Nothing to resolve.\n");
    }
    out
}

pub fn workspace(ws: &Workspace) -> String {
    let mut out = String::from("Reactants:\n");
    if ws.reactants.is_empty() {
        out.push_str("  (none; add some with /add)\n");
    }
    for (i, molecule) in ws.reactants.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", i + 1, molecule_line(molecule));
    }
    let catalysts = if ws.catalysts.trim().is_empty() {
        "None"
    } else {
        ws.catalysts.as_str()
    };
    let _ = writeln!(out, "Catalysts:  {}", catalysts);
    let _ = writeln!(
        out,
        "Conditions: {}°C, {} atm",
        ws.temperature, ws.pressure
    );
    if !ws.objective.trim().is_empty() {
        let _ = writeln!(out, "Objective:  {}", ws.objective);
    }
    if let Some(result) = &ws.result {
        let _ = writeln!(
            out,
            "Last result: {} product(s), feasibility {:.0}/100",
            result.products.len(),
            result.feasibility_score
        );
    }
    out
}

fn chemical_block(out: &mut String, index: usize, chemical: &PredictedChemical) {
    let _ = writeln!(
        out,
        "  {}. {} ({})  {:.2} g/mol  yield {}",
        index + 1,
        chemical.name,
        chemical.smiles,
        chemical.molecular_weight,
        chemical.yield_estimate
    );
    if !chemical.iupac_name.is_empty() && chemical.iupac_name != chemical.name {
        let _ = writeln!(out, "     IUPAC: {}", chemical.iupac_name);
    }
    if let Some(tpsa) = chemical.tpsa {
        let _ = writeln!(out, "     TPSA: {:.1} Å²", tpsa);
    }
    if !chemical.reasoning.is_empty() {
        let _ = writeln!(out, "     {}", chemical.reasoning);
    }
    if !chemical.applications.is_empty() {
        let _ = writeln!(out, "     Uses: {}", chemical.applications.join(", "));
    }
}

fn safety_line(warning: &SafetyWarning) -> String {
    let mut line = format!(
        "  [{}] {}: {}",
        warning.severity, warning.category, warning.description
    );
    if !warning.explanation.is_empty() {
        let _ = write!(line, "\n      {}", warning.explanation);
    }
    line
}

/// Full report of a simulation result.
pub fn simulation_report(result: &ReactionSimulationResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Feasibility: {:.0}/100   Energy: {}   Time: {}",
        result.feasibility_score, result.energy_trend, result.approx_time_required
    );

    out.push_str("\nProducts:\n");
    if result.products.is_empty() {
        out.push_str("  (none predicted)\n");
    }
    for (i, product) in result.products.iter().enumerate() {
        chemical_block(&mut out, i, product);
    }

    if !result.byproducts.is_empty() {
        out.push_str("\nByproducts:\n");
        for (i, byproduct) in result.byproducts.iter().enumerate() {
            chemical_block(&mut out, i, byproduct);
        }
    }

    if let Some(intermediates) = result.intermediates.as_ref().filter(|i| !i.is_empty()) {
        out.push_str("\nIntermediates:\n");
        for step in intermediates {
            let _ = writeln!(out, "  - {} ({}): {}", step.name, step.smiles, step.description);
        }
    }

    let _ = writeln!(out, "\nMechanism:\n  {}", result.mechanism_insight);
    if !result.alternative_route.is_empty() {
        let _ = writeln!(out, "\nAlternative route:\n  {}", result.alternative_route);
    }

    if !result.safety_assessment.is_empty() {
        out.push_str("\nSafety:\n");
        let mut warnings: Vec<&SafetyWarning> = result.safety_assessment.iter().collect();
        warnings.sort_by(|a, b| b.severity.cmp(&a.severity));
        for warning in warnings {
            let _ = writeln!(out, "{}", safety_line(warning));
        }
    }

    if let Some(notes) = result.condition_warnings.as_ref().filter(|w| !w.is_empty()) {
        out.push_str("\nCondition warnings:\n");
        for note in notes {
            let _ = writeln!(out, "  ! {}", note);
        }
    }

    if let Some(ml) = &result.ml_accuracy {
        let consensus = &ml.model_consensus;
        let _ = writeln!(
            out,
            "\nModel confidence: {:.0}%  mass balance: {}  consensus: structural {} / thermodynamic {} / kinetic {}",
            ml.confidence_score,
            ml.mass_balance_status,
            yes_no(consensus.structural),
            yes_no(consensus.thermodynamic),
            yes_no(consensus.kinetic)
        );
        if !ml.error_margin.is_empty() {
            let _ = writeln!(out, "  error margin: {}", ml.error_margin);
        }
    }
    out
}

fn yes_no(v: bool) -> &'static str {
    if v { "yes" } else { "no" }
}

/// Report plus a note on any optional fields the model left out.
pub fn parsed_report(parsed: &ParsedResult) -> String {
    let mut out = simulation_report(&parsed.result);
    if parsed.is_degraded() {
        let _ = writeln!(
            out,
            "\nNote: the model omitted {}",
            parsed.missing_optional.join(", ")
        );
    }
    out
}

/// Single-line history entry.
pub fn history_line(item: &HistoryItem) -> String {
    let reactants = item
        .input
        .reactants
        .iter()
        .map(Molecule::display_name)
        .collect::<Vec<_>>()
        .join(" + ");
    let products = item
        .result
        .products
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let when = item
        .timestamp
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M");
    format!(
        "{}  {}  {} -> {}  ({:.0}/100)",
        item.id,
        when,
        reactants,
        if products.is_empty() { "?" } else { products.as_str() },
        item.result.feasibility_score
    )
}

pub fn history_detail(item: &HistoryItem) -> String {
    let mut out = history_line(item);
    out.push_str("\n\n");
    let input = &item.input;
    for (i, molecule) in input.reactants.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", i + 1, molecule_line(molecule));
    }
    let _ = writeln!(
        out,
        "Catalysts: {}   Conditions: {}°C, {} atm",
        if input.catalysts.trim().is_empty() {
            "None"
        } else {
            input.catalysts.as_str()
        },
        input.temperature,
        input.pressure
    );
    if !input.description.trim().is_empty() {
        let _ = writeln!(out, "Objective: {}", input.description);
    }
    out.push('\n');
    out.push_str(&simulation_report(&item.result));
    out
}

pub fn plan(outcome: &PlanOutcome) -> String {
    let goal = &outcome.interpretation;
    let mut out = format!(
        "Suggested conditions: {}°C, {} atm\nRationale: {}\n",
        goal.suggested_temp, goal.suggested_pressure, goal.rationale
    );
    for molecule in &outcome.resolved {
        let _ = writeln!(out, "  + {}", molecule_line(molecule));
    }
    if !outcome.failed.is_empty() {
        let _ = writeln!(out, "  Could not resolve: {}", outcome.failed.join(", "));
    }
    if goal.suggested_reactants.is_empty() {
        out.push_str("  No reactants were suggested.\n");
    }
    out
}

pub fn inventory(inventory: &Inventory, only: Option<Category>) -> String {
    let mut out = String::new();
    for (category, shelf) in inventory.shelves() {
        if only.is_some_and(|c| c != category) {
            continue;
        }
        let _ = writeln!(out, "{} ({}):", category, shelf.len());
        if shelf.is_empty() {
            out.push_str("  (empty)\n");
        }
        for molecule in shelf {
            let _ = writeln!(out, "  {}", molecule_line(molecule));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rasaayan_core::types::{
        EnergyTrend, GoalInterpretation, MoleculeProperties, ReactionInput, SafetyCategory,
        Severity,
    };

    fn ethanol() -> Molecule {
        Molecule::new("CCO")
            .with_cid(702)
            .with_name("Ethanol")
            .with_properties(MoleculeProperties {
                molecular_weight: Some(46.07),
                formula: Some("C2H6O".to_string()),
                ..Default::default()
            })
    }

    fn result() -> ReactionSimulationResult {
        ReactionSimulationResult {
            products: vec![PredictedChemical {
                smiles: "CCOC(C)=O".to_string(),
                name: "Ethyl acetate".to_string(),
                iupac_name: "ethyl acetate".to_string(),
                molecular_weight: 88.11,
                tpsa: None,
                yield_estimate: "65%".to_string(),
                reasoning: "Fischer esterification".to_string(),
                applications: vec!["Solvent".to_string()],
            }],
            byproducts: vec![],
            intermediates: None,
            feasibility_score: 72.0,
            energy_trend: EnergyTrend::Exothermic,
            mechanism_insight: "Acid-catalysed acyl substitution.".to_string(),
            approx_time_required: "4 h".to_string(),
            alternative_route: String::new(),
            safety_assessment: vec![
                SafetyWarning {
                    category: SafetyCategory::Toxicity,
                    severity: Severity::Low,
                    description: "Mild irritant".to_string(),
                    explanation: String::new(),
                },
                SafetyWarning {
                    category: SafetyCategory::Flammability,
                    severity: Severity::High,
                    description: "Flammable vapours".to_string(),
                    explanation: String::new(),
                },
            ],
            condition_warnings: None,
            ml_accuracy: None,
        }
    }

    #[test]
    fn test_molecule_line() {
        assert_eq!(
            molecule_line(&ethanol()),
            "Ethanol  [CID 702]  C2H6O  46.07 g/mol  CCO"
        );
        assert_eq!(molecule_line(&Molecule::new("C1CC1")), "C1CC1");
    }

    #[test]
    fn test_batch_outcome_reports_failures() {
        let outcome = BatchOutcome {
            resolved: vec![ethanol()],
            failed: vec!["161".to_string()],
        };
        let text = batch_outcome(&outcome);
        assert!(text.contains("+ Ethanol"));
        assert!(text.contains("Failed to resolve: 161"));
    }

    #[test]
    fn test_workspace_numbers_reactants_from_one() {
        let mut ws = Workspace::new();
        ws.add_reactant(ethanol());
        let text = workspace(&ws);
        assert!(text.contains("1. Ethanol"));
        assert!(text.contains("Catalysts:  None"));
        assert!(text.contains("25°C, 1 atm"));
    }

    #[test]
    fn test_report_sorts_safety_by_severity() {
        let text = simulation_report(&result());
        let high = text.find("Flammable vapours").unwrap();
        let low = text.find("Mild irritant").unwrap();
        assert!(high < low);
        assert!(text.contains("1. Ethyl acetate"));
        assert!(text.contains("Feasibility: 72/100"));
        assert!(!text.contains("Model confidence"));
    }

    #[test]
    fn test_parsed_report_mentions_missing_fields() {
        let parsed = ParsedResult {
            result: result(),
            missing_optional: vec!["mlAccuracy".to_string(), "products[0].tpsa".to_string()],
        };
        assert!(parsed_report(&parsed).contains("the model omitted mlAccuracy, products[0].tpsa"));
    }

    #[test]
    fn test_history_line() {
        let item = HistoryItem {
            id: "ABC123XYZ".to_string(),
            timestamp: chrono::Utc::now(),
            input: ReactionInput {
                reactants: vec![ethanol(), Molecule::new("CC(=O)O").with_name("Acetic Acid")],
                catalysts: String::new(),
                temperature: 25.0,
                pressure: 1.0,
                description: String::new(),
            },
            result: result(),
        };
        let line = history_line(&item);
        assert!(line.starts_with("ABC123XYZ"));
        assert!(line.contains("Ethanol + Acetic Acid -> Ethyl acetate"));
        assert!(history_detail(&item).contains("Catalysts: None"));
    }

    #[test]
    fn test_plan_lists_unresolved() {
        let outcome = PlanOutcome {
            interpretation: GoalInterpretation {
                suggested_reactants: vec!["Ethanol".to_string(), "Unobtainium".to_string()],
                suggested_temp: 60.0,
                suggested_pressure: 1.0,
                rationale: "Esterification".to_string(),
            },
            resolved: vec![ethanol()],
            failed: vec!["Unobtainium".to_string()],
        };
        let text = plan(&outcome);
        assert!(text.contains("60°C, 1 atm"));
        assert!(text.contains("Could not resolve: Unobtainium"));
    }

    #[test]
    fn test_inventory_filter() {
        let inv = Inventory::builtin();
        let text = inventory(&inv, Some(Category::Synthesized));
        assert!(text.starts_with("Synthesized (0):"));
        assert!(text.contains("(empty)"));
        assert!(!text.contains("Solvents"));
    }
}
