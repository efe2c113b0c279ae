//! Chemical inventory: the built-in reagent library plus molecules the
//! user has discovered through simulations.

use crate::types::{Molecule, MoleculeProperties};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inventory shelf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Solvents,
    InorganicIonic,
    Precursors,
    CatalystsAdditives,
    Synthesized,
}

impl Category {
    /// Display order.
    pub const ALL: [Category; 5] = [
        Category::Solvents,
        Category::InorganicIonic,
        Category::Precursors,
        Category::CatalystsAdditives,
        Category::Synthesized,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Solvents => "Solvents",
            Category::InorganicIonic => "Inorganic/Ionic",
            Category::Precursors => "Precursors",
            Category::CatalystsAdditives => "Catalysts/Additives",
            Category::Synthesized => "Synthesized",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    /// Accepts the display label or a short alias, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "solvents" | "solvent" => Ok(Category::Solvents),
            "inorganic/ionic" | "inorganic" | "ionic" | "acids" | "bases" => {
                Ok(Category::InorganicIonic)
            }
            "precursors" | "precursor" | "building-blocks" => Ok(Category::Precursors),
            "catalysts/additives" | "catalysts" | "catalyst" | "additives" => {
                Ok(Category::CatalystsAdditives)
            }
            "synthesized" | "discovered" => Ok(Category::Synthesized),
            other => Err(format!(
                "unknown category '{}'; expected one of: solvents, inorganic, precursors, catalysts, synthesized",
                other
            )),
        }
    }
}

/// `(cid, name, smiles, molecular weight, logP, H-bond donors, H-bond acceptors, formula)`
type Entry = (u64, &'static str, &'static str, f64, f64, u32, u32, &'static str);

const SOLVENTS: &[Entry] = &[
    (180, "Acetone", "CC(=O)C", 58.08, -0.2, 0, 1, "C3H6O"),
    (174, "Ethylene Glycol", "C(CO)O", 62.07, -1.4, 2, 2, "C2H6O2"),
    (8028, "THF (Tetrahydrofuran)", "C1CCOC1", 72.11, 0.5, 0, 1, "C4H8O"),
    (702, "Ethanol", "CCO", 46.07, -0.3, 1, 1, "C2H6O"),
    (6344, "Dichloromethane", "C(Cl)Cl", 84.93, 1.3, 0, 0, "CH2Cl2"),
    (1140, "Toluene", "CC1=CC=CC=C1", 92.14, 2.7, 0, 0, "C7H8"),
    (679, "DMSO", "CS(=O)C", 78.13, -1.3, 0, 1, "C2H6OS"),
    (6228, "DMF", "CN(C)C=O", 73.09, -1.0, 0, 1, "C3H7NO"),
    (6341, "Acetonitrile", "CC#N", 41.05, -0.3, 0, 1, "C2H3N"),
    (176, "Acetic Acid", "CC(=O)O", 60.05, -0.17, 1, 2, "C2H4O2"),
];

const INORGANIC_IONIC: &[Entry] = &[
    (1118, "Sulfuric Acid", "OS(=O)(=O)O", 98.08, -2.2, 2, 4, "H2SO4"),
    (313, "Hydrochloric Acid", "Cl", 36.46, 0.0, 1, 0, "HCl"),
    (14798, "Sodium Hydroxide", "[OH-].[Na+]", 39.997, -1.4, 1, 1, "HNaO"),
    (222, "Ammonia", "N", 17.031, -0.6, 3, 1, "H3N"),
    (8471, "Triethylamine", "CCN(CC)CC", 101.19, 1.4, 0, 1, "C6H15N"),
    (1049, "Pyridine", "C1=CC=NC=C1", 79.1, 0.6, 0, 1, "C5H5N"),
    (24357, "Potassium Carbonate", "[K+].[K+].[C-](=O)([O-])[O-]", 138.2, -1.0, 0, 3, "CK2O3"),
    (23662, "Sodium Bicarbonate", "C(=O)(O)[O-].[Na+]", 84.007, -0.3, 1, 3, "CHNaO3"),
];

const PRECURSORS: &[Entry] = &[
    (241, "Benzene", "C1=CC=CC=C1", 78.11, 2.1, 0, 0, "C6H6"),
    (6115, "Aniline", "C1=CC=C(C=C1)N", 93.13, 0.9, 2, 1, "C6H7N"),
    (996, "Phenol", "C1=CC=C(C=C1)O", 94.11, 1.5, 1, 1, "C6H6O"),
    (240, "Benzaldehyde", "C1=CC=CC=C1C=O", 106.12, 1.5, 0, 1, "C7H6O"),
    (338, "Salicylic Acid", "C1=CC=C(C(=C1)C(=O)O)O", 138.12, 2.3, 2, 3, "C7H6O3"),
    (785, "Nitrobenzene", "C1=CC=C(C=C1)[N+](=O)[O-]", 123.11, 1.8, 0, 2, "C6H5NO2"),
    (7496, "Guaiacol", "COC1=CC=CC=C1O", 124.14, 1.3, 1, 2, "C7H8O2"),
    (4624, "Succinic Anhydride", "C1CC(=O)OC1=O", 100.07, -0.4, 0, 3, "C4H4O3"),
];

const CATALYSTS_ADDITIVES: &[Entry] = &[
    (1119, "Palladium on Carbon", "[Pd]", 106.42, 0.0, 0, 0, "Pd"),
    (14724, "Sodium Borohydride", "[BH4-].[Na+]", 37.83, -1.0, 0, 0, "H4BNa"),
    (23675, "Lithium Aluminum Hydride", "[Li+].[AlH4-]", 37.95, -1.0, 0, 0, "H4AlLi"),
    (
        8023,
        "Triphenylphosphine",
        "C1=CC=C(C=C1)P(C2=CC=CC=C2)C3=CC=CC=C3",
        262.29,
        5.7,
        0,
        0,
        "C18H15P",
    ),
];

fn to_molecule(&(cid, name, smiles, mw, log_p, hbd, hba, formula): &Entry) -> Molecule {
    Molecule::new(smiles)
        .with_cid(cid)
        .with_name(name)
        .with_properties(MoleculeProperties {
            molecular_weight: Some(mw),
            log_p: Some(log_p),
            h_bond_donors: Some(hbd),
            h_bond_acceptors: Some(hba),
            formula: Some(formula.to_string()),
            ..Default::default()
        })
}

/// Built-in molecules of a category. `Synthesized` has none.
pub fn builtin(category: Category) -> Vec<Molecule> {
    let entries: &[Entry] = match category {
        Category::Solvents => SOLVENTS,
        Category::InorganicIonic => INORGANIC_IONIC,
        Category::Precursors => PRECURSORS,
        Category::CatalystsAdditives => CATALYSTS_ADDITIVES,
        Category::Synthesized => &[],
    };
    entries.iter().map(to_molecule).collect()
}

/// All shelves, in [`Category::ALL`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct Inventory {
    shelves: Vec<(Category, Vec<Molecule>)>,
}

impl Inventory {
    /// The built-in library with an empty `Synthesized` shelf.
    pub fn builtin() -> Self {
        Self {
            shelves: Category::ALL.iter().map(|c| (*c, builtin(*c))).collect(),
        }
    }

    /// The built-in library plus previously discovered molecules, kept as
    /// loaded.
    pub fn with_synthesized(synthesized: Vec<Molecule>) -> Self {
        let mut inventory = Self::builtin();
        if let Some((_, shelf)) = inventory
            .shelves
            .iter_mut()
            .find(|(c, _)| *c == Category::Synthesized)
        {
            *shelf = synthesized;
        }
        inventory
    }

    pub fn category(&self, category: Category) -> &[Molecule] {
        self.shelves
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, shelf)| shelf.as_slice())
            .unwrap_or(&[])
    }

    pub fn synthesized(&self) -> &[Molecule] {
        self.category(Category::Synthesized)
    }

    pub fn shelves(&self) -> impl Iterator<Item = (Category, &[Molecule])> {
        self.shelves.iter().map(|(c, shelf)| (*c, shelf.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.shelves.iter().map(|(_, shelf)| shelf.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any shelf already holds `candidate`: equal SMILES, or equal
    /// CID when the candidate has one.
    pub fn contains(&self, candidate: &Molecule) -> bool {
        self.shelves.iter().flat_map(|(_, shelf)| shelf).any(|item| {
            item.smiles == candidate.smiles
                || (candidate.cid.is_some() && item.cid == candidate.cid)
        })
    }

    /// Append to `Synthesized` unless [`contains`](Self::contains) is true.
    /// Returns whether the molecule was added.
    pub fn add_synthesized(&mut self, molecule: Molecule) -> bool {
        if self.contains(&molecule) {
            return false;
        }
        match self
            .shelves
            .iter_mut()
            .find(|(c, _)| *c == Category::Synthesized)
        {
            Some((_, shelf)) => {
                shelf.push(molecule);
                true
            }
            None => false,
        }
    }

    /// Case-insensitive lookup by name, or exact match on SMILES.
    pub fn find(&self, query: &str) -> Option<&Molecule> {
        let query = query.trim();
        self.shelves.iter().flat_map(|(_, shelf)| shelf).find(|m| {
            m.smiles == query
                || m
                    .name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(query))
        })
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_library_shape() {
        let inventory = Inventory::builtin();
        assert_eq!(inventory.category(Category::Solvents).len(), 10);
        assert_eq!(inventory.category(Category::InorganicIonic).len(), 8);
        assert_eq!(inventory.category(Category::Precursors).len(), 8);
        assert_eq!(inventory.category(Category::CatalystsAdditives).len(), 4);
        assert!(inventory.synthesized().is_empty());

        let order: Vec<Category> = inventory.shelves().map(|(c, _)| c).collect();
        assert_eq!(order, Category::ALL.to_vec());
    }

    #[test]
    fn test_builtin_cids_are_unique() {
        let inventory = Inventory::builtin();
        let mut cids: Vec<u64> = inventory
            .shelves()
            .flat_map(|(_, shelf)| shelf.iter().filter_map(|m| m.cid))
            .collect();
        let total = cids.len();
        cids.sort_unstable();
        cids.dedup();
        assert_eq!(cids.len(), total);
    }

    #[test]
    fn test_ethanol_entry() {
        let inventory = Inventory::builtin();
        let ethanol = inventory.find("ethanol").unwrap();
        assert_eq!(ethanol.cid, Some(702));
        assert_eq!(ethanol.smiles, "CCO");
        assert_eq!(ethanol.properties.formula.as_deref(), Some("C2H6O"));
    }

    #[test]
    fn test_add_synthesized_dedups_across_shelves() {
        let mut inventory = Inventory::builtin();
        // Same SMILES as the built-in Ethanol.
        assert!(!inventory.add_synthesized(Molecule::new("CCO").with_name("Ethyl alcohol")));
        // Same CID as built-in Acetone, different SMILES spelling.
        assert!(!inventory.add_synthesized(Molecule::new("CC(C)=O").with_cid(180)));

        let ester = Molecule::new("CCOC(C)=O").with_name("Ethyl acetate");
        assert!(inventory.add_synthesized(ester.clone()));
        assert!(!inventory.add_synthesized(ester));
        assert_eq!(inventory.synthesized().len(), 1);
    }

    #[test]
    fn test_with_synthesized_keeps_loaded_entries() {
        let inventory = Inventory::with_synthesized(vec![Molecule::new("CCOC(C)=O")]);
        assert_eq!(inventory.synthesized().len(), 1);
        assert_eq!(inventory.len(), 31);
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("Solvents".parse::<Category>().unwrap(), Category::Solvents);
        assert_eq!(
            "inorganic/ionic".parse::<Category>().unwrap(),
            Category::InorganicIonic
        );
        assert_eq!(
            "CATALYSTS".parse::<Category>().unwrap(),
            Category::CatalystsAdditives
        );
        assert!("gases".parse::<Category>().is_err());
        assert_eq!(Category::CatalystsAdditives.to_string(), "Catalysts/Additives");
    }
}
