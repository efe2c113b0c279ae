//! Identifier resolution: turn a user-typed name, SMILES string or CID into
//! a fully described `Molecule` via PubChem.
//!
//! Every "could not resolve" condition ends in `None`, never an error; the
//! batch entry point collects those inputs so callers can report them
//! without aborting sibling lookups.

use crate::config::ResolverConfig;
use crate::pubchem::{Namespace, PropertyRecord, PropertySet, PubChemApi};
use crate::types::{Molecule, MoleculeProperties};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Characters that only appear in line notation, never in plain names.
const STRUCTURAL_CHARS: &[char] = &['(', ')', '[', ']', '=', '#'];

/// Inputs longer than this classify as SMILES when no threshold is configured.
pub const DEFAULT_SMILES_LENGTH_THRESHOLD: usize = 20;

/// Lexical class of a raw identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Cid,
    Smiles,
    Name,
}

impl IdentifierKind {
    pub fn classify(raw: &str) -> Self {
        Self::classify_with_threshold(raw, DEFAULT_SMILES_LENGTH_THRESHOLD)
    }

    /// all digits → CID; structural punctuation or longer than `threshold`
    /// characters → SMILES; anything else → name.
    pub fn classify_with_threshold(raw: &str, threshold: usize) -> Self {
        let id = raw.trim();
        if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
            return IdentifierKind::Cid;
        }
        if id.contains(STRUCTURAL_CHARS) || id.chars().count() > threshold {
            return IdentifierKind::Smiles;
        }
        IdentifierKind::Name
    }

    fn namespace(&self) -> Option<Namespace> {
        match self {
            IdentifierKind::Cid => None,
            IdentifierKind::Smiles => Some(Namespace::Smiles),
            IdentifierKind::Name => Some(Namespace::Name),
        }
    }
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentifierKind::Cid => write!(f, "cid"),
            IdentifierKind::Smiles => write!(f, "smiles"),
            IdentifierKind::Name => write!(f, "name"),
        }
    }
}

/// Split a comma-separated query into trimmed, non-empty identifiers.
pub fn split_query(query: &str) -> Vec<String> {
    query
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Result of resolving a comma-separated query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Resolved molecules, in input order.
    pub resolved: Vec<Molecule>,
    /// Inputs that could not be resolved, in input order.
    pub failed: Vec<String>,
}

impl BatchOutcome {
    /// User-facing failure line, or `None` when everything resolved.
    pub fn failure_message(&self) -> Option<String> {
        if self.failed.is_empty() {
            None
        } else {
            Some(format!("Failed to resolve: {}", self.failed.join(", ")))
        }
    }

    /// The query text is only cleared after a fully successful batch.
    pub fn should_clear_query(&self) -> bool {
        !self.resolved.is_empty() && self.failed.is_empty()
    }
}

/// Resolves identifiers against a `PubChemApi`.
pub struct IdentifierResolver {
    api: Arc<dyn PubChemApi>,
    config: ResolverConfig,
}

impl IdentifierResolver {
    pub fn new(api: Arc<dyn PubChemApi>, config: ResolverConfig) -> Self {
        Self { api, config }
    }

    pub fn api(&self) -> &Arc<dyn PubChemApi> {
        &self.api
    }

    pub fn classify(&self, raw: &str) -> IdentifierKind {
        IdentifierKind::classify_with_threshold(raw, self.config.smiles_length_threshold)
    }

    /// Resolve one identifier. `None` means "not found".
    pub async fn resolve(&self, raw: &str) -> Option<Molecule> {
        let id = raw.trim();
        if id.is_empty() {
            return None;
        }

        let kind = self.classify(id);
        debug!(identifier = id, kind = %kind, "Resolving identifier");

        let cid = match kind.namespace() {
            None => id.parse::<u64>().ok().filter(|cid| *cid != 0),
            Some(namespace) => {
                let mut cid = self.search(namespace, id).await;
                if cid.is_none() && kind == IdentifierKind::Name {
                    debug!(identifier = id, "Name lookup failed, retrying as SMILES");
                    cid = self.search(Namespace::Smiles, id).await;
                }
                cid
            }
        };

        let Some(cid) = cid else {
            warn!(identifier = id, "No CID found");
            return None;
        };

        let record = self.fetch_properties(cid).await?;

        let name = match self.api.synonym(cid).await {
            Ok(Some(name)) => name,
            Ok(None) => placeholder_name(cid),
            Err(e) => {
                warn!(cid, error = %e, "Synonym fetch failed");
                placeholder_name(cid)
            }
        };

        Some(molecule_from_record(cid, name, record))
    }

    /// Resolve every entry of a comma-separated query. Entries fail in
    /// isolation; at most `max_concurrency` lookups run at once and the
    /// output keeps input order.
    pub async fn resolve_batch(&self, query: &str) -> BatchOutcome {
        let identifiers = split_query(query);
        let limit = self.config.max_concurrency.max(1);
        let this = self;

        let results: Vec<(String, Option<Molecule>)> = futures::stream::iter(
            identifiers.into_iter().map(move |id| async move {
                let molecule = this.resolve(&id).await;
                (id, molecule)
            }),
        )
        .buffered(limit)
        .collect()
        .await;

        let mut outcome = BatchOutcome::default();
        for (id, molecule) in results {
            match molecule {
                Some(m) => outcome.resolved.push(m),
                None => outcome.failed.push(id),
            }
        }
        outcome
    }

    async fn search(&self, namespace: Namespace, id: &str) -> Option<u64> {
        match self.api.lookup_cid(namespace, id).await {
            Ok(cid) => cid,
            Err(e) => {
                warn!(identifier = id, namespace = namespace.as_path(), error = %e, "CID search failed");
                None
            }
        }
    }

    /// Full property set first, then the minimal set.
    async fn fetch_properties(&self, cid: u64) -> Option<PropertyRecord> {
        match self.api.properties(cid, PropertySet::Full).await {
            Ok(Some(record)) => return Some(record),
            Ok(None) => warn!(cid, "Full property table empty, trying minimal set"),
            Err(e) => warn!(cid, error = %e, "Full property fetch failed, trying minimal set"),
        }

        match self.api.properties(cid, PropertySet::Minimal).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                error!(cid, "Property table empty");
                None
            }
            Err(e) => {
                error!(cid, error = %e, "Failed to fetch properties");
                None
            }
        }
    }
}

fn placeholder_name(cid: u64) -> String {
    format!("CID {}", cid)
}

fn molecule_from_record(cid: u64, name: String, record: PropertyRecord) -> Molecule {
    Molecule {
        cid: Some(record.cid.unwrap_or(cid)),
        name: Some(name),
        smiles: record.structure().unwrap_or_default().to_string(),
        inchi: record.inchi.clone(),
        properties: MoleculeProperties {
            molecular_weight: record.molecular_weight,
            log_p: record.log_p(),
            h_bond_donors: Some(record.h_bond_donor_count.unwrap_or(0)),
            h_bond_acceptors: Some(record.h_bond_acceptor_count.unwrap_or(0)),
            rotatable_bonds: Some(record.rotatable_bond_count.unwrap_or(0)),
            formula: record.molecular_formula.clone(),
            tpsa: record.tpsa,
        },
    }
}
