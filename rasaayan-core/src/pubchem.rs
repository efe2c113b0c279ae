//! PubChem PUG REST client: identifier search, property tables, synonyms
//! and 3-D structure files.
//!
//! The `PubChemApi` trait is the seam the resolver talks to; `PubChemClient`
//! is the `reqwest` implementation and `MockPubChem` an in-memory one used by
//! tests and offline sessions.

use crate::config::PubChemConfig;
use crate::error::PubChemError;
use crate::types::Molecule;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Public compound summary page, outside the REST namespace.
const COMPOUND_PAGE_BASE: &str = "https://pubchem.ncbi.nlm.nih.gov/compound";

/// Input namespace for a CID search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Name,
    Smiles,
}

impl Namespace {
    pub fn as_path(&self) -> &'static str {
        match self {
            Namespace::Name => "name",
            Namespace::Smiles => "smiles",
        }
    }
}

/// Which property list to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertySet {
    Full,
    /// Reduced list used when the full request is rejected.
    Minimal,
}

impl PropertySet {
    pub fn as_path(&self) -> &'static str {
        match self {
            PropertySet::Full => {
                "MolecularWeight,XLogP,HBondDonorCount,HBondAcceptorCount,RotatableBondCount,MolecularFormula,CanonicalSMILES,InChI,TPSA"
            }
            PropertySet::Minimal => "MolecularWeight,MolecularFormula,CanonicalSMILES",
        }
    }
}

/// What to fetch a 3-D structure for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureTarget {
    Cid(u64),
    Smiles(String),
}

impl StructureTarget {
    /// Prefer the CID; fall back to the SMILES string.
    pub fn from_molecule(molecule: &Molecule) -> Option<Self> {
        match molecule.cid {
            Some(cid) => Some(StructureTarget::Cid(cid)),
            None if !molecule.smiles.is_empty() => {
                Some(StructureTarget::Smiles(molecule.smiles.clone()))
            }
            None => None,
        }
    }
}

/// One row of a PubChem property table.
///
/// PubChem reports some numbers as strings (`"MolecularWeight": "46.07"`),
/// so the float fields accept either form.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PropertyRecord {
    #[serde(rename = "CID", default)]
    pub cid: Option<u64>,
    #[serde(rename = "MolecularWeight", default, deserialize_with = "lenient_f64")]
    pub molecular_weight: Option<f64>,
    #[serde(rename = "XLogP", default, deserialize_with = "lenient_f64")]
    pub xlogp: Option<f64>,
    #[serde(rename = "LogP", default, deserialize_with = "lenient_f64")]
    pub logp: Option<f64>,
    #[serde(rename = "HBondDonorCount", default)]
    pub h_bond_donor_count: Option<u32>,
    #[serde(rename = "HBondAcceptorCount", default)]
    pub h_bond_acceptor_count: Option<u32>,
    #[serde(rename = "RotatableBondCount", default)]
    pub rotatable_bond_count: Option<u32>,
    #[serde(rename = "MolecularFormula", default)]
    pub molecular_formula: Option<String>,
    #[serde(rename = "CanonicalSMILES", default)]
    pub canonical_smiles: Option<String>,
    #[serde(rename = "ConnectivitySMILES", default)]
    pub connectivity_smiles: Option<String>,
    #[serde(rename = "SMILES", default)]
    pub smiles: Option<String>,
    #[serde(rename = "InChI", default)]
    pub inchi: Option<String>,
    #[serde(rename = "TPSA", default, deserialize_with = "lenient_f64")]
    pub tpsa: Option<f64>,
}

impl PropertyRecord {
    /// Structure string, preferring the canonical form.
    pub fn structure(&self) -> Option<&str> {
        self.canonical_smiles
            .as_deref()
            .or(self.connectivity_smiles.as_deref())
            .or(self.smiles.as_deref())
    }

    /// Lipophilicity estimate; XLogP wins over LogP.
    pub fn log_p(&self) -> Option<f64> {
        self.xlogp.or(self.logp)
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[derive(Deserialize)]
struct CidResponse {
    #[serde(rename = "IdentifierList")]
    identifier_list: Option<IdentifierList>,
}

#[derive(Deserialize)]
struct IdentifierList {
    #[serde(rename = "CID", default)]
    cid: Vec<u64>,
}

#[derive(Deserialize)]
struct PropertyResponse {
    #[serde(rename = "PropertyTable")]
    property_table: Option<PropertyTable>,
}

#[derive(Deserialize)]
struct PropertyTable {
    #[serde(rename = "Properties", default)]
    properties: Vec<PropertyRecord>,
}

#[derive(Deserialize)]
struct SynonymResponse {
    #[serde(rename = "InformationList")]
    information_list: Option<InformationList>,
}

#[derive(Deserialize)]
struct InformationList {
    #[serde(rename = "Information", default)]
    information: Vec<Information>,
}

#[derive(Deserialize)]
struct Information {
    #[serde(rename = "Synonym", default)]
    synonym: Vec<String>,
}

/// First CID of an `IdentifierList` body. CID 0 is PubChem's "no match".
pub fn parse_cid_response(body: &str) -> Result<Option<u64>, serde_json::Error> {
    let parsed: CidResponse = serde_json::from_str(body)?;
    Ok(parsed
        .identifier_list
        .and_then(|l| l.cid.into_iter().next())
        .filter(|cid| *cid != 0))
}

/// First row of a `PropertyTable` body.
pub fn parse_property_response(body: &str) -> Result<Option<PropertyRecord>, serde_json::Error> {
    let parsed: PropertyResponse = serde_json::from_str(body)?;
    Ok(parsed
        .property_table
        .and_then(|t| t.properties.into_iter().next()))
}

/// First synonym of the first `Information` entry.
pub fn parse_synonym_response(body: &str) -> Result<Option<String>, serde_json::Error> {
    let parsed: SynonymResponse = serde_json::from_str(body)?;
    Ok(parsed
        .information_list
        .and_then(|l| l.information.into_iter().next())
        .and_then(|i| i.synonym.into_iter().next())
        .filter(|s| !s.is_empty()))
}

pub fn cid_lookup_url(base: &str, namespace: Namespace, identifier: &str) -> String {
    format!(
        "{}/compound/{}/{}/cids/JSON",
        base,
        namespace.as_path(),
        urlencoding::encode(identifier)
    )
}

pub fn property_url(base: &str, cid: u64, set: PropertySet) -> String {
    format!("{}/compound/cid/{}/property/{}/JSON", base, cid, set.as_path())
}

pub fn synonym_url(base: &str, cid: u64) -> String {
    format!("{}/compound/cid/{}/synonyms/JSON", base, cid)
}

pub fn structure_url(base: &str, target: &StructureTarget) -> String {
    match target {
        StructureTarget::Cid(cid) => format!("{}/compound/cid/{}/SDF?record_type=3d", base, cid),
        StructureTarget::Smiles(smiles) => format!(
            "{}/compound/smiles/{}/SDF?record_type=3d",
            base,
            urlencoding::encode(smiles)
        ),
    }
}

pub fn image_url(base: &str, cid: u64) -> String {
    format!("{}/compound/cid/{}/PNG", base, cid)
}

pub fn compound_page_url(cid: u64) -> String {
    format!("{}/{}", COMPOUND_PAGE_BASE, cid)
}

/// Operations the resolver and the CLI need from the chemistry database.
#[async_trait]
pub trait PubChemApi: Send + Sync {
    /// Search for a CID. A non-success status means "no match" (`Ok(None)`).
    async fn lookup_cid(
        &self,
        namespace: Namespace,
        identifier: &str,
    ) -> Result<Option<u64>, PubChemError>;

    /// Fetch a property table row. A non-success status is an error so the
    /// caller can retry with a smaller set.
    async fn properties(
        &self,
        cid: u64,
        set: PropertySet,
    ) -> Result<Option<PropertyRecord>, PubChemError>;

    /// First synonym, usually the common name.
    async fn synonym(&self, cid: u64) -> Result<Option<String>, PubChemError>;

    /// 3-D SDF record.
    async fn structure_sdf(&self, target: &StructureTarget) -> Result<String, PubChemError>;

    /// 2-D depiction URL. Pure; no request is made.
    fn image_url(&self, cid: u64) -> String;
}

/// `reqwest`-backed PubChem client.
pub struct PubChemClient {
    client: reqwest::Client,
    base_url: String,
}

impl PubChemClient {
    pub fn new(config: &PubChemConfig) -> Result<Self, PubChemError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| PubChemError::Client {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a URL and return the status with the body text.
    async fn fetch(&self, url: &str) -> Result<(reqwest::StatusCode, String), PubChemError> {
        debug!(url, "PubChem request");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PubChemError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| PubChemError::Request {
            url: url.to_string(),
            message: format!("failed to read body: {}", e),
        })?;
        Ok((status, body))
    }

    fn parse_error(url: &str, e: serde_json::Error) -> PubChemError {
        PubChemError::ResponseParse {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl PubChemApi for PubChemClient {
    async fn lookup_cid(
        &self,
        namespace: Namespace,
        identifier: &str,
    ) -> Result<Option<u64>, PubChemError> {
        let url = cid_lookup_url(&self.base_url, namespace, identifier);
        let (status, body) = self.fetch(&url).await?;
        if !status.is_success() {
            debug!(url, status = status.as_u16(), "CID lookup returned no match");
            return Ok(None);
        }
        parse_cid_response(&body).map_err(|e| Self::parse_error(&url, e))
    }

    async fn properties(
        &self,
        cid: u64,
        set: PropertySet,
    ) -> Result<Option<PropertyRecord>, PubChemError> {
        let url = property_url(&self.base_url, cid, set);
        let (status, body) = self.fetch(&url).await?;
        if !status.is_success() {
            return Err(PubChemError::Status {
                url,
                status: status.as_u16(),
            });
        }
        parse_property_response(&body).map_err(|e| Self::parse_error(&url, e))
    }

    async fn synonym(&self, cid: u64) -> Result<Option<String>, PubChemError> {
        let url = synonym_url(&self.base_url, cid);
        let (status, body) = self.fetch(&url).await?;
        if !status.is_success() {
            return Ok(None);
        }
        parse_synonym_response(&body).map_err(|e| Self::parse_error(&url, e))
    }

    async fn structure_sdf(&self, target: &StructureTarget) -> Result<String, PubChemError> {
        let url = structure_url(&self.base_url, target);
        let (status, body) = self.fetch(&url).await?;
        if !status.is_success() {
            return Err(PubChemError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(body)
    }

    fn image_url(&self, cid: u64) -> String {
        image_url(&self.base_url, cid)
    }
}

/// A request observed by `MockPubChem`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    LookupCid {
        namespace: Namespace,
        identifier: String,
    },
    Properties {
        cid: u64,
        set: PropertySet,
    },
    Synonym {
        cid: u64,
    },
    StructureSdf {
        target: StructureTarget,
    },
}

/// In-memory PubChem for tests and offline use. Records every call.
#[derive(Default)]
pub struct MockPubChem {
    by_name: HashMap<String, u64>,
    by_smiles: HashMap<String, u64>,
    records: HashMap<u64, PropertyRecord>,
    synonyms: HashMap<u64, String>,
    full_property_failures: HashSet<u64>,
    broken_identifiers: HashSet<String>,
    calls: Mutex<Vec<MockCall>>,
    delay: Option<Duration>,
}

impl MockPubChem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compound searchable by name (case-insensitive) and SMILES.
    ///
    /// Only identity is recorded: formula and SMILES. Descriptors stay
    /// unset; use `with_molecule` or `with_record` to supply them.
    pub fn with_compound(mut self, cid: u64, name: &str, smiles: &str, formula: &str) -> Self {
        self.by_name.insert(name.to_lowercase(), cid);
        self.by_smiles.insert(smiles.to_string(), cid);
        self.records.insert(
            cid,
            PropertyRecord {
                cid: Some(cid),
                molecular_formula: Some(formula.to_string()),
                canonical_smiles: Some(smiles.to_string()),
                ..Default::default()
            },
        );
        self.synonyms.insert(cid, name.to_string());
        self
    }

    /// Register a known molecule, searchable by name and SMILES, with its
    /// own descriptors. Molecules without a CID are skipped.
    pub fn with_molecule(mut self, molecule: &Molecule) -> Self {
        let Some(cid) = molecule.cid else {
            return self;
        };
        if let Some(name) = &molecule.name {
            self.by_name.insert(name.to_lowercase(), cid);
            self.synonyms.insert(cid, name.clone());
        }
        self.by_smiles.insert(molecule.smiles.clone(), cid);
        let props = &molecule.properties;
        self.records.insert(
            cid,
            PropertyRecord {
                cid: Some(cid),
                molecular_weight: props.molecular_weight,
                xlogp: props.log_p,
                h_bond_donor_count: props.h_bond_donors,
                h_bond_acceptor_count: props.h_bond_acceptors,
                rotatable_bond_count: props.rotatable_bonds,
                molecular_formula: props.formula.clone(),
                canonical_smiles: Some(molecule.smiles.clone()),
                inchi: molecule.inchi.clone(),
                tpsa: props.tpsa,
                ..Default::default()
            },
        );
        self
    }

    /// Register a property record under a CID without search aliases.
    pub fn with_record(mut self, cid: u64, record: PropertyRecord) -> Self {
        self.records.insert(cid, record);
        self
    }

    /// Drop the synonym entry so the synonym lookup finds nothing.
    pub fn without_synonym(mut self, cid: u64) -> Self {
        self.synonyms.remove(&cid);
        self
    }

    /// Make the full property request for `cid` fail with HTTP 400.
    pub fn fail_full_properties(mut self, cid: u64) -> Self {
        self.full_property_failures.insert(cid);
        self
    }

    /// Hold every search and download for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every search for `identifier` fail at the transport level.
    pub fn fail_lookup(mut self, identifier: &str) -> Self {
        self.broken_identifiers.insert(identifier.to_string());
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of CID searches issued so far.
    pub fn lookup_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::LookupCid { .. }))
            .count()
    }

    fn record(&self, call: MockCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PubChemApi for MockPubChem {
    async fn lookup_cid(
        &self,
        namespace: Namespace,
        identifier: &str,
    ) -> Result<Option<u64>, PubChemError> {
        self.record(MockCall::LookupCid {
            namespace,
            identifier: identifier.to_string(),
        });
        self.wait().await;
        if self.broken_identifiers.contains(identifier) {
            return Err(PubChemError::Request {
                url: format!("mock://{}/{}", namespace.as_path(), identifier),
                message: "connection reset".to_string(),
            });
        }
        Ok(match namespace {
            Namespace::Name => self.by_name.get(&identifier.to_lowercase()).copied(),
            Namespace::Smiles => self.by_smiles.get(identifier).copied(),
        })
    }

    async fn properties(
        &self,
        cid: u64,
        set: PropertySet,
    ) -> Result<Option<PropertyRecord>, PubChemError> {
        self.record(MockCall::Properties { cid, set });
        if set == PropertySet::Full && self.full_property_failures.contains(&cid) {
            return Err(PubChemError::Status {
                url: format!("mock://cid/{}/property", cid),
                status: 400,
            });
        }
        match self.records.get(&cid) {
            Some(record) => Ok(Some(record.clone())),
            None => Err(PubChemError::Status {
                url: format!("mock://cid/{}/property", cid),
                status: 404,
            }),
        }
    }

    async fn synonym(&self, cid: u64) -> Result<Option<String>, PubChemError> {
        self.record(MockCall::Synonym { cid });
        Ok(self.synonyms.get(&cid).cloned())
    }

    async fn structure_sdf(&self, target: &StructureTarget) -> Result<String, PubChemError> {
        self.record(MockCall::StructureSdf {
            target: target.clone(),
        });
        self.wait().await;
        match target {
            StructureTarget::Cid(cid) if self.records.contains_key(cid) => {
                Ok(format!("{}\n  mock\n\n  0  0  0  0  0  0  0  0  0  0999 V2000\nM  END\n$$$$\n", cid))
            }
            _ => Err(PubChemError::Status {
                url: "mock://sdf".to_string(),
                status: 404,
            }),
        }
    }

    fn image_url(&self, cid: u64) -> String {
        format!("mock://cid/{}/PNG", cid)
    }
}
