//! # Rasaayan Core
//!
//! Core library for the Rasaayan in-silico reaction lab.
//! Provides PubChem identifier resolution, the LLM interface (brain) used
//! for reaction prediction and goal interpretation, the lab session state,
//! history and inventory persistence, configuration, and the shared types.

pub mod brain;
pub mod config;
pub mod error;
pub mod lab;
pub mod library;
pub mod providers;
pub mod pubchem;
pub mod resolver;
pub mod simulation;
pub mod store;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{LlmProvider, MockLlmProvider, StructuredRequest, StructuredResponse, TokenUsage};
pub use config::{LabConfig, ResultPolicy};
pub use error::{RasaayanError, Result};
pub use lab::{Lab, PlanOutcome, RequestKind, RequestPhase, Workspace};
pub use library::{Category, Inventory};
pub use providers::create_provider;
pub use pubchem::{MockPubChem, PubChemApi, PubChemClient};
pub use resolver::{BatchOutcome, IdentifierKind, IdentifierResolver};
pub use simulation::{ParsedResult, ReactionSimulator};
pub use store::{FileStore, HistoryLog, KeyValueStore, LabStore, MemoryStore};
pub use types::{
    GoalInterpretation, HistoryItem, Molecule, MoleculeProperties, PredictedChemical,
    ReactionInput, ReactionSimulationResult,
};
