//! CLI subcommand handlers.

use crate::render;
use crate::{Commands, ConfigAction, HistoryAction, InventoryAction};
use rasaayan_core::config::workspace_config_path;
use rasaayan_core::pubchem::{StructureTarget, compound_page_url};
use rasaayan_core::{
    Category, Inventory, Lab, LabConfig, LabStore, LlmProvider, MockLlmProvider, MockPubChem,
    PubChemApi, PubChemClient, create_provider,
};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

/// Build a lab session.
///
/// Offline sessions answer with placeholder predictions, resolve only the
/// built-in library and keep history in memory.
pub fn open_lab(config: &LabConfig, offline: bool) -> anyhow::Result<Lab> {
    if offline {
        let library = Inventory::builtin();
        let pubchem = library
            .shelves()
            .flat_map(|(_, shelf)| shelf.iter())
            .fold(MockPubChem::new(), |mock, molecule| mock.with_molecule(molecule));
        let store = LabStore::in_memory(config.store.history_capacity);
        return Ok(Lab::from_config(
            config,
            Arc::new(pubchem),
            Arc::new(MockLlmProvider::offline()),
            store,
        ));
    }

    let pubchem: Arc<dyn PubChemApi> = Arc::new(PubChemClient::new(&config.pubchem)?);
    let provider: Arc<dyn LlmProvider> = match create_provider(&config.llm) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("LLM provider init failed: {}. Using offline placeholders.", e);
            eprintln!(
                "\x1b[33mNo usable model ({}). Predictions will be placeholders.\x1b[0m",
                e
            );
            Arc::new(MockLlmProvider::offline())
        }
    };
    let data_dir = config.store.resolve_data_dir();
    tracing::debug!(dir = %data_dir.display(), "Opening lab store");
    let store = LabStore::open_dir(data_dir, config.store.history_capacity);
    Ok(Lab::from_config(config, pubchem, provider, store))
}

/// Await `fut`; a ctrl-c while it runs cancels the lab's in-flight request
/// and waits for the request to wind down.
pub async fn interruptible<F: Future>(lab: &Lab, fut: F) -> F::Output {
    tokio::pin!(fut);
    tokio::select! {
        biased;
        out = &mut fut => out,
        _ = tokio::signal::ctrl_c() => {
            lab.cancel();
            fut.await
        }
    }
}

/// Convert a 1-based product number as printed in reports.
pub fn product_index(number: usize) -> anyhow::Result<usize> {
    number
        .checked_sub(1)
        .ok_or_else(|| anyhow::anyhow!("Product numbers start at 1"))
}

/// Write the default configuration to `<workspace>/.rasaayan/config.toml`.
pub fn init_config(workspace: &Path) -> anyhow::Result<()> {
    let config_path = workspace_config_path(workspace);
    if config_path.exists() {
        println!(
            "Configuration file already exists at: {}",
            config_path.display()
        );
        return Ok(());
    }
    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let toml_str = toml::to_string_pretty(&LabConfig::default())?;
    std::fs::write(&config_path, &toml_str)?;
    println!(
        "Created default configuration at: {}",
        config_path.display()
    );
    Ok(())
}

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config: &LabConfig,
    offline: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace, config),
        Commands::Resolve { query } => {
            let lab = open_lab(config, offline)?;
            handle_resolve(&lab, &query).await
        }
        Commands::Simulate {
            reactants,
            catalysts,
            temp,
            pressure,
            objective,
        } => {
            let lab = open_lab(config, offline)?;
            lab.with_workspace(|ws| {
                ws.catalysts = catalysts;
                ws.temperature = temp;
                ws.pressure = pressure;
                ws.objective = objective;
            });
            let outcome = interruptible(&lab, lab.search(&reactants)).await?;
            print!("{}", render::batch_outcome(&outcome));
            if !outcome.failed.is_empty() {
                anyhow::bail!("Not every reactant resolved; nothing was simulated");
            }
            run_simulation(&lab).await
        }
        Commands::Plan { goal, run } => {
            let lab = open_lab(config, offline)?;
            let outcome = interruptible(&lab, lab.plan(&goal)).await?;
            print!("{}", render::plan(&outcome));
            if run {
                run_simulation(&lab).await?;
            }
            Ok(())
        }
        Commands::History { action } => handle_history(action, config, offline),
        Commands::Inventory { action } => handle_inventory(action, config, offline),
        Commands::Structure { identifier, out } => {
            let lab = open_lab(config, offline)?;
            handle_structure(&lab, &identifier, out.as_deref()).await
        }
    }
}

async fn run_simulation(lab: &Lab) -> anyhow::Result<()> {
    println!(
        "\x1b[90m  simulating with {}...\x1b[0m",
        lab.simulator().provider().model_name()
    );
    let parsed = interruptible(lab, lab.simulate()).await?;
    println!();
    print!("{}", render::parsed_report(&parsed));
    if let Some(latest) = lab.history().first() {
        println!("\nSaved as {}", latest.id);
    }
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path, config: &LabConfig) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => init_config(workspace),
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

async fn handle_resolve(lab: &Lab, query: &str) -> anyhow::Result<()> {
    let outcome = interruptible(lab, lab.lookup(query)).await?;
    for molecule in &outcome.resolved {
        println!("{}", render::molecule_details(molecule));
    }
    if let Some(message) = outcome.failure_message() {
        anyhow::bail!(message);
    }
    if outcome.resolved.is_empty() {
        println!("Nothing to resolve.");
    }
    Ok(())
}

fn handle_history(action: HistoryAction, config: &LabConfig, offline: bool) -> anyhow::Result<()> {
    let lab = open_lab(config, offline)?;
    match action {
        HistoryAction::List => {
            let history = lab.history();
            if history.is_empty() {
                println!("No simulations recorded yet.");
            }
            for item in &history {
                println!("{}", render::history_line(item));
            }
            Ok(())
        }
        HistoryAction::Show { id, json } => {
            let item = lab
                .history_item(&id)
                .ok_or_else(|| anyhow::anyhow!("History entry not found: {}", id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&item)?);
            } else {
                print!("{}", render::history_detail(&item));
            }
            Ok(())
        }
        HistoryAction::Clear => {
            let count = lab.history().len();
            lab.clear_history()?;
            println!("Removed {} history entries.", count);
            Ok(())
        }
    }
}

fn handle_inventory(
    action: InventoryAction,
    config: &LabConfig,
    offline: bool,
) -> anyhow::Result<()> {
    let lab = open_lab(config, offline)?;
    match action {
        InventoryAction::List { category } => {
            let only = category
                .as_deref()
                .map(str::parse::<Category>)
                .transpose()
                .map_err(|e| anyhow::anyhow!(e))?;
            print!("{}", render::inventory(&lab.inventory(), only));
            Ok(())
        }
        InventoryAction::Discover {
            history_id,
            product,
        } => {
            let index = product_index(product)?;
            if lab.discover_from_history(&history_id, index)? {
                println!("Added product {} of {} to Synthesized.", product, history_id);
            } else {
                println!("Already in the inventory.");
            }
            Ok(())
        }
    }
}

async fn handle_structure(lab: &Lab, identifier: &str, out: Option<&Path>) -> anyhow::Result<()> {
    let (target, sdf) = interruptible(lab, lab.structure(identifier))
        .await?
        .ok_or_else(|| anyhow::anyhow!("Could not resolve '{}'", identifier))?;

    match out {
        Some(path) => {
            std::fs::write(path, &sdf)?;
            println!("Wrote 3-D structure to {}", path.display());
            if let StructureTarget::Cid(cid) = target {
                println!("  2-D depiction: {}", lab.resolver().api().image_url(cid));
                println!("  PubChem page:  {}", compound_page_url(cid));
            }
        }
        None => print!("{}", sdf),
    }
    Ok(())
}
