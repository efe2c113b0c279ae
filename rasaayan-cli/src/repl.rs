//! Interactive lab session.

use crate::commands::{interruptible, product_index};
use crate::render;
use crate::slash::CommandRegistry;
use rasaayan_core::{Category, Lab, LabConfig};
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

/// A parsed line of REPL input.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Add(String),
    /// 0-based reactant position.
    Remove(usize),
    Clear,
    Temp(f64),
    Pressure(f64),
    Catalysts(String),
    Objective(String),
    Status,
    Run,
    Plan(String),
    Report,
    History,
    Load(String),
    Inventory(Option<Category>),
    /// 0-based product position, optionally of a history entry.
    Discover(usize, Option<String>),
    Help,
    Quit,
}

fn parse_number(value: &str, what: &str) -> Result<f64, String> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("Expected a number for {}, got '{}'", what, value))
}

fn parse_position(value: &str, usage: &str) -> Result<usize, String> {
    value
        .parse::<usize>()
        .ok()
        .and_then(|n| product_index(n).ok())
        .ok_or_else(|| format!("Usage: {}", usage))
}

/// Parse one line. Text without a leading slash is an implicit `/add`.
pub fn parse_line(registry: &CommandRegistry, input: &str) -> Result<ReplCommand, String> {
    let input = input.trim();
    if !input.starts_with('/') {
        return Ok(ReplCommand::Add(input.to_string()));
    }
    let (cmd, arg) = input
        .split_once(char::is_whitespace)
        .map(|(c, a)| (c, a.trim()))
        .unwrap_or((input, ""));

    let Some(info) = registry.lookup(cmd) else {
        return Err(match registry.suggest(cmd) {
            Some(suggestion) => format!("Unknown command: {}. Did you mean {}?", cmd, suggestion),
            None => format!("Unknown command: {}. Type /help for available commands.", cmd),
        });
    };
    let needs_arg = |usage: &str| {
        if arg.is_empty() {
            Err(format!("Usage: {}", usage))
        } else {
            Ok(arg.to_string())
        }
    };

    match info.name {
        "/add" => needs_arg(info.usage).map(ReplCommand::Add),
        "/remove" => parse_position(arg, info.usage).map(ReplCommand::Remove),
        "/clear" => Ok(ReplCommand::Clear),
        "/temp" => parse_number(arg, "temperature").map(ReplCommand::Temp),
        "/pressure" => parse_number(arg, "pressure").map(ReplCommand::Pressure),
        "/catalysts" => Ok(ReplCommand::Catalysts(arg.to_string())),
        "/objective" => Ok(ReplCommand::Objective(arg.to_string())),
        "/status" => Ok(ReplCommand::Status),
        "/run" => Ok(ReplCommand::Run),
        "/plan" => needs_arg(info.usage).map(ReplCommand::Plan),
        "/report" => Ok(ReplCommand::Report),
        "/history" => Ok(ReplCommand::History),
        "/load" => needs_arg(info.usage).map(ReplCommand::Load),
        "/inventory" if arg.is_empty() => Ok(ReplCommand::Inventory(None)),
        "/inventory" => arg
            .parse::<Category>()
            .map(|c| ReplCommand::Inventory(Some(c))),
        "/discover" => {
            let mut parts = arg.split_whitespace();
            let index = parse_position(parts.next().unwrap_or(""), info.usage)?;
            Ok(ReplCommand::Discover(index, parts.next().map(str::to_string)))
        }
        "/help" => Ok(ReplCommand::Help),
        "/quit" => Ok(ReplCommand::Quit),
        other => Err(format!("{} is not available here", other)),
    }
}

fn print_error(message: impl std::fmt::Display) {
    println!("\x1b[31mError: {}\x1b[0m", message);
}

/// Run the lab in interactive REPL mode.
pub async fn run_interactive(
    lab: Lab,
    config: &LabConfig,
    workspace: &Path,
    offline: bool,
) -> anyhow::Result<()> {
    println!("\x1b[1;32m  Rasaayan\x1b[0m  in-silico reaction lab");
    println!(
        "  Model: {}{} | Workspace: {}",
        config.llm.model,
        if offline { " (offline placeholders)" } else { "" },
        workspace.display()
    );
    println!("  Type /help for commands, /quit to exit\n");

    let registry = CommandRegistry::with_defaults();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\x1b[1;34m> \x1b[0m");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                None
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_line(&registry, &line) {
            Ok(ReplCommand::Quit) => break,
            Ok(command) => execute(&lab, &registry, command).await,
            Err(message) => println!("{}", message),
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn execute(lab: &Lab, registry: &CommandRegistry, command: ReplCommand) {
    match command {
        ReplCommand::Add(query) => match interruptible(lab, lab.search(&query)).await {
            Ok(outcome) => print!("{}", render::batch_outcome(&outcome)),
            Err(e) => print_error(e),
        },
        ReplCommand::Remove(index) => match lab.with_workspace(|ws| ws.remove_reactant(index)) {
            Some(removed) => println!("Removed {}", removed.display_name()),
            None => println!("No reactant #{}", index + 1),
        },
        ReplCommand::Clear => {
            lab.with_workspace(|ws| ws.clear_reactants());
            println!("Reactants cleared.");
        }
        ReplCommand::Temp(t) => {
            lab.with_workspace(|ws| ws.temperature = t);
            println!("Temperature set to {}°C", t);
        }
        ReplCommand::Pressure(p) => {
            lab.with_workspace(|ws| ws.pressure = p);
            println!("Pressure set to {} atm", p);
        }
        ReplCommand::Catalysts(text) => {
            if text.is_empty() {
                println!("Catalysts cleared.");
            }
            lab.with_workspace(|ws| ws.catalysts = text);
        }
        ReplCommand::Objective(text) => {
            lab.with_workspace(|ws| ws.objective = text);
        }
        ReplCommand::Status => print!("{}", render::workspace(&lab.workspace())),
        ReplCommand::Run => {
            println!(
                "\x1b[90m  simulating with {}... (ctrl-c cancels)\x1b[0m",
                lab.simulator().provider().model_name()
            );
            match interruptible(lab, lab.simulate()).await {
                Ok(parsed) => print!("\n{}", render::parsed_report(&parsed)),
                Err(e) => print_error(e),
            }
        }
        ReplCommand::Plan(goal) => match interruptible(lab, lab.plan(&goal)).await {
            Ok(outcome) => {
                print!("{}", render::plan(&outcome));
                println!("Type /run to simulate.");
            }
            Err(e) => print_error(e),
        },
        ReplCommand::Report => match lab.workspace().result {
            Some(result) => print!("{}", render::simulation_report(&result)),
            None => println!("No result yet. Type /run to simulate."),
        },
        ReplCommand::History => {
            let history = lab.history();
            if history.is_empty() {
                println!("No simulations recorded yet.");
            }
            for item in &history {
                println!("  {}", render::history_line(item));
            }
        }
        ReplCommand::Load(id) => match lab.load_history(&id) {
            Ok(item) => {
                println!("Loaded {}", item.id);
                print!("{}", render::workspace(&lab.workspace()));
            }
            Err(e) => print_error(e),
        },
        ReplCommand::Inventory(only) => print!("{}", render::inventory(&lab.inventory(), only)),
        ReplCommand::Discover(index, history_id) => {
            let added = match history_id {
                Some(id) => lab.discover_from_history(&id, index),
                None => {
                    let Some(result) = lab.workspace().result else {
                        println!("No result yet. Give a history id: /discover <n> <id>");
                        return;
                    };
                    match result.products.get(index) {
                        Some(product) => lab.discover(product),
                        None => {
                            println!("No product #{}", index + 1);
                            return;
                        }
                    }
                }
            };
            match added {
                Ok(true) => println!("Added to Synthesized."),
                Ok(false) => println!("Already in the inventory."),
                Err(e) => print_error(e),
            }
        }
        ReplCommand::Help => println!("{}", registry.help_text()),
        ReplCommand::Quit => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Result<ReplCommand, String> {
        parse_line(&CommandRegistry::with_defaults(), input)
    }

    #[test]
    fn test_plain_text_adds_reactants() {
        assert_eq!(
            parse("Ethanol, CC(=O)O"),
            Ok(ReplCommand::Add("Ethanol, CC(=O)O".to_string()))
        );
    }

    #[test]
    fn test_conditions() {
        assert_eq!(parse("/temp 85"), Ok(ReplCommand::Temp(85.0)));
        assert_eq!(parse("/t -10.5"), Ok(ReplCommand::Temp(-10.5)));
        assert_eq!(parse("/pressure 2"), Ok(ReplCommand::Pressure(2.0)));
        assert!(parse("/temp hot").is_err());
        assert!(parse("/temp inf").is_err());
        assert!(parse("/pressure").is_err());
    }

    #[test]
    fn test_positions_are_one_based() {
        assert_eq!(parse("/remove 1"), Ok(ReplCommand::Remove(0)));
        assert_eq!(parse("/rm 3"), Ok(ReplCommand::Remove(2)));
        assert!(parse("/remove 0").is_err());
        assert!(parse("/remove").is_err());
        assert_eq!(parse("/discover 2"), Ok(ReplCommand::Discover(1, None)));
        assert_eq!(
            parse("/discover 1 ABC123XYZ"),
            Ok(ReplCommand::Discover(0, Some("ABC123XYZ".to_string())))
        );
    }

    #[test]
    fn test_free_text_arguments() {
        assert_eq!(
            parse("/catalysts H2SO4 (cat.)"),
            Ok(ReplCommand::Catalysts("H2SO4 (cat.)".to_string()))
        );
        assert_eq!(parse("/catalysts"), Ok(ReplCommand::Catalysts(String::new())));
        assert_eq!(
            parse("/plan synthesize aspirin"),
            Ok(ReplCommand::Plan("synthesize aspirin".to_string()))
        );
        assert!(parse("/plan").is_err());
    }

    #[test]
    fn test_inventory_category() {
        assert_eq!(parse("/inventory"), Ok(ReplCommand::Inventory(None)));
        assert_eq!(
            parse("/inv synthesized"),
            Ok(ReplCommand::Inventory(Some(Category::Synthesized)))
        );
        assert!(parse("/inventory metals").is_err());
    }

    #[test]
    fn test_unknown_command_suggests() {
        let err = parse("/histroy").unwrap_err();
        assert!(err.contains("Did you mean /history?"));
        assert_eq!(parse("/exit"), Ok(ReplCommand::Quit));
    }

    #[tokio::test]
    async fn test_execute_edits_workspace() {
        let lab = crate::commands::open_lab(&LabConfig::default(), true).unwrap();
        let registry = CommandRegistry::with_defaults();
        for line in ["Ethanol", "/temp 60", "/catalysts H2SO4", "/objective esterify"] {
            let command = parse_line(&registry, line).unwrap();
            execute(&lab, &registry, command).await;
        }
        let ws = lab.workspace();
        assert_eq!(ws.reactants.len(), 1);
        assert_eq!(ws.temperature, 60.0);
        assert_eq!(ws.catalysts, "H2SO4");
        assert_eq!(ws.objective, "esterify");

        execute(&lab, &registry, ReplCommand::Remove(0)).await;
        assert!(lab.workspace().reactants.is_empty());
    }
}
