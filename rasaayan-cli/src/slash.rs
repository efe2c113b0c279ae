//! Slash command registry for the REPL.
//!
//! Provides structured metadata for all `/command` slash commands,
//! enabling categorized help, alias resolution and "did you mean" hints.

/// Categories for grouping commands in `/help` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCategory {
    Workspace,
    Simulation,
    Records,
    Session,
}

impl CommandCategory {
    pub fn label(&self) -> &'static str {
        match self {
            CommandCategory::Workspace => "Workspace",
            CommandCategory::Simulation => "Simulation",
            CommandCategory::Records => "History & Inventory",
            CommandCategory::Session => "Session",
        }
    }

    pub fn all() -> &'static [CommandCategory] {
        &[
            CommandCategory::Workspace,
            CommandCategory::Simulation,
            CommandCategory::Records,
            CommandCategory::Session,
        ]
    }
}

impl std::fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Metadata describing a slash command.
#[derive(Debug, Clone)]
pub struct CommandInfo {
    /// Primary name including the slash, e.g., "/run".
    pub name: &'static str,
    /// Alternative aliases, e.g., &["/exit", "/q"] for /quit.
    pub aliases: &'static [&'static str],
    pub description: &'static str,
    /// Usage pattern, e.g., "/temp <°C>".
    pub usage: &'static str,
    pub category: CommandCategory,
}

/// Registry holding all slash commands with their metadata.
pub struct CommandRegistry {
    commands: Vec<CommandInfo>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Create a registry pre-populated with all default commands.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    pub fn register(&mut self, info: CommandInfo) {
        self.commands.push(info);
    }

    /// Register all built-in commands.
    pub fn register_defaults(&mut self) {
        use CommandCategory::*;
        let defaults: [(&'static str, &'static [&'static str], &'static str, &'static str, CommandCategory); 17] = [
            ("/add", &["/search"], "Resolve identifiers and add them as reactants", "/add <name, smiles or cid, ...>", Workspace),
            ("/remove", &["/rm"], "Remove reactant #n", "/remove <n>", Workspace),
            ("/clear", &[], "Remove all reactants", "/clear", Workspace),
            ("/temp", &["/t"], "Set the temperature", "/temp <°C>", Workspace),
            ("/pressure", &["/p"], "Set the pressure", "/pressure <atm>", Workspace),
            ("/catalysts", &["/cat"], "Set catalysts or reagents (empty clears)", "/catalysts [text]", Workspace),
            ("/objective", &["/goal"], "Set the research objective", "/objective [text]", Workspace),
            ("/status", &["/ws"], "Show the workspace", "/status", Workspace),
            ("/run", &["/simulate"], "Simulate the current workspace", "/run", Simulation),
            ("/plan", &[], "Interpret a research goal and set up the workspace", "/plan <goal>", Simulation),
            ("/report", &[], "Show the last simulation report", "/report", Simulation),
            ("/history", &[], "List past simulations", "/history", Records),
            ("/load", &[], "Restore a past simulation into the workspace", "/load <id>", Records),
            ("/inventory", &["/inv"], "List the chemical library", "/inventory [category]", Records),
            ("/discover", &[], "Add product #n of the last result (or of a history entry) to the inventory", "/discover <n> [id]", Records),
            ("/help", &["/?"], "Show this help", "/help", Session),
            ("/quit", &["/exit", "/q"], "Exit Rasaayan", "/quit", Session),
        ];
        for (name, aliases, description, usage, category) in defaults {
            self.register(CommandInfo {
                name,
                aliases,
                description,
                usage,
                category,
            });
        }
    }

    /// Look up a command by name or alias.
    pub fn lookup(&self, input: &str) -> Option<&CommandInfo> {
        self.commands
            .iter()
            .find(|cmd| cmd.name == input || cmd.aliases.contains(&input))
    }

    /// Generate categorized help text.
    pub fn help_text(&self) -> String {
        let mut output = String::from("\nAvailable commands:\n");

        for category in CommandCategory::all() {
            let cmds: Vec<&CommandInfo> = self
                .commands
                .iter()
                .filter(|c| c.category == *category)
                .collect();

            if cmds.is_empty() {
                continue;
            }

            output.push_str(&format!("\n  {}:\n", category.label()));

            for cmd in cmds {
                let aliases = if cmd.aliases.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", cmd.aliases.join(", "))
                };
                output.push_str(&format!(
                    "    {:<34} {}{}\n",
                    cmd.usage, cmd.description, aliases
                ));
            }
        }

        output.push_str(
            "\nInput:\n  Text without a leading slash is resolved and added as reactants.\n  Ctrl-C cancels a running request; at the prompt it exits.\n",
        );
        output
    }

    #[cfg(test)]
    pub fn all(&self) -> &[CommandInfo] {
        &self.commands
    }

    /// Suggest the closest command for an unknown input using edit distance.
    pub fn suggest(&self, input: &str) -> Option<&str> {
        let mut best: Option<(&str, usize)> = None;

        for cmd in &self.commands {
            for candidate in std::iter::once(&cmd.name).chain(cmd.aliases.iter()) {
                let dist = edit_distance(input, candidate);
                if dist <= 3 && best.is_none_or(|(_, d)| dist < d) {
                    best = Some((*candidate, dist));
                }
            }
        }

        best.map(|(name, _)| name)
    }
}

/// Simple Levenshtein edit distance for command suggestions.
fn edit_distance(a: &str, b: &str) -> usize {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    let b_len = b_bytes.len();

    let mut prev = (0..=b_len).collect::<Vec<_>>();
    let mut curr = vec![0; b_len + 1];

    for (i, a_byte) in a_bytes.iter().enumerate() {
        curr[0] = i + 1;
        for j in 1..=b_len {
            let cost = usize::from(*a_byte != b_bytes[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registry_new_is_empty() {
        let registry = CommandRegistry::new();
        assert!(registry.all().is_empty());
    }

    #[test]
    fn test_register_defaults_populates() {
        let registry = CommandRegistry::with_defaults();
        assert_eq!(registry.all().len(), 17);
    }

    #[test]
    fn test_lookup_by_name_and_alias() {
        let registry = CommandRegistry::with_defaults();
        assert_eq!(registry.lookup("/run").unwrap().name, "/run");
        assert_eq!(registry.lookup("/simulate").unwrap().name, "/run");
        assert_eq!(registry.lookup("/q").unwrap().name, "/quit");
        assert_eq!(registry.lookup("/?").unwrap().name, "/help");
        assert!(registry.lookup("/nonexistent").is_none());
    }

    #[test]
    fn test_help_text_contains_all_categories_and_commands() {
        let registry = CommandRegistry::with_defaults();
        let help = registry.help_text();
        for category in CommandCategory::all() {
            assert!(help.contains(category.label()), "missing {}", category);
        }
        for cmd in registry.all() {
            assert!(help.contains(cmd.usage), "missing {}", cmd.name);
        }
    }

    #[test]
    fn test_no_duplicate_names_or_aliases() {
        let registry = CommandRegistry::with_defaults();
        let mut seen = HashSet::new();
        for cmd in registry.all() {
            assert!(seen.insert(cmd.name), "duplicate {}", cmd.name);
            for alias in cmd.aliases {
                assert!(seen.insert(*alias), "duplicate {}", alias);
            }
        }
    }

    #[test]
    fn test_suggest_close_match() {
        let registry = CommandRegistry::with_defaults();
        assert_eq!(registry.suggest("/histroy"), Some("/history"));
        assert_eq!(registry.suggest("/presure"), Some("/pressure"));
    }

    #[test]
    fn test_suggest_no_match() {
        let registry = CommandRegistry::with_defaults();
        assert_eq!(registry.suggest("/xyzzy_unknown_command"), None);
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("abc", "abc"), 0);
        assert_eq!(edit_distance("abc", "abd"), 1);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn test_every_category_has_commands() {
        let registry = CommandRegistry::with_defaults();
        for category in CommandCategory::all() {
            assert!(registry.all().iter().any(|c| c.category == *category));
        }
    }
}
