// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interactive REPL for defining and requiring modules.
//!
//! ```text
//! modload> define b {"val": 10}
//! modload> define a [b] {"val": 11}
//! modload> require a
//! ```

use crate::commands::format_info;
use modload_core::source::json::parse_json_module;
use modload_core::{json_definition, LoaderError, ModuleLoader};
use owo_colors::OwoColorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Config, Editor, Helper};
use serde_json::Value;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tokio::runtime::Handle;

const HISTORY_FILE: &str = ".modload_history";
const MAX_HISTORY_SIZE: usize = 1000;

const DEFINE_USAGE: &str = "usage: define <name> [dep, ...] <json>";

/// REPL commands that can be executed with a dot prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Exit,
    Clear,
    Version,
    Status,
    Load,
}

impl ReplCommand {
    /// Parse a REPL command from input string
    pub fn parse(input: &str) -> Option<(Self, Option<&str>)> {
        let input = input.trim().strip_prefix('.')?;

        let mut parts = input.splitn(2, char::is_whitespace);
        let cmd = parts.next()?.to_lowercase();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        match cmd.as_str() {
            "help" | "h" | "?" => Some((ReplCommand::Help, arg)),
            "exit" | "quit" | "q" => Some((ReplCommand::Exit, arg)),
            "clear" | "cls" => Some((ReplCommand::Clear, arg)),
            "version" | "v" => Some((ReplCommand::Version, arg)),
            "status" | "s" => Some((ReplCommand::Status, arg)),
            "load" | "l" => Some((ReplCommand::Load, arg)),
            _ => None,
        }
    }

    /// Get all available commands for help/completion
    pub fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            (".help", "Show this help message"),
            (".exit", "Exit the REPL"),
            (".clear", "Clear the screen"),
            (".version", "Show version information"),
            (".status", "Show every known module and its state"),
            (".load <file>", "Define a JSON module file under its file stem"),
        ]
    }
}

/// A module command typed at the prompt
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleCommand {
    /// `define <name> [dep, ...] <json>`
    Define {
        name: String,
        dependencies: Vec<String>,
        exports: Value,
    },
    /// `require <name>...`
    Require(Vec<String>),
}

impl ModuleCommand {
    /// Parse a module command
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        let (keyword, rest) = input
            .split_once(char::is_whitespace)
            .unwrap_or((input, ""));

        match keyword {
            "define" | "def" => parse_define(rest.trim()),
            "require" | "req" => {
                let names: Vec<String> = rest.split_whitespace().map(String::from).collect();
                if names.is_empty() {
                    return Err("usage: require <name>...".to_string());
                }
                Ok(ModuleCommand::Require(names))
            }
            _ => Err(format!("unknown command '{}', try .help", keyword)),
        }
    }
}

/// A leading `[...]` is the dependency list only when JSON follows it;
/// otherwise it is the exports array itself.
fn parse_define(rest: &str) -> Result<ModuleCommand, String> {
    let (name, rest) = rest.split_once(char::is_whitespace).ok_or(DEFINE_USAGE)?;
    let rest = rest.trim_start();

    let (dependencies, json) = match split_bracketed(rest) {
        Some((deps, tail)) if is_name_list(deps) && !tail.trim().is_empty() => {
            (parse_dependencies(deps), tail)
        }
        _ => (Vec::new(), rest),
    };

    let exports =
        serde_json::from_str(json.trim()).map_err(|e| format!("invalid JSON exports: {}", e))?;

    Ok(ModuleCommand::Define {
        name: name.to_string(),
        dependencies,
        exports,
    })
}

/// Split a leading `[...]` at its matching close bracket into its contents
/// and whatever follows.
fn split_bracketed(input: &str) -> Option<(&str, &str)> {
    let body = input.strip_prefix('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in body.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' if depth == 0 => return Some((&body[..i], &body[i + 1..])),
            ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

/// Dependency lists hold bare or quoted names, never nested values
fn is_name_list(list: &str) -> bool {
    !list.contains(['[', ']', '{', '}'])
}

fn parse_dependencies(list: &str) -> Vec<String> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .map(|dep| dep.trim_matches('"'))
        .filter(|dep| !dep.is_empty())
        .map(String::from)
        .collect()
}

/// Completion, hints, highlighting and validation for the editor
struct ModloadHelper {
    loader: ModuleLoader<Value>,
}

impl ModloadHelper {
    const COMMANDS: &'static [&'static str] = &[
        "define", "require", ".help", ".exit", ".clear", ".version", ".status", ".load",
    ];

    /// Commands plus every module name the loader has seen
    fn candidates(&self) -> Vec<String> {
        Self::COMMANDS
            .iter()
            .map(|c| c.to_string())
            .chain(self.loader.registry().names())
            .collect()
    }
}

fn word_start(line: &str) -> usize {
    line.rfind(|c: char| c.is_whitespace() || c == '[' || c == ',')
        .map(|i| i + 1)
        .unwrap_or(0)
}

impl Completer for ModloadHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = word_start(&line[..pos]);
        let word = &line[start..pos];
        if word.is_empty() {
            return Ok((pos, vec![]));
        }

        let matches = self
            .candidates()
            .into_iter()
            .filter(|c| c.starts_with(word))
            .map(|c| Pair {
                replacement: c[word.len()..].to_string(),
                display: c,
            })
            .collect();

        Ok((pos, matches))
    }
}

impl Hinter for ModloadHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        if pos < line.len() {
            return None;
        }

        let word = &line[word_start(line)..];
        if word.len() < 2 {
            return None;
        }

        self.candidates()
            .into_iter()
            .find(|c| c.starts_with(word) && c.len() > word.len())
            .map(|c| (&c[word.len()..]).dimmed().to_string())
    }
}

impl Highlighter for ModloadHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let mut result = String::with_capacity(line.len() * 2);
        let mut in_string = false;
        let mut word = String::new();

        for c in line.chars() {
            if in_string {
                result.push_str(&c.green().to_string());
                if c == '"' {
                    in_string = false;
                }
                continue;
            }

            if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' {
                word.push(c);
                continue;
            }

            if !word.is_empty() {
                result.push_str(&highlight_word(&word));
                word.clear();
            }

            let colored = match c {
                '[' | ']' | '{' | '}' => c.yellow().to_string(),
                ':' | ',' => c.dimmed().to_string(),
                '"' => {
                    in_string = true;
                    c.green().to_string()
                }
                _ => c.to_string(),
            };
            result.push_str(&colored);
        }

        if !word.is_empty() {
            result.push_str(&highlight_word(&word));
        }

        Cow::Owned(result)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn highlight_word(word: &str) -> String {
    match word {
        "define" | "def" | "require" | "req" => word.magenta().bold().to_string(),
        "true" | "false" | "null" => word.blue().to_string(),
        _ if word.starts_with('.') => word.magenta().to_string(),
        _ if word.parse::<f64>().is_ok() => word.yellow().to_string(),
        _ => word.to_string(),
    }
}

impl Validator for ModloadHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        let input = ctx.input();

        // Keep reading while a JSON value is still open
        if !is_balanced(input) {
            return Ok(ValidationResult::Incomplete);
        }

        let trimmed = input.trim();
        if trimmed.ends_with('\\') || trimmed.ends_with(',') || trimmed.ends_with(':') {
            return Ok(ValidationResult::Incomplete);
        }

        Ok(ValidationResult::Valid(None))
    }
}

/// Check if JSON brackets and braces are balanced outside of strings
fn is_balanced(input: &str) -> bool {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for c in input.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }

        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '[' => stack.push(']'),
            '{' => stack.push('}'),
            ']' | '}' => {
                if stack.pop() != Some(c) {
                    // Mismatched; let the JSON parser report it
                    return true;
                }
            }
            _ => {}
        }
    }

    stack.is_empty() && !in_string
}

impl Helper for ModloadHelper {}

/// The interactive module REPL
pub struct Repl {
    loader: ModuleLoader<Value>,
    runtime: Handle,
    editor: Editor<ModloadHelper, DefaultHistory>,
    history_path: PathBuf,
}

impl Repl {
    /// Create a REPL over `loader`, blocking on `runtime` for loads.
    ///
    /// Must not be called from inside the runtime.
    pub fn new(loader: ModuleLoader<Value>, runtime: Handle) -> rustyline::Result<Self> {
        let config = Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(MAX_HISTORY_SIZE)?
            .auto_add_history(true)
            .build();

        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(ModloadHelper {
            loader: loader.clone(),
        }));

        let history_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("modload")
            .join(HISTORY_FILE);

        if let Some(parent) = history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = editor.load_history(&history_path);

        Ok(Self {
            loader,
            runtime,
            editor,
            history_path,
        })
    }

    /// Run the REPL main loop
    pub fn run(&mut self) -> rustyline::Result<()> {
        self.print_banner();

        loop {
            let prompt = format!("{} ", "modload>".bright_green().bold());

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    if trimmed.starts_with('.') {
                        match ReplCommand::parse(trimmed) {
                            Some((cmd, arg)) => {
                                if let CommandResult::Exit = self.execute_command(cmd, arg) {
                                    break;
                                }
                            }
                            None => eprintln!(
                                "{}: unknown command '{}'",
                                "Error".red().bold(),
                                trimmed.cyan()
                            ),
                        }
                        continue;
                    }

                    match ModuleCommand::parse(trimmed) {
                        Ok(command) => self.execute_module_command(command),
                        Err(msg) => eprintln!("{}: {}", "Error".red().bold(), msg),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "^D".dimmed());
                    break;
                }
                Err(err) => {
                    eprintln!("{}: {:?}", "Error".red().bold(), err);
                    break;
                }
            }
        }

        let _ = self.editor.save_history(&self.history_path);
        Ok(())
    }

    fn print_banner(&self) {
        println!();
        println!(
            "  {} {} {}",
            "modload".bright_cyan().bold(),
            "v".dimmed(),
            env!("CARGO_PKG_VERSION").bright_yellow()
        );
        println!(
            "  {} {}",
            "modules from".dimmed(),
            self.loader.config().base_dir.display().cyan()
        );
        println!();
        println!(
            "  {} {} {}",
            "Type".dimmed(),
            ".help".cyan(),
            "for available commands".dimmed()
        );
        println!();
    }

    fn execute_command(&mut self, cmd: ReplCommand, arg: Option<&str>) -> CommandResult {
        match cmd {
            ReplCommand::Help => self.print_help(),
            ReplCommand::Exit => return CommandResult::Exit,
            ReplCommand::Clear => print!("\x1B[2J\x1B[H"),
            ReplCommand::Version => {
                println!(
                    "{}: {}  {}: {}",
                    "modload".bright_cyan().bold(),
                    env!("CARGO_PKG_VERSION").yellow(),
                    "core".dimmed(),
                    modload_core::VERSION.yellow()
                );
            }
            ReplCommand::Status => self.print_status(),
            ReplCommand::Load => match arg {
                Some(path) => self.load_file(Path::new(path)),
                None => eprintln!(
                    "{}: {} {}",
                    "Error".red().bold(),
                    ".load".cyan(),
                    "requires a file path".dimmed()
                ),
            },
        }
        CommandResult::Continue
    }

    fn execute_module_command(&mut self, command: ModuleCommand) {
        match command {
            ModuleCommand::Define {
                name,
                dependencies,
                exports,
            } => {
                let definition = json_definition(dependencies, exports);
                match self.loader.define_module(&name, definition) {
                    Ok(()) => println!("{} {}", "defined".dimmed(), name.bold()),
                    Err(e) => print_error(&e),
                }
            }
            ModuleCommand::Require(names) => {
                match self.runtime.block_on(self.loader.require_all(&names)) {
                    Ok(values) => {
                        for (name, value) in names.iter().zip(&values) {
                            println!("{} {}", name.bright_cyan().bold(), format_value(value));
                        }
                    }
                    Err(e) => print_error(&e),
                }
            }
        }
    }

    fn load_file(&mut self, path: &Path) {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            eprintln!("{}: not a module file '{}'", "Error".red().bold(), path.display());
            return;
        };

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("{}: {}: {}", "Error".red().bold(), path.display(), e);
                return;
            }
        };

        let defined = parse_json_module(name, &content)
            .and_then(|definition| self.loader.define_module(name, definition));
        match defined {
            Ok(()) => println!("{} {}", "defined".dimmed(), name.bold()),
            Err(e) => print_error(&e),
        }
    }

    fn print_status(&self) {
        let snapshot = self.loader.snapshot();
        if snapshot.is_empty() {
            println!("{}", "no modules yet".dimmed());
        }
        for info in snapshot {
            println!("{}", format_info(&info));
        }
    }

    fn print_help(&self) {
        println!();
        println!("{}", "Module Commands:".white().bold());
        println!();
        println!(
            "  {:28} {}",
            "define <name> [deps] <json>".cyan(),
            "Define a module exporting <json>".dimmed()
        );
        println!(
            "  {:28} {}",
            "require <name>...".cyan(),
            "Load modules and print their exports".dimmed()
        );
        println!();
        println!("{}", "REPL Commands:".white().bold());
        println!();
        for (cmd, desc) in ReplCommand::all_commands() {
            println!("  {:28} {}", cmd.cyan(), desc.dimmed());
        }
        println!();
        println!("{}", "Keyboard Shortcuts:".white().bold());
        println!();
        println!("  {:28} {}", "Ctrl+C".yellow(), "Cancel current input".dimmed());
        println!("  {:28} {}", "Ctrl+D".yellow(), "Exit REPL".dimmed());
        println!("  {:28} {}", "Tab".yellow(), "Complete commands and module names".dimmed());
        println!();
    }
}

/// Result of executing a REPL command
enum CommandResult {
    Continue,
    Exit,
}

/// Format exports for display with coloring
fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".blue().to_string(),
        Value::Bool(b) => b.yellow().to_string(),
        Value::Number(n) => n.yellow().to_string(),
        Value::String(s) => format!("{:?}", s).green().to_string(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string_pretty(value)
            .unwrap_or_else(|_| value.to_string())
            .cyan()
            .to_string(),
    }
}

/// Print a loader error and, for dependency failures, what caused it
fn print_error(error: &LoaderError) {
    eprintln!("{}: {}", "Error".red().bold(), error);

    let root = error.root_cause();
    if root != error {
        eprintln!("  {} {}", "caused by:".dimmed(), root.red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_repl_command_parse() {
        assert!(matches!(
            ReplCommand::parse(".help"),
            Some((ReplCommand::Help, None))
        ));
        assert!(matches!(
            ReplCommand::parse(".exit"),
            Some((ReplCommand::Exit, None))
        ));
        assert!(matches!(
            ReplCommand::parse(".status"),
            Some((ReplCommand::Status, None))
        ));
        assert!(matches!(
            ReplCommand::parse(".load mods/a.json"),
            Some((ReplCommand::Load, Some("mods/a.json")))
        ));
        assert!(ReplCommand::parse("require a").is_none());
        assert!(ReplCommand::parse(".bogus").is_none());
    }

    #[test]
    fn test_parse_define_with_dependencies() {
        let cmd = ModuleCommand::parse(r#"define a [b, "c"] {"val": 11}"#).unwrap();
        assert_eq!(
            cmd,
            ModuleCommand::Define {
                name: "a".into(),
                dependencies: vec!["b".into(), "c".into()],
                exports: json!({ "val": 11 }),
            }
        );
    }

    #[test]
    fn test_parse_define_array_exports() {
        // A lone bracketed value is the exports, not a dependency list
        let cmd = ModuleCommand::parse("define days [\"Mon\", \"Tue\"]").unwrap();
        assert_eq!(
            cmd,
            ModuleCommand::Define {
                name: "days".into(),
                dependencies: vec![],
                exports: json!(["Mon", "Tue"]),
            }
        );

        let cmd = ModuleCommand::parse("define pick [days] 0").unwrap();
        assert!(matches!(
            cmd,
            ModuleCommand::Define { dependencies, .. } if dependencies == vec!["days".to_string()]
        ));
    }

    #[test]
    fn test_parse_define_nested_array_exports() {
        let cmd = ModuleCommand::parse("define m [[1],[2]]").unwrap();
        assert_eq!(
            cmd,
            ModuleCommand::Define {
                name: "m".into(),
                dependencies: vec![],
                exports: json!([[1], [2]]),
            }
        );

        let cmd = ModuleCommand::parse(r#"define n [a] [["x]"], {"k": [1]}]"#).unwrap();
        assert_eq!(
            cmd,
            ModuleCommand::Define {
                name: "n".into(),
                dependencies: vec!["a".into()],
                exports: json!([["x]"], { "k": [1] }]),
            }
        );
    }

    #[test]
    fn test_split_bracketed() {
        assert_eq!(split_bracketed("[a, b] 1"), Some(("a, b", " 1")));
        assert_eq!(split_bracketed("[[1],[2]]"), Some(("[1],[2]", "")));
        assert_eq!(split_bracketed(r#"["]"] 2"#), Some((r#""]""#, " 2")));
        assert_eq!(split_bracketed("[unclosed"), None);
        assert_eq!(split_bracketed("{}"), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(ModuleCommand::parse("define a").is_err());
        assert!(ModuleCommand::parse("define a {oops").is_err());
        assert!(ModuleCommand::parse("require").is_err());
        assert!(ModuleCommand::parse("frobnicate a").is_err());
    }

    #[test]
    fn test_parse_require() {
        assert_eq!(
            ModuleCommand::parse("require a  b").unwrap(),
            ModuleCommand::Require(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn test_is_balanced() {
        assert!(is_balanced(r#"{"a": [1, 2]}"#));
        assert!(!is_balanced(r#"{"a": [1, 2"#));
        assert!(!is_balanced(r#"define a {"#));
        assert!(is_balanced(r#"{"s": "brace { inside"}"#));
        assert!(is_balanced(r#"{"s": "escaped \" quote"}"#));
        assert!(!is_balanced(r#"{"s": "open"#));
    }
}
