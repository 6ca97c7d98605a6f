//! REPL – drives a [`WorkingMemory`] and an [`EpisodicMemory`] by hand.
//!
//! Supported commands:
//!   add <ID> <attr> <value>   – add a fact (`+` / `+L` makes a new identifier)
//!   act <fact> <n|none>       – set or untrack a fact's activation
//!   rm <fact>                 – remove a fact
//!   cue <attr> <value>        – add a fact to the cue (`cue clear` empties it)
//!   out <attr> <value>        – put a command on the output link (`out clear`)
//!   next                      – place the `next` navigation command
//!   cycle [n]                 – run n decision cycles (default 1)
//!   record                    – record an episode now
//!   show [ID]                 – print the belief tree
//!   episodes | dump <n>       – list episodes / print one as JSON
//!   stats | history | help | quit

use colored::Colorize;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use epmem_memory::{BeliefState, EpisodeId, Retrieval, WorkingMemory};
use epmem_runtime::link::COMMAND_ATTR;
use epmem_runtime::{CycleAction, CycleReport, EpisodicMemory};
use epmem_types::{EpmemError, FactId, SymbolId, Value};

use crate::config::Config;

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add { ident: String, attr: String, value: String },
    Activate { fact: FactId, activation: Option<i64> },
    Remove(FactId),
    Cue { attr: String, value: String },
    ClearCue,
    Out { attr: String, value: String },
    ClearOut,
    Next,
    Cycle(u32),
    Record,
    Show(Option<String>),
    Episodes,
    Dump(usize),
    Stats,
    History,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let usage = |u: &str| -> Result<Command, String> { Err(format!("usage: {u}")) };
        match words.as_slice() {
            ["add", ident, attr, rest @ ..] if !rest.is_empty() => Ok(Command::Add {
                ident: ident.to_string(),
                attr: attr.to_string(),
                value: rest.join(" "),
            }),
            ["add", ..] => usage("add <ID> <attr> <value>"),
            ["act", fact, "none"] => Ok(Command::Activate {
                fact: parse_fact(fact)?,
                activation: None,
            }),
            ["act", fact, n] => Ok(Command::Activate {
                fact: parse_fact(fact)?,
                activation: Some(n.parse().map_err(|_| format!("'{n}' is not an integer"))?),
            }),
            ["act", ..] => usage("act <fact> <n|none>"),
            ["rm", fact] => Ok(Command::Remove(parse_fact(fact)?)),
            ["rm", ..] => usage("rm <fact>"),
            ["cue", "clear"] => Ok(Command::ClearCue),
            ["cue", attr, rest @ ..] if !rest.is_empty() => Ok(Command::Cue {
                attr: attr.to_string(),
                value: rest.join(" "),
            }),
            ["cue", ..] => usage("cue <attr> <value> | cue clear"),
            ["out", "clear"] => Ok(Command::ClearOut),
            ["out", attr, rest @ ..] if !rest.is_empty() => Ok(Command::Out {
                attr: attr.to_string(),
                value: rest.join(" "),
            }),
            ["out", ..] => usage("out <attr> <value> | out clear"),
            ["next"] => Ok(Command::Next),
            ["cycle"] => Ok(Command::Cycle(1)),
            ["cycle", n] => Ok(Command::Cycle(
                n.parse().map_err(|_| format!("'{n}' is not a cycle count"))?,
            )),
            ["record"] => Ok(Command::Record),
            ["show"] => Ok(Command::Show(None)),
            ["show", id] => Ok(Command::Show(Some(id.to_string()))),
            ["episodes"] => Ok(Command::Episodes),
            ["dump", n] => Ok(Command::Dump(
                n.parse().map_err(|_| format!("'{n}' is not an episode number"))?,
            )),
            ["stats"] => Ok(Command::Stats),
            ["history"] => Ok(Command::History),
            ["help"] => Ok(Command::Help),
            ["quit"] | ["exit"] => Ok(Command::Quit),
            [other, ..] => Err(format!("unknown command '{other}'")),
            [] => Err("empty command".to_string()),
        }
    }
}

fn parse_fact(raw: &str) -> Result<FactId, String> {
    raw.trim_start_matches('#')
        .parse()
        .map(FactId)
        .map_err(|_| format!("'{raw}' is not a fact handle"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Shell
// ─────────────────────────────────────────────────────────────────────────────

/// Belief state, episodic memory and line history of one session.
pub struct Shell {
    wm: WorkingMemory,
    epmem: EpisodicMemory,
    output: SymbolId,
    history: VecDeque<String>,
    history_limit: usize,
}

impl Shell {
    /// `S1 ^output-link O1` plus the mounted `^epmem` link.
    pub fn new(config: &Config) -> Result<Self, EpmemError> {
        let mut wm = WorkingMemory::new();
        let s1 = wm.top_state();
        let output = wm.new_identifier('O');
        wm.add_fact(s1, "output-link", Value::Identifier(output))?;
        let epmem = EpisodicMemory::new(config.tunables.clone(), &mut wm, s1, Some(output))?;
        Ok(Self {
            wm,
            epmem,
            output,
            history: VecDeque::new(),
            history_limit: config.prompt_history,
        })
    }

    /// Run one parsed command and return the lines to print.
    pub fn execute(&mut self, command: Command) -> Result<Vec<String>, String> {
        let err = |e: EpmemError| e.to_string();
        match command {
            Command::Add { ident, attr, value } => {
                let id = self.symbol(&ident)?;
                let value = self.parse_value(&attr, &value);
                let fact = self.wm.add_fact(id, &attr, value).map_err(err)?;
                Ok(vec![format!("added #{}", fact.0)])
            }
            Command::Activate { fact, activation } => {
                self.wm.set_activation(fact, activation).map_err(err)?;
                Ok(vec![format!("#{} activation {:?}", fact.0, activation)])
            }
            Command::Remove(fact) => {
                self.wm.remove_fact(fact).map_err(err)?;
                Ok(vec![format!("removed #{}", fact.0)])
            }
            Command::Cue { attr, value } => {
                let query = self.epmem.link().query();
                let value = self.parse_value(&attr, &value);
                let fact = self.wm.add_fact(query, &attr, value).map_err(err)?;
                Ok(vec![format!("cue #{}", fact.0)])
            }
            Command::ClearCue => {
                self.wm.clear_children(self.epmem.link().query()).map_err(err)?;
                Ok(vec!["cue cleared".to_string()])
            }
            Command::Out { attr, value } => {
                let value = self.parse_value(&attr, &value);
                let fact = self.wm.add_fact(self.output, &attr, value).map_err(err)?;
                Ok(vec![format!("output #{}", fact.0)])
            }
            Command::ClearOut => {
                self.wm.clear_children(self.output).map_err(err)?;
                Ok(vec!["output cleared".to_string()])
            }
            Command::Next => {
                let root = self.epmem.link().root();
                if let Some(old) = self.wm.find(root, COMMAND_ATTR).map(|f| f.id) {
                    self.wm.remove_fact(old).map_err(err)?;
                }
                self.wm
                    .add_fact(root, COMMAND_ATTR, Value::Str("next".to_string()))
                    .map_err(err)?;
                Ok(vec!["command next placed; run `cycle`".to_string()])
            }
            Command::Cycle(n) => {
                let mut lines = Vec::new();
                for _ in 0..n {
                    let report = self.epmem.on_cycle(&mut self.wm).map_err(err)?;
                    lines.push(describe(&report));
                }
                Ok(lines)
            }
            Command::Record => {
                let outcome = self.epmem.record_now(&mut self.wm);
                Ok(vec![format!(
                    "episode {} ({} leaves, {} new nodes)",
                    outcome.episode.0, outcome.leaves, outcome.new_nodes
                )])
            }
            Command::Show(id) => {
                let id = match id {
                    Some(name) => self.symbol(&name)?,
                    None => self.wm.top_state(),
                };
                Ok(self.wm.render(id).lines().map(str::to_string).collect())
            }
            Command::Episodes => {
                let store = self.epmem.engine().store();
                if store.is_empty() {
                    return Ok(vec!["no episodes".to_string()]);
                }
                Ok(store
                    .iter()
                    .map(|e| {
                        let marker = if store.current() == Some(e.id()) { "▶" } else { " " };
                        format!(
                            "{marker} {:>4}  cycle {:<5} {}  {} leaves",
                            e.id().0,
                            e.cycle(),
                            e.recorded_at().with_timezone(&chrono::Local).format("%H:%M:%S"),
                            e.leaves().count()
                        )
                    })
                    .collect())
            }
            Command::Dump(n) => {
                let summary = self
                    .epmem
                    .engine()
                    .summary(EpisodeId(n))
                    .ok_or_else(|| format!("no episode {n}"))?;
                let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
                Ok(json.lines().map(str::to_string).collect())
            }
            Command::Stats => {
                let json = serde_json::to_string_pretty(&self.epmem.stats()).map_err(|e| e.to_string())?;
                Ok(json.lines().map(str::to_string).collect())
            }
            Command::History => Ok(self
                .history
                .iter()
                .enumerate()
                .map(|(i, l)| format!("{:>4}  {l}", i + 1))
                .collect()),
            Command::Help => Ok(HELP.lines().map(str::to_string).collect()),
            Command::Quit => Ok(Vec::new()),
        }
    }

    fn remember(&mut self, line: &str) {
        if self.history_limit == 0 {
            return;
        }
        if self.history.len() == self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(line.to_string());
    }

    fn symbol(&self, name: &str) -> Result<SymbolId, String> {
        self.wm
            .lookup(name)
            .ok_or_else(|| format!("unknown identifier '{name}'"))
    }

    /// `+` or `+L` creates an identifier, a known identifier name refers to
    /// it, numbers parse as numbers, anything else is a string.
    fn parse_value(&mut self, attr: &str, raw: &str) -> Value {
        let raw = raw.trim();
        if let Some(letter) = raw.strip_prefix('+') {
            let letter = letter
                .chars()
                .next()
                .or_else(|| attr.chars().find(|c| c.is_ascii_alphabetic()))
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or('X');
            return Value::Identifier(self.wm.new_identifier(letter));
        }
        if let Some(id) = self.wm.lookup(raw) {
            return Value::Identifier(id);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Str(raw.trim_matches('"').to_string())
    }
}

fn describe(report: &CycleReport) -> String {
    let recorded = match &report.recorded {
        Some(o) => format!("recorded episode {}", o.episode.0),
        None => "no recording".to_string(),
    };
    let action = match &report.action {
        CycleAction::Idle => "idle".to_string(),
        CycleAction::Retrieved(Retrieval::Episode { id, score }) => {
            format!("retrieved episode {} (score {score})", id.0)
        }
        CycleAction::Retrieved(Retrieval::NoMemory(reason)) => format!("no memory ({reason:?})"),
        CycleAction::Navigated(Some(id)) => format!("next -> episode {}", id.0),
        CycleAction::Navigated(None) => "next -> end of store".to_string(),
        CycleAction::IgnoredCommand(c) => format!("ignored command '{c}'"),
    };
    format!("cycle {}: {recorded}, {action}", report.cycle)
}

const HELP: &str = "\
add <ID> <attr> <value>   add a fact (`+` / `+L` makes a new identifier)
act <fact> <n|none>       set or untrack a fact's activation
rm <fact>                 remove a fact
cue <attr> <value>        add to the cue     | cue clear
out <attr> <value>        add output command | out clear
next                      place the `next` navigation command
cycle [n]                 run n decision cycles
record                    record an episode now
show [ID]                 print the belief tree
episodes                  list stored episodes
dump <n>                  print episode n as JSON
stats                     engine statistics and timers
history                   recent shell lines
quit                      exit";

// ─────────────────────────────────────────────────────────────────────────────
// Loop
// ─────────────────────────────────────────────────────────────────────────────

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(mut shell: Shell, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "epmem>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match Command::parse(line) {
            Ok(c) => c,
            Err(e) => {
                println!("{} {}. Type {} for available commands.", "Error:".red(), e, "help".bold());
                continue;
            }
        };
        if command != Command::History {
            shell.remember(line);
        }
        if command == Command::Quit {
            println!("{}", "Goodbye.".green());
            shutdown.store(true, Ordering::SeqCst);
            break;
        }

        match shell.execute(command) {
            Ok(lines) => {
                for l in lines {
                    println!("  {l}");
                }
            }
            Err(e) => println!("{} {}", "Error:".red(), e),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
