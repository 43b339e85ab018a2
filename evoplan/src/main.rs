//! Developer CLI over the plan-graph lifecycle.
//!
//! Renders prompts, extracts and validates recorded model responses, and
//! replays recorded responses through the test case spawner. No model is
//! called from here; responses come from files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use evoplan::agents::spawner::{SpawnerConfig, TestCaseSpawner};
use evoplan::core::code::extract_code_unit;
use evoplan::core::extract::extract_structured;
use evoplan::core::plan_validator::{PlanOutcome, check_and_rectify};
use evoplan::core::types::{Individual, Operator};
use evoplan::exit_codes;
use evoplan::io::config::{DEFAULT_CONFIG_FILE, EvoplanConfig, load_config, write_config};
use evoplan::io::model::ReplayModel;
use evoplan::io::prompt::PromptBuilder;
use evoplan::io::store::{load_examples, load_plan, load_signature, read_text, write_plan};

#[derive(Parser)]
#[command(
    name = "evoplan",
    version,
    about = "Plan-graph prompts, validation and test case spawning"
)]
struct Cli {
    /// Config file (defaults apply when missing).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render an operator prompt for a task signature.
    Prompt {
        #[arg(long)]
        signature: PathBuf,
        #[arg(long)]
        operator: Operator,
        /// JSON list of `{reasoning, code}` parents.
        #[arg(long)]
        parents: Option<PathBuf>,
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Render the plan sketch prompt, or the plan graph prompt given a sketch.
    PlanPrompt {
        #[arg(long)]
        signature: PathBuf,
        #[arg(long)]
        sketch: Option<PathBuf>,
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Extract the structured payload (or code unit) from a response file.
    Extract {
        response: PathBuf,
        #[arg(long)]
        code: bool,
    },
    /// Validate and rectify a plan response against a signature.
    Validate {
        #[arg(long)]
        signature: PathBuf,
        #[arg(long)]
        response: PathBuf,
        /// Write the rectified plan here as well as stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Replay recorded spawn responses and print per-step test cases.
    Spawn {
        #[arg(long)]
        plan: PathBuf,
        #[arg(long)]
        examples: PathBuf,
        #[arg(long, num_args = 1.., required = true)]
        responses: Vec<PathBuf>,
        /// Keep duplicate first-step inputs when combining samples.
        #[arg(long)]
        no_unique: bool,
    },
    /// Write a default config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    evoplan::logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::InitConfig { force } => cmd_init_config(&cli.config, force),
        command => {
            let cfg = load_config(&cli.config)?;
            dispatch(command, &cfg)
        }
    }
}

fn dispatch(command: Command, cfg: &EvoplanConfig) -> Result<i32> {
    let builder = PromptBuilder::new(cfg.prompt_budget_bytes);
    match command {
        Command::Prompt {
            signature,
            operator,
            parents,
            feedback,
        } => {
            let signature = load_signature(&signature)?;
            let parents = match parents {
                Some(path) => load_parents(&path)?,
                None => Vec::new(),
            };
            let pack =
                builder.build_operator(&signature, operator, &parents, feedback.as_deref())?;
            println!("{}", pack.as_str());
            Ok(exit_codes::OK)
        }
        Command::PlanPrompt {
            signature,
            sketch,
            feedback,
        } => {
            let signature = load_signature(&signature)?;
            let pack = match sketch {
                Some(path) => builder.build_plan_graph(&signature, &read_text(&path)?)?,
                None => builder.build_plan_sketch(&signature, feedback.as_deref())?,
            };
            println!("{}", pack.as_str());
            Ok(exit_codes::OK)
        }
        Command::Extract { response, code } => {
            let text = read_text(&response)?;
            if code {
                println!("{}", extract_code_unit(&text)?);
            } else {
                print_json(&extract_structured(&text)?)?;
            }
            Ok(exit_codes::OK)
        }
        Command::Validate {
            signature,
            response,
            output,
        } => {
            let signature = load_signature(&signature)?;
            let text = read_text(&response)?;
            let outcome = match extract_structured(&text) {
                Ok(raw) => check_and_rectify(&raw, &signature),
                Err(err) => PlanOutcome::rejected(err),
            };
            let Some(plan) = outcome.plan else {
                eprintln!("{}", outcome.error_text);
                return Ok(exit_codes::REJECTED);
            };
            if let Some(path) = output {
                write_plan(&path, &plan)?;
            }
            print_json(&plan)?;
            Ok(exit_codes::OK)
        }
        Command::Spawn {
            plan,
            examples,
            responses,
            no_unique,
        } => {
            let plan = load_plan(&plan)?;
            let examples = load_examples(&examples)?;
            let model = ReplayModel::from_files(&responses)?;
            let spawner = TestCaseSpawner::new(SpawnerConfig {
                prompt_budget_bytes: cfg.prompt_budget_bytes,
                batch_size: responses.len(),
                unique: cfg.spawn.unique && !no_unique,
            });
            let report = spawner.spawn(&model, &plan, &examples);
            for line in &report.diagnostics {
                eprintln!("{line}");
            }
            if report.is_empty() {
                return Ok(exit_codes::REJECTED);
            }
            print_json(&report.cases)?;
            Ok(exit_codes::OK)
        }
        Command::InitConfig { .. } => bail!("init-config is handled before config load"),
    }
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    write_config(path, &EvoplanConfig::default())?;
    Ok(exit_codes::OK)
}

fn load_parents(path: &Path) -> Result<Vec<Individual>> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse parents {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_validate() {
        let cli = Cli::parse_from([
            "evoplan",
            "validate",
            "--signature",
            "sig.json",
            "--response",
            "plan.md",
        ]);
        assert!(matches!(
            cli.command,
            Command::Validate { output: None, .. }
        ));
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn parse_prompt_operator() {
        let cli = Cli::parse_from([
            "evoplan",
            "prompt",
            "--signature",
            "sig.json",
            "--operator",
            "e2",
        ]);
        assert!(matches!(
            cli.command,
            Command::Prompt {
                operator: Operator::E2,
                ..
            }
        ));
    }

    #[test]
    fn parse_spawn_requires_responses() {
        assert!(
            Cli::try_parse_from(["evoplan", "spawn", "--plan", "p", "--examples", "e"]).is_err()
        );
        let cli = Cli::parse_from([
            "evoplan",
            "spawn",
            "--plan",
            "p",
            "--examples",
            "e",
            "--responses",
            "a.md",
            "b.md",
            "--no-unique",
        ]);
        match cli.command {
            Command::Spawn {
                responses,
                no_unique,
                ..
            } => {
                assert_eq!(responses.len(), 2);
                assert!(no_unique);
            }
            _ => panic!("expected spawn"),
        }
    }

    #[test]
    fn parse_init_config_force() {
        let cli = Cli::parse_from(["evoplan", "init-config", "--force"]);
        assert!(matches!(cli.command, Command::InitConfig { force: true }));
    }
}
