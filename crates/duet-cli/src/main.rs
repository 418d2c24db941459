//! # duet-cli
//!
//! Binary entry point for duet.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Configuration loading, overrides, and validation
//! - Logging setup (console plus optional file)
//! - Wiring the Discord transports into a conversation
//! - `duet check` and `duet script` for inspecting a setup before running it

mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use duet_core::{
    Conversation, ConversationOutcome, ConversationSettings, DuetConfig, ScenarioSet,
    load_scenarios, token_env_var,
};
use duet_discord::{DiscordHttp, DiscordTransport};
use duet_proto::ChatTransport;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const IDENTITIES: [&str; 2] = ["identity_1", "identity_2"];

/// Two bot identities replaying a scripted dialogue in a Discord channel.
#[derive(Parser, Debug)]
#[command(name = "duet", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: duet.yml)
    #[arg(short, long, default_value = "duet.yml", global = true)]
    config: PathBuf,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play the script (default if no subcommand given)
    Run(RunArgs),

    /// Validate the config and scenarios, then log both identities in
    Check(CheckArgs),

    /// Print the lines that would be played
    Script(ScriptArgs),
}

#[derive(Parser, Debug, Default)]
struct RunArgs {
    /// Scenarios file (overrides scenarios_file)
    #[arg(short, long)]
    scenarios: Option<PathBuf>,

    /// Channel to talk in (overrides discord.channel_id)
    #[arg(long)]
    channel: Option<u64>,

    /// Play this day instead of the first scenario
    #[arg(short, long)]
    day: Option<u32>,

    /// Seconds to show "typing" before each reply
    #[arg(long)]
    typing_delay: Option<u64>,

    /// Start the conversation without waiting for someone to reply to a bot
    #[arg(long)]
    kickoff: bool,

    /// Validate and print the resolved setup without connecting
    #[arg(long)]
    dry_run: bool,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Skip logging in to Discord
    #[arg(long)]
    offline: bool,
}

#[derive(Parser, Debug)]
struct ScriptArgs {
    /// Scenarios file (overrides scenarios_file)
    #[arg(short, long)]
    scenarios: Option<PathBuf>,

    /// Show this day instead of the first scenario
    #[arg(short, long)]
    day: Option<u32>,

    /// Show speakers as with `run --kickoff`
    #[arg(long)]
    kickoff: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, found) = load_config(&cli.config)?;
    config.apply_env();

    let log_guard = logging::init_logging(&config.log, cli.verbose)?;
    if !found {
        warn!("Config file {:?} not found, using defaults", cli.config);
    }

    let exit_code = match cli.command {
        Some(Commands::Run(args)) => run_command(config, args).await?,
        Some(Commands::Check(args)) => {
            check_command(config, args).await?;
            0
        }
        Some(Commands::Script(args)) => {
            script_command(config, args).await?;
            0
        }
        None => run_command(config, RunArgs::default()).await?,
    };

    // `process::exit` skips destructors; flush the file log first.
    drop(log_guard);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// Loads the config file, or defaults when it does not exist.
fn load_config(path: &Path) -> Result<(DuetConfig, bool)> {
    if path.exists() {
        let config = DuetConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {path:?}"))?;
        Ok((config, true))
    } else {
        Ok((DuetConfig::default(), false))
    }
}

fn apply_run_overrides(config: &mut DuetConfig, args: &RunArgs) {
    if let Some(path) = &args.scenarios {
        config.scenarios_file.clone_from(path);
    }
    if let Some(channel) = args.channel {
        config.discord.channel_id = channel;
    }
    if args.day.is_some() {
        config.day = args.day;
    }
    if let Some(secs) = args.typing_delay {
        config.typing_delay_secs = secs;
    }
    if args.kickoff {
        config.kickoff.enabled = true;
    }
}

fn validate(config: &DuetConfig) -> Result<()> {
    let warnings = config.validate().context("Configuration validation failed")?;
    for warning in &warnings {
        eprintln!("{warning}");
    }
    Ok(())
}

async fn load_set(config: &DuetConfig) -> Result<ScenarioSet> {
    let set = load_scenarios(&config.scenarios_file)
        .await
        .context("Failed to load scenarios")?;
    for warning in set.validate() {
        warn!("Scenarios: {}", warning);
    }
    Ok(set)
}

fn transport(config: &DuetConfig, label: &str) -> Result<Arc<dyn ChatTransport>> {
    let token = config.token(label)?;
    let http = DiscordHttp::new(config.discord.api_base.clone(), token)
        .with_context(|| format!("Failed to build Discord client for {label}"))?;
    info!(identity = label, token = %http.token_masked(), "Discord client ready");
    Ok(Arc::new(DiscordTransport::new(
        http,
        config.discord.channel(),
        config.discord.poll_interval(),
    )))
}

/// Returns the process exit code for the conversation's outcome.
async fn run_command(mut config: DuetConfig, args: RunArgs) -> Result<i32> {
    apply_run_overrides(&mut config, &args);
    validate(&config)?;

    let set = load_set(&config).await?;
    let script = set.script(config.day_selection())?;

    if args.dry_run {
        println!("Dry run mode - configuration:");
        println!("  Channel: {}", config.discord.channel_id);
        println!("  Identity 1: {}", config.identity_1.id);
        println!("  Identity 2: {}", config.identity_2.id);
        println!("  Scenarios: {}", config.scenarios_file.display());
        match script.day {
            Some(day) => println!("  Day: {day} ({} lines)", script.len()),
            None => println!("  Day: none (0 lines)"),
        }
        println!("  Typing delay: {}s", config.typing_delay_secs);
        if config.kickoff.enabled {
            println!("  Kickoff: {:?}", config.kickoff.anchor);
        } else {
            println!("  Kickoff: off (waiting for a reply to either bot)");
        }
        return Ok(0);
    }

    let conversation = Conversation::new(
        ConversationSettings::from_config(&config),
        transport(&config, IDENTITIES[0])?,
        transport(&config, IDENTITIES[1])?,
        script,
    );

    let outcome = conversation.run().await?;
    print_summary(&outcome);
    Ok(outcome.reason.exit_code())
}

fn print_summary(outcome: &ConversationOutcome) {
    println!(
        "Conversation ended: {} ({}/{} lines sent)",
        outcome.reason,
        outcome.lines_sent(),
        outcome.script_len
    );
}

async fn check_command(config: DuetConfig, args: CheckArgs) -> Result<()> {
    validate(&config)?;
    println!("✓ Config is valid");

    let set = load_set(&config).await?;
    let script = set.script(config.day_selection())?;
    println!(
        "✓ {} scenario(s) loaded from {}; {} line(s) to play",
        set.scenarios.len(),
        config.scenarios_file.display(),
        script.len()
    );

    if args.offline {
        return Ok(());
    }

    for label in IDENTITIES {
        let transport = transport(&config, label)?;
        let user = transport
            .login()
            .await
            .with_context(|| format!("{label} could not log in (token from config or {})", token_env_var(label)))?;
        let expected = match label {
            "identity_1" => config.identity_1.id,
            _ => config.identity_2.id,
        };
        if user.id.get() == expected {
            println!("✓ {label} logged in as {} ({})", user.name, user.id);
        } else {
            println!(
                "⚠ {label} logged in as {} ({}) but the config says id {expected}",
                user.name, user.id
            );
        }
    }
    Ok(())
}

async fn script_command(mut config: DuetConfig, args: ScriptArgs) -> Result<()> {
    if let Some(path) = args.scenarios {
        config.scenarios_file = path;
    }
    if args.day.is_some() {
        config.day = args.day;
    }
    if args.kickoff {
        config.kickoff.enabled = true;
    }

    let set = load_set(&config).await?;
    let script = set.script(config.day_selection())?;

    match script.day {
        Some(day) => println!("Day {day}: {} line(s)", script.len()),
        None => println!("No scenarios in {}", config.scenarios_file.display()),
    }
    if !config.kickoff.enabled {
        println!("(no kickoff: line 1 goes to whichever identity was not greeted)");
    }
    for (index, line) in script.lines().iter().enumerate() {
        match speaker(index, config.kickoff.enabled) {
            Some(speaker) => println!("{:>3}  {speaker:<10}  {line}", index + 1),
            None => println!("{:>3}  {line}", index + 1),
        }
    }
    Ok(())
}

/// Who speaks line `index`. Only known up front when identity 1 kicks off;
/// otherwise the opening speaker depends on which bot a person replies to.
fn speaker(index: usize, kickoff: bool) -> Option<&'static str> {
    kickoff.then(|| IDENTITIES[index % 2])
}
