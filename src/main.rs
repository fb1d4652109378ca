//! The Great Work - campaign administration CLI
//!
//! Thin wrapper over `GameEngine` for operators: submit actions, inspect
//! projections, replay history and audit the log.
//!
//! Run with: great-work [--config <toml>] [--db <path>] <command>

use anyhow::{bail, Context, Result};
use great_work::{
    config::{self, EngineConfig},
    ActionRequest, ActionType, EntityKind, EntityRef, EventId, GameEngine, PlayerId,
};
use std::path::PathBuf;

const USAGE: &str = "\
Usage: great-work [--config <toml>] [--db <path>] <command>

Commands:
  init                                  create the campaign database
  config                                print the effective configuration
  act <request-json> [--actor <id>] [--key <key>]
                                        submit a player action
  submit <action_type> <payload-json> [--actor <id>] [--key <key>]
                                        append a pre-built payload
  show <kind> <id>                      current state of an entity
  replay <kind> <id> <event-id>         entity as of an event
  log [from] [to]                       print events
  state                                 full current projection
  checkpoint                            write a checkpoint now
  verify                                verify the hash chain
  watch [action_type] [--from <id>]     follow new events
";

/// Parsed command line: global flags plus the positional words
#[derive(Debug, Default)]
struct Cli {
    config: Option<PathBuf>,
    db: Option<PathBuf>,
    actor: Option<String>,
    key: Option<String>,
    from: Option<i64>,
    words: Vec<String>,
}

fn parse_args(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .with_context(|| format!("{} needs a value", flag))
        };
        match arg.as_str() {
            "--config" => cli.config = Some(PathBuf::from(value("--config")?)),
            "--db" => cli.db = Some(PathBuf::from(value("--db")?)),
            "--actor" => cli.actor = Some(value("--actor")?),
            "--key" => cli.key = Some(value("--key")?),
            "--from" => {
                let raw = value("--from")?;
                cli.from = Some(raw.parse().with_context(|| format!("bad event id '{}'", raw))?);
            }
            "-h" | "--help" => cli.words = vec!["help".into()],
            s if s.starts_with("--") => bail!("unknown flag {}\n\n{}", s, USAGE),
            _ => cli.words.push(arg.clone()),
        }
    }
    Ok(cli)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args)?;
    let words: Vec<&str> = cli.words.iter().map(String::as_str).collect();

    let Some((&command, rest)) = words.split_first() else {
        print!("{}", USAGE);
        return Ok(());
    };
    if command == "help" {
        print!("{}", USAGE);
        return Ok(());
    }

    let config = load_config(&cli)?;
    if command == "config" {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let db_path = db_path(&cli)?;
    let engine = GameEngine::open(&db_path, config)
        .with_context(|| format!("opening campaign at {}", db_path.display()))?;
    let actor = cli.actor.as_deref().map(PlayerId::from);

    match (command, rest) {
        ("init", []) => {
            let latest = engine.store().latest_event_id()?;
            println!("Campaign database: {}", db_path.display());
            println!("Events: {}", latest);
            println!("Checkpoints: {}", engine.store().checkpoint_count()?);
        }
        ("act", [request]) => {
            let request: ActionRequest =
                serde_json::from_str(request).context("parsing action request")?;
            let id = engine.submit_action(actor.as_ref(), request, cli.key.as_deref())?;
            print_event(&engine, id)?;
        }
        ("submit", [action_type, payload]) => {
            let id = engine.submit_raw(action_type, cli.actor.as_deref(), payload, cli.key.as_deref())?;
            print_event(&engine, id)?;
        }
        ("show", [kind, id]) => {
            let snapshot = engine.get_projection(parse_kind(kind)?, id)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        ("replay", [kind, id, as_of]) => {
            let entity = EntityRef::new(parse_kind(kind)?, id);
            let snapshot = engine.replay(&entity, parse_event_id(as_of)?)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        ("log", range) if range.len() <= 2 => {
            let from = match range.first() {
                Some(from) => parse_event_id(from)?,
                None => EventId(1),
            };
            let to = range.get(1).map(|to| parse_event_id(to)).transpose()?;
            for event in engine.events(from, to)? {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
        ("state", []) => {
            println!("{}", serde_json::to_string_pretty(&engine.state()?)?);
        }
        ("checkpoint", []) => {
            let offset = engine.checkpoint()?;
            println!("Checkpoint written at event {}", offset);
        }
        ("verify", []) => {
            let result = engine.verify_chain()?;
            println!("Chain length: {}", result.chain_length);
            if result.valid {
                println!("✅ Chain intact");
            } else {
                println!("❌ Chain broken:");
                for error in &result.errors {
                    println!("   • {}", error);
                }
                bail!("chain broken: {} error(s)", result.errors.len());
            }
        }
        ("watch", filter) if filter.len() <= 1 => {
            let filter = filter
                .first()
                .map(|t| t.parse::<ActionType>())
                .transpose()?;
            let cursor = EventId(cli.from.unwrap_or(0));
            run_watch(&engine, cursor, filter).await?;
        }
        _ => bail!("bad command line: {}\n\n{}", words.join(" "), USAGE),
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn db_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(path) = &cli.db {
        return Ok(path.clone());
    }
    let data_dir = config::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    Ok(data_dir.join("great-work.db"))
}

fn parse_kind(raw: &str) -> Result<EntityKind> {
    raw.parse::<EntityKind>().map_err(anyhow::Error::msg)
}

fn parse_event_id(raw: &str) -> Result<EventId> {
    let id: i64 = raw
        .parse()
        .with_context(|| format!("bad event id '{}'", raw))?;
    Ok(EventId(id))
}

fn print_event(engine: &GameEngine, id: EventId) -> Result<()> {
    let event = engine.store().get(id)?;
    println!("{}", serde_json::to_string_pretty(&event)?);
    Ok(())
}

async fn run_watch(engine: &GameEngine, cursor: EventId, filter: Option<ActionType>) -> Result<()> {
    let mut subscription = engine.subscribe_from(cursor, filter);
    tracing::info!(cursor = %cursor, "watching for events (ctrl-c to stop)");
    loop {
        tokio::select! {
            event = subscription.next() => {
                println!("{}", serde_json::to_string(&event?)?);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(cursor = %subscription.cursor(), "stopped");
                return Ok(());
            }
        }
    }
}
