use std::{
    collections::BTreeMap,
    io::Read,
    path::{Path, PathBuf},
};

use agentmark::{
    config::{self, SecretConfig, SessionConfig},
    render::AdapterRegistry,
    substitution::Overrides,
    Document, Error, InternalResult, Session, SessionContext,
};
use clap::{command, Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print the block list as JSON
    Segment(Input),
    /// Print resolved definitions as JSON
    Definitions(Input),
    /// Print extracted calls as JSON
    Calls(Input),
    /// Render without generating, using saved previews when given
    Render(Render),
    /// Generate every eager call and print the rendered document
    Run(Run),
}

#[derive(Args)]
struct Input {
    /// Markdown file, or `-` for stdin
    input: PathBuf,

    /// Override a variable input: `define:<block>:<Name>=value`, or `Name=value`
    /// for the first input of that name
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

#[derive(Args)]
struct Render {
    #[command(flatten)]
    input: Input,

    /// JSON object of identity key to saved value
    #[arg(long)]
    previews: Option<PathBuf>,

    /// Keep markers instead of rendering them as text
    #[arg(long)]
    raw: bool,
}

#[derive(Args)]
struct Run {
    #[command(flatten)]
    render: Render,

    /// Session config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// File holding `{"api_key": "..."}`; falls back to the environment
    #[arg(long)]
    secret: Option<PathBuf>,

    /// Write Ready values here after the run
    #[arg(long)]
    save: Option<PathBuf>,
}

fn read_input(path: &Path) -> InternalResult<String> {
    let mut text = String::new();
    if path == Path::new("-") {
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| Error::internal(format!("Failed to read stdin: {}", e)))?;
    } else {
        text = std::fs::read_to_string(path)
            .map_err(|e| Error::internal(format!("Failed to read {}: {}", path.display(), e)))?;
    }
    Ok(text)
}

fn parse_overrides(document: &Document, pairs: &[String]) -> InternalResult<Overrides> {
    let mut overrides = Overrides::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::internal(format!("Expected KEY=VALUE, got {}", pair)))?;
        let slot = document
            .slot(key)
            .or_else(|| document.slots().iter().find(|slot| slot.name == key))
            .ok_or_else(|| Error::internal(format!("No variable input named {}", key)))?;
        overrides.insert(slot.key.clone(), value.to_string());
    }
    Ok(overrides)
}

fn load_previews(path: Option<&Path>) -> InternalResult<BTreeMap<String, String>> {
    match path {
        Some(path) => Ok(config::from_file(path)?),
        None => Ok(BTreeMap::new()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> InternalResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| Error::internal(format!("Failed to serialize output: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn output(session: &Session, raw: bool) -> String {
    if raw {
        session.render()
    } else {
        session.render_with(&mut AdapterRegistry::plain_text(session.intent_states()))
    }
}

async fn run(cli: Cli) -> InternalResult<()> {
    match cli.command {
        Command::Segment(input) => {
            let document = Document::parse(read_input(&input.input)?);
            print_json(&document.blocks())
        }
        Command::Definitions(input) => {
            let document = Document::parse(read_input(&input.input)?);
            print_json(document.definitions())
        }
        Command::Calls(input) => {
            let document = Document::parse(read_input(&input.input)?);
            let overrides = parse_overrides(&document, &input.overrides)?;
            print_json(&document.calls(&overrides))
        }
        Command::Render(render) => {
            let text = read_input(&render.input.input)?;
            let overrides = parse_overrides(&Document::parse(text.as_str()), &render.input.overrides)?;
            let previews = load_previews(render.previews.as_deref())?;
            let context = SessionContext::from_config(SessionConfig::offline(), None)?;
            let session = Session::restore(context, text, previews, overrides);
            println!("{}", output(&session, render.raw));
            Ok(())
        }
        Command::Run(run) => {
            let config = match &run.config {
                Some(path) => SessionConfig::from_file(path)?,
                None => SessionConfig::default(),
            };
            debug!("config: {:?}", config);
            let secret = run
                .secret
                .as_deref()
                .map(SecretConfig::from_file)
                .transpose()?;

            let text = read_input(&run.render.input.input)?;
            let overrides =
                parse_overrides(&Document::parse(text.as_str()), &run.render.input.overrides)?;
            let previews = load_previews(run.render.previews.as_deref())?;
            let context = SessionContext::from_config(config, secret.as_ref())?;
            let session = Session::restore(context, text, previews, overrides);
            info!(pending = session.evaluator().in_flight(), "waiting for generation");
            session.settled().await;

            println!("{}", output(&session, run.render.raw));
            if let Some(path) = &run.save {
                let json = serde_json::to_string_pretty(&session.snapshot())
                    .map_err(|e| Error::internal(format!("Failed to serialize previews: {}", e)))?;
                std::fs::write(path, json).map_err(|e| {
                    Error::internal(format!("Failed to write {}: {}", path.display(), e))
                })?;
                info!(path = %path.display(), "previews saved");
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
