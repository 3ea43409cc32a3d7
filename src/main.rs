use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::prelude::*;

use lifeline::config::LayoutConfig;
use lifeline::error::{Error, Result};
use lifeline::fonts::{ApproximateMeasure, CosmicTextMeasure, TextMeasure};
use lifeline::sequence::{DiagramLayout, LayoutSession};

/// Semantic model and layout engine for ZenUML-style sequence diagrams
#[derive(Parser, Debug)]
#[command(name = "lifeline")]
#[command(version)]
#[command(about = "Lay out sequence diagrams and print the geometry as JSON", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute participant order, lifeline coordinates and message geometry
    Layout(LayoutArgs),
    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args, Debug)]
struct LayoutArgs {
    /// Input diagram (use "-" for stdin)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Write JSON here instead of stdout
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Starter participant, replacing any @Starter in the source
    #[arg(long, value_name = "NAME")]
    starter: Option<String>,

    /// Layout config file (TOML or YAML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Built-in spacing preset (default, compact, spacious)
    #[arg(long, value_name = "PRESET", conflicts_with = "config")]
    preset: Option<String>,

    /// Use per-character metrics instead of shaping with system fonts
    #[arg(long)]
    approximate: bool,

    /// Pretty-print the JSON
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lifeline=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match Cli::parse().command {
        Command::Layout(args) => layout(args),
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "lifeline", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn layout(args: LayoutArgs) -> Result<()> {
    let config = match (&args.config, &args.preset) {
        (Some(path), _) => LayoutConfig::load(path)?,
        (None, Some(preset)) => LayoutConfig::from_preset(preset)?,
        (None, None) => LayoutConfig::default(),
    };

    let source = read_input(&args.input)?;
    let starter = args.starter.as_deref();

    let layout = if args.approximate {
        run(config, ApproximateMeasure::default(), &source, starter)
    } else {
        let measure = CosmicTextMeasure::new().map_err(Error::Measure)?;
        run(config, measure, &source, starter)
    };

    for error in &layout.errors {
        eprintln!("error: {}", error);
    }
    for diagnostic in &layout.diagnostics {
        eprintln!(
            "layout: {}:{} {}",
            diagnostic.line, diagnostic.column, diagnostic.message
        );
    }

    let json = if args.pretty {
        serde_json::to_string_pretty(&layout)?
    } else {
        serde_json::to_string(&layout)?
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, json).map_err(|source| Error::Write {
                what: path.display().to_string(),
                source,
            })?;
            eprintln!("Layout saved to: {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn run<M: TextMeasure>(
    config: LayoutConfig,
    measure: M,
    source: &str,
    starter: Option<&str>,
) -> DiagramLayout {
    let session = LayoutSession::new(config, measure);
    let layout = session.update(source, starter);
    (*layout).clone()
}

fn read_input(input: &Path) -> Result<String> {
    if input.to_str() == Some("-") {
        let mut buffer = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buffer).map_err(|source| {
            Error::Io {
                what: "stdin".to_string(),
                source,
            }
        })?;
        Ok(buffer)
    } else {
        std::fs::read_to_string(input).map_err(|source| Error::Io {
            what: input.display().to_string(),
            source,
        })
    }
}
