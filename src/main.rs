use clap::{Parser, Subcommand};
use fieldforge::cli::{self, OutputFormat};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fieldforge")]
#[command(about = "Reactive formula fields for YAML documents")]
#[command(long_about = "FieldForge - evaluate formula fields in a YAML document

Each field may carry a formula referencing other fields:

  fields:
    - id: age
      type: number
      value: 20
    - id: adult
      formula: \"{age} >= 18\"

COMMANDS:
  evaluate  - Compute every formula field, optionally after edits
  graph     - Show dependencies, recompute order and cycles
  eval      - Evaluate one expression against a document

EXAMPLES:
  fieldforge evaluate form.yaml
  fieldforge evaluate form.yaml --set age=17 --format json
  fieldforge eval form.yaml 'sum({products.price})'

Set RUST_LOG (e.g. RUST_LOG=fieldforge=trace) for engine logs.")]
#[command(version)]
struct Cli {
    /// Log engine activity (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Evaluate every formula field in a document.

Each --set is applied afterwards as a host edit, so only the formulas
depending on that field are recomputed.

EXAMPLE:
  fieldforge evaluate form.yaml --set gender=Female --set age=18")]
    /// Evaluate every formula field
    Evaluate {
        /// Path to the YAML document
        file: PathBuf,

        /// Field edit applied after the first evaluation (id=value)
        #[arg(short, long = "set", value_name = "ID=VALUE")]
        sets: Vec<String>,

        /// Engine configuration file (YAML)
        #[arg(short, long, env = "FIELDFORGE_CONFIG")]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show formula dependencies, recompute order and cycles
    Graph {
        /// Path to the YAML document
        file: PathBuf,

        /// Engine configuration file (YAML)
        #[arg(short, long, env = "FIELDFORGE_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Evaluate one expression against a document
    Eval {
        /// Path to the YAML document
        file: PathBuf,

        /// Expression, e.g. 'concat({first}, " ", {last})'
        expression: String,

        /// Engine configuration file (YAML)
        #[arg(short, long, env = "FIELDFORGE_CONFIG")]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "fieldforge=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Evaluate {
            file,
            sets,
            config,
            format,
        } => cli::evaluate(file, sets, config, format)?,

        Commands::Graph { file, config } => cli::graph(file, config)?,

        Commands::Eval {
            file,
            expression,
            config,
            format,
        } => cli::eval(file, expression, config, format)?,
    }
    Ok(())
}
