//! Command-line interface for the smalldb utility
//!
//! Builds a state machine definition from a JSON machine source and prints
//! it as JSON or as a Mermaid state diagram.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use smalldb::core::export::to_mermaid;
use smalldb::plugins::Pipeline;
use smalldb::{BuildConfig, Definition, DiagramFormat, MachineSource};

/// Smalldb - Build state machine definitions
#[derive(Parser)]
#[command(name = "smalldb")]
#[command(about = "Assemble and validate Smalldb state machine definitions")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Set log level (trace|debug|info|warn|error|off)
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Set log format (compact|pretty|json)
    #[arg(long, value_enum, global = true)]
    pub log_format: Option<LogFormat>,
}

/// Log level options
#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

/// Log format options
#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Compact => "compact",
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        }
    }
}

/// Output formats for a built definition
#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Frozen definition as pretty-printed JSON
    #[default]
    Json,
    /// Mermaid state diagram of states and transitions
    Mermaid,
}

/// Options shared by every command that runs a build
#[derive(Args, Debug, Clone, Default)]
pub struct BuildOptions {
    /// Machine source file in JSON (use - for stdin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Directory relative class directories resolve against
    /// (defaults to the input file's directory)
    #[arg(long, env = "SMALLDB_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Fail on incomplete transitions instead of dropping them
    #[arg(long, env = "SMALLDB_STRICT_TRANSITIONS")]
    pub strict: bool,

    /// Fallback format for included diagrams that cannot be detected
    #[arg(long, env = "SMALLDB_DIAGRAM_FORMAT", value_parser = DiagramFormat::from_str)]
    pub diagram_format: Option<DiagramFormat>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a machine definition and print it
    Build {
        #[command(flatten)]
        options: BuildOptions,

        /// Output file (use - for stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Check that a machine source builds
    Validate {
        #[command(flatten)]
        options: BuildOptions,
    },

    /// Show registered preprocessors and diagram formats
    Preprocessors {
        /// Show in JSON format
        #[arg(long)]
        json: bool,
    },
}

/// Main CLI application
#[derive(Default)]
pub struct SmalldbApp;

impl SmalldbApp {
    pub fn new() -> Self {
        Self
    }

    /// Run the application with the given CLI arguments
    pub fn run(&self, cli: Cli) -> Result<()> {
        if cli.verbose {
            eprintln!("Smalldb v{}", env!("CARGO_PKG_VERSION"));
        }

        match cli.command {
            Commands::Build {
                options,
                output,
                format,
            } => self.build_command(options, output, format, cli.verbose),
            Commands::Validate { options } => self.validate_command(options, cli.verbose),
            Commands::Preprocessors { json } => self.preprocessors_command(json),
        }
    }

    /// Build configuration for a run
    ///
    /// Without an explicit base directory, class directories resolve
    /// against the directory of the input file.
    pub fn build_config(&self, options: &BuildOptions) -> BuildConfig {
        let mut config = BuildConfig::new().with_drop_incomplete_transitions(!options.strict);
        let base_dir = options.base_dir.clone().or_else(|| {
            options
                .input
                .as_deref()
                .filter(|p| p.as_os_str() != "-")
                .and_then(Path::parent)
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
        });
        if let Some(dir) = base_dir {
            config = config.with_base_dir(dir);
        }
        if let Some(format) = options.diagram_format {
            config = config.with_default_diagram_format(format);
        }
        config
    }

    /// Read, parse and build the machine source named by `options`
    pub fn build_definition(&self, options: &BuildOptions, verbose: bool) -> Result<Definition> {
        let content = self.read_input(options.input.clone())?;
        if verbose {
            eprintln!("Read {} bytes of input", content.len());
        }

        let source = MachineSource::from_json(&content).context("Invalid machine source")?;
        let pipeline = Pipeline::with_default_preprocessors(self.build_config(options));
        Ok(pipeline.build(&source)?)
    }

    fn build_command(
        &self,
        options: BuildOptions,
        output: Option<PathBuf>,
        format: OutputFormat,
        verbose: bool,
    ) -> Result<()> {
        let definition = self.build_definition(&options, verbose)?;
        if verbose {
            eprintln!(
                "Built machine '{}': {} states, {} transitions",
                definition.machine_type(),
                definition.state_count(),
                definition.transition_count()
            );
        }

        let rendered = match format {
            OutputFormat::Json => serde_json::to_string_pretty(&definition.to_json()?)?,
            OutputFormat::Mermaid => to_mermaid(&definition),
        };
        self.write_output(output, &rendered)
    }

    fn validate_command(&self, options: BuildOptions, verbose: bool) -> Result<()> {
        match self.build_definition(&options, verbose) {
            Ok(definition) => {
                println!(
                    "✓ Valid machine '{}' ({} states, {} transitions)",
                    definition.machine_type(),
                    definition.state_count(),
                    definition.transition_count()
                );
                Ok(())
            }
            Err(e) => {
                println!("✗ Invalid machine source: {:#}", e);
                Err(e)
            }
        }
    }

    fn preprocessors_command(&self, json: bool) -> Result<()> {
        let pipeline = Pipeline::with_default_preprocessors(BuildConfig::default());
        let names = pipeline.preprocessor_names();
        let formats = DiagramFormat::variants();

        if json {
            let listing = serde_json::json!({
                "preprocessors": names,
                "diagram_formats": formats,
                "total": names.len(),
            });
            println!("{}", serde_json::to_string_pretty(&listing)?);
        } else {
            println!("Registered preprocessors:");
            for name in &names {
                println!("  {}", name);
            }
            println!();
            println!("Diagram formats: {}", formats.join(", "));
        }
        Ok(())
    }

    /// Read input from file or stdin
    pub fn read_input(&self, input: Option<PathBuf>) -> Result<String> {
        match input {
            Some(path) if path.as_os_str() != "-" => fs::read_to_string(&path)
                .map_err(|e| anyhow!("Failed to read input file '{}': {}", path.display(), e)),
            _ => {
                let mut content = String::new();
                io::stdin().read_to_string(&mut content)?;
                Ok(content)
            }
        }
    }

    /// Write output to file or stdout
    pub fn write_output(&self, output: Option<PathBuf>, content: &str) -> Result<()> {
        match output {
            Some(path) if path.as_os_str() != "-" => {
                fs::write(&path, content)
                    .map_err(|e| anyhow!("Failed to write output file '{}': {}", path.display(), e))?;
            }
            _ => {
                let mut stdout = io::stdout();
                stdout.write_all(content.as_bytes())?;
                if !content.is_empty() && !content.ends_with('\n') {
                    stdout.write_all(b"\n")?;
                }
                stdout.flush()?;
            }
        }
        Ok(())
    }
}
