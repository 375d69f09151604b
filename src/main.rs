use clap::{Parser, ValueEnum};
use nmn::{NmnError, ParseOutput, ParserConfig, Severity};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::process;

/// Compile a numbered-notation score to its resolved document model.
#[derive(Parser)]
#[command(name = "nmnc", version)]
#[command(about = "Compile numbered musical notation (jianpu) scores")]
struct Args {
    /// Score file to compile
    input: PathBuf,

    /// Parser configuration (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only print the issues
    #[arg(long, conflicts_with = "sequence")]
    issues: bool,

    /// Only print the performed timelines
    #[arg(long)]
    sequence: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(fatal) => {
            if fatal {
                process::exit(2);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Returns whether the score had a fatal issue.
fn run(args: &Args) -> Result<bool, NmnError> {
    let config = match &args.config {
        Some(path) => ParserConfig::load(path)?,
        None => ParserConfig::default(),
    };
    let source = fs::read_to_string(&args.input).map_err(|source| NmnError::Io {
        path: args.input.display().to_string(),
        source,
    })?;

    let output = nmn::parse_with_config(&source, &config)?;
    for issue in &output.issues {
        if issue.severity >= Severity::Warning {
            eprintln!("{}", issue);
        }
    }
    let fatal = output.issues.iter().any(|i| i.severity == Severity::Fatal);

    let text = render(&output, args)?;
    match &args.output {
        Some(path) => {
            fs::write(path, &text).map_err(|source| NmnError::Io {
                path: path.display().to_string(),
                source,
            })?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(fatal)
}

fn render(output: &ParseOutput, args: &Args) -> Result<String, NmnError> {
    if args.issues {
        encode(&output.issues, args.format)
    } else if args.sequence {
        encode(&output.sequenced, args.format)
    } else {
        encode(output, args.format)
    }
}

fn encode<T: Serialize>(value: &T, format: Format) -> Result<String, NmnError> {
    Ok(match format {
        Format::Json => serde_json::to_string_pretty(value)?,
        Format::Yaml => serde_yaml::to_string(value).map_err(|e| NmnError::Serialize(e.to_string()))?,
    })
}
