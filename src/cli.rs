use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use formfill::batch::{self, RowStatus};
use formfill::compose::Composer;
use formfill::config::{REPORT_FILE_NAME, RunConfig};
use formfill::engine::{DocxEngine, RenditionOptions};
use formfill::session::DocumentSession;
use formfill::source::{self, Dataset};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "formfill",
    version,
    about = "Fill document templates from spreadsheet rows"
)]
pub struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Do not write log files, log to the console only
    #[arg(long, global = true)]
    pub no_log_files: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate one document per spreadsheet row
    Generate {
        /// Path to the JSON run configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory. Overrides `output_dir` from the configuration.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only write the editable documents, skip the PDF rendition
        #[arg(long)]
        no_rendition: bool,
    },
    /// List the placeholders of a template
    Fields {
        /// Path to the .docx template
        #[arg(short, long)]
        template: PathBuf,
    },
    /// Print the field values the first rows would receive, without writing documents
    Preview {
        /// Path to the JSON run configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Number of rows to show
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
    /// Write an example run configuration
    InitConfig {
        /// Where to write the configuration
        #[arg(short, long, default_value = "formfill.json")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Generate {
            config,
            output,
            no_rendition,
        } => run_generate(&config, output, no_rendition),
        Commands::Fields { template } => run_fields(&template),
        Commands::Preview { config, limit } => run_preview(&config, limit),
        Commands::InitConfig { output, force } => run_init_config(&output, force),
    }
}

fn load_config(path: &Path) -> Result<RunConfig> {
    RunConfig::from_file(path)
        .with_context(|| format!("Failed to load run configuration {}", path.display()))
}

fn load_dataset(config: &RunConfig) -> Result<Dataset> {
    let dataset = source::read(&config.source_path, &config.read_options())?;
    Ok(source::apply_column_types(&dataset, &config.column_types)?)
}

fn run_generate(config_path: &Path, output: Option<PathBuf>, no_rendition: bool) -> Result<()> {
    let mut config = load_config(config_path)?;
    if no_rendition {
        config.rendition.enabled = false;
    }
    let output_dir = output.unwrap_or_else(|| config.output_dir());

    let dataset = load_dataset(&config)?;
    println!(
        "Generating {} documents from {} into {}",
        dataset.len(),
        config.source_path.display(),
        output_dir.display()
    );

    let plan = config.batch_plan(output_dir.clone());
    let engine = DocxEngine::new(config.rendition.clone());
    let report = batch::generate(engine, &dataset, &plan, |progress| {
        println!("  [{}/{}] {}", progress.current, progress.total, progress.row);
    })?;

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let report_path = output_dir.join(REPORT_FILE_NAME);
    report.write_json(&report_path)?;

    println!("{}", report.summary());
    for outcome in report.failures() {
        if let RowStatus::Failure { error } = &outcome.status {
            println!("  failed {}: {error}", outcome.row);
        }
    }
    println!("Report written to {}", report_path.display());
    Ok(())
}

fn run_fields(template: &Path) -> Result<()> {
    let mut session = DocumentSession::new(DocxEngine::new(RenditionOptions::disabled()));
    let fields = session.open(template)?;
    if fields.is_empty() {
        println!("{} has no placeholders", template.display());
    }
    for field in fields {
        println!("{field}");
    }
    session.release();
    Ok(())
}

fn run_preview(config_path: &Path, limit: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let dataset = load_dataset(&config)?;
    let composer = Composer::new(&config.field_mapping, dataset.columns(), &config.fixed_values)?;

    let rows: Vec<serde_json::Value> = dataset
        .rows()
        .iter()
        .take(limit)
        .map(|row| {
            let resolution = composer.resolve(row);
            let errors: Vec<String> = resolution.failures.iter().map(ToString::to_string).collect();
            serde_json::json!({
                "row": row.id,
                "fields": resolution.values,
                "errors": errors,
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn run_init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }
    RunConfig::example().to_file(output)?;
    println!("Example configuration written to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generate_arguments() {
        let cli = Cli::parse_from([
            "formfill",
            "generate",
            "--config",
            "run.json",
            "--no-rendition",
        ]);
        match cli.command {
            Commands::Generate {
                config,
                output,
                no_rendition,
            } => {
                assert_eq!(config, PathBuf::from("run.json"));
                assert!(output.is_none());
                assert!(no_rendition);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_init_config_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("formfill.json");
        run_init_config(&path, false).unwrap();
        assert!(RunConfig::from_file(&path).is_ok());
        assert!(run_init_config(&path, false).is_err());
        run_init_config(&path, true).unwrap();
    }
}
