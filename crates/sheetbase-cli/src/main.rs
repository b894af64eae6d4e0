//! CLI tool for managing sheetbase tables.

mod error;
mod render;

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand, ValueEnum};
use log::debug;
use snafu::ResultExt;
use sheetbase_core::{
    BatchPolicy, CreateOutcome, DuplicatePolicy, ExportFormat, Sheetbase, SheetbaseConfig,
    TableId, TableSpec, config::DatabaseSettings,
};

use crate::error::{
    CliResult, ConfigSnafu, NoFileNameSnafu, OutputExistsSnafu, ReadInputSnafu,
    ServiceSnafu, StdoutSnafu, WriteOutputSnafu,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExportFormatArg {
    Xlsx,
    Csv,
    Jsonl,
}

impl From<ExportFormatArg> for ExportFormat {
    fn from(v: ExportFormatArg) -> Self {
        match v {
            ExportFormatArg::Xlsx => ExportFormat::Xlsx,
            ExportFormatArg::Csv => ExportFormat::Csv,
            ExportFormatArg::Jsonl => ExportFormat::Jsonl,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    StopOnFirstError,
    BestEffort,
    AllOrNothing,
}

impl From<PolicyArg> for BatchPolicy {
    fn from(v: PolicyArg) -> Self {
        match v {
            PolicyArg::StopOnFirstError => BatchPolicy::StopOnFirstError,
            PolicyArg::BestEffort => BatchPolicy::BestEffort,
            PolicyArg::AllOrNothing => BatchPolicy::AllOrNothing,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an empty table with the given columns
    Create {
        #[arg(long)]
        name: String,

        /// Human-readable label (default: the name)
        #[arg(long = "display-name")]
        display_name: Option<String>,

        /// Repeatable column names, in order
        #[arg(long = "column", required = true)]
        columns: Vec<String>,

        /// Fail instead of reporting the existing table when the name is taken
        #[arg(long, default_value_t = false)]
        reject_duplicate: bool,
    },

    /// Create a table from a spreadsheet's header row and load its rows
    CreateFromXlsx {
        #[arg(long)]
        name: String,

        #[arg(long)]
        file: PathBuf,
    },

    /// Soft-delete a table
    Delete {
        #[arg(long)]
        id: i64,
    },

    /// List tables
    List {
        #[arg(long, default_value_t = false)]
        include_deleted: bool,

        /// Print descriptors as JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Insert records given as a JSON array of objects
    Insert {
        #[arg(long)]
        id: i64,

        #[arg(
            long,
            conflicts_with = "json_file",
            required_unless_present = "json_file"
        )]
        json: Option<String>,

        #[arg(long = "json-file")]
        json_file: Option<PathBuf>,
    },

    /// Append one spreadsheet to a table
    Ingest {
        #[arg(long)]
        id: i64,

        #[arg(long)]
        file: PathBuf,
    },

    /// Append several spreadsheets to a table
    IngestMany {
        #[arg(long)]
        id: i64,

        /// Repeatable spreadsheet paths, ingested in order
        #[arg(long = "file", required = true)]
        files: Vec<PathBuf>,

        /// Failure policy (default: from config)
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,
    },

    /// Print a table's rows
    Show {
        #[arg(long)]
        id: i64,

        #[arg(long, default_value_t = 10)]
        max_rows: usize,
    },

    /// Download a table as xlsx, csv or jsonl
    Export {
        #[arg(long)]
        id: i64,

        #[arg(long, value_enum, default_value_t = ExportFormatArg::Xlsx)]
        format: ExportFormatArg,

        /// Repeatable projected columns (default: every user column)
        #[arg(long = "column")]
        columns: Vec<String>,

        /// Destination file (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Overwrite an existing output file
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Pearson correlation between two columns
    Correlate {
        #[arg(long)]
        id: i64,

        #[arg(long)]
        x: String,

        #[arg(long)]
        y: String,
    },
}

#[derive(Debug, Parser)]
#[command(name = "sheetbase", version)]
struct Cli {
    /// TOML config file (default: built-in defaults plus SHEETBASE_* overrides)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file or sqlite:// URL, overriding the config
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

fn load_config(path: Option<&Path>, database: Option<&str>) -> CliResult<SheetbaseConfig> {
    let mut config = match path {
        Some(path) => SheetbaseConfig::from_file(path).context(ConfigSnafu)?,
        None => SheetbaseConfig::from_env().context(ConfigSnafu)?,
    };

    if let Some(database) = database {
        config.database.url = if database.starts_with("sqlite:") {
            database.to_string()
        } else {
            DatabaseSettings::for_path(database).url
        };
        config.validate().context(ConfigSnafu)?;
    }
    Ok(config)
}

fn init_logging(level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .try_init();
}

fn read_input(path: &Path) -> CliResult<Vec<u8>> {
    std::fs::read(path).context(ReadInputSnafu {
        path: path.display().to_string(),
    })
}

fn file_name(path: &Path) -> CliResult<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            NoFileNameSnafu {
                path: path.display().to_string(),
            }
            .build()
        })
}

fn report_created(outcome: &CreateOutcome) {
    let d = outcome.descriptor();
    match outcome {
        CreateOutcome::Created(_) => println!("Created table {} (id: {})", d.logical_name, d.id),
        CreateOutcome::AlreadyExists(_) => {
            println!("Table {} already exists (id: {})", d.logical_name, d.id)
        }
    }
}

async fn cmd_create(
    service: &Sheetbase,
    name: String,
    display_name: Option<String>,
    columns: Vec<String>,
    reject_duplicate: bool,
) -> CliResult<()> {
    let mut spec = TableSpec::new(name, columns);
    if let Some(display_name) = display_name {
        spec = spec.display_name(display_name);
    }

    let outcome = if reject_duplicate {
        service
            .create_table_with_policy(spec, DuplicatePolicy::Reject)
            .await
    } else {
        service.create_table(spec).await
    }
    .context(ServiceSnafu)?;

    report_created(&outcome);
    Ok(())
}

async fn cmd_create_from_xlsx(service: &Sheetbase, name: &str, file: &Path) -> CliResult<()> {
    let bytes = read_input(file)?;
    let (outcome, rows) = service
        .create_table_from_spreadsheet(name, &file_name(file)?, &bytes)
        .await
        .context(ServiceSnafu)?;

    report_created(&outcome);
    if outcome.is_created() {
        println!("Ingested rows: {rows}");
    }
    Ok(())
}

async fn cmd_list(service: &Sheetbase, include_deleted: bool, json: bool) -> CliResult<()> {
    let tables = service
        .list_tables(include_deleted)
        .await
        .context(ServiceSnafu)?;

    let mut out = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &tables)
            .map_err(std::io::Error::from)
            .context(StdoutSnafu)?;
        writeln!(out).context(StdoutSnafu)?;
        return Ok(());
    }
    render::write_tables(&tables, &mut out)
}

async fn cmd_insert(
    service: &Sheetbase,
    id: TableId,
    json: Option<String>,
    json_file: Option<PathBuf>,
) -> CliResult<()> {
    let json = match (json, json_file) {
        (Some(json), _) => json,
        (None, Some(path)) => String::from_utf8_lossy(&read_input(&path)?).into_owned(),
        (None, None) => "[]".to_string(),
    };

    let rows = service
        .insert_records(id, &json)
        .await
        .context(ServiceSnafu)?;
    println!("Inserted rows: {rows}");
    Ok(())
}

async fn cmd_ingest(service: &Sheetbase, id: TableId, file: &Path) -> CliResult<()> {
    let bytes = read_input(file)?;
    let rows = service
        .ingest_single(id, &file_name(file)?, &bytes)
        .await
        .context(ServiceSnafu)?;
    println!("Ingested rows: {rows}");
    Ok(())
}

async fn cmd_ingest_many(
    service: &Sheetbase,
    id: TableId,
    files: &[PathBuf],
    policy: Option<PolicyArg>,
) -> CliResult<()> {
    let mut uploads = Vec::with_capacity(files.len());
    for path in files {
        uploads.push((file_name(path)?, read_input(path)?));
    }

    let report = service
        .ingest_multiple(id, &uploads, policy.map(Into::into))
        .await
        .context(ServiceSnafu)?;

    render::write_report(&report, &mut std::io::stdout().lock())?;
    if let Some(failure) = report.first_failure() {
        debug!("first failing file: {}", failure.source);
    }
    Ok(())
}

async fn cmd_show(service: &Sheetbase, id: TableId, max_rows: usize) -> CliResult<()> {
    let batch = service.show(id).await.context(ServiceSnafu)?;
    render::write_batch(&format!("table {id}"), &batch, max_rows, &mut std::io::stdout().lock())
}

async fn cmd_export(
    service: &Sheetbase,
    id: TableId,
    format: ExportFormat,
    columns: Vec<String>,
    output: Option<PathBuf>,
    force: bool,
) -> CliResult<()> {
    if let Some(path) = &output
        && path.exists()
        && !force
    {
        return OutputExistsSnafu {
            path: path.display().to_string(),
        }
        .fail();
    }

    let projection = (!columns.is_empty()).then_some(columns.as_slice());
    let bytes = service
        .export(id, projection, format)
        .await
        .context(ServiceSnafu)?;

    match output {
        Some(path) => {
            std::fs::write(&path, &bytes).context(WriteOutputSnafu {
                path: path.display().to_string(),
            })?;
            eprintln!(
                "Wrote {} ({}, {} bytes)",
                path.display(),
                format.content_type(),
                bytes.len()
            );
        }
        None => {
            let mut out = std::io::stdout().lock();
            out.write_all(&bytes).context(StdoutSnafu)?;
            out.flush().context(StdoutSnafu)?;
        }
    }
    Ok(())
}

async fn cmd_correlate(service: &Sheetbase, id: TableId, x: &str, y: &str) -> CliResult<()> {
    match service.correlate(id, x, y).await.context(ServiceSnafu)? {
        Some(r) => println!("pearson_r({x}, {y}) = {r:.6}"),
        None => println!("pearson_r({x}, {y}) = undefined (fewer than two numeric pairs)"),
    }
    Ok(())
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref(), cli.database.as_deref())?;
    init_logging(&config.logging.level);

    let service = Sheetbase::open(&config).await.context(ServiceSnafu)?;

    let result = match cli.cmd {
        Command::Create {
            name,
            display_name,
            columns,
            reject_duplicate,
        } => cmd_create(&service, name, display_name, columns, reject_duplicate).await,

        Command::CreateFromXlsx { name, file } => {
            cmd_create_from_xlsx(&service, &name, &file).await
        }

        Command::Delete { id } => {
            let id = TableId(id);
            service
                .delete_table(id)
                .await
                .context(ServiceSnafu)
                .map(|()| println!("Deleted table {id}"))
        }

        Command::List {
            include_deleted,
            json,
        } => cmd_list(&service, include_deleted, json).await,

        Command::Insert {
            id,
            json,
            json_file,
        } => cmd_insert(&service, TableId(id), json, json_file).await,

        Command::Ingest { id, file } => cmd_ingest(&service, TableId(id), &file).await,

        Command::IngestMany { id, files, policy } => {
            cmd_ingest_many(&service, TableId(id), &files, policy).await
        }

        Command::Show { id, max_rows } => cmd_show(&service, TableId(id), max_rows).await,

        Command::Export {
            id,
            format,
            columns,
            output,
            force,
        } => cmd_export(&service, TableId(id), format.into(), columns, output, force).await,

        Command::Correlate { id, x, y } => cmd_correlate(&service, TableId(id), &x, &y).await,
    };

    service.close().await;
    result
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        match e.kind() {
            Some(kind) => eprintln!("error[{kind}]: {e}"),
            None => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use clap::CommandFactory;

    use super::*;
    use crate::error::CliError;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn database_flag_accepts_paths_and_urls() {
        let config = load_config(None, Some("/tmp/x.db")).expect("config");
        assert_eq!(config.database.url, "sqlite:///tmp/x.db");

        let config = load_config(None, Some("sqlite::memory:")).expect("config");
        assert_eq!(config.database.url, "sqlite::memory:");
    }

    #[test]
    fn missing_file_name_is_an_error() {
        assert!(matches!(
            file_name(Path::new("/")),
            Err(CliError::NoFileName { .. })
        ));
    }
}
