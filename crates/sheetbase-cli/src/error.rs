use arrow::error::ArrowError;
use sheetbase_core::{ErrorKind, SheetbaseError, config::ConfigError};

use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("{source}"))]
    Config { source: ConfigError },

    #[snafu(display("{source}"))]
    Service {
        #[snafu(source(from(SheetbaseError, Box::new)))]
        source: Box<SheetbaseError>,
    },

    #[snafu(display("Failed to read {path}: {source}"))]
    ReadInput {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Refusing to overwrite existing file: {path}"))]
    OutputExists { path: String },

    #[snafu(display("Failed to write {path}: {source}"))]
    WriteOutput {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Input path has no file name: {path}"))]
    NoFileName { path: String },

    #[snafu(display("Failed to render rows: {source}"))]
    Render { source: ArrowError },

    #[snafu(display("Failed to write output: {source}"))]
    Stdout { source: std::io::Error },
}

impl CliError {
    /// Classification used for the `error[...]` prefix, when one applies.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            CliError::Service { source } => Some(source.kind()),
            CliError::Config { .. } => Some(ErrorKind::InvalidInput),
            _ => None,
        }
    }
}
