//! `sheet2sql` command line front end.
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::ValueEnum;
use sheet2sql::Config;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    /// CREATE TABLE statements
    Sql,
    /// Tables, DDL and warnings as JSON
    Json,
}

/// Infer SQL CREATE TABLE statements from an .xlsx, .xls or .ods spreadsheet.
#[derive(Debug, Parser)]
#[command(name = "sheet2sql", version, about)]
struct Cli {
    /// Spreadsheet file to read
    input: PathBuf,

    /// JSON configuration file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of data rows that decide column types
    #[arg(long, value_name = "ROWS")]
    sample_rows: Option<usize>,

    /// Values read as booleans
    #[arg(long, value_delimiter = ',', value_name = "TOKENS")]
    boolean_tokens: Option<Vec<String>>,

    /// Ascending VARCHAR sizes
    #[arg(long, value_delimiter = ',', value_name = "SIZES")]
    varchar_buckets: Option<Vec<u32>>,

    /// Values read as empty cells
    #[arg(long, value_delimiter = ',', value_name = "TOKENS")]
    null_tokens: Option<Vec<String>>,

    /// Sheet name glob pattern, repeatable
    #[arg(long = "sheet", value_name = "PATTERN")]
    sheets: Vec<String>,

    /// A1-style range whose first row is the header, e.g. A3:F
    #[arg(long)]
    range: Option<String>,

    /// Fail on columns that mix text with other values
    #[arg(long)]
    strict: bool,

    /// Comment columns that look like foreign keys
    #[arg(long)]
    annotate_foreign_keys: bool,

    #[arg(long, value_enum, default_value_t = Format::Sql)]
    format: Format,

    /// Write to this file instead of stdout
    #[arg(long, short, conflicts_with = "save")]
    output: Option<PathBuf>,

    /// Write <input stem>_schema.sql next to the input
    #[arg(long)]
    save: bool,
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
                Config::from_json(&json).with_context(|| format!("Invalid configuration in {}", path.display()))?
            }
            None => Config::default(),
        };
        if let Some(rows) = self.sample_rows {
            config.sample_row_limit = Some(rows);
        }
        if let Some(tokens) = &self.boolean_tokens {
            config.boolean_token_set = tokens.to_owned();
        }
        if let Some(buckets) = &self.varchar_buckets {
            config.varchar_buckets = buckets.to_owned();
        }
        if let Some(tokens) = &self.null_tokens {
            config.null_tokens = tokens.to_owned();
        }
        if !self.sheets.is_empty() {
            config.sheets = self.sheets.to_owned();
        }
        if let Some(range) = &self.range {
            config.range = Some(range.to_owned());
        }
        config.strict |= self.strict;
        config.annotate_foreign_keys |= self.annotate_foreign_keys;
        config.validate()?;
        Ok(config)
    }

    fn destination(&self) -> Option<PathBuf> {
        if self.save {
            let stem = self.input.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();
            Some(self.input.with_file_name(format!("{stem}_schema.sql")))
        } else {
            self.output.to_owned()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sheet2sql=warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;
    let bytes = fs::read(&cli.input).with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let file_name = file_name(&cli.input);
    let conversion = sheet2sql::convert(&bytes, &file_name, &config)?;

    let mut text = match cli.format {
        Format::Sql => conversion.sql,
        Format::Json => serde_json::to_string_pretty(&conversion)?,
    };
    text.push('\n');
    match cli.destination() {
        Some(path) => {
            fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "schema written");
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
}
