use anyhow::Result;
use clap::Parser;
use csv2docx::{convert, ConvertOptions};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Generate one .docx per data row by filling a template's merge fields"
)]
struct Args {
    /// Delimited data file; the first line holds the column names
    #[arg(short, long, env = "CSV2DOCX_DATA")]
    data: PathBuf,
    /// .docx template containing MERGEFIELDs
    #[arg(short, long, env = "CSV2DOCX_TEMPLATE")]
    template: PathBuf,
    /// Column whose value names each generated file
    #[arg(short, long, env = "CSV2DOCX_NAME")]
    name: String,
    /// Output directory, created if missing
    #[arg(short, long, env = "CSV2DOCX_PATH", default_value = convert::DEFAULT_OUTPUT_DIR)]
    path: PathBuf,
    /// Single-character column delimiter
    #[arg(long, env = "CSV2DOCX_DELIMITER", default_value_t = convert::DEFAULT_DELIMITER)]
    delimiter: char,
}

impl From<Args> for ConvertOptions {
    fn from(args: Args) -> Self {
        ConvertOptions::new(args.data, args.template, args.name)
            .with_path(args.path)
            .with_delimiter(args.delimiter)
    }
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let opts = ConvertOptions::from(Args::parse());
    match convert::convert(&opts) {
        Ok(summary) => {
            info!("done, {} documents", summary.written.len());
            Ok(())
        }
        Err(err) => {
            error!("{:#}", err);
            Err(err)
        }
    }
}
