// src/convert.rs
use crate::{
    data::DataSource,
    output::{create_output_folder, unique_path},
    template::Template,
    validate::{check_fields, check_name_column},
};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, instrument};

pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_DELIMITER: char = ';';

/// Inputs of one conversion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Delimited data file; its first line is the header.
    pub data: PathBuf,
    /// `.docx` template with MERGEFIELDs.
    pub template: PathBuf,
    /// Column whose value names each output file.
    pub name: String,
    /// Output directory, created if missing.
    pub path: PathBuf,
    pub delimiter: char,
}

impl ConvertOptions {
    pub fn new(
        data: impl Into<PathBuf>,
        template: impl Into<PathBuf>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            data: data.into(),
            template: template.into(),
            name: name.into(),
            path: PathBuf::from(DEFAULT_OUTPUT_DIR),
            delimiter: DEFAULT_DELIMITER,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }
}

#[derive(Debug, Default)]
pub struct ConvertSummary {
    /// Written documents, in row order.
    pub written: Vec<PathBuf>,
}

/// Generate one document per data row.
///
/// The name column and the template fields are checked against the header
/// before anything is written. The first failing row stops the run; documents
/// already written are left in place.
#[instrument(level = "info", skip(opts), fields(data = %opts.data.display(), template = %opts.template.display()))]
pub fn convert(opts: &ConvertOptions) -> Result<ConvertSummary> {
    info!("Getting .docx template and data files ...");

    let source = DataSource::open(&opts.data, opts.delimiter)?;
    check_name_column(source.headers(), &opts.name)?;

    let template = Template::open(&opts.template)?;
    info!("DOCX fields : {:?}", template.fields());
    info!("Data fields : {:?}", source.headers());
    check_fields(template.fields(), source.headers())?;

    info!("All fields are present in your data. Generating Word docs ...");
    let output_dir = create_output_folder(&opts.path)?;

    let mut summary = ConvertSummary::default();
    for record in source.records() {
        let record = record?;
        let payload = record.payload(template.fields())?;
        let name = record
            .get(&opts.name)
            .with_context(|| format!("row {}: no value in column `{}`", record.row, opts.name))?;

        let rendered = template.instantiate().merge(&payload)?;
        let path = unique_path(name, &output_dir)?;
        rendered
            .write_new(&path)
            .with_context(|| format!("row {}: writing document", record.row))?;

        info!(row = record.row, path = %path.display(), "wrote document");
        summary.written.push(path);
    }

    info!("{} documents written to {}", summary.written.len(), output_dir.display());
    Ok(summary)
}
