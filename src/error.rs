use thiserror::Error;

/// Invalid run configuration, detected before any row is processed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("column `{column}` not found in data header {available:?}; please enter a valid column name")]
    NameColumnMissing {
        column: String,
        available: Vec<String>,
    },
    #[error("{missing:?} in the word document, but not in the data header")]
    FieldsMissing { missing: Vec<String> },
    #[error("delimiter {0:?} must be a single ASCII character")]
    InvalidDelimiter(char),
}

/// The template file is not a usable `.docx` document.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("not a zip archive: {0}")]
    NotAnArchive(#[source] zip::result::ZipError),
    #[error("missing part `{0}`")]
    MissingPart(String),
    #[error("malformed XML in part `{part}`: {source}")]
    Xml {
        part: String,
        #[source]
        source: quick_xml::Error,
    },
}

/// A data row that cannot be merged. Fatal to the whole run.
#[derive(Debug, Error)]
pub enum RowError {
    /// Unreadable row, including a field count that differs from the header.
    #[error("row {row}: {source}")]
    Malformed {
        row: u64,
        #[source]
        source: csv::Error,
    },
    #[error("row {row}: no value for field `{field}`")]
    MissingValue { row: u64, field: String },
}
