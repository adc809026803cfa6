//! Fill a `.docx` template's merge fields from the rows of a delimited file,
//! writing one document per row.

pub mod convert;
pub mod data;
pub mod error;
pub mod output;
pub mod template;
pub mod validate;

pub use convert::{convert, ConvertOptions, ConvertSummary};
pub use error::{ConfigError, RowError, TemplateError};
