// src/data.rs
use crate::error::{ConfigError, RowError};
use anyhow::{Context, Result};
use csv::{Reader, ReaderBuilder};
use std::{collections::BTreeMap, fs::File, path::Path, sync::Arc};
use tracing::debug;

/// Field name → value, restricted to the fields a template asks for.
pub type Payload = BTreeMap<String, String>;

/// A delimited data file whose header row has already been read.
pub struct DataSource {
    headers: Arc<[String]>,
    reader: Reader<File>,
}

/// One data row, keyed by the header of the file it came from.
#[derive(Debug, Clone)]
pub struct Record {
    /// 1-based data row number (the header is row 0).
    pub row: u64,
    headers: Arc<[String]>,
    values: Vec<String>,
}

impl DataSource {
    /// Open `path` and read its first line as the header.
    ///
    /// The reader is strict: a row whose field count differs from the header
    /// is reported as [`RowError::Malformed`] when it is reached.
    pub fn open<P: AsRef<Path>>(path: P, delimiter: char) -> Result<Self> {
        let path = path.as_ref();
        if !delimiter.is_ascii() {
            return Err(ConfigError::InvalidDelimiter(delimiter).into());
        }

        let file =
            File::open(path).with_context(|| format!("Failed to open data file {:?}", path))?;
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter as u8)
            .has_headers(true)
            .flexible(false)
            .from_reader(file);

        let headers: Arc<[String]> = reader
            .headers()
            .with_context(|| format!("Failed to read header of {:?}", path))?
            .iter()
            .map(str::to_string)
            .collect();
        debug!(path = %path.display(), columns = headers.len(), "read data header");

        Ok(Self { headers, reader })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Lazily parse the remaining rows, in file order.
    pub fn records(self) -> impl Iterator<Item = Result<Record, RowError>> {
        let headers = self.headers;
        self.reader
            .into_records()
            .zip(1u64..)
            .map(move |(result, row)| match result {
                Ok(rec) => Ok(Record {
                    row,
                    headers: Arc::clone(&headers),
                    values: rec.iter().map(str::to_string).collect(),
                }),
                Err(source) => Err(RowError::Malformed { row, source }),
            })
    }
}

impl Record {
    /// Value of the first column named `column`, if the row has one.
    pub fn get(&self, column: &str) -> Option<&str> {
        let idx = self.headers.iter().position(|h| h == column)?;
        self.values.get(idx).map(String::as_str)
    }

    /// Build the merge payload for exactly `fields`.
    pub fn payload(&self, fields: &[String]) -> Result<Payload, RowError> {
        fields
            .iter()
            .map(|field| {
                self.get(field)
                    .map(|v| (field.clone(), v.to_string()))
                    .ok_or_else(|| RowError::MissingValue {
                        row: self.row,
                        field: field.clone(),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn data_file(content: &str) -> Result<NamedTempFile> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(content.as_bytes())?;
        Ok(tmp)
    }

    #[test]
    fn reads_header_and_rows_in_order() -> Result<()> {
        let tmp = data_file("first_name;amount\nAlice;10\nBob;20\n")?;
        let source = DataSource::open(tmp.path(), ';')?;
        assert_eq!(source.headers(), ["first_name", "amount"]);

        let rows: Vec<Record> = source.records().collect::<Result<_, _>>()?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row, 1);
        assert_eq!(rows[0].get("first_name"), Some("Alice"));
        assert_eq!(rows[1].get("amount"), Some("20"));
        assert_eq!(rows[1].get("email"), None);
        Ok(())
    }

    #[test]
    fn honours_custom_delimiter_and_quoting() -> Result<()> {
        let tmp = data_file("name,note\n\"Smith, Jane\",\"line one\nline two\"\n")?;
        let source = DataSource::open(tmp.path(), ',')?;
        let rows: Vec<Record> = source.records().collect::<Result<_, _>>()?;
        assert_eq!(rows[0].get("name"), Some("Smith, Jane"));
        assert_eq!(rows[0].get("note"), Some("line one\nline two"));
        Ok(())
    }

    #[test]
    fn ragged_row_is_an_error() -> Result<()> {
        let tmp = data_file("a;b\n1;2\n3\n4;5\n")?;
        let mut rows = DataSource::open(tmp.path(), ';')?.records();
        assert!(rows.next().unwrap().is_ok());
        match rows.next().unwrap() {
            Err(RowError::Malformed { row, .. }) => assert_eq!(row, 2),
            other => panic!("expected malformed row, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn empty_file_has_no_headers() -> Result<()> {
        let tmp = data_file("")?;
        let source = DataSource::open(tmp.path(), ';')?;
        assert!(source.headers().is_empty());
        assert_eq!(source.records().count(), 0);
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(DataSource::open("does/not/exist.csv", ';').is_err());
    }

    #[test]
    fn non_ascii_delimiter_is_rejected() -> Result<()> {
        let tmp = data_file("a;b\n")?;
        let err = DataSource::open(tmp.path(), '§').err().unwrap();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::InvalidDelimiter('§'))
        );
        Ok(())
    }

    #[test]
    fn payload_is_restricted_to_fields() -> Result<()> {
        let tmp = data_file("first_name;email;amount\nAlice;a@x.org;10\n")?;
        let source = DataSource::open(tmp.path(), ';')?;
        let row = source.records().next().unwrap()?;

        let fields = vec!["amount".to_string(), "first_name".to_string()];
        let payload = row.payload(&fields)?;
        assert_eq!(payload.len(), 2);
        assert_eq!(payload["amount"], "10");
        assert_eq!(payload["first_name"], "Alice");

        let err = row.payload(&["date".to_string()]).unwrap_err();
        assert!(matches!(err, RowError::MissingValue { row: 1, ref field } if field == "date"));
        Ok(())
    }
}
