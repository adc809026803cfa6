// src/validate.rs
use crate::error::ConfigError;
use std::collections::HashSet;

/// Template fields that no header column provides, in template order.
pub fn missing_fields(template_fields: &[String], headers: &[String]) -> Vec<String> {
    let header_set: HashSet<&str> = headers.iter().map(String::as_str).collect();
    template_fields
        .iter()
        .filter(|f| !header_set.contains(f.as_str()))
        .cloned()
        .collect()
}

pub fn check_name_column(headers: &[String], name: &str) -> Result<(), ConfigError> {
    if headers.iter().any(|h| h == name) {
        Ok(())
    } else {
        Err(ConfigError::NameColumnMissing {
            column: name.to_string(),
            available: headers.to_vec(),
        })
    }
}

pub fn check_fields(template_fields: &[String], headers: &[String]) -> Result<(), ConfigError> {
    let missing = missing_fields(template_fields, headers);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::FieldsMissing { missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reports_fields_missing_from_header() {
        let fields = strings(&["first_name", "date"]);
        let headers = strings(&["first_name", "email"]);
        assert_eq!(missing_fields(&fields, &headers), vec!["date"]);
        assert_eq!(
            check_fields(&fields, &headers),
            Err(ConfigError::FieldsMissing {
                missing: strings(&["date"])
            })
        );
    }

    #[test]
    fn subset_passes() {
        let fields = strings(&["email"]);
        let headers = strings(&["first_name", "email", "extra"]);
        assert!(check_fields(&fields, &headers).is_ok());
        assert!(check_fields(&[], &headers).is_ok());
    }

    #[test]
    fn name_column_must_exist() {
        let headers = strings(&["first_name", "email"]);
        assert!(check_name_column(&headers, "first_name").is_ok());

        let err = check_name_column(&headers, "full_name").unwrap_err();
        assert_eq!(
            err,
            ConfigError::NameColumnMissing {
                column: "full_name".into(),
                available: headers.clone()
            }
        );
        assert!(err.to_string().contains("full_name"));
    }

    #[test]
    fn name_column_is_case_sensitive() {
        let headers = strings(&["Name"]);
        assert!(check_name_column(&headers, "name").is_err());
        assert!(check_name_column(&[], "name").is_err());
    }
}
