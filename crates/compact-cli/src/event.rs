//! # Validate-Event Subcommand
//!
//! Runs an inbound envelope through the same validation the event listener
//! applies and prints the normalized form.
//!
//! ```bash
//! compact validate-event license-encumbrance.json
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use compact_state::EncumbranceEvent;

/// Arguments for `validate-event`.
#[derive(Args, Debug)]
pub struct ValidateEventArgs {
    /// Path to a JSON envelope.
    pub path: PathBuf,
}

/// Execute `validate-event`. Exit code 1 when the envelope is rejected.
pub fn run_validate_event(args: &ValidateEventArgs) -> Result<u8> {
    let text = read(&args.path)?;
    match EncumbranceEvent::from_json(&text) {
        Ok(event) => {
            println!("{}", serde_json::to_string_pretty(&event.to_value())?);
            Ok(0)
        }
        Err(e) => {
            eprintln!("{}: {e}", args.path.display());
            Ok(1)
        }
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn envelope_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn accepts_valid_envelope() {
        let file = envelope_file(
            r#"{
                "compact": "aslp",
                "providerId": "0a8f9e7c-8d0b-4bb4-8f43-5d0f6a3fb0a1",
                "jurisdiction": "oh",
                "licenseTypeAbbreviation": "aud",
                "adverseActionId": "98fec590-4a3a-4a0c-9a3f-2d4bd7b29d54",
                "effectiveDate": "2024-03-15",
                "eventTime": "2024-03-15T10:00:00Z"
            }"#,
        );
        let code = run_validate_event(&ValidateEventArgs {
            path: file.path().to_path_buf(),
        })
        .unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn rejects_missing_field() {
        let file = envelope_file(r#"{"compact": "aslp", "jurisdiction": "oh"}"#);
        let code = run_validate_event(&ValidateEventArgs {
            path: file.path().to_path_buf(),
        })
        .unwrap();
        assert_eq!(code, 1);
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = run_validate_event(&ValidateEventArgs {
            path: PathBuf::from("/nonexistent/event.json"),
        });
        assert!(result.is_err());
    }
}
