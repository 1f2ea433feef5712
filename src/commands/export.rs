//! Export command
//!
//! Converts a saved message body (a plain text file) into a markdown or
//! HTML document using the export collaborator.

use std::path::Path;

use crate::error::{PrdgenError, Result};
use crate::export::{export_html, export_markdown};
use crate::session::{ChatMessage, Role};

/// Run the export command.
///
/// # Arguments
///
/// * `input` - File holding the message content
/// * `output` - Destination file
/// * `title` - Document title (defaults to "PRD Document")
/// * `format` - "markdown" (or "md") or "html"
///
/// # Errors
///
/// Returns error if the input cannot be read, the format is unknown, or
/// the export collaborator reports failure.
pub fn run_export(
    input: &Path,
    output: &Path,
    title: Option<String>,
    format: &str,
) -> Result<()> {
    let content = std::fs::read_to_string(input)
        .map_err(|e| PrdgenError::Config(format!("Failed to read {}: {}", input.display(), e)))?;

    let message = ChatMessage::new(Role::Assistant, content);
    let title = title.unwrap_or_else(|| "PRD Document".to_string());

    let ok = match format {
        "markdown" | "md" => export_markdown(&message, &title, output),
        "html" => export_html(&message, &title, output),
        other => {
            return Err(PrdgenError::Config(format!(
                "Unknown export format: {} (expected markdown or html)",
                other
            ))
            .into())
        }
    };

    if !ok {
        anyhow::bail!("Export to {} failed", output.display());
    }

    println!("Exported to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_markdown_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.md");
        std::fs::write(&input, "## Section\nbody").unwrap();

        run_export(&input, &output, Some("T".to_string()), "markdown").unwrap();
        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.starts_with("# T"));
    }

    #[test]
    fn test_export_html_format() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.html");
        std::fs::write(&input, "content").unwrap();

        run_export(&input, &output, None, "html").unwrap();
        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.contains("<title>PRD Document</title>"));
    }

    #[test]
    fn test_unknown_format_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        std::fs::write(&input, "x").unwrap();

        let result = run_export(&input, &dir.path().join("out.pdf"), None, "pdf");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_input_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_export(
            &dir.path().join("missing.txt"),
            &dir.path().join("out.md"),
            None,
            "markdown",
        );
        assert!(result.is_err());
    }
}
