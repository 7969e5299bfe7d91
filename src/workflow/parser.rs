//! Definition Parser
//!
//! Handles loading workflow definitions from YAML or JSON files.
//! The format is chosen by file extension (`.json` parses as JSON,
//! everything else as YAML), and the parsed definition is validated
//! before it is returned.

use std::fs;
use std::path::Path;

use log::{debug, info};
use thiserror::Error;

use super::definition::WorkflowDefinition;
use super::validator::{validate_definition, ValidationError};

/// Errors raised while loading a definition file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read definition file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse definition YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse definition JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Loads and validates a workflow definition from a file.
///
/// # Arguments
///
/// * `path` - Path to a YAML or JSON definition file
///
/// # Example
///
/// ```rust,no_run
/// use flowrunner::workflow::load_definition;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let definition = load_definition("order-workflow.yaml")?;
///     println!("Loaded '{}' with {} states", definition.id, definition.len());
///     Ok(())
/// }
/// ```
pub fn load_definition(path: impl AsRef<Path>) -> Result<WorkflowDefinition, ParseError> {
    let path = path.as_ref();
    info!("Loading definition from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;

    debug!("Definition content loaded ({} bytes)", content.len());

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let definition: WorkflowDefinition = if is_json {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };

    validate_definition(&definition)?;

    info!(
        "Definition '{}' loaded: {} states, root '{}'",
        definition.id,
        definition.len(),
        definition.root
    );

    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const VALID_YAML: &str = r#"
id: demo
root: DoWork
states:
  DoWork:
    type: Task
    operation: noop
    next: Done
  Done:
    type: Succeed
"#;

    fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let file_path = dir.join(name);
        let mut file = fs::File::create(&file_path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file_path
    }

    #[test]
    fn test_load_yaml_definition() {
        let dir = tempdir().unwrap();
        let file = write_file(dir.path(), "wf.yaml", VALID_YAML);

        let definition = load_definition(&file).unwrap();
        assert_eq!(definition.id, "demo");
        assert_eq!(definition.root, "DoWork");
        assert_eq!(definition.len(), 2);
    }

    #[test]
    fn test_load_json_definition() {
        let json = r#"{
            "id": "demo",
            "root": "Done",
            "states": { "Done": { "type": "Succeed" } }
        }"#;
        let dir = tempdir().unwrap();
        let file = write_file(dir.path(), "wf.json", json);

        let definition = load_definition(&file).unwrap();
        assert_eq!(definition.root, "Done");
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_definition("/nonexistent/wf.yaml");
        assert!(matches!(result, Err(ParseError::Io { .. })));
    }

    #[test]
    fn test_load_malformed_yaml() {
        let dir = tempdir().unwrap();
        let file = write_file(dir.path(), "wf.yaml", "id: [unclosed");

        let result = load_definition(&file);
        assert!(matches!(result, Err(ParseError::Yaml(_))));
    }

    #[test]
    fn test_load_invalid_definition_fails_validation() {
        let yaml = r#"
id: demo
root: Ghost
states:
  Done:
    type: Succeed
"#;
        let dir = tempdir().unwrap();
        let file = write_file(dir.path(), "wf.yaml", yaml);

        let result = load_definition(&file);
        assert!(matches!(result, Err(ParseError::Validation(_))));
    }
}
