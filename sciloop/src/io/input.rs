//! Detection input loading with schema validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde_json::Value;

use crate::core::signals::ProblemDetectionInput;

pub const DETECTION_INPUT_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/detection_input/v1.schema.json"
));

/// Load and validate detection input from disk.
pub fn load_detection_input(path: &Path) -> Result<ProblemDetectionInput> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read input {}", path.display()))?;
    parse_detection_input(&contents).with_context(|| format!("load input {}", path.display()))
}

/// Parse detection input JSON, validating against the embedded schema first.
pub fn parse_detection_input(raw: &str) -> Result<ProblemDetectionInput> {
    let value: Value = serde_json::from_str(raw).context("parse input json")?;
    validate_schema(&value)?;
    let input: ProblemDetectionInput =
        serde_json::from_value(value).context("deserialize detection input")?;
    Ok(input)
}

/// Validate JSON instance against the detection input schema (Draft 2020-12).
fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(DETECTION_INPUT_SCHEMA).context("parse detection input schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile json schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}
