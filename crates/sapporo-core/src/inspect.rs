//! Workflow content inspection
//!
//! Detects the workflow language of a document, extracts its input
//! parameters, and builds a parameters template from them. Only CWL is
//! understood; other documents inspect to an empty type and no parameters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::CoreError;

/// Language name used for CWL documents
pub const CWL: &str = "CWL";

/// Type and version detected from workflow content
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowTypeVersion {
    #[serde(rename = "type")]
    pub type_name: String,
    pub version: String,
}

impl WorkflowTypeVersion {
    pub fn is_known(&self) -> bool {
        !self.type_name.is_empty()
    }
}

/// One input of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub default: Option<Value>,
    pub required: bool,
    pub array: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbols: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_files: Option<Value>,
}

/// Parse workflow content as JSON, falling back to YAML
pub fn parse_content(content: &str) -> Result<Value, CoreError> {
    if let Ok(value) = serde_json::from_str::<Value>(content) {
        return Ok(value);
    }
    match serde_yaml::from_str::<Value>(content) {
        Ok(value) if value.is_object() => Ok(value),
        _ => Err(CoreError::WorkflowParseError(
            "the input string is neither json nor yaml".to_string(),
        )),
    }
}

/// Detect the workflow language of `content`
pub fn inspect_workflow(content: &str) -> Result<WorkflowTypeVersion, CoreError> {
    Ok(inspect_value(&parse_content(content)?))
}

fn inspect_value(document: &Value) -> WorkflowTypeVersion {
    match document.get("cwlVersion") {
        Some(version) => WorkflowTypeVersion {
            type_name: CWL.to_string(),
            version: match version {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        },
        None => WorkflowTypeVersion::default(),
    }
}

/// Extract the input parameters declared by `content`
pub fn extract_parameters(content: &str) -> Result<Vec<WorkflowParameter>, CoreError> {
    let document = parse_content(content)?;
    if inspect_value(&document).type_name != CWL {
        return Ok(Vec::new());
    }

    let params = match document.get("inputs") {
        Some(Value::Array(inputs)) => inputs
            .iter()
            .map(|input| {
                let id = input.get("id").and_then(Value::as_str).unwrap_or_default();
                cwl_input_to_param(id.trim_start_matches('#'), input)
            })
            .collect(),
        Some(Value::Object(inputs)) => inputs
            .iter()
            .map(|(id, input)| cwl_input_to_param(id, input))
            .collect(),
        _ => Vec::new(),
    };
    Ok(params)
}

fn cwl_input_to_param(id: &str, input: &Value) -> WorkflowParameter {
    // `inputs: {reads: File?}` is shorthand for `{reads: {type: File?}}`
    let declared = match input {
        Value::String(_) | Value::Array(_) => input,
        other => other.get("type").unwrap_or(&Value::Null),
    };
    let (type_name, required, array) = cwl_type(declared);

    WorkflowParameter {
        name: id.to_string(),
        type_name,
        default: input.get("default").cloned(),
        required,
        array,
        symbols: input.get("symbols").cloned(),
        secondary_files: input.get("secondaryFiles").cloned(),
    }
}

/// Returns `(base type, required, array)`
fn cwl_type(declared: &Value) -> (String, bool, bool) {
    match declared {
        Value::String(raw) => {
            let mut type_name = raw.as_str();
            let mut required = true;
            let mut array = false;
            if let Some(stripped) = type_name.strip_suffix('?') {
                type_name = stripped;
                required = false;
            }
            if let Some(stripped) = type_name.strip_suffix("[]") {
                type_name = stripped;
                array = true;
            }
            (type_name.to_string(), required, array)
        }
        // ["null", "File"] is the long form of "File?"
        Value::Array(variants) => {
            let nullable = variants.iter().any(|v| v.as_str() == Some("null"));
            let inner = variants
                .iter()
                .find(|v| v.as_str() != Some("null"))
                .unwrap_or(&Value::Null);
            let (type_name, required, array) = cwl_type(inner);
            (type_name, required && !nullable, array)
        }
        Value::Object(schema) if schema.get("type").and_then(Value::as_str) == Some("array") => {
            let (type_name, _, _) = cwl_type(schema.get("items").unwrap_or(&Value::Null));
            (type_name, true, true)
        }
        Value::Object(schema) => {
            let type_name = schema.get("type").and_then(Value::as_str).unwrap_or_default();
            (type_name.to_string(), true, false)
        }
        _ => (String::new(), true, false),
    }
}

/// Build a parameters template from extracted parameters.
///
/// `File` and `Directory` inputs become CWL location objects, everything
/// else maps to its default value (or null).
pub fn generate_parameters_template(params: &[WorkflowParameter]) -> Value {
    let mut template = Map::new();
    for param in params {
        let value = match param.type_name.to_ascii_lowercase().as_str() {
            "file" | "directory" if !param.array => {
                let class = if param.type_name.eq_ignore_ascii_case("file") {
                    "File"
                } else {
                    "Directory"
                };
                let location = match &param.default {
                    Some(Value::Object(obj)) => obj
                        .get("location")
                        .or_else(|| obj.get("path"))
                        .cloned()
                        .unwrap_or(Value::Null),
                    Some(Value::String(s)) => Value::String(s.clone()),
                    _ => Value::Null,
                };
                serde_json::json!({ "class": class, "location": location })
            }
            _ => param.default.clone().unwrap_or(Value::Null),
        };
        template.insert(param.name.clone(), value);
    }
    Value::Object(template)
}

/// Inspect `content` and render a pretty-printed parameters template
pub fn parameters_template_for(content: &str) -> Result<String, CoreError> {
    let params = extract_parameters(content)?;
    Ok(serde_json::to_string_pretty(&generate_parameters_template(&params))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const CWL_LIST_INPUTS: &str = r#"
cwlVersion: v1.0
class: Workflow
inputs:
  - id: fastq_1
    type: File
    secondaryFiles: [.fai]
  - id: nthreads
    type: int?
    default: 2
  - id: samples
    type: string[]
  - id: mode
    type:
      type: enum
      symbols: [fast, slow]
    symbols: [fast, slow]
"#;

    #[test]
    fn detects_cwl_from_yaml() {
        let detected = inspect_workflow(CWL_LIST_INPUTS).unwrap();
        assert_eq!(detected.type_name, "CWL");
        assert_eq!(detected.version, "v1.0");
        assert!(detected.is_known());
    }

    #[test]
    fn detects_cwl_from_json() {
        let detected = inspect_workflow(r#"{"cwlVersion": "v1.2", "inputs": {}}"#).unwrap();
        assert_eq!(detected.version, "v1.2");
    }

    #[test]
    fn unknown_language_is_empty() {
        let detected = inspect_workflow("version: 1.0\nworkflow: x").unwrap();
        assert_eq!(detected, WorkflowTypeVersion::default());
        assert!(extract_parameters("version: 1.0").unwrap().is_empty());
    }

    #[test]
    fn rejects_unparseable_content() {
        assert!(matches!(
            inspect_workflow("just words"),
            Err(CoreError::WorkflowParseError(_))
        ));
    }

    #[test]
    fn extracts_list_inputs() {
        let params = extract_parameters(CWL_LIST_INPUTS).unwrap();
        assert_eq!(params.len(), 4);

        assert_eq!(params[0].name, "fastq_1");
        assert_eq!(params[0].type_name, "File");
        assert!(params[0].required);
        assert_eq!(params[0].secondary_files, Some(json!([".fai"])));

        assert_eq!(params[1].type_name, "int");
        assert!(!params[1].required);
        assert_eq!(params[1].default, Some(json!(2)));

        assert_eq!(params[2].type_name, "string");
        assert!(params[2].array);

        assert_eq!(params[3].type_name, "enum");
        assert_eq!(params[3].symbols, Some(json!(["fast", "slow"])));
    }

    #[test]
    fn extracts_map_inputs() {
        let content = r#"{
            "cwlVersion": "v1.0",
            "inputs": {
                "reads": {"type": "File?"},
                "ref": "File",
                "labels": {"type": ["null", {"type": "array", "items": "string"}]}
            }
        }"#;
        let params = extract_parameters(content).unwrap();
        let by_name = |n: &str| params.iter().find(|p| p.name == n).unwrap().clone();

        assert!(!by_name("reads").required);
        assert_eq!(by_name("ref").type_name, "File");
        let labels = by_name("labels");
        assert_eq!(labels.type_name, "string");
        assert!(labels.array);
        assert!(!labels.required);
    }

    #[test]
    fn template_uses_location_objects_for_files() {
        let params = extract_parameters(CWL_LIST_INPUTS).unwrap();
        let template = generate_parameters_template(&params);
        assert_eq!(
            template,
            json!({
                "fastq_1": {"class": "File", "location": null},
                "nthreads": 2,
                "samples": null,
                "mode": null,
            })
        );
    }

    #[test]
    fn template_for_content_is_pretty_json() {
        let rendered = parameters_template_for(CWL_LIST_INPUTS).unwrap();
        let parsed: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["nthreads"], json!(2));
    }
}
