use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use crate::dispatch::DispatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    TestConnection,
    ListApplications,
    ListEvaluations,
    ListCriteria,
    ListQuestions,
}

impl ToolKind {
    /// Registry order; this is also the order `tools/list` reports.
    pub const ALL: [ToolKind; 5] = [
        ToolKind::TestConnection,
        ToolKind::ListApplications,
        ToolKind::ListEvaluations,
        ToolKind::ListCriteria,
        ToolKind::ListQuestions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::TestConnection => "test_connection",
            ToolKind::ListApplications => "get_event_applications",
            ToolKind::ListEvaluations => "get_application_evaluations",
            ToolKind::ListCriteria => "get_event_criteria",
            ToolKind::ListQuestions => "get_event_questions",
        }
    }

    fn descriptor(self) -> ToolDescriptor {
        let (description, params) = match self {
            ToolKind::TestConnection => (
                "Check connectivity to the events API and report the gateway's upstream configuration.",
                Vec::new(),
            ),
            ToolKind::ListApplications => (
                "List all applications submitted to an event.",
                vec![ParamSpec::required_string(
                    PARAM_EVENT_ID,
                    "Identifier (UUID) of the event",
                )],
            ),
            ToolKind::ListEvaluations => (
                "List all evaluations recorded for an application.",
                vec![ParamSpec::required_string(
                    PARAM_APPLICATION_ID,
                    "Identifier (UUID) of the application",
                )],
            ),
            ToolKind::ListCriteria => (
                "List the evaluation criteria configured for an event.",
                vec![ParamSpec::required_string(
                    PARAM_EVENT_ID,
                    "Identifier (UUID) of the event",
                )],
            ),
            ToolKind::ListQuestions => (
                "List the application form questions configured for an event.",
                vec![ParamSpec::required_string(
                    PARAM_EVENT_ID,
                    "Identifier (UUID) of the event",
                )],
            ),
        };
        ToolDescriptor {
            kind: self,
            name: self.name(),
            description,
            params,
        }
    }
}

const PARAM_EVENT_ID: &str = "eventId";
const PARAM_APPLICATION_ID: &str = "applicationId";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub param_type: ParamType,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    fn required_string(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            param_type: ParamType::String,
            required: true,
            description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub kind: ToolKind,
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

impl ToolDescriptor {
    /// JSON Schema for the tool's arguments. Extra properties are allowed.
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|param| {
                (
                    param.name.to_string(),
                    json!({
                        "type": param.param_type.as_str(),
                        "description": param.description,
                    }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|param| param.required)
            .map(|param| param.name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventArgs {
    pub event_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationArgs {
    pub application_id: String,
}

/// A validated invocation. Only the registry constructs these from raw arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    TestConnection,
    ListApplications(EventArgs),
    ListEvaluations(ApplicationArgs),
    ListCriteria(EventArgs),
    ListQuestions(EventArgs),
}

impl ToolCall {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolCall::TestConnection => ToolKind::TestConnection,
            ToolCall::ListApplications(_) => ToolKind::ListApplications,
            ToolCall::ListEvaluations(_) => ToolKind::ListEvaluations,
            ToolCall::ListCriteria(_) => ToolKind::ListCriteria,
            ToolCall::ListQuestions(_) => ToolKind::ListQuestions,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }
}

/// Static tool catalog. Immutable after construction.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ToolRegistry {
    pub fn builtin() -> Self {
        Self {
            tools: ToolKind::ALL.iter().map(|kind| kind.descriptor()).collect(),
        }
    }

    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    /// Discovery payload for `tools/list`.
    pub fn list_payload(&self) -> Value {
        let tools: Vec<Value> = self.tools.iter().map(ToolDescriptor::to_value).collect();
        json!({ "tools": tools })
    }

    /// Validate raw arguments against the named tool's schema and build the typed call.
    pub fn resolve(&self, name: &str, args: &Map<String, Value>) -> Result<ToolCall, DispatchError> {
        let descriptor = self
            .get(name)
            .ok_or_else(|| DispatchError::UnknownTool(name.to_string()))?;
        let mut validated = ValidatedArgs::check(descriptor, args)?;

        Ok(match descriptor.kind {
            ToolKind::TestConnection => ToolCall::TestConnection,
            ToolKind::ListApplications => ToolCall::ListApplications(EventArgs {
                event_id: validated.take(PARAM_EVENT_ID)?,
            }),
            ToolKind::ListEvaluations => ToolCall::ListEvaluations(ApplicationArgs {
                application_id: validated.take(PARAM_APPLICATION_ID)?,
            }),
            ToolKind::ListCriteria => ToolCall::ListCriteria(EventArgs {
                event_id: validated.take(PARAM_EVENT_ID)?,
            }),
            ToolKind::ListQuestions => ToolCall::ListQuestions(EventArgs {
                event_id: validated.take(PARAM_EVENT_ID)?,
            }),
        })
    }
}

struct ValidatedArgs {
    tool: &'static str,
    values: BTreeMap<&'static str, String>,
}

impl ValidatedArgs {
    fn check(descriptor: &ToolDescriptor, args: &Map<String, Value>) -> Result<Self, DispatchError> {
        let mut values = BTreeMap::new();
        for param in &descriptor.params {
            let invalid = |reason: String| DispatchError::InvalidArguments {
                tool: descriptor.name.to_string(),
                field: param.name.to_string(),
                reason,
            };
            match (args.get(param.name), param.param_type) {
                (None | Some(Value::Null), _) if param.required => {
                    return Err(invalid(format!("Missing required field '{}'", param.name)));
                }
                (None | Some(Value::Null), _) => {}
                (Some(Value::String(raw)), ParamType::String) => {
                    let trimmed = raw.trim();
                    if trimmed.is_empty() {
                        if param.required {
                            return Err(invalid(format!("'{}' must not be empty", param.name)));
                        }
                        continue;
                    }
                    values.insert(param.name, trimmed.to_string());
                }
                (Some(_), ParamType::String) => {
                    return Err(invalid(format!("'{}' must be a string", param.name)));
                }
            }
        }
        Ok(Self {
            tool: descriptor.name,
            values,
        })
    }

    fn take(&mut self, name: &'static str) -> Result<String, DispatchError> {
        self.values
            .remove(name)
            .ok_or_else(|| DispatchError::InvalidArguments {
                tool: self.tool.to_string(),
                field: name.to_string(),
                reason: format!("Missing required field '{name}'"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn registry_lists_tools_in_declared_order() {
        let registry = ToolRegistry::builtin();
        let names: Vec<&str> = registry.list().iter().map(|tool| tool.name).collect();
        assert_eq!(
            names,
            vec![
                "test_connection",
                "get_event_applications",
                "get_application_evaluations",
                "get_event_criteria",
                "get_event_questions",
            ]
        );
    }

    #[test]
    fn tool_names_are_unique() {
        let registry = ToolRegistry::builtin();
        let mut names: Vec<&str> = registry.list().iter().map(|tool| tool.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), registry.list().len());
    }

    #[test]
    fn input_schema_marks_required_parameters() {
        let registry = ToolRegistry::builtin();
        let schema = registry
            .get("get_event_applications")
            .expect("tool should be registered")
            .input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["eventId"]["type"], "string");
        assert_eq!(schema["required"], json!(["eventId"]));

        let test_connection = registry.get("test_connection").unwrap().input_schema();
        assert_eq!(test_connection["required"], json!([]));
    }

    #[test]
    fn resolve_builds_typed_calls() {
        let registry = ToolRegistry::builtin();
        assert_eq!(
            registry.resolve("test_connection", &Map::new()).unwrap(),
            ToolCall::TestConnection
        );
        assert_eq!(
            registry
                .resolve(
                    "get_application_evaluations",
                    &args(json!({ "applicationId": " app-7 " }))
                )
                .unwrap(),
            ToolCall::ListEvaluations(ApplicationArgs {
                application_id: "app-7".to_string()
            })
        );
    }

    #[test]
    fn resolve_rejects_unknown_tool() {
        let err = ToolRegistry::builtin()
            .resolve("drop_database", &Map::new())
            .unwrap_err();
        assert_eq!(err, DispatchError::UnknownTool("drop_database".to_string()));
    }

    #[test]
    fn resolve_rejects_missing_empty_and_mistyped_parameters() {
        let registry = ToolRegistry::builtin();
        for bad in [
            json!({}),
            json!({ "eventId": null }),
            json!({ "eventId": "   " }),
            json!({ "eventId": 42 }),
            json!({ "event_id": "11111111-1111-1111-1111-111111111111" }),
        ] {
            let err = registry
                .resolve("get_event_criteria", &args(bad.clone()))
                .expect_err("invalid arguments should be rejected");
            match err {
                DispatchError::InvalidArguments { tool, field, .. } => {
                    assert_eq!(tool, "get_event_criteria");
                    assert_eq!(field, "eventId", "for {bad}");
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn resolve_ignores_unknown_extra_parameters() {
        let call = ToolRegistry::builtin()
            .resolve(
                "get_event_questions",
                &args(json!({ "eventId": "evt-1", "verbose": true })),
            )
            .unwrap();
        assert_eq!(
            call,
            ToolCall::ListQuestions(EventArgs {
                event_id: "evt-1".to_string()
            })
        );
    }
}
