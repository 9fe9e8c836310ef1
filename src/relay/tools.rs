//! The `save_value` function the assistant calls when it learns something
//! about the user.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::{
    assistants::Tool,
    chat::{structured_output::FunctionDefinition, ToolCall},
    error::{RelayError, Result},
};

pub const SAVE_VALUE_FUNCTION: &str = "save_value";

/// Save exactly one key value of the user found in the conversation.
#[derive(Debug, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SaveValue {
    /// A key value of the user, such as something they care about or enjoy.
    pub value: String,
}

pub fn save_value_tool() -> Tool {
    Tool::Function {
        function: FunctionDefinition::from_schema::<SaveValue>(SAVE_VALUE_FUNCTION, false),
    }
}

/// Extracts the candidate value from a `save_value` call.
pub fn parse_save_value(call: &ToolCall) -> Result<String> {
    let skipped = |reason: String| RelayError::ValidationSkipped {
        tool_call_id: call.id.clone(),
        reason,
    };
    if call.function.name != SAVE_VALUE_FUNCTION {
        return Err(skipped(format!("unknown function `{}`", call.function.name)));
    }
    let arguments: SaveValue = serde_json::from_str(&call.function.arguments)
        .map_err(|e| skipped(format!("bad arguments: {e}")))?;
    Ok(arguments.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ToolCallFunction, ToolKind};

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            kind: ToolKind::Function,
            function: ToolCallFunction {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }

    #[test]
    fn reads_value_argument() {
        let value = parse_save_value(&call("save_value", r#"{"value":"hiking"}"#)).unwrap();
        assert_eq!(value, "hiking");
    }

    #[test]
    fn rejects_malformed_arguments() {
        for arguments in ["not json", r#"{"other":"x"}"#, r#"{"value":3}"#] {
            let err = parse_save_value(&call("save_value", arguments)).unwrap_err();
            let RelayError::ValidationSkipped { ref tool_call_id, .. } = err else {
                panic!("{arguments} should be skipped, got {err:?}");
            };
            assert_eq!(tool_call_id, "call_1");
        }
    }

    #[test]
    fn rejects_other_functions() {
        let err = parse_save_value(&call("get_weather", r#"{"value":"x"}"#)).unwrap_err();
        assert!(err.to_string().contains("unknown function `get_weather`"));
    }

    #[test]
    fn tool_declares_required_value() {
        let Tool::Function { function } = save_value_tool() else {
            panic!("save_value must be a function tool");
        };
        assert_eq!(function.name, "save_value");
        let parameters = function.parameters.unwrap();
        assert_eq!(parameters["required"], serde_json::json!(["value"]));
        assert_eq!(parameters["properties"]["value"]["type"], "string");
    }
}
