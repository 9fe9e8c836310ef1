use std::mem::take;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-schema constrained response format for chat completions.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ResponseFormatJsonSchema {
    /// Must be a-z, A-Z, 0-9, or contain underscores and dashes, with a maximum length of 64.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// When true the model always follows the exact schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

impl ResponseFormatJsonSchema {
    pub fn new<T: JsonSchema>(strict: bool) -> Self {
        let (schema, description) = generate_json_schema::<T>();
        ResponseFormatJsonSchema {
            name: T::schema_name(),
            description,
            schema: Some(schema),
            strict: Some(strict),
        }
    }
}

/// A callable function declared to the model, either on an assistant or in a
/// single chat completion request.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Parameters as a JSON Schema object. Omitting it declares an empty parameter list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

impl FunctionDefinition {
    /// Declares a function named `name` whose arguments have the shape of `T`.
    ///
    /// The description is taken from the doc comment on `T`.
    pub fn from_schema<T: JsonSchema>(name: impl Into<String>, strict: bool) -> Self {
        let (schema, description) = generate_json_schema::<T>();
        FunctionDefinition {
            name: name.into(),
            description,
            parameters: Some(schema),
            strict: Some(strict),
        }
    }
}

// Strict mode wants every property required, no additional properties, and
// `anyOf` instead of `oneOf`. Validation keywords it rejects are dropped.
fn strict_post_process(schema: &mut Value) {
    let obj = match schema {
        Value::Object(obj) => obj,
        _ => return,
    };
    if let Some(v) = obj.remove("oneOf") {
        obj.insert("anyOf".to_string(), v);
    }
    if let Some(Value::Array(variants)) = obj.get_mut("anyOf") {
        variants.iter_mut().for_each(strict_post_process);
    }
    let ty = match obj.get("type") {
        Some(Value::String(s)) => s.clone(),
        _ => return,
    };
    match ty.as_str() {
        "array" => {
            if let Some(items) = obj.get_mut("items") {
                strict_post_process(items);
            }
        }
        "object" => {
            let Some(Value::Object(properties)) = obj.get_mut("properties") else {
                return;
            };
            let mut required = Vec::with_capacity(properties.len());
            for (name, property) in properties.iter_mut() {
                strict_post_process(property);
                required.push(Value::String(name.clone()));
            }
            obj.insert("required".to_string(), Value::Array(required));
            obj.entry("additionalProperties")
                .or_insert(Value::Bool(false));
        }
        "string" => retain_keys(obj, &["type", "enum", "description"]),
        "number" | "integer" | "boolean" => retain_keys(obj, &["type", "description"]),
        _ => {}
    }
}

fn retain_keys(obj: &mut serde_json::Map<String, Value>, keys: &[&str]) {
    *obj = take(obj)
        .into_iter()
        .filter(|(k, _)| keys.contains(&k.as_str()))
        .collect();
}

/// Generates an inlined JSON schema for `T` suitable for strict structured
/// output, along with the type's doc comment as description.
pub fn generate_json_schema<T: JsonSchema>() -> (Value, Option<String>) {
    let mut settings = schemars::r#gen::SchemaSettings::default();
    settings.option_nullable = false;
    settings.option_add_null_type = true;
    settings.inline_subschemas = true;
    let mut generator = schemars::r#gen::SchemaGenerator::new(settings);
    let mut schema = T::json_schema(&mut generator).into_object();
    let description = schema.metadata().description.clone();
    schema.metadata().description = None;
    let mut schema = match serde_json::to_value(schema) {
        Ok(schema) => schema,
        Err(_) => Value::Object(Default::default()),
    };
    strict_post_process(&mut schema);
    (schema, description)
}
