//! Argument validation against a tool's declared JSON schema.
//!
//! Covers the subset the task tools declare: an object at the top level,
//! `required` properties, primitive `type`s (single or a list), `items` of
//! arrays and string `enum`s. Anything else in the schema is ignored.

use serde_json::Value;

/// Check `args` against `schema`, returning a human-readable detail on failure.
pub fn validate(schema: &Value, args: &Value) -> Result<(), String> {
    if let Some(expected) = schema.get("type") {
        check_type(expected, args, "arguments")?;
    }

    let Some(object) = args.as_object() else {
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            match object.get(name) {
                None | Some(Value::Null) => {
                    return Err(format!("missing required field `{name}`"));
                }
                Some(_) => {}
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (name, value) in object {
        // optional fields sent as null are treated as absent
        if value.is_null() {
            continue;
        }
        if let Some(property) = properties.get(name) {
            check_property(property, value, name)?;
        }
    }
    Ok(())
}

fn check_property(property: &Value, value: &Value, path: &str) -> Result<(), String> {
    if let Some(expected) = property.get("type") {
        check_type(expected, value, path)?;
    }

    if let Some(allowed) = property.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let options: Vec<String> = allowed
                .iter()
                .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                .collect();
            return Err(format!("field `{path}` must be one of {}", options.join(", ")));
        }
    }

    if let (Some(items), Some(elements)) = (property.get("items"), value.as_array()) {
        for (i, element) in elements.iter().enumerate() {
            check_property(items, element, &format!("{path}[{i}]"))?;
        }
    }
    Ok(())
}

fn check_type(expected: &Value, value: &Value, path: &str) -> Result<(), String> {
    let accepted: Vec<&str> = match expected {
        Value::String(t) => vec![t.as_str()],
        Value::Array(types) => types.iter().filter_map(Value::as_str).collect(),
        _ => return Ok(()),
    };

    if accepted.iter().any(|t| matches_type(t, value)) {
        Ok(())
    } else {
        Err(format!(
            "field `{path}` should be {}, got {}",
            accepted.join(" or "),
            type_name(value)
        ))
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // unknown type keywords are not enforced
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
