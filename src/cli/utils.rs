use serde::Serialize;
use serde_json::json;

use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let response = json!({
                "success": true,
                "message": message
            });
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output a single record, as JSON or as `key: value` lines
pub fn output_item<T: Serialize>(output_format: &OutputFormat, item: &T) -> anyhow::Result<()> {
    let value = serde_json::to_value(item)?;

    match output_format {
        OutputFormat::Json => {
            let response = json!({ "success": true, "data": value });
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            if let Some(fields) = value.as_object() {
                for (key, field) in fields {
                    match field {
                        serde_json::Value::String(s) => println!("{}: {}", key, s),
                        serde_json::Value::Null => println!("{}: -", key),
                        other => println!("{}: {}", key, other),
                    }
                }
            }
        }
    }
    Ok(())
}
