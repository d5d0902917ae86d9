use serde_json::{json, Value};
use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(
    output_format: &OutputFormat,
    message: &str,
    data: Option<Value>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let Some(data_value) = data {
                response["data"] = data_value;
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(
    output_format: &OutputFormat,
    message: &str,
    error_code: Option<&str>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": false,
                "error": message
            });

            if let Some(code) = error_code {
                response["error_code"] = json!(code);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}

/// A command that failed after its outcome was already shown to the user
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CommandFailed {
    pub message: String,
    /// The JSON error document was printed; the binary only sets the exit code
    pub reported: bool,
}

/// Report a failed command; JSON mode prints the error document first
pub fn fail(output_format: &OutputFormat, message: &str, error_code: &str) -> anyhow::Result<()> {
    let reported = match output_format {
        OutputFormat::Json => {
            output_error(output_format, message, Some(error_code))?;
            true
        }
        OutputFormat::Text => false,
    };
    Err(CommandFailed {
        message: message.to_string(),
        reported,
    }
    .into())
}

/// Output a list of rows; text mode prints one summary line per row
pub fn output_rows(
    output_format: &OutputFormat,
    collection_name: &str,
    rows: &[Value],
    summary: impl Fn(&Value) -> String,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({
                collection_name: rows
            }))?);
        }
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("No {} found", collection_name.replace('_', " "));
            }
            for row in rows {
                println!("{}", summary(row));
            }
        }
    }
    Ok(())
}

/// Output a single record as key/value lines or JSON
pub fn output_record(output_format: &OutputFormat, record: &Value) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(record)?),
        OutputFormat::Text => {
            if let Some(fields) = record.as_object() {
                for (key, value) in fields {
                    match value {
                        Value::String(s) => println!("{}: {}", key, s),
                        other => println!("{}: {}", key, other),
                    }
                }
            }
        }
    }
    Ok(())
}

/// Parse `key=value` pairs; values that parse as JSON keep their type
pub fn parse_assignments(pairs: &[String]) -> anyhow::Result<serde_json::Map<String, Value>> {
    let mut fields = serde_json::Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Expected key=value, got '{}'", pair))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("Empty field name in '{}'", pair);
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        fields.insert(key.to_string(), value);
    }
    Ok(fields)
}

/// Read a value from the flag or prompt for it on the terminal
pub fn value_or_prompt(value: Option<String>, prompt: &str) -> anyhow::Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }

    use std::io::Write;
    print!("{}: ", prompt);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
