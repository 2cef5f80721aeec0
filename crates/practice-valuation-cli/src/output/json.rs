use serde_json::Value;

/// Pretty-print JSON to stdout. Decimals stay as strings, so no precision is lost.
pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => tracing::error!(error = %e, "JSON serialization failed"),
    }
}
