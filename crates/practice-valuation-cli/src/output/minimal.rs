use serde_json::Value;

/// Headline figures in priority order, searched one level deep.
const PRIORITY_KEYS: [&str; 9] = [
    "final_enterprise_value",
    "blended_enterprise_value",
    "adjusted_value",
    "enterprise_value",
    "run_rate_uplift",
    "mean",
    "score",
    "wacc",
    "equity_value",
];

/// Print just the key answer value from the output.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Some(val) = find_headline(result_obj) {
        println!("{}", format_minimal(val));
        return;
    }

    if let Value::Object(map) = result_obj {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn find_headline(obj: &Value) -> Option<&Value> {
    let map = obj.as_object()?;
    for key in PRIORITY_KEYS {
        if let Some(val) = map.get(key).filter(|v| !v.is_null() && !v.is_object()) {
            return Some(val);
        }
    }
    // Simulation results keep the mean inside a statistics object.
    map.get("enterprise_stats").and_then(|s| s.get("mean"))
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
