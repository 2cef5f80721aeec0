use serde_json::Value;
use std::io::{self, Read};

/// Read piped JSON (or YAML) from stdin. `None` when stdin is a terminal or empty.
pub fn read_stdin() -> Result<Option<Value>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    parse_piped(&buffer)
}

fn parse_piped(buffer: &str) -> Result<Option<Value>, Box<dyn std::error::Error>> {
    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(Some(value)),
        Err(json_err) => serde_yaml::from_str(trimmed)
            .map(Some)
            .map_err(|_| format!("stdin is neither JSON nor YAML: {json_err}").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_and_yaml() {
        let json = parse_piped(r#"{"revenue": "1000000"}"#).unwrap().unwrap();
        assert_eq!(json["revenue"], "1000000");
        let yaml = parse_piped("revenue: '1000000'\nlocations: 2\n").unwrap().unwrap();
        assert_eq!(yaml["locations"], 2);
        assert!(parse_piped("   \n").unwrap().is_none());
    }
}
