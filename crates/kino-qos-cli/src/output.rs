//! Output formatting for CLI

use serde::Serialize;

/// Output format options
pub enum OutputFormat {
    Text,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

/// Print `data` as pretty JSON
pub fn print_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// Print a `key: value` line with aligned keys
pub fn field(key: &str, value: impl std::fmt::Display) {
    println!("  {:<34} {}", format!("{key}:"), value);
}

/// Print a section heading
pub fn heading(title: &str) {
    println!("\n{title}");
}
