//! Output helpers shared by the CLI commands
//!
//! [`OutputFormat`] selects how results are printed; [`render_rows`] turns a
//! list of serializable rows into the selected format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default maximum length for AS names in tables
pub const DEFAULT_NAME_MAX_LEN: usize = 32;

/// Output format for asnmap commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Pretty table with borders (default)
    #[default]
    Table,
    /// Compact JSON on one line
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// Pipe-separated values with header
    Psv,
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json | Self::JsonPretty)
    }

    pub fn all_names() -> &'static [&'static str] {
        &["table", "json", "json-pretty", "psv"]
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::JsonPretty => write!(f, "json-pretty"),
            Self::Psv => write!(f, "psv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "pretty" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "json-pretty" | "jsonpretty" => Ok(Self::JsonPretty),
            "psv" | "pipe" => Ok(Self::Psv),
            _ => Err(format!(
                "Unknown output format '{}'. Valid formats: {}",
                s,
                Self::all_names().join(", ")
            )),
        }
    }
}

/// Truncate a string to `max_len` characters, ending in "..." if cut
pub fn truncate_name(name: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        name.to_string()
    } else {
        let truncated: String = name.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Render a JSON value in one of the JSON formats
pub fn render_json<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> String {
    let rendered = match format {
        OutputFormat::JsonPretty => serde_json::to_string_pretty(value),
        _ => serde_json::to_string(value),
    };
    rendered.unwrap_or_else(|e| format!(r#"{{"error":"{}"}}"#, e))
}

/// Render rows as pipe-separated values, using the serialized field names as header
///
/// Columns follow field declaration order.
pub fn render_psv<T: Serialize>(rows: &[T]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    for (idx, row) in rows.iter().enumerate() {
        let Ok(serde_json::Value::Object(map)) = serde_json::to_value(row) else {
            continue;
        };
        if idx == 0 {
            lines.push(map.keys().cloned().collect::<Vec<_>>().join("|"));
        }
        let values: Vec<String> = map
            .values()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        lines.push(values.join("|"));
    }
    lines.join("\n")
}

/// Render rows in any format; tables use `tabled`
#[cfg(feature = "display")]
pub fn render_rows<T: Serialize + tabled::Tabled>(rows: &[T], format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => tabled::Table::new(rows)
            .with(tabled::settings::Style::rounded())
            .to_string(),
        OutputFormat::Psv => render_psv(rows),
        OutputFormat::Json | OutputFormat::JsonPretty => render_json(rows, format),
    }
}
