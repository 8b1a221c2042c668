//! Rendering of tool results into conversation text.
//!
//! Results are written as single-line JSON with `", "` and `": "`
//! separators, e.g. `{"files": ["a.txt"]}`.

use std::io;

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::Formatter;

/// Compact formatter with a space after each separator.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Serialize any value with spaced separators.
pub fn to_spaced_json<T: Serialize + ?Sized>(value: &T) -> String {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    if value.serialize(&mut ser).is_err() {
        return serde_json::to_string(value).unwrap_or_default();
    }
    String::from_utf8(out).unwrap_or_default()
}

/// Render a tool result for the conversation history.
///
/// Objects and arrays become spaced JSON; a bare string is used verbatim;
/// other scalars use their JSON text.
pub fn format_tool_result(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => to_spaced_json(result),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn objects_use_spaced_separators() {
        assert_eq!(
            format_tool_result(&json!({"files": ["a.txt", "b.txt"]})),
            r#"{"files": ["a.txt", "b.txt"]}"#
        );
        assert_eq!(
            format_tool_result(&json!({"a": {"b": 1}, "c": []})),
            r#"{"a": {"b": 1}, "c": []}"#
        );
    }

    #[test]
    fn strings_in_values_are_escaped() {
        assert_eq!(
            format_tool_result(&json!({"stdout": "line\n\"q\""})),
            r#"{"stdout": "line\n\"q\""}"#
        );
    }

    #[test]
    fn scalars() {
        assert_eq!(format_tool_result(&json!("plain text")), "plain text");
        assert_eq!(format_tool_result(&json!(42)), "42");
        assert_eq!(format_tool_result(&json!(null)), "null");
    }
}
