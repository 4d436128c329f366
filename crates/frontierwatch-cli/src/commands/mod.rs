//! Command implementations. Each produces a serializable report; `main`
//! prints it as JSON on stdout.

pub mod daily;
pub mod query;
pub mod status;

use std::io::Write;

use frontierwatch_core::{FrontierError, FrontierResult};
use serde::Serialize;

/// Write `value` as pretty JSON followed by a newline.
///
/// # Errors
///
/// Returns [`FrontierError::Serialization`] if encoding fails and
/// [`FrontierError::Io`] if the writer does.
pub fn write_json<W: Write, T: Serialize>(writer: &mut W, value: &T) -> FrontierResult<()> {
    serde_json::to_writer_pretty(&mut *writer, value).map_err(|source| {
        FrontierError::Serialization {
            context: "command output".into(),
            source,
        }
    })?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// [`write_json`] to stdout.
///
/// # Errors
///
/// As [`write_json`].
pub fn emit_json<T: Serialize>(value: &T) -> FrontierResult<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_json(&mut out, value)
}

#[cfg(test)]
mod tests {
    use super::write_json;

    #[test]
    fn output_is_pretty_json_with_trailing_newline() {
        let mut buf = Vec::new();
        write_json(&mut buf, &serde_json::json!({"frontier": 42})).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with("}\n"));
        assert!(text.contains("\"frontier\": 42"));
    }
}
