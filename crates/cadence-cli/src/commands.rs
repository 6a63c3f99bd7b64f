//! REPL inline commands and per-turn trace paths.

use std::path::{Path, PathBuf};

use cadence_agents::{FORMAT_HINT, MIDI_PATH, STYLE_HINT};
use cadence_engine::PREFERRED_FINISHER;

/// A parsed `:` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineCommand {
    /// Store `value` under the attachment `key`.
    Attach { key: &'static str, value: String },
    Unknown,
}

/// Parse a line starting with `:`.
pub fn parse_inline(line: &str) -> InlineCommand {
    let mut parts = line.trim().trim_start_matches(':').splitn(3, char::is_whitespace);
    let (Some("attach"), Some(target), Some(value)) = (parts.next(), parts.next(), parts.next())
    else {
        return InlineCommand::Unknown;
    };
    let value = value.trim();
    if value.is_empty() {
        return InlineCommand::Unknown;
    }
    let key = match target {
        "midi" => MIDI_PATH,
        "style" => STYLE_HINT,
        "format" => FORMAT_HINT,
        "finisher" => PREFERRED_FINISHER,
        _ => return InlineCommand::Unknown,
    };
    InlineCommand::Attach {
        key,
        value: value.to_string(),
    }
}

/// Trace file for interactive turn `turn`: `<stem>-turn<N><ext>`.
pub fn build_trace_path(base: &Path, turn: usize) -> PathBuf {
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("trace");
    let ext = base
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("json");
    base.with_file_name(format!("{stem}-turn{turn}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attach_commands() {
        assert_eq!(
            parse_inline(":attach style dreamy city pop"),
            InlineCommand::Attach {
                key: STYLE_HINT,
                value: "dreamy city pop".to_string()
            }
        );
        assert_eq!(
            parse_inline(":attach finisher writer"),
            InlineCommand::Attach {
                key: PREFERRED_FINISHER,
                value: "writer".to_string()
            }
        );
        assert_eq!(
            parse_inline(":attach midi /tmp/song.mid"),
            InlineCommand::Attach {
                key: MIDI_PATH,
                value: "/tmp/song.mid".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_commands() {
        assert_eq!(parse_inline(":help"), InlineCommand::Unknown);
        assert_eq!(parse_inline(":attach style"), InlineCommand::Unknown);
        assert_eq!(parse_inline(":attach tempo 120"), InlineCommand::Unknown);
    }

    #[test]
    fn test_build_trace_path() {
        assert_eq!(
            build_trace_path(Path::new("runs/trace.json"), 2),
            PathBuf::from("runs/trace-turn2.json")
        );
        assert_eq!(
            build_trace_path(Path::new("runs/trace"), 1),
            PathBuf::from("runs/trace-turn1.json")
        );
    }
}
