//! Stack trace parsing.

use crate::resolve::ResolveError;
use once_cell::sync::Lazy;
use regex::Regex;

/// `    at label (file:line:col)`
static LABELED_FRAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*at (.*?) [(](.*?):(\d+):(\d+)[)]$").expect("valid regex"));

/// `    at file:line:col`
static BARE_FRAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*at (.*?):(\d+):(\d+)$").expect("valid regex"));

/// Label of the frame directly above the declaration's call site.
pub const DECLARATION_LABEL: &str = "InWasm";

/// One parsed trace frame. `line` and `column` are one-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub at: String,
    pub unit: String,
    pub line: u32,
    pub column: u32,
}

/// Parse the frames of a trace. The first line is the message and is skipped;
/// blank lines are ignored.
pub fn parse_call_stack(trace: &str) -> Result<Vec<StackFrame>, ResolveError> {
    if trace.trim().is_empty() {
        return Err(ResolveError::StackParse {
            line: String::new(),
        });
    }

    let mut frames = Vec::new();
    for line in trace.lines().skip(1).filter(|l| !l.trim().is_empty()) {
        let malformed = || ResolveError::StackParse {
            line: line.to_string(),
        };

        let frame = if let Some(caps) = LABELED_FRAME.captures(line) {
            StackFrame {
                at: caps[1].to_string(),
                unit: caps[2].to_string(),
                line: caps[3].parse().map_err(|_| malformed())?,
                column: caps[4].parse().map_err(|_| malformed())?,
            }
        } else if let Some(caps) = BARE_FRAME.captures(line) {
            StackFrame {
                at: String::new(),
                unit: caps[1].to_string(),
                line: caps[2].parse().map_err(|_| malformed())?,
                column: caps[3].parse().map_err(|_| malformed())?,
            }
        } else {
            return Err(malformed());
        };
        frames.push(frame);
    }

    Ok(frames)
}

/// First frame in `file` whose caller frame is the declaration wrapper.
pub fn find_declaration_frame<'a>(
    frames: &'a [StackFrame],
    file: &str,
) -> Result<&'a StackFrame, ResolveError> {
    frames
        .windows(2)
        .find(|pair| pair[1].unit.contains(file) && pair[0].at == DECLARATION_LABEL)
        .map(|pair| &pair[1])
        .ok_or(ResolveError::NoFrame)
}
