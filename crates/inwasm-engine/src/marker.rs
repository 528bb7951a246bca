//! Rewrite markers
//!
//! A compiled call site is bracketed by two block comments:
//!
//! ```text
//! /*inwasm#1a2b3c4d:start:"add"*/{s:1,t:0,d:'...'}/*inwasm#1a2b3c4d:end:"add"*/
//! ```
//!
//! The run id tells sites written by the current run apart from older ones,
//! which are candidates for reprocessing.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"/\*inwasm#([0-9a-f]{8}):(start|end):("(?:[^"\\]|\\.)*")\*/"#).expect("valid regex")
});

/// Identifier of one compile run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(u32);

impl RunId {
    /// Fresh random run id.
    pub fn generate() -> Self {
        RunId(rand::random())
    }

    pub fn from_u32(value: u32) -> Self {
        RunId(value)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl FromStr for RunId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u32::from_str_radix(s, 16).map(RunId)
    }
}

/// JSON-quote `name` so it can sit inside a block comment.
fn quote(name: &str) -> String {
    serde_json::Value::String(name.to_string())
        .to_string()
        .replace("*/", "*\\/")
}

pub fn start_marker(run_id: RunId, name: &str) -> String {
    format!("/*inwasm#{}:start:{}*/", run_id, quote(name))
}

pub fn end_marker(run_id: RunId, name: &str) -> String {
    format!("/*inwasm#{}:end:{}*/", run_id, quote(name))
}

/// Bracket `inner` with the markers for `name`.
pub fn wrap(run_id: RunId, name: &str, inner: &str) -> String {
    format!(
        "{}{}{}",
        start_marker(run_id, name),
        inner,
        end_marker(run_id, name)
    )
}

/// A matched start/end marker pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPair {
    pub run_id: RunId,
    pub name: String,
    /// Both markers and everything between them
    pub range: Range<usize>,
    /// Text between the markers
    pub inner: Range<usize>,
}

/// Find all marker pairs in `text`, in source order.
///
/// An end marker closes the nearest open start marker with the same run id
/// and name. Unpaired markers and markers with undecodable names are ignored.
pub fn scan(text: &str) -> Vec<MarkerPair> {
    let mut open: Vec<(RunId, String, Range<usize>)> = Vec::new();
    let mut pairs = Vec::new();

    for caps in MARKER.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let Ok(run_id) = caps[1].parse::<RunId>() else {
            continue;
        };
        let Ok(name) = serde_json::from_str::<String>(&caps[3]) else {
            continue;
        };

        if &caps[2] == "start" {
            open.push((run_id, name, whole.range()));
            continue;
        }

        if let Some(index) = open
            .iter()
            .rposition(|(id, open_name, _)| *id == run_id && *open_name == name)
        {
            let (run_id, name, start) = open.remove(index);
            pairs.push(MarkerPair {
                run_id,
                name,
                range: start.start..whole.end(),
                inner: start.end..whole.start(),
            });
        }
    }

    pairs.sort_by_key(|pair| pair.range.start);
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_format() {
        let id = RunId::from_u32(0xab);
        assert_eq!(id.to_string(), "000000ab");
        assert_eq!("000000ab".parse::<RunId>(), Ok(id));
    }

    #[test]
    fn test_wrap_and_scan() {
        let id = RunId::from_u32(0x1a2b3c4d);
        let text = format!("const a = InWasm({});\n", wrap(id, "add", "{s:1,t:0,d:'AA=='}"));
        assert!(text.contains(r#"/*inwasm#1a2b3c4d:start:"add"*/{s:1"#));

        let pairs = scan(&text);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].name, "add");
        assert_eq!(pairs[0].run_id, id);
        assert_eq!(&text[pairs[0].inner.clone()], "{s:1,t:0,d:'AA=='}");
        assert!(text[pairs[0].range.clone()].ends_with(r#":end:"add"*/"#));
    }

    #[test]
    fn test_awkward_names() {
        let id = RunId::from_u32(7);
        let name = "a\"b*/c";
        let text = wrap(id, name, "{}");
        let pairs = scan(&text);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].name, name);
        assert_eq!(pairs[0].range, 0..text.len());
    }

    #[test]
    fn test_unpaired_markers_ignored() {
        let a = RunId::from_u32(1);
        let b = RunId::from_u32(2);
        let text = format!(
            "{} x {} y {}",
            start_marker(a, "lost"),
            wrap(b, "kept", "{}"),
            end_marker(a, "other")
        );
        let pairs = scan(&text);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].name, "kept");
    }
}
