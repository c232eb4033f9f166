//! Locating chart blocks in agent text.
//!
//! A chart block is a heading line carrying a `(TYPE: <name>)` tag followed,
//! after optional blank lines, by a fenced code block. Everything the scanner
//! consumes is cut from the display text, whether or not it later validates.

use std::sync::LazyLock;

use regex::Regex;

use super::{Diagnostic, DiagnosticKind};

/// Blocks considered per reply; later ones are left in the text.
pub const MAX_BLOCKS: usize = 32;

/// Largest fenced payload accepted, in bytes.
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;

const UNTITLED: &str = "Untitled chart";

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:#{1,6}\s+)?(?:[-*+]\s+)?(?:\d+[.)]\s+)?\*{0,2}\s*(?P<title>.*?)\s*\(\s*TYPE\s*:\s*(?P<kind>[^)]*?)\s*\)\s*\*{0,2}\s*:?\s*$",
    )
    .unwrap()
});

static TITLE_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^chart\s*title\s*:\s*").unwrap());

/// A located block, not yet parsed.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct RawBlock {
    /// 1-based position among the blocks found in the reply.
    pub index: usize,
    pub title: String,
    pub declared_type: String,
    pub payload: String,
}

#[derive(Debug, Default)]
pub(super) struct Scan {
    pub blocks: Vec<RawBlock>,
    pub display_text: String,
    pub diagnostics: Vec<Diagnostic>,
}

struct Heading {
    title: String,
    kind: String,
}

fn heading(line: &str) -> Option<Heading> {
    let caps = HEADING_RE.captures(line)?;
    Some(Heading {
        title: clean_title(caps.name("title").map_or("", |m| m.as_str())),
        kind: caps.name("kind").map_or("", |m| m.as_str()).to_string(),
    })
}

pub(super) fn clean_title(raw: &str) -> String {
    let trimmed = raw.trim_matches(|c: char| c == '*' || c == ':' || c.is_whitespace());
    let title = TITLE_PREFIX_RE
        .replace(trimmed, "")
        .trim_matches(|c: char| c == '*' || c == '"' || c.is_whitespace())
        .to_string();
    if title.is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}

fn is_fence_open(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

fn is_fence_close(line: &str) -> bool {
    line.trim() == "```"
}

/// A fence that opens and closes on one line, as in ```` ```json [1]``` ````.
fn inline_fence(line: &str) -> Option<String> {
    let inner = line.trim().strip_prefix("```")?.strip_suffix("```")?;
    let inner = inner.trim_start();
    let body = match inner.find(|c: char| c == '[' || c == '{') {
        Some(at) if inner[..at].chars().all(|c| c.is_ascii_alphanumeric() || c.is_whitespace()) => {
            &inner[at..]
        }
        _ => inner,
    };
    let body = body.trim();
    (!body.is_empty()).then(|| body.to_string())
}

/// Find the end of the fence opened at `open` and return its closing line
/// with the payload. The search stops at the next chart heading or fence
/// opener, so one broken block cannot swallow the blocks after it.
fn fenced(lines: &[&str], open: usize) -> Option<(usize, String)> {
    if let Some(payload) = inline_fence(lines[open]) {
        return Some((open, payload));
    }
    for k in open + 1..lines.len() {
        if is_fence_close(lines[k]) {
            return Some((k, lines[open + 1..k].join("\n")));
        }
        if is_fence_open(lines[k]) || heading(lines[k]).is_some() {
            return None;
        }
    }
    None
}

pub(super) fn scan(raw: &str) -> Scan {
    let lines: Vec<&str> = raw.lines().collect();
    let mut scan = Scan::default();
    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
    let mut at_seam = false;
    let mut found = 0;
    let mut overflow = 0;

    let mut i = 0;
    while i < lines.len() {
        let Some(head) = heading(lines[i]) else {
            keep(&mut kept, lines[i], &mut at_seam);
            i += 1;
            continue;
        };

        let mut open = i + 1;
        while open < lines.len() && lines[open].trim().is_empty() {
            open += 1;
        }
        if open >= lines.len() || !is_fence_open(lines[open]) {
            scan.diagnostics.push(Diagnostic::new(
                found + 1,
                &head.title,
                DiagnosticKind::MissingPayload,
                "chart heading is not followed by a fenced block",
            ));
            keep(&mut kept, lines[i], &mut at_seam);
            i += 1;
            continue;
        }

        let Some((close, payload)) = fenced(&lines, open) else {
            scan.diagnostics.push(Diagnostic::new(
                found + 1,
                &head.title,
                DiagnosticKind::Unterminated,
                "fenced block is never closed",
            ));
            keep(&mut kept, lines[i], &mut at_seam);
            i += 1;
            continue;
        };

        found += 1;
        if found > MAX_BLOCKS {
            overflow += 1;
            for line in &lines[i..=close] {
                keep(&mut kept, line, &mut at_seam);
            }
            i = close + 1;
            continue;
        }

        if payload.len() > MAX_PAYLOAD_BYTES {
            scan.diagnostics.push(Diagnostic::new(
                found,
                &head.title,
                DiagnosticKind::PayloadTooLarge,
                format!(
                    "payload is {} bytes; the limit is {MAX_PAYLOAD_BYTES}",
                    payload.len()
                ),
            ));
        } else {
            scan.blocks.push(RawBlock {
                index: found,
                title: head.title,
                declared_type: head.kind,
                payload,
            });
        }

        // Drop blank lines left dangling before the cut.
        while kept.last().is_some_and(|l| l.trim().is_empty()) {
            kept.pop();
        }
        at_seam = true;
        i = close + 1;
    }

    if overflow > 0 {
        scan.diagnostics.push(Diagnostic::new(
            MAX_BLOCKS + 1,
            "",
            DiagnosticKind::TooManyBlocks,
            format!("{overflow} block(s) beyond the first {MAX_BLOCKS} were left in the text"),
        ));
    }

    scan.display_text = kept.join("\n").trim().to_string();
    scan
}

/// Push a display line. After a cut, the first blank run becomes a single
/// separator.
fn keep<'a>(kept: &mut Vec<&'a str>, line: &'a str, at_seam: &mut bool) {
    if *at_seam {
        if line.trim().is_empty() {
            return;
        }
        if !kept.is_empty() {
            kept.push("");
        }
        *at_seam = false;
    }
    kept.push(line);
}
