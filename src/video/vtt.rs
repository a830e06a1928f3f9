//! WebVTT caption payload → plain text.
//!
//! Auto-generated YouTube captions "roll": each cue repeats the previous line
//! before adding new words, and word timings are embedded as inline tags.
//! The conversion drops all timing/markup and collapses those repeats.

/// Convert a WebVTT document into plain text, one caption line per output line.
///
/// A cue identifier is only recognised as the line directly before a timing
/// line, so captions that are just a number ("42", "2024") are kept.
pub fn vtt_to_text(vtt: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut skipping_block = false;
    let mut block_start = true;
    // first line of a block, held until we know whether it is an identifier
    let mut pending: Option<&str> = None;

    for raw in vtt.lines() {
        let line = raw.trim();

        if line.is_empty() {
            if let Some(text) = pending.take() {
                push_caption(&mut lines, text);
            }
            skipping_block = false;
            block_start = true;
            continue;
        }
        if skipping_block {
            continue;
        }
        let first_in_block = std::mem::replace(&mut block_start, false);

        if line.starts_with("WEBVTT") {
            skipping_block = true;
            continue;
        }
        if first_in_block && (line.starts_with("NOTE") || line == "STYLE" || line == "REGION") {
            skipping_block = true;
            continue;
        }
        if line.contains("-->") {
            pending = None;
            continue;
        }
        if let Some(text) = pending.take() {
            push_caption(&mut lines, text);
        }
        if first_in_block {
            pending = Some(line);
            continue;
        }
        push_caption(&mut lines, line);
    }
    if let Some(text) = pending {
        push_caption(&mut lines, text);
    }

    lines.join("\n")
}

fn push_caption(lines: &mut Vec<String>, line: &str) {
    let text = collapse_whitespace(&decode_entities(&strip_tags(line)));
    if text.is_empty() {
        return;
    }
    if lines.last().map(String::as_str) == Some(text.as_str()) {
        return;
    }
    lines.push(text);
}

fn strip_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_tag = false;
    for c in line.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn decode_entities(line: &str) -> String {
    line.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn collapse_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}
