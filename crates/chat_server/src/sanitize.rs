use crate::parsers::html_entity_parser;

/// Keeps at most `max_chars` characters.
pub fn clamp_length(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Strips markup, decodes character references, drops control and zero-width
/// characters and collapses whitespace runs to one space. Repeats until the
/// text stops changing, so sanitizing twice is the same as sanitizing once.
pub fn sanitize(text: &str) -> String {
    let mut current = sanitize_pass(text);
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn sanitize_pass(text: &str) -> String {
    let text = strip_markup(text);
    let text = decode_entities(&text);
    let text: String = text.chars().filter(|c| !is_invisible(*c)).collect();
    collapse_whitespace(&text).trim().to_owned()
}

/// Removes every `<...>` span. An unclosed `<` is kept as text.
fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('<') {
        let Some(close) = rest[open..].find('>') else {
            break;
        };
        out.push_str(&rest[..open]);
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        match html_entity_parser(&rest[amp..]) {
            Ok((remaining, decoded)) => {
                out.push(decoded);
                rest = remaining;
            }
            Err(_) => {
                out.push('&');
                rest = &rest[amp + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_invisible(c: char) -> bool {
    c.is_control() || matches!(c, '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{2060}' | '\u{feff}')
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_run {
                out.push(' ');
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}
