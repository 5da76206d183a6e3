//! Key/value property files.
//!
//! The text format is the classic `key=value` properties format: one entry
//! per line, `#` or `!` comments, `=`, `:` or whitespace separators,
//! backslash escapes and line continuations. Layer metadata stores it
//! gzip-compressed; parameter side files and the legacy metadata file are
//! plain text.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Parsed property entries, ordered by key.
pub type Properties = BTreeMap<String, String>;

const HEADER_COMMENT: &str = "auto generated file, do not edit by hand";

// =============================================================================
// Text Codec
// =============================================================================

/// Parse properties text.
pub fn parse(text: &str) -> Properties {
    let mut props = Properties::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }

        let mut logical = String::from(trimmed);
        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some(next) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let (key, value) = split_entry(&logical);
        props.insert(unescape(key), unescape(value));
    }
    props
}

/// A line continues when it ends with an odd number of backslashes.
fn ends_with_continuation(line: &str) -> bool {
    line.bytes().rev().take_while(|b| *b == b'\\').count() % 2 == 1
}

fn split_entry(line: &str) -> (&str, &str) {
    let mut key_end = line.len();
    let mut chars = line.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '=' | ':' | ' ' | '\t' | '\x0c' => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }
    let key = &line[..key_end];

    let is_blank = |c: char| matches!(c, ' ' | '\t' | '\x0c');
    let mut rest = line[key_end..].trim_start_matches(is_blank);
    if let Some(stripped) = rest.strip_prefix(|c: char| c == '=' || c == ':') {
        rest = stripped.trim_start_matches(is_blank);
    }
    (key, rest)
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let Ok(unit) = u16::from_str_radix(&hex, 16) else {
                    out.push_str(&hex);
                    continue;
                };
                let mut units = vec![unit];
                // characters outside the BMP are written as a surrogate pair
                if (0xD800..0xDC00).contains(&unit) {
                    let mut ahead = chars.clone();
                    if let Some(low) = read_unicode_escape(&mut ahead) {
                        if (0xDC00..0xE000).contains(&low) {
                            units.push(low);
                            chars = ahead;
                        }
                    }
                }
                out.extend(
                    char::decode_utf16(units).map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER)),
                );
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Read `\uXXXX` from the front of `chars`.
fn read_unicode_escape(chars: &mut std::str::Chars<'_>) -> Option<u16> {
    if chars.next()? != '\\' || chars.next()? != 'u' {
        return None;
    }
    let hex: String = chars.take(4).collect();
    if hex.len() != 4 {
        return None;
    }
    u16::from_str_radix(&hex, 16).ok()
}

fn escape(s: &str, is_key: bool, out: &mut String) {
    for (i, c) in s.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || (c as u32) > 0x7e => {
                let mut units = [0_u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04X}", unit));
                }
            }
            c => out.push(c),
        }
    }
}

/// Render properties as text, one `key=value` line per entry.
pub fn to_text(props: &Properties) -> String {
    let mut out = String::new();
    out.push('#');
    out.push_str(HEADER_COMMENT);
    out.push('\n');
    for (key, value) in props {
        escape(key, true, &mut out);
        out.push('=');
        escape(value, false, &mut out);
        out.push('\n');
    }
    out
}

// =============================================================================
// Files
// =============================================================================

/// Read a plain properties file.
pub fn read_plain(path: &Path) -> io::Result<Properties> {
    let mut text = String::new();
    BufReader::new(File::open(path)?).read_to_string(&mut text)?;
    Ok(parse(&text))
}

/// Read a gzip-compressed properties file.
pub fn read_gzip(path: &Path) -> io::Result<Properties> {
    let mut text = String::new();
    GzDecoder::new(BufReader::new(File::open(path)?)).read_to_string(&mut text)?;
    Ok(parse(&text))
}

/// Write properties as plain text to `out`.
pub fn write_plain<W: Write>(props: &Properties, out: &mut W) -> io::Result<()> {
    out.write_all(to_text(props).as_bytes())
}

/// Write properties gzip-compressed to `out`.
pub fn write_gzip<W: Write>(props: &Properties, out: &mut W) -> io::Result<()> {
    let mut encoder = GzEncoder::new(out, Compression::default());
    encoder.write_all(to_text(props).as_bytes())?;
    encoder.finish()?;
    Ok(())
}
