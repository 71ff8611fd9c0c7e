//! Source text heuristics.
//!
//! Shared by the detail extractor for hand-written sources from a
//! `-sources.jar` and for decompiler output. Deliberately line-based and
//! permissive: a signature that cannot be recognized is simply skipped.

use sha2::{Digest, Sha256};

/// One source unit recovered from decompiler output.
#[derive(Debug, Clone)]
pub struct DecompiledUnit {
    pub class_name: String,
    pub text: String,
}

/// CFR prints one banner comment per decompiled class; a banner opens a
/// new unit.
const CFR_BANNER: &str = "* Decompiled with CFR";

/// Split concatenated decompiler output into per-class units. Output
/// without any banner is treated as a single unit, keyed by whatever type
/// declaration it carries.
pub fn split_decompiled_units(output: &str) -> Vec<DecompiledUnit> {
    let mut blocks: Vec<String> = Vec::new();
    let mut current = String::new();

    let mut lines = output.lines().peekable();
    while let Some(line) = lines.next() {
        let opens_banner = line.trim() == "/*"
            && lines
                .peek()
                .is_some_and(|next| next.trim_start().starts_with(CFR_BANNER));
        if opens_banner && !current.trim().is_empty() {
            blocks.push(std::mem::take(&mut current));
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        blocks.push(current);
    }

    blocks
        .into_iter()
        .filter_map(|block| {
            let text = block.trim().to_string();
            class_name_of(&text).map(|class_name| DecompiledUnit { class_name, text })
        })
        .collect()
}

/// Fully qualified name of the first type declared in a source text:
/// the `package` statement joined with the first class-like declaration.
pub fn class_name_of(source: &str) -> Option<String> {
    let simple = source.lines().find_map(|line| {
        let line = line.trim_start();
        // Comment lines can mention "class" without declaring one.
        if line.starts_with("//") || line.starts_with('*') || line.starts_with("/*") {
            return None;
        }
        declared_type_name(line)
    })?;
    let package = source.lines().find_map(|line| {
        line.trim()
            .strip_prefix("package ")
            .map(|rest| rest.trim_end_matches(';').trim().to_string())
            .filter(|pkg| !pkg.is_empty())
    });
    Some(match package {
        Some(pkg) => format!("{pkg}.{simple}"),
        None => simple,
    })
}

/// The identifier following a type keyword on this line, stripped of
/// generics and the opening brace.
fn declared_type_name(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace();
    while let Some(token) = tokens.next() {
        if matches!(token, "class" | "interface" | "enum" | "record" | "@interface") {
            let raw = tokens.next()?;
            let name = raw.split(['<', '{', '(']).next().unwrap_or(raw).trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    None
}

/// Public/protected method signatures recognized in a source text, one
/// normalized string per declaration.
pub fn extract_method_signatures(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(method_signature_from_line)
        .collect()
}

/// Recognize a method declaration on one line. Accepts the common
/// hand-written forms and the decompiler's output: modifiers, return type
/// (or none for constructors), name, parameter list, optional `throws`.
fn method_signature_from_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if !trimmed.starts_with("public ") && !trimmed.starts_with("protected ") {
        return None;
    }
    // Type declarations have their own keywords.
    for kw in ["class ", "interface ", "enum ", "record ", "@interface "] {
        if trimmed.contains(kw) {
            return None;
        }
    }

    let open = trimmed.find('(')?;
    // Fields with initializers carry '=' before any parenthesis.
    if trimmed[..open].contains('=') {
        return None;
    }
    let close = matching_paren(trimmed, open)?;

    // Method name directly before the parameter list.
    let head = trimmed[..open].trim_end();
    let name = head.rsplit([' ', '\t']).next()?;
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
        return None;
    }

    let mut signature = trimmed[..=close].to_string();
    let tail = trimmed[close + 1..].trim();
    if let Some(rest) = tail.strip_prefix("throws") {
        let clause = rest.trim_end_matches(['{', ';']).trim();
        if !clause.is_empty() {
            signature.push_str(" throws ");
            signature.push_str(clause);
        }
    }

    Some(normalize_whitespace(&signature))
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Javadoc paragraphs accumulated across every `/** ... */` block, with
/// comment gutters stripped.
pub fn extract_javadoc(content: &str) -> Option<String> {
    let mut paragraphs = Vec::new();
    let mut rest = content;
    while let Some(start) = rest.find("/**") {
        let after = &rest[start + 3..];
        let Some(end) = after.find("*/") else { break };
        let block = &after[..end];
        let cleaned = block
            .lines()
            .map(|line| line.trim().trim_start_matches('*').trim())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if !cleaned.is_empty() {
            paragraphs.push(cleaned);
        }
        rest = &after[end + 2..];
    }
    if paragraphs.is_empty() {
        None
    } else {
        Some(paragraphs.join("\n\n"))
    }
}

/// Hex sha256 over the payload, for change detection on detail responses.
pub fn content_digest(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
