//! Java source structure via tree-sitter.
//!
//! Used by the detail extractor for `.java` sources, where an AST walk is
//! more reliable than the line heuristics in `parse` (annotations,
//! multi-line declarations, nested generics). Kotlin sources and
//! decompiled text still go through the heuristics.
//!
//! Headers and signatures are cut straight out of the source by byte
//! range (declaration start up to the body), then whitespace-squeezed,
//! rather than reassembled node by node.

use tree_sitter::{Node, Parser};

#[derive(Debug, Clone)]
pub struct SourceStructure {
    pub package: String,
    pub class_declaration: String,
    /// Public API signatures: public/protected methods and constructors;
    /// for interfaces and annotation types, every member.
    pub signatures: Vec<String>,
}

pub fn parse_source_structure(source: &str) -> Option<SourceStructure> {
    if source.trim().is_empty() {
        return None;
    }

    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_java::LANGUAGE.into())
        .ok()?;
    let tree = parser.parse(source, None)?;
    let root = tree.root_node();

    let mut package = String::new();
    let mut class_declaration = String::new();
    let mut signatures = Vec::new();

    for node in named_children(&root) {
        match node.kind() {
            "package_declaration" => {
                package = text_of(source, &node)
                    .trim_start_matches("package")
                    .trim_end_matches(';')
                    .trim()
                    .to_string();
            }
            "class_declaration" | "record_declaration" | "enum_declaration" => {
                class_declaration = header_of(source, &node);
                collect_members(source, &node, false, &mut signatures);
            }
            "interface_declaration" | "annotation_type_declaration" => {
                class_declaration = header_of(source, &node);
                collect_members(source, &node, true, &mut signatures);
            }
            _ => {}
        }
    }

    if class_declaration.is_empty() {
        return None;
    }

    Some(SourceStructure {
        package,
        class_declaration,
        signatures,
    })
}

fn collect_members(
    source: &str,
    type_node: &Node,
    members_implicitly_public: bool,
    signatures: &mut Vec<String>,
) {
    let Some(body) = type_body(type_node) else {
        return;
    };

    // enum bodies tuck their methods one level deeper.
    let mut members: Vec<Node> = Vec::new();
    for child in named_children(&body) {
        if child.kind() == "enum_body_declarations" {
            members.extend(named_children(&child));
        } else {
            members.push(child);
        }
    }

    for member in members {
        let wanted = match member.kind() {
            "method_declaration" | "constructor_declaration" => {
                members_implicitly_public || is_public_or_protected(source, &member)
            }
            "annotation_type_element_declaration" => true,
            _ => false,
        };
        if wanted && let Some(sig) = member_signature(source, &member) {
            signatures.push(sig);
        }
    }
}

/// Declaration text up to (not including) the body, annotations dropped.
fn header_of(source: &str, node: &Node) -> String {
    let end = type_body(node)
        .map(|body| body.start_byte())
        .unwrap_or_else(|| node.end_byte());
    squeeze_skipping_annotations(source.get(node.start_byte()..end).unwrap_or(""))
}

/// Member text up to its block (or the whole node for bodiless members),
/// annotations dropped and the trailing `;` trimmed.
fn member_signature(source: &str, node: &Node) -> Option<String> {
    let end = named_children(node)
        .into_iter()
        .find(|c| matches!(c.kind(), "block" | "constructor_body"))
        .map(|c| c.start_byte())
        .unwrap_or_else(|| node.end_byte());
    let raw = source.get(node.start_byte()..end)?;
    let sig = squeeze_skipping_annotations(raw.trim_end().trim_end_matches(';'));
    (!sig.is_empty()).then_some(sig)
}

fn is_public_or_protected(source: &str, node: &Node) -> bool {
    named_children(node)
        .into_iter()
        .find(|c| c.kind() == "modifiers")
        .map(|m| {
            let text = text_of(source, &m);
            text.contains("public") || text.contains("protected")
        })
        .unwrap_or(false)
}

/// The `*_body` child of a type declaration, whichever flavor.
fn type_body<'a>(node: &Node<'a>) -> Option<Node<'a>> {
    named_children(node)
        .into_iter()
        .find(|c| c.kind().ends_with("_body"))
}

fn named_children<'a>(node: &Node<'a>) -> Vec<Node<'a>> {
    (0..node.named_child_count())
        .filter_map(|i| node.named_child(i))
        .collect()
}

fn text_of<'a>(source: &'a str, node: &Node) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// Collapse runs of whitespace and drop `@Annotation` tokens, which are
/// noise in a signature listing.
fn squeeze_skipping_annotations(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for token in text.split_whitespace() {
        if token.starts_with('@') && token != "@interface" {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(token);
    }
    out
}
