//! Flow-documentation comment blocks.
//!
//! A flow definition may be preceded by a structured comment block that
//! declares its input/output parameter contract:
//!
//! ```text
//! ##
//! # Copies a file to the target host.
//! # in:
//! #   src: string, mandatory, source path
//! #   dst: string, optional
//! # out:
//! #   result: boolean
//! ##
//! ```
//!
//! Parsing is a single forward pass with no backtracking. A parameter line
//! advances through up to four tokens in strict order: name, type,
//! keyword, free text. Semantic checks (duplicate names, unknown types)
//! belong to the lint layer, not here.

use crate::meta::Diagnostic;
use crate::tree::{DocumentTree, NodeId, NodeKind, Span};

/// One raw comment line, `#` prefix included.
#[derive(Debug, Clone)]
pub struct CommentLine {
    pub text: String,
    pub span: Span,
}

/// A parameter declared in an `in:` or `out:` section.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowDocParameter {
    pub name: String,
    pub raw_type: String,
    /// True only for the recognized keywords `mandatory` and `required`.
    pub mandatory: bool,
    /// The raw keyword token when one was present, recognized or not.
    pub keyword: Option<String>,
    pub description: Option<String>,
    pub span: Span,
}

impl FlowDocParameter {
    /// `string[]`-style declarations.
    pub fn is_array(&self) -> bool {
        self.raw_type.ends_with("[]")
    }

    /// Declared type without the array suffix.
    pub fn base_type(&self) -> &str {
        self.raw_type
            .strip_suffix("[]")
            .unwrap_or(&self.raw_type)
    }
}

/// A parsed documentation block. Structural errors are collected, not
/// thrown: a partial doc is always kept.
#[derive(Debug, Clone, Default)]
pub struct FlowDocumentation {
    pub description: Option<String>,
    pub input_parameters: Vec<FlowDocParameter>,
    pub output_parameters: Vec<FlowDocParameter>,
    pub errors: Vec<Diagnostic>,
}

impl FlowDocumentation {
    pub fn input(&self, name: &str) -> Option<&FlowDocParameter> {
        self.input_parameters.iter().find(|p| p.name == name)
    }

    pub fn has_inputs(&self) -> bool {
        !self.input_parameters.is_empty()
    }
}

const BASE_TYPES: &[&str] = &[
    "string", "boolean", "int", "integer", "number", "object", "regexp", "any",
];

/// Whether a declared base type name is recognized, case-insensitively.
pub fn is_known_base_type(name: &str) -> bool {
    BASE_TYPES.iter().any(|t| t.eq_ignore_ascii_case(name))
}

fn is_marker(content: &str) -> bool {
    content.trim() == "##"
}

/// Comment line content after the `#` prefix and one optional space.
fn content_of(text: &str) -> &str {
    let text = text.strip_prefix('#').unwrap_or(text);
    text.strip_prefix(' ').unwrap_or(text)
}

enum Section {
    In,
    Out,
}

/// Parse a comment block into a documentation node.
///
/// The first line must be the opening `##` marker; otherwise the block is
/// not documentation and `None` is returned. A missing closing marker
/// produces exactly one "Expected closing ## marker" error and keeps
/// everything parsed so far.
pub fn parse_comment_block(lines: &[CommentLine]) -> Option<FlowDocumentation> {
    let first = lines.first()?;
    if !is_marker(&first.text) {
        return None;
    }

    let mut doc = FlowDocumentation::default();
    let mut pos = 1;
    let mut closed = false;

    // description: consecutive non-blank free-text lines before the first
    // section header; a blank line ends collection
    let mut description = Vec::new();
    while pos < lines.len() {
        let content = content_of(&lines[pos].text);
        if is_marker(&lines[pos].text) || is_section_header(content).is_some() {
            break;
        }
        if content.trim().is_empty() {
            if !description.is_empty() {
                break;
            }
            pos += 1;
            continue;
        }
        description.push(content.trim_end().to_string());
        pos += 1;
    }
    if !description.is_empty() {
        doc.description = Some(description.join("\n"));
    }

    // sections in any order; junk lines between them are skipped
    while pos < lines.len() {
        let line = &lines[pos];
        if is_marker(&line.text) {
            closed = true;
            break;
        }
        let content = content_of(&line.text);
        match is_section_header(content) {
            Some(section) => {
                pos += 1;
                let params = parse_section(lines, &mut pos);
                match section {
                    Section::In => doc.input_parameters.extend(params),
                    Section::Out => doc.output_parameters.extend(params),
                }
            }
            None => pos += 1,
        }
    }

    if !closed {
        let span = lines.last().map(|l| l.span).unwrap_or(first.span);
        doc.errors
            .push(Diagnostic::error("Expected closing ## marker", span));
    }

    Some(doc)
}

fn is_section_header(content: &str) -> Option<Section> {
    match content.trim() {
        "in:" => Some(Section::In),
        "out:" => Some(Section::Out),
        _ => None,
    }
}

fn parse_section(lines: &[CommentLine], pos: &mut usize) -> Vec<FlowDocParameter> {
    let mut params = Vec::new();
    while *pos < lines.len() {
        let line = &lines[*pos];
        if is_marker(&line.text) {
            break;
        }
        let content = content_of(&line.text);
        if is_section_header(content).is_some() {
            break;
        }
        if let Some(param) = parse_parameter(content, line.span) {
            params.push(param);
        }
        *pos += 1;
    }
    params
}

/// `name: type[, keyword][, free text]`. Tokens are consumed in strict
/// order; each is present only if it immediately follows.
fn parse_parameter(content: &str, span: Span) -> Option<FlowDocParameter> {
    let content = content.trim();
    let colon = content.find(':')?;
    let name = content[..colon].trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }

    let rest = content[colon + 1..].trim();
    let mut pieces = rest.splitn(3, ',').map(str::trim);

    let raw_type = pieces.next().unwrap_or("").to_string();
    let raw_type = if raw_type.is_empty() {
        "any".to_string()
    } else {
        raw_type
    };

    let mut keyword = None;
    let mut description_parts: Vec<&str> = Vec::new();
    if let Some(second) = pieces.next() {
        // a single bare word at this position is a keyword (recognized or
        // a typo); anything with whitespace is already free text
        if !second.is_empty() && !second.contains(char::is_whitespace) {
            keyword = Some(second.to_string());
        } else if !second.is_empty() {
            description_parts.push(second);
        }
    }
    if let Some(third) = pieces.next() {
        if !third.is_empty() {
            description_parts.push(third);
        }
    }

    let mandatory = matches!(keyword.as_deref(), Some("mandatory") | Some("required"));
    let description = if description_parts.is_empty() {
        None
    } else {
        Some(description_parts.join(", "))
    };

    Some(FlowDocParameter {
        name: name.to_string(),
        raw_type,
        mandatory,
        keyword,
        description,
        span,
    })
}

/// Collect the contiguous run of comment siblings immediately preceding a
/// node, in source order.
pub fn preceding_comment_lines(tree: &DocumentTree, node: NodeId) -> Vec<CommentLine> {
    let mut comments = Vec::new();
    let mut current = node;
    while let Some(prev) = tree.prev_sibling(current) {
        if tree.kind(prev) != NodeKind::Comment {
            break;
        }
        comments.push(prev);
        current = prev;
    }
    comments.reverse();
    comments
        .into_iter()
        .map(|id| CommentLine {
            text: tree.text(id).to_string(),
            span: tree.span(id),
        })
        .collect()
}

/// Documentation anchored to a flow definition: the comment block
/// directly above it. With stacked blocks the one nearest the definition
/// wins; at most one block is ever associated.
pub fn documentation_for(tree: &DocumentTree, definition: NodeId) -> Option<FlowDocumentation> {
    let lines = preceding_comment_lines(tree, definition);
    let markers: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| is_marker(&l.text))
        .map(|(i, _)| i)
        .collect();
    let opening = match markers.len() {
        0 => return None,
        1 => markers[0],
        n => markers[n - 2],
    };
    parse_comment_block(&lines[opening..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_source;

    fn block(text: &str) -> Vec<CommentLine> {
        text.lines()
            .map(|l| CommentLine {
                text: l.to_string(),
                span: Span::new(0, l.len()),
            })
            .collect()
    }

    #[test]
    fn full_block() {
        let doc = parse_comment_block(&block(
            "##\n\
             # Copies a file.\n\
             # Overwrites the target.\n\
             # in:\n\
             #   src: string, mandatory, source path\n\
             #   dst: string, optional\n\
             # out:\n\
             #   result: boolean\n\
             ##",
        ))
        .unwrap();

        assert!(doc.errors.is_empty());
        assert_eq!(
            doc.description.as_deref(),
            Some("Copies a file.\nOverwrites the target.")
        );
        assert_eq!(doc.input_parameters.len(), 2);
        assert_eq!(doc.output_parameters.len(), 1);

        let src = doc.input("src").unwrap();
        assert_eq!(src.raw_type, "string");
        assert!(src.mandatory);
        assert_eq!(src.description.as_deref(), Some("source path"));

        let dst = doc.input("dst").unwrap();
        assert!(!dst.mandatory);
        assert_eq!(dst.keyword.as_deref(), Some("optional"));
    }

    #[test]
    fn required_spelling_also_sets_mandatory() {
        let doc = parse_comment_block(&block(
            "##\n# in:\n#   a: string, required\n##",
        ))
        .unwrap();
        assert!(doc.input("a").unwrap().mandatory);
    }

    #[test]
    fn typo_keyword_parses_but_is_not_mandatory() {
        let doc = parse_comment_block(&block(
            "##\n# in:\n#   a: string, mandatry, oops\n##",
        ))
        .unwrap();
        let a = doc.input("a").unwrap();
        assert!(!a.mandatory);
        assert_eq!(a.keyword.as_deref(), Some("mandatry"));
        assert_eq!(a.description.as_deref(), Some("oops"));
    }

    #[test]
    fn array_type_suffix() {
        let doc = parse_comment_block(&block("##\n# in:\n#   hosts: string[]\n##")).unwrap();
        let hosts = doc.input("hosts").unwrap();
        assert!(hosts.is_array());
        assert_eq!(hosts.base_type(), "string");
    }

    #[test]
    fn sections_in_any_order() {
        let doc = parse_comment_block(&block(
            "##\n# out:\n#   r: int\n# in:\n#   a: string\n##",
        ))
        .unwrap();
        assert_eq!(doc.input_parameters.len(), 1);
        assert_eq!(doc.output_parameters.len(), 1);
    }

    #[test]
    fn missing_closing_marker_keeps_partial_doc() {
        let doc = parse_comment_block(&block("##\n# in:\n#   a: string, mandatory")).unwrap();
        assert_eq!(doc.errors.len(), 1);
        assert_eq!(doc.errors[0].message, "Expected closing ## marker");
        assert!(doc.input("a").unwrap().mandatory);
    }

    #[test]
    fn not_a_doc_block() {
        assert!(parse_comment_block(&block("# just a comment")).is_none());
        assert!(parse_comment_block(&[]).is_none());
    }

    #[test]
    fn blank_line_terminates_description() {
        let doc = parse_comment_block(&block(
            "##\n# First.\n#\n# Not description anymore.\n##",
        ))
        .unwrap();
        assert_eq!(doc.description.as_deref(), Some("First."));
    }

    #[test]
    fn missing_type_defaults_to_any() {
        let doc = parse_comment_block(&block("##\n# in:\n#   a:\n##")).unwrap();
        assert_eq!(doc.input("a").unwrap().raw_type, "any");
    }

    #[test]
    fn anchoring_to_flow_definition() {
        let tree = load_source(
            "flows:\n\
             \x20 ##\n\
             \x20 # Greets.\n\
             \x20 # in:\n\
             \x20 #   who: string, mandatory\n\
             \x20 ##\n\
             \x20 greet:\n\
             \x20   - log: \"hi\"\n",
        )
        .unwrap();
        let top = tree.children(tree.root())[0];
        let flows_kv = tree.key_value(top, "flows").unwrap();
        let flows = tree.value_of(flows_kv).unwrap();
        let greet = tree.key_value(flows, "greet").unwrap();

        let doc = documentation_for(&tree, greet).unwrap();
        assert_eq!(doc.description.as_deref(), Some("Greets."));
        assert!(doc.input("who").unwrap().mandatory);
    }

    #[test]
    fn anchoring_after_an_earlier_flow() {
        // the block sits between flow a's step list and flow b
        let src = "\
flows:
  a:
  - log: hi
  ##
  # Doc for b.
  # in:
  #   x: string, mandatory
  ##
  b:
  - log: x
";
        let tree = load_source(src).unwrap();
        let top = tree.children(tree.root())[0];
        let flows = tree.value_of(tree.key_value(top, "flows").unwrap()).unwrap();

        let b = tree.key_value(flows, "b").unwrap();
        let doc = documentation_for(&tree, b).unwrap();
        assert!(doc.errors.is_empty());
        assert_eq!(doc.description.as_deref(), Some("Doc for b."));
        assert!(doc.input("x").unwrap().mandatory);

        let a = tree.key_value(flows, "a").unwrap();
        assert!(documentation_for(&tree, a).is_none());
    }

    #[test]
    fn nearest_block_wins_when_stacked() {
        let lines = [
            "##", "# old", "##", "##", "# new", "##",
        ];
        let tree_lines: Vec<CommentLine> = lines
            .iter()
            .map(|l| CommentLine {
                text: l.to_string(),
                span: Span::new(0, l.len()),
            })
            .collect();
        // simulate documentation_for's marker selection
        let markers: Vec<usize> = tree_lines
            .iter()
            .enumerate()
            .filter(|(_, l)| is_marker(&l.text))
            .map(|(i, _)| i)
            .collect();
        let opening = markers[markers.len() - 2];
        let doc = parse_comment_block(&tree_lines[opening..]).unwrap();
        assert_eq!(doc.description.as_deref(), Some("new"));
    }

    #[test]
    fn known_base_types() {
        for t in ["string", "Boolean", "INT", "number", "object", "any"] {
            assert!(is_known_base_type(t), "{t}");
        }
        assert!(!is_known_base_type("strng"));
    }
}
