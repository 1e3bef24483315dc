//! Loading workflow YAML text into a [`DocumentTree`].
//!
//! Parses the block-style subset the workflow language uses: nested
//! mappings, sequences, plain and quoted scalars, comments and blank
//! lines. Comments are kept as tree nodes because flow documentation
//! lives in them. Malformed lines are skipped rather than failing the
//! whole document; an editor buffer is incomplete most of the time.
//!
//! Flow-style collections (`{}` / `[]`), anchors, tags and multi-document
//! streams are not supported.

use std::path::Path;

use crate::error::LoadError;
use crate::tree::{DocumentTree, Node, NodeId, NodeKind, Span};

/// Load a workflow document from a file.
///
/// # Errors
///
/// Returns `LoadError` if the file cannot be read or uses tab indentation.
pub fn load_file(path: &Path) -> Result<DocumentTree, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    load_source(&text)
}

/// Load a workflow document from a string.
///
/// # Errors
///
/// Returns `LoadError::TabIndentation` if a line is indented with tabs.
pub fn load_source(text: &str) -> Result<DocumentTree, LoadError> {
    let lines = scan_lines(text)?;
    let mut parser = Parser {
        source: text,
        lines,
        pos: 0,
        nodes: Vec::new(),
    };

    let root = parser.push(NodeKind::Document, None, Span::new(0, text.len()));
    if let Some(top) = parser.parse_value(root, 0) {
        parser.nodes[root.0 as usize].children.push(top);
    }

    Ok(DocumentTree::from_parts(parser.nodes, text.to_string(), root))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Blank,
    Comment,
    Content,
}

#[derive(Debug, Clone, Copy)]
struct Line {
    indent: usize,
    start: usize,
    end: usize,
    kind: LineKind,
}

fn scan_lines(text: &str) -> Result<Vec<Line>, LoadError> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for (idx, raw) in text.split('\n').enumerate() {
        let end = offset + raw.len();
        let mut indent = 0;
        for ch in raw.chars() {
            match ch {
                ' ' => indent += 1,
                '\t' => return Err(LoadError::TabIndentation { line: idx + 1 }),
                _ => break,
            }
        }
        let content = raw[indent..].trim_end();
        let kind = if content.is_empty() {
            LineKind::Blank
        } else if content.starts_with('#') {
            LineKind::Comment
        } else {
            LineKind::Content
        };
        lines.push(Line {
            indent,
            start: offset + indent,
            end: offset + indent + content.len(),
            kind,
        });
        offset = end + 1;
    }
    Ok(lines)
}

struct Parser<'a> {
    source: &'a str,
    lines: Vec<Line>,
    pos: usize,
    nodes: Vec<Node>,
}

impl<'a> Parser<'a> {
    fn push(&mut self, kind: NodeKind, parent: Option<NodeId>, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
            span,
            key: None,
            key_span: None,
            text: None,
        });
        id
    }

    fn line_text(&self, line: &Line) -> &'a str {
        &self.source[line.start..line.end]
    }

    /// Advance past blank lines; returns the next line, if any.
    fn peek(&mut self) -> Option<Line> {
        while let Some(line) = self.lines.get(self.pos) {
            if line.kind == LineKind::Blank {
                self.pos += 1;
            } else {
                return Some(*line);
            }
        }
        None
    }

    /// First content line at or after the cursor, skipping comments.
    fn peek_content(&self, min_indent: usize) -> Option<Line> {
        let mut idx = self.pos;
        while let Some(line) = self.lines.get(idx) {
            match line.kind {
                LineKind::Blank => idx += 1,
                LineKind::Comment if line.indent >= min_indent => idx += 1,
                LineKind::Comment => return None,
                LineKind::Content => {
                    return (line.indent >= min_indent).then_some(*line);
                }
            }
        }
        None
    }

    /// Parse a value block starting at the cursor. The block's own indent
    /// is taken from its first content line.
    fn parse_value(&mut self, parent: NodeId, min_indent: usize) -> Option<NodeId> {
        let next = self.peek()?;
        if next.indent < min_indent && next.kind == LineKind::Content {
            return None;
        }

        match self.peek_content(min_indent) {
            Some(content) => {
                let text = self.line_text(&content);
                if is_sequence_item(text) {
                    Some(self.parse_sequence(parent, content.indent))
                } else if find_key_colon(text).is_some() {
                    Some(self.parse_mapping(parent, content.indent))
                } else {
                    self.skip_comments(min_indent);
                    Some(self.parse_scalar_line(parent))
                }
            }
            // Comments with no content after them: keep them in a mapping so
            // trailing documentation blocks stay addressable.
            None if matches!(self.peek(), Some(l) if l.kind == LineKind::Comment && l.indent >= min_indent) =>
            {
                Some(self.parse_mapping(parent, min_indent))
            }
            None => None,
        }
    }

    fn skip_comments(&mut self, min_indent: usize) {
        while let Some(line) = self.peek() {
            if line.kind == LineKind::Comment && line.indent >= min_indent {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn parse_scalar_line(&mut self, parent: NodeId) -> NodeId {
        let line = self.lines[self.pos];
        self.pos += 1;
        let raw = self.line_text(&line);
        let (text, span) = trim_scalar(raw, line.start);
        let id = self.push(NodeKind::Scalar, Some(parent), span);
        self.nodes[id.0 as usize].text = Some(text);
        id
    }

    fn parse_mapping(&mut self, parent: NodeId, indent: usize) -> NodeId {
        let id = self.push(NodeKind::Mapping, Some(parent), Span::new(0, 0));

        while let Some(line) = self.peek() {
            match line.kind {
                LineKind::Comment => {
                    if line.indent >= indent {
                        self.pos += 1;
                        let c = self.push(
                            NodeKind::Comment,
                            Some(id),
                            Span::new(line.start, line.end),
                        );
                        self.nodes[c.0 as usize].text = Some(self.line_text(&line).to_string());
                        self.nodes[id.0 as usize].children.push(c);
                    } else {
                        break;
                    }
                }
                LineKind::Content => {
                    if line.indent < indent {
                        break;
                    }
                    if line.indent > indent || is_sequence_item(self.line_text(&line)) {
                        // Stray deeper content or a sequence item at mapping
                        // level: not ours, skip to recover.
                        self.pos += 1;
                        continue;
                    }
                    let kv = self.parse_key_value(id, line);
                    match kv {
                        Some(kv) => self.nodes[id.0 as usize].children.push(kv),
                        None => self.pos += 1,
                    }
                }
                LineKind::Blank => unreachable!("peek skips blank lines"),
            }
        }

        self.fix_span(id);
        id
    }

    fn parse_key_value(&mut self, mapping: NodeId, line: Line) -> Option<NodeId> {
        let text = self.line_text(&line);
        let colon = find_key_colon(text)?;
        self.pos += 1;

        let key_raw = &text[..colon];
        let key = unquote(key_raw.trim()).to_string();
        let key_span = Span::new(line.start, line.start + colon);

        let kv = self.push(NodeKind::KeyValue, Some(mapping), Span::new(line.start, line.end));
        self.nodes[kv.0 as usize].key = Some(key);
        self.nodes[kv.0 as usize].key_span = Some(key_span);

        let rest = strip_trailing_comment(&text[colon + 1..]);
        let value = if !rest.trim().is_empty() {
            let rest_offset = line.start + colon + 1 + (text[colon + 1..].len() - text[colon + 1..].trim_start().len());
            let (scalar_text, span) = trim_scalar(rest.trim(), rest_offset);
            let v = self.push(NodeKind::Scalar, Some(kv), span);
            self.nodes[v.0 as usize].text = Some(scalar_text);
            Some(v)
        } else {
            self.parse_nested_value(kv, line.indent)
        };

        if let Some(v) = value {
            self.nodes[kv.0 as usize].children.push(v);
        }
        self.fix_kv_span(kv);
        Some(kv)
    }

    /// Value of a key with nothing after the colon: either a deeper block,
    /// or a sequence at the same indent as the key.
    fn parse_nested_value(&mut self, kv: NodeId, key_indent: usize) -> Option<NodeId> {
        let next = self.peek()?;
        if next.kind == LineKind::Content
            && next.indent == key_indent
            && is_sequence_item(self.line_text(&next))
        {
            return Some(self.parse_sequence(kv, key_indent));
        }
        if next.indent > key_indent {
            return self.parse_value(kv, key_indent + 1);
        }
        None
    }

    fn parse_sequence(&mut self, parent: NodeId, indent: usize) -> NodeId {
        let id = self.push(NodeKind::Sequence, Some(parent), Span::new(0, 0));

        while let Some(line) = self.peek() {
            match line.kind {
                LineKind::Comment => {
                    // A trailing comment run is left for the enclosing
                    // mapping: it may document the next definition. Only
                    // comments with more items after them stay interior.
                    if line.indent >= indent && self.sequence_continues_after_comments(indent) {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                LineKind::Content => {
                    if line.indent != indent || !is_sequence_item(self.line_text(&line)) {
                        break;
                    }
                    let item = self.parse_sequence_item(id, line);
                    self.nodes[id.0 as usize].children.push(item);
                }
                LineKind::Blank => unreachable!("peek skips blank lines"),
            }
        }

        self.fix_span(id);
        id
    }

    /// Whether, past the upcoming blank and comment lines, another item of
    /// this sequence follows.
    fn sequence_continues_after_comments(&self, indent: usize) -> bool {
        let mut idx = self.pos;
        while let Some(line) = self.lines.get(idx) {
            match line.kind {
                LineKind::Blank | LineKind::Comment => idx += 1,
                LineKind::Content => {
                    return line.indent == indent && is_sequence_item(self.line_text(line));
                }
            }
        }
        false
    }

    fn parse_sequence_item(&mut self, sequence: NodeId, line: Line) -> NodeId {
        let item = self.push(
            NodeKind::SequenceItem,
            Some(sequence),
            Span::new(line.start, line.end),
        );

        let text = self.line_text(&line);
        let after_dash = text[1..].trim_start();
        let value = if after_dash.is_empty() {
            // Dash alone: the value is the deeper block below.
            self.pos += 1;
            self.parse_value(item, line.indent + 1)
        } else {
            // Re-point the current line past the dash and parse the value
            // in place; following lines at the content column continue it.
            let content_start = line.start + (text.len() - text[1..].trim_start().len());
            let content_col = line.indent + (content_start - line.start);
            self.lines[self.pos].indent = content_col;
            self.lines[self.pos].start = content_start;
            self.parse_value(item, content_col)
        };

        if let Some(v) = value {
            self.nodes[item.0 as usize].children.push(v);
            let end = self.nodes[v.0 as usize].span.end;
            let span = &mut self.nodes[item.0 as usize].span;
            span.end = span.end.max(end);
        }
        item
    }

    fn fix_span(&mut self, id: NodeId) {
        let children = &self.nodes[id.0 as usize].children;
        let first = children.first().map(|c| self.nodes[c.0 as usize].span.start);
        let last = children.last().map(|c| self.nodes[c.0 as usize].span.end);
        if let (Some(start), Some(end)) = (first, last) {
            self.nodes[id.0 as usize].span = Span::new(start, end);
        }
    }

    fn fix_kv_span(&mut self, kv: NodeId) {
        if let Some(&value) = self.nodes[kv.0 as usize].children.first() {
            let end = self.nodes[value.0 as usize].span.end;
            let span = &mut self.nodes[kv.0 as usize].span;
            span.end = span.end.max(end);
        }
    }
}

fn is_sequence_item(text: &str) -> bool {
    text == "-" || text.starts_with("- ")
}

/// Position of the key-terminating colon, quote aware. Returns `None` for
/// lines that are not key-value pairs.
fn find_key_colon(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.first() == Some(&b'"') || bytes.first() == Some(&b'\'') {
        let quote = bytes[0];
        let close = text[1..].find(quote as char)? + 1;
        let rest = &text[close + 1..];
        let colon = rest.find(':')?;
        let after = rest.as_bytes().get(colon + 1);
        if after.is_none() || after == Some(&b' ') {
            return Some(close + 1 + colon);
        }
        return None;
    }
    for (i, &b) in bytes.iter().enumerate() {
        if b == b':' {
            match bytes.get(i + 1) {
                None | Some(&b' ') => return Some(i),
                _ => {}
            }
        }
    }
    None
}

/// Cut an unquoted ` #` comment off a scalar remainder.
fn strip_trailing_comment(text: &str) -> &str {
    let bytes = text.as_bytes();
    let mut in_single = false;
    let mut in_double = false;
    let mut prev_space = true;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'\'' if !in_double => in_single = !in_single,
            b'"' if !in_single => in_double = !in_double,
            b'#' if !in_single && !in_double && prev_space => return &text[..i],
            _ => {}
        }
        prev_space = b == b' ';
    }
    text
}

/// Strip surrounding quotes, returning the scalar text and its span.
fn trim_scalar(raw: &str, offset: usize) -> (String, Span) {
    let trimmed = raw.trim();
    let lead = raw.len() - raw.trim_start().len();
    let span = Span::new(offset + lead, offset + lead + trimmed.len());
    (unquote(trimmed).to_string(), span)
}

fn unquote(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeKind;

    #[test]
    fn parses_nested_mappings() {
        let tree = load_source("configuration:\n  arguments:\n    name: test\n").unwrap();
        let top = tree.children(tree.root())[0];
        let config = tree.key_value(top, "configuration").unwrap();
        let config_map = tree.value_of(config).unwrap();
        let args = tree.key_value(config_map, "arguments").unwrap();
        let args_map = tree.value_of(args).unwrap();
        let name = tree.key_value(args_map, "name").unwrap();
        let value = tree.value_of(name).unwrap();
        assert_eq!(tree.scalar_text(value), Some("test"));
    }

    #[test]
    fn parses_sequence_of_step_mappings() {
        let src = "flows:\n  main:\n  - log: hello\n  - task: deploy\n    in:\n      target: prod\n";
        let tree = load_source(src).unwrap();
        let top = tree.children(tree.root())[0];
        let flows = tree.value_of(tree.key_value(top, "flows").unwrap()).unwrap();
        let main = tree.key_value(flows, "main").unwrap();
        let steps = tree.value_of(main).unwrap();
        assert_eq!(tree.kind(steps), NodeKind::Sequence);
        assert_eq!(tree.children(steps).len(), 2);

        let second = tree.item_value(tree.children(steps)[1]).unwrap();
        assert_eq!(tree.kind(second), NodeKind::Mapping);
        let keys = tree.keys(second);
        assert!(keys.contains("task"));
        assert!(keys.contains("in"));

        let in_map = tree.value_of(tree.key_value(second, "in").unwrap()).unwrap();
        assert_eq!(tree.kind(in_map), NodeKind::Mapping);
        assert!(tree.keys(in_map).contains("target"));
    }

    #[test]
    fn keeps_comments_as_mapping_children() {
        let src = "flows:\n  ##\n  # greets\n  ##\n  main:\n  - log: hi\n";
        let tree = load_source(src).unwrap();
        let top = tree.children(tree.root())[0];
        let flows = tree.value_of(tree.key_value(top, "flows").unwrap()).unwrap();

        let comments: Vec<_> = tree
            .children(flows)
            .iter()
            .filter(|&&c| tree.kind(c) == NodeKind::Comment)
            .collect();
        assert_eq!(comments.len(), 3);
        assert_eq!(tree.scalar_text(*comments[1]), Some("# greets"));
    }

    #[test]
    fn comments_after_a_sequence_belong_to_the_mapping() {
        let src = "flows:\n  a:\n  - log: hi\n  ##\n  # Doc for b.\n  ##\n  b:\n  - log: x\n";
        let tree = load_source(src).unwrap();
        let top = tree.children(tree.root())[0];
        let flows = tree.value_of(tree.key_value(top, "flows").unwrap()).unwrap();

        let b = tree.key_value(flows, "b").unwrap();
        assert_eq!(
            tree.kind(tree.prev_sibling(b).unwrap()),
            NodeKind::Comment
        );
        let a_steps = tree.value_of(tree.key_value(flows, "a").unwrap()).unwrap();
        assert_eq!(tree.children(a_steps).len(), 1);
    }

    #[test]
    fn interior_sequence_comments_do_not_split_items() {
        let src = "flows:\n  main:\n  - log: a\n  # note\n  - log: b\n";
        let tree = load_source(src).unwrap();
        let top = tree.children(tree.root())[0];
        let flows = tree.value_of(tree.key_value(top, "flows").unwrap()).unwrap();
        let steps = tree.value_of(tree.key_value(flows, "main").unwrap()).unwrap();
        assert_eq!(tree.children(steps).len(), 2);
    }

    #[test]
    fn quoted_scalars_are_unquoted() {
        let tree = load_source("a: \"x: y\"\nb: 'z'\n").unwrap();
        let top = tree.children(tree.root())[0];
        let a = tree.value_of(tree.key_value(top, "a").unwrap()).unwrap();
        assert_eq!(tree.scalar_text(a), Some("x: y"));
        let b = tree.value_of(tree.key_value(top, "b").unwrap()).unwrap();
        assert_eq!(tree.scalar_text(b), Some("z"));
    }

    #[test]
    fn trailing_comments_are_stripped() {
        let tree = load_source("a: value # note\n").unwrap();
        let top = tree.children(tree.root())[0];
        let a = tree.value_of(tree.key_value(top, "a").unwrap()).unwrap();
        assert_eq!(tree.scalar_text(a), Some("value"));
    }

    #[test]
    fn tab_indentation_is_rejected() {
        let err = load_source("a:\n\tb: 1\n").unwrap_err();
        assert!(matches!(err, LoadError::TabIndentation { line: 2 }));
    }

    #[test]
    fn empty_document() {
        let tree = load_source("").unwrap();
        assert!(tree.children(tree.root()).is_empty());

        let tree = load_source("\n\n").unwrap();
        assert!(tree.children(tree.root()).is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        // A stray scalar inside a mapping does not kill the rest.
        let tree = load_source("a: 1\nstray\nb: 2\n").unwrap();
        let top = tree.children(tree.root())[0];
        assert!(tree.key_value(top, "a").is_some());
        assert!(tree.key_value(top, "b").is_some());
    }
}
