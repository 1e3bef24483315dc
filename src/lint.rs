//! Workflow linting - static analysis of workflow documents.
//!
//! Walks a loaded document with the meta-type provider and reports:
//! - unknown keys (suppressed for open maps),
//! - missing required keys,
//! - value shape and literal errors (including union aggregation),
//! - missing mandatory call input parameters,
//! - flow-documentation structural errors and quality warnings.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::docs::{self, is_known_base_type, FlowDocParameter};
use crate::error::LoadError;
use crate::loader::load_source;
use crate::meta::{
    compute_missing_fields, resolve_ref, validate_value, Diagnostic, MetaType, MetaTypeRef,
    Relation, Severity,
};
use crate::provider::MetaTypeProvider;
use crate::tree::{DocumentTree, NodeId, NodeKind, Span};

/// A lint finding with a stable code and 1-based source position.
#[derive(Debug, Clone, Serialize)]
pub struct LintDiagnostic {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub span: Span,
    pub line: usize,
    pub column: usize,
}

/// Result of linting one document.
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    pub errors: usize,
    pub warnings: usize,
    pub diagnostics: Vec<LintDiagnostic>,
}

impl LintResult {
    /// Returns true if no errors were found (warnings are allowed).
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}

struct Linter<'a> {
    tree: &'a DocumentTree,
    provider: &'a MetaTypeProvider,
    diagnostics: Vec<LintDiagnostic>,
}

/// Lint a loaded document.
pub fn lint_tree(tree: &DocumentTree, provider: &MetaTypeProvider) -> LintResult {
    let mut linter = Linter {
        tree,
        provider,
        diagnostics: Vec::new(),
    };
    linter.walk(tree.root());
    linter.check_flow_docs();

    let errors = linter
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    let warnings = linter.diagnostics.len() - errors;
    LintResult {
        errors,
        warnings,
        diagnostics: linter.diagnostics,
    }
}

/// Parse and lint workflow source text.
///
/// # Errors
///
/// Returns `LoadError` when the text cannot be parsed into a tree at all.
pub fn lint_source(text: &str) -> Result<LintResult, LoadError> {
    let tree = load_source(text)?;
    let provider = MetaTypeProvider::new();
    Ok(lint_tree(&tree, &provider))
}

impl<'a> Linter<'a> {
    fn push(&mut self, code: &str, diagnostic: Diagnostic) {
        let (line, column) = self.tree.line_col(diagnostic.span.start);
        self.diagnostics.push(LintDiagnostic {
            severity: diagnostic.severity,
            code: code.to_string(),
            message: diagnostic.message,
            span: diagnostic.span,
            line,
            column,
        });
    }

    fn walk(&mut self, node: NodeId) {
        match self.tree.kind(node) {
            NodeKind::Document => {
                for &child in self.tree.children(node) {
                    self.walk(child);
                }
            }
            NodeKind::Mapping => self.check_mapping(node),
            NodeKind::Sequence => self.check_sequence(node),
            _ => {}
        }
    }

    fn check_mapping(&mut self, mapping: NodeId) {
        if let Some(field) = self.provider.resolve_field(self.tree, mapping) {
            let ty = resolve_ref(&field.ty);
            self.check_unknown_keys(mapping, &ty);
            self.check_missing_required(mapping, &ty);
        }
        if self.tree.key_value(mapping, "call").is_some() {
            self.check_call_inputs(mapping);
        }

        let entries: Vec<NodeId> = self.tree.entries(mapping).collect();
        for kv in entries {
            self.check_entry_value(kv);
            if let Some(value) = self.tree.value_of(kv) {
                self.walk(value);
            }
        }
    }

    fn check_unknown_keys(&mut self, mapping: NodeId, ty: &MetaTypeRef) {
        let entries: Vec<NodeId> = self.tree.entries(mapping).collect();
        for kv in entries {
            let Some(key) = self.tree.key_text(kv) else {
                continue;
            };
            if !allows_key(ty, key) {
                let span = self.tree.key_span(kv).unwrap_or_else(|| self.tree.span(kv));
                self.push(
                    "E101",
                    Diagnostic::error(format!("unknown key \"{key}\""), span),
                );
            }
        }
    }

    fn check_missing_required(&mut self, mapping: NodeId, ty: &MetaTypeRef) {
        let present = self.tree.keys(mapping);
        let missing = compute_missing_fields(ty, &present);
        if !missing.is_empty() {
            self.push(
                "E102",
                Diagnostic::error(
                    format!("missing required keys: {}", missing.join(", ")),
                    self.tree.span(mapping),
                ),
            );
        }
    }

    fn check_entry_value(&mut self, kv: NodeId) {
        let Some(value) = self.tree.value_of(kv) else {
            return;
        };
        let Some(field) = self.provider.resolve_field(self.tree, kv) else {
            return;
        };
        // a scalar parked on the next line is an object under construction,
        // not this key's value
        if field.relation == Relation::ObjectContents
            && self.tree.kind(value) == NodeKind::Scalar
            && self.tree.has_line_break_between_key_and_value(kv)
        {
            return;
        }
        for diagnostic in validate_value(&field.ty, self.tree, value) {
            self.push("E103", diagnostic);
        }
    }

    fn check_sequence(&mut self, sequence: NodeId) {
        let items: Vec<NodeId> = self.tree.children(sequence).to_vec();
        for item in items {
            let Some(value) = self.tree.item_value(item) else {
                continue;
            };
            if let Some(field) = self.provider.resolve_field(self.tree, item) {
                if !self.is_step_keyword(&field.ty, value) {
                    for diagnostic in validate_value(&field.ty, self.tree, value) {
                        self.push("E103", diagnostic);
                    }
                }
            }
            self.walk(value);
        }
    }

    /// `return` and `exit` are valid scalar steps despite the step family
    /// being an object type.
    fn is_step_keyword(&self, ty: &MetaTypeRef, value: NodeId) -> bool {
        if !matches!(resolve_ref(ty).as_ref(), MetaType::Identity(_)) {
            return false;
        }
        matches!(self.tree.scalar_text(value), Some("return") | Some("exit"))
    }

    /// Mandatory inputs of the documented target flow must appear in the
    /// call step's `in:` block.
    fn check_call_inputs(&mut self, call_step: NodeId) {
        let schema = self.provider.call_input_schema(self.tree, call_step);
        let present: BTreeSet<String> = self
            .tree
            .key_value(call_step, "in")
            .and_then(|kv| self.tree.value_of(kv))
            .filter(|&v| self.tree.kind(v) == NodeKind::Mapping)
            .map(|v| self.tree.keys(v))
            .unwrap_or_default();

        let missing = compute_missing_fields(&schema, &present);
        if missing.is_empty() {
            return;
        }
        let span = self
            .tree
            .key_value(call_step, "call")
            .and_then(|kv| self.tree.key_span(kv))
            .unwrap_or_else(|| self.tree.span(call_step));
        self.push(
            "E104",
            Diagnostic::error(
                format!("missing mandatory call input parameters: {}", missing.join(", ")),
                span,
            ),
        );
    }

    fn check_flow_docs(&mut self) {
        let Some(flows) = self.flows_mapping() else {
            return;
        };

        let children: Vec<NodeId> = self.tree.children(flows).to_vec();
        for &child in &children {
            if self.tree.kind(child) != NodeKind::KeyValue {
                continue;
            }
            if let Some(doc) = docs::documentation_for(self.tree, child) {
                for error in doc.errors {
                    self.push("E105", error);
                }
                self.check_parameters(&doc.input_parameters);
                self.check_parameters(&doc.output_parameters);
            }
        }

        self.check_orphaned_docs(&children);
    }

    fn check_parameters(&mut self, params: &[FlowDocParameter]) {
        let mut seen = BTreeSet::new();
        for param in params {
            if !seen.insert(param.name.clone()) {
                self.push(
                    "W101",
                    Diagnostic::warning(
                        format!("duplicate parameter \"{}\"", param.name),
                        param.span,
                    ),
                );
            }
            if !is_known_base_type(param.base_type()) {
                self.push(
                    "W102",
                    Diagnostic::warning(
                        format!("unknown parameter type \"{}\"", param.base_type()),
                        param.span,
                    ),
                );
            }
            if let Some(keyword) = &param.keyword {
                if !matches!(keyword.as_str(), "mandatory" | "required" | "optional") {
                    self.push(
                        "W103",
                        Diagnostic::warning(
                            format!(
                                "unknown keyword \"{keyword}\": expected mandatory, required, or optional"
                            ),
                            param.span,
                        ),
                    );
                }
            }
        }
    }

    /// A documentation block with no flow definition after it documents
    /// nothing.
    fn check_orphaned_docs(&mut self, children: &[NodeId]) {
        let mut run_start: Option<NodeId> = None;
        let mut has_marker = false;
        for &child in children {
            match self.tree.kind(child) {
                NodeKind::Comment => {
                    if run_start.is_none() {
                        run_start = Some(child);
                    }
                    if self.tree.text(child).trim() == "##" {
                        has_marker = true;
                    }
                }
                _ => {
                    run_start = None;
                    has_marker = false;
                }
            }
        }
        if let (Some(start), true) = (run_start, has_marker) {
            self.push(
                "W104",
                Diagnostic::warning(
                    "documentation block is not followed by a flow definition",
                    self.tree.span(start),
                ),
            );
        }
    }

    fn flows_mapping(&self) -> Option<NodeId> {
        let top = self.tree.children(self.tree.root()).first().copied()?;
        if self.tree.kind(top) != NodeKind::Mapping {
            return None;
        }
        let kv = self.tree.key_value(top, "flows")?;
        let flows = self.tree.value_of(kv)?;
        (self.tree.kind(flows) == NodeKind::Mapping).then_some(flows)
    }
}

/// Whether a mapping governed by `ty` may carry `key`. Open types accept
/// everything; a scalar-typed mapping is already a shape error, so unknown
/// keys are not piled on top.
fn allows_key(ty: &MetaTypeRef, key: &str) -> bool {
    match ty.as_ref() {
        MetaType::Object(schema) => {
            schema.features().contains_key(key) || schema.fallback().is_some()
        }
        MetaType::Identity(family) => family.has_feature(key),
        MetaType::AnyMap(_) | MetaType::Anything | MetaType::CallInput => true,
        MetaType::AnyOf(subtypes) => {
            // only mapping-shaped members constrain keys; a union with
            // none of them is a shape mismatch reported elsewhere
            let mut constrained = false;
            for sub in subtypes {
                let sub = resolve_ref(sub);
                match sub.as_ref() {
                    MetaType::Object(_)
                    | MetaType::AnyMap(_)
                    | MetaType::Identity(_)
                    | MetaType::Anything
                    | MetaType::CallInput => {
                        constrained = true;
                        if allows_key(&sub, key) {
                            return true;
                        }
                    }
                    _ => {}
                }
            }
            !constrained
        }
        MetaType::Deferred(_) => allows_key(&resolve_ref(ty), key),
        MetaType::Scalar(_) | MetaType::Array(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(result: &LintResult) -> Vec<&str> {
        result.diagnostics.iter().map(|d| d.code.as_str()).collect()
    }

    #[test]
    fn clean_document_passes() {
        let result = lint_source(
            "flows:\n  main:\n  - log: hello\n  - task: deploy\n    in:\n      target: prod\n",
        )
        .unwrap();
        assert!(result.is_ok(), "{:?}", result.diagnostics);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn unknown_step_key_is_reported() {
        let result =
            lint_source("flows:\n  main:\n  - log: hi\n    wrong: here\n").unwrap();
        assert!(!result.is_ok());
        assert!(codes(&result).contains(&"E101"));
        assert!(result.diagnostics[0].message.contains("wrong"));
    }

    #[test]
    fn unknown_top_level_key_is_reported() {
        let result = lint_source("floows:\n  x: 1\n").unwrap();
        assert!(codes(&result).contains(&"E101"));
    }

    #[test]
    fn extended_sections_and_steps_lint_clean() {
        let src = "\
resources:
  concord:
  - \"concord/*.yml\"

forms:
  myForm:
  - myField: string

triggers:
- github:
    useInitiator: true

flows:
  main:
  - throw: \"boom\"
  - suspend: waitForEvent
  - switch: ${case}
    red:
    - log: red
    default:
    - log: other
  - parallel:
    - log: a
  - try:
    - log: b
    error:
    - log: failed
  - form: myForm
    yield: true
  - logYaml:
      a: 1
";
        let result = lint_source(src).unwrap();
        assert!(result.is_ok(), "{:?}", result.diagnostics);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn missing_required_then_in_if_step() {
        let result = lint_source("flows:\n  main:\n  - if: ${ok}\n").unwrap();
        assert!(codes(&result).contains(&"E102"));
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.code == "E102")
            .unwrap();
        assert!(d.message.contains("then"));
    }

    #[test]
    fn scalar_step_is_a_shape_error_except_keywords() {
        let result = lint_source("flows:\n  main:\n  - log: a\n  - return\n").unwrap();
        assert!(result.is_ok(), "{:?}", result.diagnostics);

        let result = lint_source("flows:\n  main:\n  - oops\n").unwrap();
        assert!(codes(&result).contains(&"E103"));
    }

    #[test]
    fn if_condition_must_be_expression() {
        let result =
            lint_source("flows:\n  main:\n  - if: notexpr\n    then:\n    - log: a\n").unwrap();
        assert!(codes(&result).contains(&"E103"));
    }

    #[test]
    fn missing_mandatory_call_input() {
        let src = "\
flows:
  ##
  # in:
  #   file: string, mandatory
  ##
  copy:
  - log: hi

  main:
  - call: copy
";
        let result = lint_source(src).unwrap();
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.code == "E104")
            .expect("missing input not reported");
        assert!(d.message.contains("file"));
    }

    #[test]
    fn supplied_mandatory_call_input_passes() {
        let src = "\
flows:
  ##
  # in:
  #   file: string, mandatory
  ##
  copy:
  - log: hi

  main:
  - call: copy
    in:
      file: /tmp/x
";
        let result = lint_source(src).unwrap();
        assert!(result.is_ok(), "{:?}", result.diagnostics);
    }

    #[test]
    fn unknown_call_input_key() {
        let src = "\
flows:
  ##
  # in:
  #   file: string, mandatory
  ##
  copy:
  - log: hi

  main:
  - call: copy
    in:
      file: /tmp/x
      bogus: 1
";
        let result = lint_source(src).unwrap();
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.code == "E101")
            .expect("unknown input not reported");
        assert!(d.message.contains("bogus"));
    }

    #[test]
    fn unterminated_doc_block() {
        let src = "\
flows:
  ##
  # in:
  #   a: string
  copy:
  - log: hi
";
        let result = lint_source(src).unwrap();
        assert!(codes(&result).contains(&"E105"));
    }

    #[test]
    fn doc_quality_warnings() {
        let src = "\
flows:
  ##
  # in:
  #   a: string, mandatry
  #   a: strng
  ##
  copy:
  - log: hi
";
        let result = lint_source(src).unwrap();
        let codes = codes(&result);
        assert!(codes.contains(&"W101"), "{codes:?}");
        assert!(codes.contains(&"W102"), "{codes:?}");
        assert!(codes.contains(&"W103"), "{codes:?}");
        // warnings alone do not fail the lint
        assert!(result.is_ok());
    }

    #[test]
    fn orphaned_doc_block() {
        let src = "\
flows:
  main:
  - log: hi
  ##
  # in:
  #   a: string
  ##
";
        let result = lint_source(src).unwrap();
        assert!(codes(&result).contains(&"W104"));
    }

    #[test]
    fn expression_call_target_disables_input_checks() {
        let src = "\
flows:
  main:
  - call: ${target}
    in:
      whatever: 1
";
        let result = lint_source(src).unwrap();
        assert!(result.is_ok(), "{:?}", result.diagnostics);
    }
}
