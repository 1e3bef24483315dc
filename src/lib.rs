//! Workflow Schema Engine
//!
//! Schema-driven analysis for workflow YAML documents: resolving the type
//! that governs any position in a document, validating values against it,
//! and deriving per-call-site input contracts from flow documentation
//! comments.
//!
//! # Example
//!
//! ```
//! use flow_schema::{lint_source, load_source, MetaTypeProvider};
//!
//! // comment lines are spelled with \n escapes: rustdoc would otherwise
//! // treat leading `#` in the literal as hidden-line markers
//! let src = "flows:\n  ##\n  # Copies a file.\n  # in:\n  #   src: string, mandatory\n  ##\n  copy:\n  - log: \"copying\"\n\n  main:\n  - call: copy\n    in:\n      src: /tmp/a\n";
//!
//! let result = lint_source(src).unwrap();
//! assert!(result.is_ok());
//!
//! // the provider answers "what type governs this node"
//! let tree = load_source(src).unwrap();
//! let provider = MetaTypeProvider::new();
//! assert!(provider.resolve_field(&tree, tree.root()).is_some());
//! ```
//!
//! # Resolution model
//!
//! A document position is resolved by walking to the nearest key-value,
//! sequence item or document ancestor and descending the static type
//! catalog from the root schema. Step mappings are polymorphic: the marker
//! key present (`call`, `task`, `log`, ...) selects the member schema. A
//! `call` step's `in:` block is checked against the documented input
//! parameters of the target flow, when that documentation exists.
//!
//! All lookups degrade to "no constraint" rather than failing: unknown
//! keys, malformed ancestry and missing documentation are normal inputs
//! for an editor buffer.

mod catalog;
mod docs;
mod dynamic;
mod error;
mod expr;
mod identity;
mod lint;
mod loader;
mod meta;
mod provider;
mod tree;

pub use catalog::{root_field, step, steps};
pub use docs::{
    documentation_for, is_known_base_type, parse_comment_block, CommentLine, FlowDocParameter,
    FlowDocumentation,
};
pub use dynamic::{find_call_key, in_params_schema, resolve_target, FlowIndex};
pub use error::LoadError;
pub use expr::{contains_expression, find_expression_ranges, ExpressionRange};
pub use identity::{IdentityEntry, IdentityFamily};
pub use lint::{lint_source, lint_tree, LintDiagnostic, LintResult};
pub use loader::{load_file, load_source};
pub use meta::{
    any_of, compute_key_completions, compute_missing_fields, find_feature, resolve_ref, type_name,
    validate_key, validate_value, Diagnostic, Feature, Field, MetaType, MetaTypeRef, ObjectSchema,
    Relation, ScalarKind, Severity,
};
pub use provider::MetaTypeProvider;
pub use tree::{DocumentTree, NodeId, NodeKind, Revision, Span};
