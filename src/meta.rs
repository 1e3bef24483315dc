//! Meta-type model: schema types, fields and validation.
//!
//! A [`MetaType`] describes what is allowed at a position in a workflow
//! document: which keys a mapping may carry, what shape a value must
//! have, what a union accepts. The engine hands out [`Field`]s (a named,
//! typed, relation-tagged binding) and consumers run validation or key
//! completion against the field's type.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::expr::contains_expression;
use crate::identity::IdentityFamily;
use crate::tree::{DocumentTree, NodeId, NodeKind, Span};

/// Shared handle to an immutable meta-type.
pub type MetaTypeRef = Arc<MetaType>;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single validation finding, located by byte span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            span,
        }
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            span,
        }
    }
}

/// Scalar value kinds with literal-level validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// Any scalar text.
    Str,
    /// An integer literal.
    Int,
    /// `true` or `false`.
    Bool,
    /// Scalar text containing an embedded `${...}` expression.
    Expression,
}

impl ScalarKind {
    fn type_name(self) -> &'static str {
        match self {
            ScalarKind::Str => "string",
            ScalarKind::Int => "int",
            ScalarKind::Bool => "boolean",
            ScalarKind::Expression => "expression",
        }
    }
}

/// A named child-type binding inside an object schema.
#[derive(Debug, Clone)]
pub struct Feature {
    pub ty: MetaTypeRef,
    pub required: bool,
    pub description: Option<String>,
}

impl Feature {
    pub fn new(ty: MetaTypeRef) -> Self {
        Feature {
            ty,
            required: false,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A closed object type: a fixed feature map plus its required subset.
#[derive(Debug, Clone)]
pub struct ObjectSchema {
    type_name: String,
    features: std::collections::BTreeMap<String, Feature>,
    fallback: Option<MetaTypeRef>,
}

impl ObjectSchema {
    pub fn new(type_name: impl Into<String>) -> Self {
        ObjectSchema {
            type_name: type_name.into(),
            features: Default::default(),
            fallback: None,
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, feature: Feature) {
        self.features.insert(name.into(), feature);
    }

    pub fn with(mut self, name: impl Into<String>, feature: Feature) -> Self {
        self.insert(name, feature);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn features(&self) -> &std::collections::BTreeMap<String, Feature> {
        &self.features
    }

    /// Type for keys not named in the feature map; `None` keeps the
    /// object closed. Used by families whose members carry free-form keys
    /// (switch case labels).
    pub fn with_fallback(mut self, ty: MetaTypeRef) -> Self {
        self.fallback = Some(ty);
        self
    }

    pub fn fallback(&self) -> Option<&MetaTypeRef> {
        self.fallback.as_ref()
    }
}

/// A schema type description capable of validating and enumerating its
/// own valid children.
#[derive(Debug)]
pub enum MetaType {
    /// A scalar with literal-level validation.
    Scalar(ScalarKind),
    /// A sequence whose items share one element type.
    Array(MetaTypeRef),
    /// A closed mapping with a fixed feature set.
    Object(ObjectSchema),
    /// An open mapping: every key maps to the same element type.
    AnyMap(MetaTypeRef),
    /// Ordered union of candidate types.
    AnyOf(Vec<MetaTypeRef>),
    /// Polymorphic family selected by marker key.
    Identity(IdentityFamily),
    /// Placeholder for call-site input parameters; replaced with a
    /// document-derived schema during resolution.
    CallInput,
    /// Indirection for recursive catalog types (steps contain steps).
    Deferred(fn() -> MetaTypeRef),
    /// Accepts everything. Terminal.
    Anything,
}

/// Build a union, flattening nested unions. A single subtype collapses to
/// itself. An empty subtype list is a catalog construction bug.
pub fn any_of(types: Vec<MetaTypeRef>) -> MetaTypeRef {
    debug_assert!(!types.is_empty(), "any_of with no subtypes");
    let mut flat = Vec::new();
    for ty in types {
        match ty.as_ref() {
            MetaType::AnyOf(inner) => flat.extend(inner.iter().cloned()),
            _ => flat.push(ty),
        }
    }
    if flat.len() == 1 {
        flat.remove(0)
    } else {
        MetaTypeRef::new(MetaType::AnyOf(flat))
    }
}

/// Resolve a `Deferred` indirection; other types pass through.
pub fn resolve_ref(ty: &MetaTypeRef) -> MetaTypeRef {
    match ty.as_ref() {
        MetaType::Deferred(thunk) => thunk(),
        _ => ty.clone(),
    }
}

/// Display name of a type; unions join distinct member names with `|`.
pub fn type_name(ty: &MetaTypeRef) -> String {
    match ty.as_ref() {
        MetaType::Scalar(kind) => kind.type_name().to_string(),
        MetaType::Array(elem) => format!("{}[]", type_name(elem)),
        MetaType::Object(schema) => schema.type_name().to_string(),
        MetaType::AnyMap(_) => "object".to_string(),
        MetaType::AnyOf(subtypes) => {
            let mut names = Vec::new();
            for sub in subtypes {
                let name = type_name(sub);
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            names.join("|")
        }
        MetaType::Identity(family) => family.type_name().to_string(),
        MetaType::CallInput => "call in params".to_string(),
        MetaType::Deferred(_) => type_name(&resolve_ref(ty)),
        MetaType::Anything => "any".to_string(),
    }
}

/// How a field's value attaches syntactically to its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    ObjectContents,
    ScalarValue,
    SequenceItem,
}

/// A named, typed, relation-tagged binding from a parent schema node to a
/// child. Immutable value object.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: MetaTypeRef,
    pub relation: Relation,
    pub required: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: MetaTypeRef, required: bool) -> Self {
        let ty = resolve_ref(&ty);
        let relation = default_relation(&ty);
        Field {
            name: name.into(),
            ty,
            relation,
            required,
        }
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relation = relation;
        self
    }

    /// Refine the field against a concrete value node. An identity family
    /// resolves to the member matching the value mapping's keys; other
    /// types are returned unchanged.
    pub fn specialize(&self, tree: &DocumentTree, value: NodeId) -> Field {
        if let MetaType::Identity(family) = self.ty.as_ref() {
            if tree.kind(value) == NodeKind::Mapping {
                let keys = tree.keys(value);
                if let Some(entry) = family.find_entry(&keys) {
                    return Field {
                        name: self.name.clone(),
                        ty: entry.schema().clone(),
                        relation: self.relation,
                        required: self.required,
                    };
                }
            }
        }
        self.clone()
    }
}

fn default_relation(ty: &MetaTypeRef) -> Relation {
    match ty.as_ref() {
        MetaType::Scalar(_) => Relation::ScalarValue,
        MetaType::Array(_) => Relation::SequenceItem,
        MetaType::Deferred(_) => default_relation(&resolve_ref(ty)),
        _ => Relation::ObjectContents,
    }
}

/// Look up a feature of `ty` by key name.
pub fn find_feature(ty: &MetaTypeRef, name: &str) -> Option<Field> {
    match ty.as_ref() {
        MetaType::Object(schema) => match schema.features().get(name) {
            Some(feature) => Some(Field::new(name, feature.ty.clone(), feature.required)),
            None => schema
                .fallback()
                .map(|fallback| Field::new(name, fallback.clone(), false)),
        },
        MetaType::AnyMap(elem) => Some(Field::new(name, elem.clone(), false)),
        MetaType::AnyOf(subtypes) => subtypes.iter().find_map(|sub| find_feature(sub, name)),
        MetaType::Identity(family) => {
            // the key is an identity marker: the field is typed by the
            // family and resolves to a member once the mapping is known
            let single: BTreeSet<String> = std::iter::once(name.to_string()).collect();
            family.identify_entry(&single)?;
            Some(Field::new(name, ty.clone(), false))
        }
        MetaType::Deferred(_) => find_feature(&resolve_ref(ty), name),
        _ => None,
    }
}

/// Names of required features missing from the given key set, sorted
/// ascending.
pub fn compute_missing_fields(ty: &MetaTypeRef, present: &BTreeSet<String>) -> Vec<String> {
    match ty.as_ref() {
        MetaType::Object(schema) => schema
            .features()
            .iter()
            .filter(|(name, feature)| feature.required && !present.contains(name.as_str()))
            .map(|(name, _)| name.clone())
            .collect(),
        MetaType::Identity(family) => match family.identify_entry(present) {
            Some(entry) => compute_missing_fields(entry.schema(), present),
            None => Vec::new(),
        },
        MetaType::AnyOf(subtypes) => {
            let mut first_non_empty = Vec::new();
            for sub in subtypes {
                let missing = compute_missing_fields(sub, present);
                if missing.is_empty() {
                    return Vec::new();
                }
                if first_non_empty.is_empty() {
                    first_non_empty = missing;
                }
            }
            first_non_empty
        }
        MetaType::Deferred(_) => compute_missing_fields(&resolve_ref(ty), present),
        _ => Vec::new(),
    }
}

/// Fields to offer for key completion inside a mapping typed by `ty`.
pub fn compute_key_completions(ty: &MetaTypeRef, existing: &BTreeSet<String>) -> Vec<Field> {
    match ty.as_ref() {
        MetaType::Object(schema) => schema
            .features()
            .iter()
            .map(|(name, feature)| Field::new(name, feature.ty.clone(), feature.required))
            .collect(),
        MetaType::AnyOf(subtypes) => {
            let mut seen = BTreeSet::new();
            let mut out = Vec::new();
            for sub in subtypes {
                for field in compute_key_completions(sub, existing) {
                    if seen.insert(field.name.clone()) {
                        out.push(field);
                    }
                }
            }
            out
        }
        MetaType::Identity(family) => match family.identify_entry(existing) {
            Some(entry) => compute_key_completions(entry.schema(), existing),
            None => {
                let mut seen = BTreeSet::new();
                let mut out = Vec::new();
                for candidate in family.candidates() {
                    if !seen.insert(candidate.identity().to_string()) {
                        continue;
                    }
                    if let Some(field) = find_feature(candidate.schema(), candidate.identity()) {
                        out.push(field);
                    }
                }
                out
            }
        },
        MetaType::Deferred(_) => compute_key_completions(&resolve_ref(ty), existing),
        _ => Vec::new(),
    }
}

/// Whether the type's own shape kind is scalar.
fn accepts_scalar(ty: &MetaTypeRef) -> bool {
    match ty.as_ref() {
        MetaType::Scalar(_) | MetaType::Anything => true,
        MetaType::AnyOf(subtypes) => subtypes.iter().any(accepts_scalar),
        MetaType::Deferred(_) => accepts_scalar(&resolve_ref(ty)),
        _ => false,
    }
}

/// Validate a value node against a type.
pub fn validate_value(ty: &MetaTypeRef, tree: &DocumentTree, node: NodeId) -> Vec<Diagnostic> {
    let span = tree.span(node);
    match ty.as_ref() {
        MetaType::Scalar(kind) => match tree.kind(node) {
            NodeKind::Scalar => validate_scalar(*kind, tree, node),
            NodeKind::Mapping | NodeKind::Sequence => {
                vec![Diagnostic::error("scalar value expected", span)]
            }
            _ => Vec::new(),
        },
        MetaType::Array(_) => {
            if tree.kind(node) != NodeKind::Sequence {
                vec![Diagnostic::error("array is required", span)]
            } else {
                Vec::new()
            }
        }
        MetaType::Object(_) | MetaType::AnyMap(_) => {
            if tree.kind(node) == NodeKind::Scalar {
                vec![Diagnostic::error("object is required", span)]
            } else {
                Vec::new()
            }
        }
        MetaType::Identity(family) => {
            if tree.kind(node) == NodeKind::Scalar {
                return vec![Diagnostic::error("object is required", span)];
            }
            if tree.kind(node) == NodeKind::Mapping {
                if let Some(entry) = family.find_entry(&tree.keys(node)) {
                    return validate_value(entry.schema(), tree, node);
                }
            }
            Vec::new()
        }
        MetaType::AnyOf(subtypes) => validate_any_of(ty, subtypes, tree, node),
        MetaType::Deferred(_) => validate_value(&resolve_ref(ty), tree, node),
        MetaType::CallInput | MetaType::Anything => Vec::new(),
    }
}

fn validate_scalar(kind: ScalarKind, tree: &DocumentTree, node: NodeId) -> Vec<Diagnostic> {
    let text = tree.scalar_text(node).unwrap_or_default();
    let span = tree.span(node);
    match kind {
        ScalarKind::Str => Vec::new(),
        ScalarKind::Int => {
            if text.parse::<i64>().is_ok() {
                Vec::new()
            } else {
                vec![Diagnostic::error("integer value expected", span)]
            }
        }
        ScalarKind::Bool => {
            if text == "true" || text == "false" {
                Vec::new()
            } else {
                vec![Diagnostic::error(
                    "boolean value expected (true/false)",
                    span,
                )]
            }
        }
        ScalarKind::Expression => {
            if contains_expression(text) {
                Vec::new()
            } else {
                vec![Diagnostic::error("expression expected", span)]
            }
        }
    }
}

/// Union validation: the value is accepted when any shape-matching
/// candidate accepts it; otherwise one aggregated error is reported for
/// the whole value.
fn validate_any_of(
    union: &MetaTypeRef,
    subtypes: &[MetaTypeRef],
    tree: &DocumentTree,
    node: NodeId,
) -> Vec<Diagnostic> {
    debug_assert!(!subtypes.is_empty(), "union with no subtypes");

    let value_is_scalar = tree.kind(node) == NodeKind::Scalar;
    let (matching, other): (Vec<_>, Vec<_>) = subtypes
        .iter()
        .partition(|sub| accepts_scalar(sub) == value_is_scalar);

    // Prefer shape-matching candidates; fall back to one candidate of the
    // other kind so a precise shape error can be reported.
    let candidates: Vec<&MetaTypeRef> = if !matching.is_empty() {
        matching
    } else {
        other.into_iter().take(1).collect()
    };

    let mut all_rejected = true;
    for candidate in &candidates {
        let diagnostics = validate_value(candidate, tree, node);
        if diagnostics.is_empty() {
            all_rejected = false;
            break;
        }
    }

    if all_rejected && !candidates.is_empty() {
        vec![Diagnostic::error(
            format!("invalid value, expected: {}", type_name(union)),
            tree.span(node),
        )]
    } else {
        Vec::new()
    }
}

/// Validate a key node. Unions accept when any subtype accepts; all
/// subtypes are consulted since keys have no shape of their own.
pub fn validate_key(ty: &MetaTypeRef, tree: &DocumentTree, key_value: NodeId) -> Vec<Diagnostic> {
    match ty.as_ref() {
        MetaType::AnyOf(subtypes) => {
            let mut collected = Vec::new();
            for sub in subtypes {
                let diagnostics = validate_key(sub, tree, key_value);
                if diagnostics.is_empty() {
                    return Vec::new();
                }
                collected.extend(diagnostics);
            }
            collected
        }
        MetaType::Deferred(_) => validate_key(&resolve_ref(ty), tree, key_value),
        _ => Vec::new(),
    }
}
