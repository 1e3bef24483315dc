//! Call-site input schemas derived from flow documentation.
//!
//! A `call` step's `in:` block is validated against the documented input
//! contract of the target flow. The schema is ephemeral: built on demand
//! from the documentation block preceding the flow definition, memoized by
//! the provider, and replaced wholesale on the next document revision.
//! Absence of documentation never produces an error; it only disables
//! input-shape checking.

use std::collections::HashMap;

use crate::catalog;
use crate::docs::{documentation_for, FlowDocParameter};
use crate::meta::{any_of, Feature, MetaType, MetaTypeRef, ObjectSchema};
use crate::tree::{DocumentTree, NodeId, NodeKind};

/// Per-document index of flow name to definition (`KeyValue` under
/// `flows:`). Rebuilt with the provider cache on revision change.
#[derive(Debug, Default)]
pub struct FlowIndex {
    by_name: HashMap<String, NodeId>,
}

impl FlowIndex {
    pub fn build(tree: &DocumentTree) -> FlowIndex {
        let mut by_name = HashMap::new();
        if let Some(flows) = flows_mapping(tree) {
            for kv in tree.entries(flows) {
                if let Some(name) = tree.key_text(kv) {
                    by_name.entry(name.to_string()).or_insert(kv);
                }
            }
        }
        FlowIndex { by_name }
    }

    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }
}

fn flows_mapping(tree: &DocumentTree) -> Option<NodeId> {
    let top = tree.children(tree.root()).first().copied()?;
    if tree.kind(top) != NodeKind::Mapping {
        return None;
    }
    let flows_kv = tree.key_value(top, "flows")?;
    let flows = tree.value_of(flows_kv)?;
    (tree.kind(flows) == NodeKind::Mapping).then_some(flows)
}

/// The `call` entry of the nearest enclosing mapping that has one. This is
/// the call step a node under `in:`/`out:` belongs to.
pub fn find_call_key(tree: &DocumentTree, node: NodeId) -> Option<NodeId> {
    let mut current = Some(node);
    while let Some(id) = current {
        if tree.kind(id) == NodeKind::Mapping {
            if let Some(call_kv) = tree.key_value(id, "call") {
                return Some(call_kv);
            }
        }
        current = tree.parent(id);
    }
    None
}

/// Target flow name of a call site. `None` for a missing or non-scalar
/// value.
pub fn call_target_name(tree: &DocumentTree, call_site: NodeId) -> Option<String> {
    let call_kv = find_call_key(tree, call_site)?;
    let value = tree.value_of(call_kv)?;
    if tree.kind(value) != NodeKind::Scalar {
        return None;
    }
    tree.scalar_text(value).map(str::to_owned)
}

/// Resolve a call site to its target flow definition. The index is the
/// primary lookup; direct navigation is the fallback for documents whose
/// structure the index missed.
pub fn resolve_target(tree: &DocumentTree, call_site: NodeId, index: &FlowIndex) -> Option<NodeId> {
    let name = call_target_name(tree, call_site)?;
    if name.contains("${") {
        return None;
    }
    index
        .get(&name)
        .or_else(|| flows_mapping(tree).and_then(|flows| tree.key_value(flows, &name)))
}

/// Build the input-parameter object type for a call site.
///
/// Expression targets, unresolved flows and undocumented flows all yield
/// the permissive open map.
pub fn in_params_schema(
    tree: &DocumentTree,
    call_site: NodeId,
    index: &FlowIndex,
) -> MetaTypeRef {
    let Some(definition) = resolve_target(tree, call_site, index) else {
        return catalog::any_map();
    };
    let Some(doc) = documentation_for(tree, definition) else {
        return catalog::any_map();
    };
    if !doc.has_inputs() {
        return catalog::any_map();
    }

    let flow_name = tree.key_text(definition).unwrap_or("flow");
    let mut schema = ObjectSchema::new(format!("{flow_name} in params"));
    for param in &doc.input_parameters {
        let mut feature = Feature::new(parameter_type(param));
        if param.mandatory {
            feature = feature.required();
        }
        if let Some(desc) = &param.description {
            feature = feature.describe(desc.clone());
        }
        schema.insert(param.name.clone(), feature);
    }
    MetaTypeRef::new(MetaType::Object(schema))
}

/// A declared parameter accepts its base type or an expression producing
/// it. Unknown base type names degrade to `Anything`.
fn parameter_type(param: &FlowDocParameter) -> MetaTypeRef {
    let Some(base) = base_type_meta(param.base_type()) else {
        return catalog::anything();
    };
    let declared = if param.is_array() {
        MetaTypeRef::new(MetaType::Array(base))
    } else {
        base
    };
    any_of(vec![declared, catalog::expression()])
}

fn base_type_meta(name: &str) -> Option<MetaTypeRef> {
    let lower = name.to_ascii_lowercase();
    match lower.as_str() {
        "string" | "regexp" => Some(catalog::string()),
        "boolean" => Some(catalog::boolean()),
        "int" | "integer" | "number" => Some(catalog::integer()),
        "object" => Some(catalog::any_map()),
        "any" => Some(catalog::anything()),
        _ => None,
    }
}
