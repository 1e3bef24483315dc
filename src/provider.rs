//! Resolving tree positions to schema fields.
//!
//! [`MetaTypeProvider::resolve_field`] answers "what type governs this
//! node" by walking to the nearest structurally typed ancestor (key-value,
//! sequence item or document) and descending the catalog from the root
//! schema. `None` means "no constraint", never an error: unknown keys,
//! malformed ancestry and empty documents all degrade silently.
//!
//! Results are memoized per `(node, revision)`. A revision change discards
//! the whole cache at once; there is no partial invalidation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::catalog;
use crate::dynamic::{self, FlowIndex};
use crate::meta::{any_of, resolve_ref, find_feature, Field, MetaType, MetaTypeRef, Relation};
use crate::tree::{DocumentTree, NodeId, NodeKind, Revision};

struct CacheState {
    revision: Revision,
    fields: HashMap<NodeId, Option<Field>>,
    call_inputs: HashMap<NodeId, MetaTypeRef>,
    flow_index: Option<Arc<FlowIndex>>,
}

impl CacheState {
    fn empty(revision: Revision) -> Self {
        CacheState {
            revision,
            fields: HashMap::new(),
            call_inputs: HashMap::new(),
            flow_index: None,
        }
    }
}

/// Stateless resolution façade over a per-revision memoization cache.
/// Cheap to share; all methods take `&self`.
pub struct MetaTypeProvider {
    cache: Mutex<CacheState>,
}

impl Default for MetaTypeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaTypeProvider {
    pub fn new() -> Self {
        MetaTypeProvider {
            cache: Mutex::new(CacheState::empty(0)),
        }
    }

    /// The field governing `node`, or `None` when the position is
    /// unconstrained.
    pub fn resolve_field(&self, tree: &DocumentTree, node: NodeId) -> Option<Field> {
        let typed = tree.ancestor_or_self(node, |k| {
            matches!(
                k,
                NodeKind::KeyValue | NodeKind::SequenceItem | NodeKind::Document
            )
        })?;

        if let Some(hit) = self.cached_field(tree, typed) {
            return hit;
        }

        let computed = self.compute_field(tree, typed);
        self.store_field(tree, typed, computed.clone());
        computed
    }

    fn compute_field(&self, tree: &DocumentTree, typed: NodeId) -> Option<Field> {
        match tree.kind(typed) {
            NodeKind::Document => Some(catalog::root_field()),
            NodeKind::SequenceItem => self.resolve_item_field(tree, typed),
            NodeKind::KeyValue => self.resolve_key_value_field(tree, typed),
            _ => None,
        }
    }

    /// A sequence item's field unwraps one array level of the sequence's
    /// own field and specializes against the item value.
    fn resolve_item_field(&self, tree: &DocumentTree, item: NodeId) -> Option<Field> {
        let sequence = tree.parent(item)?;
        let seq_field = self.resolve_field(tree, sequence)?;
        let seq_ty = resolve_ref(&seq_field.ty);
        let element = match seq_ty.as_ref() {
            MetaType::Array(element) => resolve_ref(element),
            _ => return None,
        };
        let field = Field::new(seq_field.name, element, false)
            .with_relation(Relation::SequenceItem);
        match tree.item_value(item) {
            Some(value) => Some(field.specialize(tree, value)),
            None => Some(field),
        }
    }

    fn resolve_key_value_field(&self, tree: &DocumentTree, kv: NodeId) -> Option<Field> {
        let mapping = tree.parent(kv)?;
        if tree.kind(mapping) != NodeKind::Mapping {
            return None;
        }
        let parent_field = self.resolve_field(tree, mapping)?;
        // identity resolution happens here: the mapping's keys pin the
        // family down to one member before feature lookup
        let effective = parent_field.specialize(tree, mapping);

        let key = tree.key_text(kv)?;
        let mut field = find_feature(&effective.ty, key)?;

        if matches!(field.ty.as_ref(), MetaType::CallInput) {
            field.ty = any_of(vec![
                catalog::expression(),
                self.call_input_schema(tree, kv),
            ]);
        }

        let value = tree.value_of(kv);
        field.relation = match value.map(|v| tree.kind(v)) {
            Some(NodeKind::Scalar) => {
                // a scalar on the line after the key belongs to an object
                // under construction, not to the key
                if tree.has_line_break_between_key_and_value(kv) {
                    Relation::ObjectContents
                } else {
                    Relation::ScalarValue
                }
            }
            Some(NodeKind::Sequence) => Relation::SequenceItem,
            Some(NodeKind::Mapping) => Relation::ObjectContents,
            _ => field.relation,
        };

        match value {
            Some(value) => Some(field.specialize(tree, value)),
            None => Some(field),
        }
    }

    /// The documented input object for the call step enclosing
    /// `call_site`. Memoized per call site; the permissive open map when
    /// no contract can be derived.
    pub fn call_input_schema(&self, tree: &DocumentTree, call_site: NodeId) -> MetaTypeRef {
        {
            let state = self.lock_current(tree);
            if let Some(hit) = state.call_inputs.get(&call_site) {
                return hit.clone();
            }
        }
        let index = self.flow_index(tree);
        let schema = dynamic::in_params_schema(tree, call_site, &index);
        let mut state = self.lock_current(tree);
        state.call_inputs.insert(call_site, schema.clone());
        schema
    }

    /// Per-revision flow-name index, built lazily.
    pub fn flow_index(&self, tree: &DocumentTree) -> Arc<FlowIndex> {
        {
            let state = self.lock_current(tree);
            if let Some(index) = &state.flow_index {
                return index.clone();
            }
        }
        let built = Arc::new(FlowIndex::build(tree));
        let mut state = self.lock_current(tree);
        state.flow_index.get_or_insert_with(|| built).clone()
    }

    fn cached_field(&self, tree: &DocumentTree, node: NodeId) -> Option<Option<Field>> {
        self.lock_current(tree).fields.get(&node).cloned()
    }

    fn store_field(&self, tree: &DocumentTree, node: NodeId, field: Option<Field>) {
        self.lock_current(tree).fields.insert(node, field);
    }

    /// Lock the cache, discarding it first if the document moved on.
    fn lock_current(&self, tree: &DocumentTree) -> std::sync::MutexGuard<'_, CacheState> {
        let mut state = match self.cache.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.revision != tree.revision() {
            *state = CacheState::empty(tree.revision());
        }
        state
    }
}
