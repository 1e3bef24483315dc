//! End-to-end resolution tests over complete workflow documents.

use std::collections::BTreeSet;

use flow_schema::{
    compute_key_completions, compute_missing_fields, find_expression_ranges, lint_source,
    load_source, type_name, FlowIndex, MetaTypeProvider, NodeId, NodeKind, Relation,
};

const WORKFLOW: &str = "\
configuration:
  runtime: \"workflow-v2\"
  arguments:
    retries: 3

flows:
  ##
  # Deploys a service to one environment.
  # in:
  #   service: string, mandatory, service identifier
  #   env: string, mandatory
  #   replicas: int, optional
  # out:
  #   deployed: boolean
  ##
  deploy:
  - task: kubectl
    in:
      action: apply
    error:
    - log: \"deploy failed: ${lastError.message}\"

  main:
  - if: \"${env != 'prod'}\"
    then:
    - call: deploy
      in:
        service: billing
        env: staging
    else:
    - log: \"skipping\"
";

fn top_mapping(tree: &flow_schema::DocumentTree) -> NodeId {
    tree.children(tree.root())[0]
}

fn flows_mapping(tree: &flow_schema::DocumentTree) -> NodeId {
    let top = top_mapping(tree);
    tree.value_of(tree.key_value(top, "flows").unwrap()).unwrap()
}

#[test]
fn full_document_resolves_and_lints_clean() {
    let result = lint_source(WORKFLOW).unwrap();
    assert!(result.is_ok(), "{:?}", result.diagnostics);
    assert!(result.diagnostics.is_empty());
}

#[test]
fn resolution_descends_through_nested_steps() {
    let tree = load_source(WORKFLOW).unwrap();
    let provider = MetaTypeProvider::new();

    let flows = flows_mapping(&tree);
    let main = tree
        .value_of(tree.key_value(flows, "main").unwrap())
        .unwrap();
    let if_step = tree.item_value(tree.children(main)[0]).unwrap();

    let field = provider.resolve_field(&tree, if_step).unwrap();
    assert_eq!(type_name(&field.ty), "if step");

    // then: -> call step -> in: -> documented schema
    let then_seq = tree
        .value_of(tree.key_value(if_step, "then").unwrap())
        .unwrap();
    let call_step = tree.item_value(tree.children(then_seq)[0]).unwrap();
    let field = provider.resolve_field(&tree, call_step).unwrap();
    assert_eq!(type_name(&field.ty), "call step");

    let in_kv = tree.key_value(call_step, "in").unwrap();
    let field = provider.resolve_field(&tree, in_kv).unwrap();
    assert_eq!(type_name(&field.ty), "expression|deploy in params");
    assert_eq!(field.relation, Relation::ObjectContents);
}

#[test]
fn error_handler_steps_resolve_like_flow_steps() {
    let tree = load_source(WORKFLOW).unwrap();
    let provider = MetaTypeProvider::new();

    let flows = flows_mapping(&tree);
    let deploy = tree
        .value_of(tree.key_value(flows, "deploy").unwrap())
        .unwrap();
    let task_step = tree.item_value(tree.children(deploy)[0]).unwrap();
    let error_kv = tree.key_value(task_step, "error").unwrap();

    let field = provider.resolve_field(&tree, error_kv).unwrap();
    assert_eq!(type_name(&field.ty), "step[]");

    let error_seq = tree.value_of(error_kv).unwrap();
    let log_step = tree.children(error_seq)[0];
    let field = provider.resolve_field(&tree, log_step).unwrap();
    assert_eq!(type_name(&field.ty), "log step");
}

#[test]
fn key_completions_on_a_partial_step() {
    let src = "flows:\n  main:\n  - if: ${ok}\n";
    let tree = load_source(src).unwrap();
    let provider = MetaTypeProvider::new();

    let flows = flows_mapping(&tree);
    let main = tree
        .value_of(tree.key_value(flows, "main").unwrap())
        .unwrap();
    let step = tree.item_value(tree.children(main)[0]).unwrap();

    let field = provider.resolve_field(&tree, tree.children(main)[0]).unwrap();
    let completions = compute_key_completions(&field.ty, &tree.keys(step));
    let names: Vec<&str> = completions.iter().map(|f| f.name.as_str()).collect();
    assert!(names.contains(&"then"));
    assert!(names.contains(&"else"));
    // sorted ascending, per the feature map ordering
    let mut sorted = names.clone();
    sorted.sort_unstable();
    assert_eq!(names, sorted);
}

#[test]
fn missing_mandatory_inputs_via_call_schema() {
    let tree = load_source(WORKFLOW).unwrap();
    let provider = MetaTypeProvider::new();

    let flows = flows_mapping(&tree);
    let main = tree
        .value_of(tree.key_value(flows, "main").unwrap())
        .unwrap();
    let if_step = tree.item_value(tree.children(main)[0]).unwrap();
    let then_seq = tree
        .value_of(tree.key_value(if_step, "then").unwrap())
        .unwrap();
    let call_step = tree.item_value(tree.children(then_seq)[0]).unwrap();

    let schema = provider.call_input_schema(&tree, call_step);

    // no keys supplied: both mandatory params are missing, sorted
    let missing = compute_missing_fields(&schema, &BTreeSet::new());
    assert_eq!(missing, vec!["env".to_string(), "service".to_string()]);

    // the document supplies both
    let in_map = tree
        .value_of(tree.key_value(call_step, "in").unwrap())
        .unwrap();
    let missing = compute_missing_fields(&schema, &tree.keys(in_map));
    assert!(missing.is_empty());
}

#[test]
fn flow_index_covers_all_definitions() {
    let tree = load_source(WORKFLOW).unwrap();
    let index = FlowIndex::build(&tree);
    let mut names: Vec<&str> = index.names().collect();
    names.sort_unstable();
    assert_eq!(names, vec!["deploy", "main"]);

    let deploy = index.get("deploy").unwrap();
    assert_eq!(tree.kind(deploy), NodeKind::KeyValue);
    assert!(index.get("missing").is_none());
}

#[test]
fn expression_ranges_in_document_scalars() {
    let tree = load_source(WORKFLOW).unwrap();
    let flows = flows_mapping(&tree);
    let deploy = tree
        .value_of(tree.key_value(flows, "deploy").unwrap())
        .unwrap();
    let task_step = tree.item_value(tree.children(deploy)[0]).unwrap();
    let error_seq = tree
        .value_of(tree.key_value(task_step, "error").unwrap())
        .unwrap();
    let log_step = tree.item_value(tree.children(error_seq)[0]).unwrap();
    let message = tree
        .value_of(tree.key_value(log_step, "log").unwrap())
        .unwrap();

    let text = tree.scalar_text(message).unwrap();
    let ranges = find_expression_ranges(text);
    assert_eq!(ranges.len(), 1);
    assert_eq!(&text[ranges[0].start..ranges[0].end], "${lastError.message}");
}

#[test]
fn incomplete_buffer_degrades_without_panicking() {
    // an editor snapshot mid-typing
    let src = "flows:\n  main:\n  - call:\n    in:\n";
    let tree = load_source(src).unwrap();
    let provider = MetaTypeProvider::new();

    for id in walk_all(&tree) {
        let _ = provider.resolve_field(&tree, id);
    }
    let result = lint_source(src).unwrap();
    // findings are fine; panics are not
    let _ = result.errors;
}

fn walk_all(tree: &flow_schema::DocumentTree) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![tree.root()];
    while let Some(id) = stack.pop() {
        out.push(id);
        stack.extend(tree.children(id).iter().copied());
    }
    out
}
