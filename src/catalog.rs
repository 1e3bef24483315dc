//! Static type catalog for the workflow language.
//!
//! Built once via `Lazy` statics. Step schemas that contain steps again
//! (`error`, `then`, `else`) reference the step array through a
//! [`MetaType::Deferred`] thunk to keep initialization acyclic.

use once_cell::sync::Lazy;

use crate::identity::{IdentityEntry, IdentityFamily};
use crate::meta::{any_of, Feature, Field, MetaType, MetaTypeRef, ObjectSchema, Relation, ScalarKind};

static STRING: Lazy<MetaTypeRef> = Lazy::new(|| MetaTypeRef::new(MetaType::Scalar(ScalarKind::Str)));
static INTEGER: Lazy<MetaTypeRef> = Lazy::new(|| MetaTypeRef::new(MetaType::Scalar(ScalarKind::Int)));
static BOOLEAN: Lazy<MetaTypeRef> = Lazy::new(|| MetaTypeRef::new(MetaType::Scalar(ScalarKind::Bool)));
static EXPRESSION: Lazy<MetaTypeRef> =
    Lazy::new(|| MetaTypeRef::new(MetaType::Scalar(ScalarKind::Expression)));
static ANYTHING: Lazy<MetaTypeRef> = Lazy::new(|| MetaTypeRef::new(MetaType::Anything));
static ANY_MAP: Lazy<MetaTypeRef> =
    Lazy::new(|| MetaTypeRef::new(MetaType::AnyMap(anything())));
static STRING_ARRAY: Lazy<MetaTypeRef> =
    Lazy::new(|| MetaTypeRef::new(MetaType::Array(string())));

pub fn string() -> MetaTypeRef {
    STRING.clone()
}

pub fn integer() -> MetaTypeRef {
    INTEGER.clone()
}

pub fn boolean() -> MetaTypeRef {
    BOOLEAN.clone()
}

pub fn expression() -> MetaTypeRef {
    EXPRESSION.clone()
}

pub fn anything() -> MetaTypeRef {
    ANYTHING.clone()
}

/// Open mapping accepting any keys and values. The permissive default for
/// call inputs without a documented contract.
pub fn any_map() -> MetaTypeRef {
    ANY_MAP.clone()
}

fn string_or_expression() -> MetaTypeRef {
    any_of(vec![string(), expression()])
}

fn bool_or_expression() -> MetaTypeRef {
    any_of(vec![boolean(), expression()])
}

fn deferred_steps() -> MetaTypeRef {
    MetaTypeRef::new(MetaType::Deferred(steps))
}

/// `out` accepts a single variable name, a list of names, or a mapping of
/// name to expression.
fn out_value() -> MetaTypeRef {
    any_of(vec![string(), STRING_ARRAY.clone(), any_map()])
}

fn with_common(mut schema: ObjectSchema) -> ObjectSchema {
    schema.insert("name", Feature::new(string()).describe("step label"));
    schema.insert("meta", Feature::new(any_map()));
    schema
}

fn with_error_handling(mut schema: ObjectSchema) -> ObjectSchema {
    schema.insert("error", Feature::new(deferred_steps()).describe("error handler steps"));
    schema.insert("retry", Feature::new(any_map()));
    schema.insert("loop", Feature::new(any_map()));
    schema
}

fn call_step() -> IdentityEntry {
    let mut schema = with_error_handling(with_common(ObjectSchema::new("call step")));
    schema.insert("call", Feature::new(string()).required().describe("flow to call"));
    schema.insert("in", Feature::new(MetaTypeRef::new(MetaType::CallInput)));
    schema.insert("out", Feature::new(out_value()));
    IdentityEntry::new("call", schema)
}

fn task_step() -> IdentityEntry {
    let mut schema = with_error_handling(with_common(ObjectSchema::new("task step")));
    schema.insert("task", Feature::new(string()).required().describe("task to run"));
    schema.insert("in", Feature::new(any_map()));
    schema.insert("out", Feature::new(out_value()));
    schema.insert("ignoreErrors", Feature::new(bool_or_expression()));
    IdentityEntry::new("task", schema)
}

fn log_step() -> IdentityEntry {
    let mut schema = with_common(ObjectSchema::new("log step"));
    schema.insert("log", Feature::new(string()).required().describe("message"));
    IdentityEntry::new("log", schema)
}

fn if_step() -> IdentityEntry {
    let mut schema = ObjectSchema::new("if step");
    schema.insert("if", Feature::new(expression()).required().describe("condition"));
    schema.insert("then", Feature::new(deferred_steps()).required());
    schema.insert("else", Feature::new(deferred_steps()));
    schema.insert("meta", Feature::new(any_map()));
    IdentityEntry::new("if", schema)
}

fn script_step() -> IdentityEntry {
    let mut schema = with_error_handling(with_common(ObjectSchema::new("script step")));
    schema.insert("script", Feature::new(string()).required().describe("language or file"));
    schema.insert("body", Feature::new(string()));
    schema.insert("in", Feature::new(any_map()));
    schema.insert("out", Feature::new(out_value()));
    IdentityEntry::new("script", schema)
}

fn set_step() -> IdentityEntry {
    let mut schema = with_common(ObjectSchema::new("set step"));
    schema.insert("set", Feature::new(any_map()).required().describe("variables to set"));
    IdentityEntry::new("set", schema)
}

fn expr_step() -> IdentityEntry {
    let mut schema = with_common(ObjectSchema::new("expr step"));
    schema.insert("expr", Feature::new(expression()).required());
    schema.insert("out", Feature::new(string()));
    schema.insert("error", Feature::new(deferred_steps()));
    IdentityEntry::new("expr", schema)
}

fn checkpoint_step() -> IdentityEntry {
    let mut schema = with_common(ObjectSchema::new("checkpoint step"));
    schema.insert("checkpoint", Feature::new(string_or_expression()).required());
    IdentityEntry::new("checkpoint", schema)
}

fn log_yaml_step() -> IdentityEntry {
    let mut schema = with_common(ObjectSchema::new("logYaml step"));
    schema.insert("logYaml", Feature::new(anything()).required().describe("value to log"));
    IdentityEntry::new("logYaml", schema)
}

fn throw_step() -> IdentityEntry {
    let mut schema = with_common(ObjectSchema::new("throw step"));
    schema.insert("throw", Feature::new(string_or_expression()).required().describe("error to raise"));
    IdentityEntry::new("throw", schema)
}

fn suspend_step() -> IdentityEntry {
    let mut schema = with_common(ObjectSchema::new("suspend step"));
    schema.insert("suspend", Feature::new(string_or_expression()).required().describe("event name"));
    IdentityEntry::new("suspend", schema)
}

/// `parallel`, `try` and `block` wrap a nested step list.
fn group_step(identity: &str) -> IdentityEntry {
    let mut schema = with_common(ObjectSchema::new(format!("{identity} step")));
    schema.insert(identity, Feature::new(deferred_steps()).required());
    schema.insert("out", Feature::new(out_value()));
    schema.insert("loop", Feature::new(any_map()));
    if identity != "parallel" {
        schema.insert("error", Feature::new(deferred_steps()));
    }
    IdentityEntry::new(identity, schema)
}

/// Any key other than `switch` is a case label mapping to steps.
fn switch_step() -> IdentityEntry {
    let mut schema = ObjectSchema::new("switch step").with_fallback(deferred_steps());
    schema.insert("switch", Feature::new(expression()).required().describe("value to branch on"));
    IdentityEntry::new("switch", schema)
}

fn form_step() -> IdentityEntry {
    let mut schema = with_common(ObjectSchema::new("form step"));
    schema.insert("form", Feature::new(string()).required().describe("form to show"));
    schema.insert("yield", Feature::new(boolean()));
    schema.insert("saveSubmittedBy", Feature::new(boolean()));
    schema.insert("runAs", Feature::new(any_map()));
    schema.insert("values", Feature::new(any_map()));
    schema.insert(
        "fields",
        Feature::new(any_of(vec![
            expression(),
            MetaTypeRef::new(MetaType::Array(any_map())),
        ])),
    );
    IdentityEntry::new("form", schema)
}

/// The step family. Declaration order is the identity tie-break order.
static STEP: Lazy<MetaTypeRef> = Lazy::new(|| {
    MetaTypeRef::new(MetaType::Identity(IdentityFamily::new(
        "step",
        vec![
            call_step(),
            task_step(),
            log_step(),
            log_yaml_step(),
            if_step(),
            script_step(),
            set_step(),
            expr_step(),
            checkpoint_step(),
            throw_step(),
            suspend_step(),
            group_step("parallel"),
            switch_step(),
            group_step("try"),
            group_step("block"),
            form_step(),
        ],
    )))
});

static STEPS: Lazy<MetaTypeRef> = Lazy::new(|| MetaTypeRef::new(MetaType::Array(step())));

static FLOWS: Lazy<MetaTypeRef> = Lazy::new(|| MetaTypeRef::new(MetaType::AnyMap(steps())));

static CONFIGURATION: Lazy<MetaTypeRef> = Lazy::new(|| {
    let mut schema = ObjectSchema::new("configuration");
    schema.insert("runtime", Feature::new(string()));
    schema.insert("debug", Feature::new(boolean()));
    schema.insert("entryPoint", Feature::new(string()));
    schema.insert("dependencies", Feature::new(STRING_ARRAY.clone()));
    schema.insert("arguments", Feature::new(any_map()));
    schema.insert("meta", Feature::new(any_map()));
    schema.insert("requirements", Feature::new(any_map()));
    schema.insert("processTimeout", Feature::new(string()));
    schema.insert("out", Feature::new(STRING_ARRAY.clone()));
    schema.insert("template", Feature::new(string()));
    schema.insert("parallelLoopParallelism", Feature::new(any_of(vec![integer(), expression()])));
    MetaTypeRef::new(MetaType::Object(schema))
});

static IMPORTS: Lazy<MetaTypeRef> =
    Lazy::new(|| MetaTypeRef::new(MetaType::Array(any_map())));

static RESOURCES: Lazy<MetaTypeRef> = Lazy::new(|| {
    let mut schema = ObjectSchema::new("resources");
    schema.insert("concord", Feature::new(STRING_ARRAY.clone()));
    MetaTypeRef::new(MetaType::Object(schema))
});

// form definitions mix nested field lists and flow-style values the
// loader keeps as scalars, so forms stay unconstrained
static FORMS: Lazy<MetaTypeRef> = Lazy::new(|| MetaTypeRef::new(MetaType::AnyMap(anything())));

static TRIGGERS: Lazy<MetaTypeRef> = Lazy::new(|| MetaTypeRef::new(MetaType::Array(any_map())));

static PROFILES: Lazy<MetaTypeRef> = Lazy::new(|| {
    let mut profile = ObjectSchema::new("profile");
    profile.insert("configuration", Feature::new(CONFIGURATION.clone()));
    profile.insert("flows", Feature::new(flows()));
    MetaTypeRef::new(MetaType::AnyMap(MetaTypeRef::new(MetaType::Object(profile))))
});

static ROOT: Lazy<MetaTypeRef> = Lazy::new(|| {
    let mut schema = ObjectSchema::new("document");
    schema.insert("configuration", Feature::new(CONFIGURATION.clone()));
    schema.insert("flows", Feature::new(flows()));
    schema.insert("imports", Feature::new(IMPORTS.clone()));
    schema.insert("profiles", Feature::new(PROFILES.clone()));
    schema.insert("publicFlows", Feature::new(STRING_ARRAY.clone()));
    schema.insert("resources", Feature::new(RESOURCES.clone()));
    schema.insert("forms", Feature::new(FORMS.clone()));
    schema.insert("triggers", Feature::new(TRIGGERS.clone()));
    MetaTypeRef::new(MetaType::Object(schema))
});

/// The step identity family.
pub fn step() -> MetaTypeRef {
    STEP.clone()
}

/// `step[]`, the value type of every flow definition.
pub fn steps() -> MetaTypeRef {
    STEPS.clone()
}

/// Open map of flow name to step array.
pub fn flows() -> MetaTypeRef {
    FLOWS.clone()
}

/// Top-level document schema.
pub fn root() -> MetaTypeRef {
    ROOT.clone()
}

/// The file-level field, anchor of every resolution walk.
pub fn root_field() -> Field {
    Field::new("document", root(), false).with_relation(Relation::ObjectContents)
}
