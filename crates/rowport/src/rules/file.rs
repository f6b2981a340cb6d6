//! YAML rule files.
//!
//! One file per table rule. Files are discovered in a directory, sorted by
//! file name, and keyed by their stem so `10_users.yaml` runs before
//! `20_posts.yaml` and shows up as `users`.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::{AppendPredicate, RuleConfig, RuleSet, TableRule};
use crate::convert::{
    coerce_integer, default_datetime_offset, format_value, ConversionStep, FieldType,
};
use crate::core::value::SourceRow;
use crate::error::{MigrateError, Result};

/// A scalar YAML value read as text (`62` and `"62"` are the same key).
///
/// Zero-filled values such as `007` are strings in YAML 1.2 and keep their
/// zeros, so they match raw source keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Bool(bool),
    Str(String),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Int(v) => v.to_string(),
            Scalar::Bool(v) => v.to_string(),
            Scalar::Str(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleFile {
    old_table: String,
    new_table: String,
    #[serde(default = "default_primary_key")]
    old_primary_key: String,
    #[serde(default = "default_primary_key")]
    new_primary_key: String,
    #[serde(default)]
    skip: Vec<Scalar>,
    #[serde(default)]
    config: RuleConfig,
    #[serde(default)]
    append: Option<AppendSpec>,
    #[serde(default)]
    steps: Vec<StepSpec>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AppendSpec {
    old_pk_in: Option<Vec<Scalar>>,
    old_pk_between: Option<(i64, i64)>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepSpec {
    convert: Option<ConvertSpec>,
    foreign_key: Option<ForeignKeySpec>,
    literal: Option<LiteralSpec>,
    value_map: Option<ValueMapSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConvertSpec {
    #[serde(rename = "type")]
    kind: String,
    field: String,
    to: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ForeignKeySpec {
    field: String,
    table: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LiteralSpec {
    field: String,
    value: Scalar,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ValueMapSpec {
    field: String,
    to: Option<String>,
    values: HashMap<Scalar, Scalar>,
    default: Option<Scalar>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Parse a rule from YAML text.
pub fn from_yaml(yaml: &str) -> Result<TableRule> {
    let file: RuleFile = serde_yaml::from_str(yaml)?;
    build_rule(file)
}

/// Load a rule from a file.
pub fn load_file(path: &Path) -> Result<TableRule> {
    let content = fs::read_to_string(path)?;
    from_yaml(&content).map_err(|e| with_context(e, &path.display()))
}

/// Prefix a rule error with where it was found.
fn with_context(err: MigrateError, context: &dyn std::fmt::Display) -> MigrateError {
    match err {
        MigrateError::Yaml(e) => MigrateError::Config(format!("{}: {}", context, e)),
        MigrateError::Config(msg) => MigrateError::Config(format!("{}: {}", context, msg)),
        other => other,
    }
}

/// List rule files in a directory, sorted by file name.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_rule = path.is_file()
            && matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
        if is_rule {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Load every rule file in a directory into an ordered rule set.
pub fn load_dir(dir: &Path) -> Result<RuleSet> {
    let files = discover(dir)?;
    if files.is_empty() {
        return Err(MigrateError::Config(format!(
            "no rule files (*.yaml, *.yml) found in {}",
            dir.display()
        )));
    }

    let mut rules = RuleSet::new();
    for path in files {
        let key = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| MigrateError::Config(format!("invalid rule file name: {}", path.display())))?
            .to_string();
        debug!("Loading rule {} from {}", key, path.display());
        let rule = load_file(&path)?;
        rules.insert(key, rule)?;
    }
    Ok(rules)
}

fn build_rule(file: RuleFile) -> Result<TableRule> {
    let mut rule = TableRule::new(file.old_table, file.new_table)
        .with_primary_keys(file.old_primary_key, file.new_primary_key)
        .with_skip(file.skip.into_iter().map(Scalar::into_string))
        .with_config(file.config);

    if let Some(append) = file.append {
        let predicate = build_append(append, &rule.old_primary_key)?;
        rule = rule.with_append(predicate);
    }

    for (index, step) in file.steps.into_iter().enumerate() {
        let step = build_step(step, &rule.old_table)
            .map_err(|e| with_context(e, &format!("step {}", index + 1)))?;
        rule.steps.push(step);
    }

    rule.validate()?;
    Ok(rule)
}

fn build_append(spec: AppendSpec, old_pk: &str) -> Result<AppendPredicate> {
    let old_pk = old_pk.to_string();
    match (spec.old_pk_in, spec.old_pk_between) {
        (None, None) => Ok(AppendPredicate::always()),
        (Some(values), None) => {
            let values: HashSet<String> = values.into_iter().map(Scalar::into_string).collect();
            let label = format!("{} in {} values", old_pk, values.len());
            Ok(AppendPredicate::new(label, move |old: &SourceRow, _| {
                let pk = old.get(&old_pk).and_then(|v| v.as_deref()).unwrap_or("");
                values.contains(pk)
            }))
        }
        (None, Some((low, high))) => {
            if low > high {
                return Err(MigrateError::Config(format!(
                    "append.old_pk_between: {} is greater than {}",
                    low, high
                )));
            }
            let label = format!("{} between {} and {}", old_pk, low, high);
            Ok(AppendPredicate::new(label, move |old: &SourceRow, _| {
                old.get(&old_pk)
                    .and_then(|v| v.as_deref())
                    .and_then(|v| coerce_integer(v).parse::<i64>().ok())
                    .is_some_and(|pk| (low..=high).contains(&pk))
            }))
        }
        (Some(_), Some(_)) => Err(MigrateError::Config(
            "append accepts either old_pk_in or old_pk_between, not both".to_string(),
        )),
    }
}

fn parse_kind(kind: Option<String>) -> Result<FieldType> {
    kind.map_or(Ok(FieldType::String), |k| k.parse())
}

fn build_step(spec: StepSpec, table: &str) -> Result<ConversionStep> {
    let named = [
        spec.convert.is_some(),
        spec.foreign_key.is_some(),
        spec.literal.is_some(),
        spec.value_map.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();
    if named != 1 {
        return Err(MigrateError::Config(
            "a step must name exactly one of convert, foreign_key, literal, value_map".to_string(),
        ));
    }

    if let Some(convert) = spec.convert {
        let kind: FieldType = convert.kind.parse()?;
        return Ok(match convert.to {
            Some(to) => ConversionStep::convert_as(kind, convert.field, to),
            None => ConversionStep::convert(kind, convert.field),
        });
    }

    if let Some(fk) = spec.foreign_key {
        return Ok(ConversionStep::foreign_key(fk.field, fk.table));
    }

    if let Some(literal) = spec.literal {
        let kind = parse_kind(literal.kind)?;
        let value = literal.value.into_string();
        // Reject bad literals at load time; render per row at the run's offset.
        format_value(kind, default_datetime_offset(), table, &literal.field, Some(&value))?;
        let field = literal.field;
        let table = table.to_string();
        return Ok(ConversionStep::custom(format!("literal {}", field), move |ctx| {
            let formatted = format_value(kind, ctx.datetime_offset, &table, &field, Some(&value))?;
            ctx.new.insert(field.as_str(), formatted);
            Ok(())
        }));
    }

    let map = spec
        .value_map
        .ok_or_else(|| MigrateError::Config("empty step".to_string()))?;
    let kind = parse_kind(map.kind)?;
    let values: HashMap<String, String> = map
        .values
        .into_iter()
        .map(|(k, v)| (k.into_string(), v.into_string()))
        .collect();
    let default = map.default.map(Scalar::into_string);
    let target = map.to.unwrap_or_else(|| map.field.clone());
    let field = map.field;
    let table = table.to_string();
    Ok(ConversionStep::custom(
        format!("value_map {} -> {}", field, target),
        move |ctx| {
            let source = ctx.old_value(&field).unwrap_or("");
            let mapped = values
                .get(source)
                .or(default.as_ref())
                .map_or(source, String::as_str);
            let literal = format_value(kind, ctx.datetime_offset, &table, &field, Some(mapped))?;
            ctx.new.insert(target.as_str(), literal);
            Ok(())
        },
    ))
}
