use crate::config::EngineConfig;
use crate::core::{display_value, DocumentProvider, FormulaEngine};
use crate::document::{describe_value, parse_value_text, value_to_json, Document, Field};
use crate::error::{DocumentError, DocumentResult, FormulaResult};
use crate::types::Value;
use colored::Colorize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn load_config(config: Option<&Path>) -> DocumentResult<EngineConfig> {
    match config {
        Some(path) => EngineConfig::load(path),
        None => Ok(EngineConfig::default()),
    }
}

/// Split `id=value` from `--set`
fn parse_assignment(text: &str) -> DocumentResult<(String, Value)> {
    let (id, value) = text.split_once('=').ok_or_else(|| {
        DocumentError::Validation(format!("Expected id=value, got '{}'", text))
    })?;
    let id = id.trim();
    if id.is_empty() {
        return Err(DocumentError::Validation(format!(
            "Missing field id in '{}'",
            text
        )));
    }
    Ok((id.to_string(), parse_value_text(value.trim())))
}

/// Execute the evaluate command
pub fn evaluate(
    file: PathBuf,
    sets: Vec<String>,
    config: Option<PathBuf>,
    format: OutputFormat,
) -> DocumentResult<()> {
    let config = load_config(config.as_deref())?;
    let assignments = sets
        .iter()
        .map(|s| parse_assignment(s))
        .collect::<DocumentResult<Vec<_>>>()?;

    let document = Document::load(&file)?;
    let mut engine = FormulaEngine::with_config(document, config);
    let mut results = engine.evaluate_all();

    for (id, value) in assignments {
        if !engine.provider().has_field(&id) {
            return Err(DocumentError::Validation(format!("Unknown field '{}'", id)));
        }
        results.extend(engine.update_value(&id, value));
    }

    // Under the lazy policy updated formulas are still dirty; reading computes them
    for id in engine.provider().all_formula_field_identifiers() {
        let result = engine.value(&id);
        results.insert(id, result);
    }

    match format {
        OutputFormat::Json => print_fields_json(engine.provider(), &results),
        OutputFormat::Text => print_fields_text(&file, engine.provider(), &results),
    }
    Ok(())
}

/// Formula fields show their latest result, other fields their stored value
fn shown_value(field: &Field, results: &BTreeMap<String, FormulaResult<Value>>) -> Value {
    match results.get(&field.id) {
        Some(result) => display_value(result, field.kind),
        None => field.value.clone(),
    }
}

fn print_fields_text(
    file: &Path,
    document: &Document,
    results: &BTreeMap<String, FormulaResult<Value>>,
) {
    println!("{}", "🔥 FieldForge - Evaluating formulas".bold().green());
    println!("   File: {}", file.display());
    println!();
    println!("{}", "✅ Field values:".bold().green());

    for field in document.fields() {
        let shown = describe_value(&shown_value(field, results));
        match results.get(&field.id) {
            Some(Err(err)) => println!(
                "   {} = {}  {}",
                field.id.bright_blue(),
                shown.bold(),
                format!("⚠️  {}", err).red()
            ),
            Some(Ok(_)) => println!(
                "   {} = {}  {}",
                field.id.bright_blue(),
                shown.bold(),
                "(formula)".dimmed()
            ),
            None => println!("   {} = {}", field.id.bright_blue(), shown),
        }
    }
    println!();
}

fn print_fields_json(
    document: &Document,
    results: &BTreeMap<String, FormulaResult<Value>>,
) {
    let mut fields = serde_json::Map::new();
    for field in document.fields() {
        fields.insert(field.id.clone(), value_to_json(&shown_value(field, results)));
    }
    let errors: serde_json::Map<String, serde_json::Value> = results
        .iter()
        .filter_map(|(id, result)| {
            result
                .as_ref()
                .err()
                .map(|err| (id.clone(), serde_json::Value::String(err.to_string())))
        })
        .collect();

    let output = serde_json::json!({ "fields": fields, "errors": errors });
    println!(
        "{}",
        serde_json::to_string_pretty(&output).unwrap_or_else(|_| output.to_string())
    );
}

/// Execute the graph command - show dependencies, recompute order and cycles
pub fn graph(file: PathBuf, config: Option<PathBuf>) -> DocumentResult<()> {
    let config = load_config(config.as_deref())?;
    let document = Document::load(&file)?;
    let engine = FormulaEngine::with_config(document, config);
    let graph = engine.graph();

    println!("{}", "🔍 FieldForge - Dependency graph".bold().green());
    println!("   File: {}\n", file.display());

    let formulas = graph.formula_fields();
    println!("{}", "📋 Formula fields:".bold().cyan());
    for id in &formulas {
        let join = |set: Option<&BTreeSet<String>>| {
            set.map(|s| s.iter().cloned().collect::<Vec<_>>().join(", "))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "-".to_string())
        };
        println!("   {}", id.bright_blue().bold());
        println!("      uses:    {}", join(graph.precedents(id)));
        println!("      used by: {}", join(graph.dependents(id)));
    }
    println!();

    println!("{}", "🧮 Recompute order:".bold().cyan());
    for (step, component) in graph.components_in_order(&formulas).iter().enumerate() {
        let names = component.join(", ");
        if graph.is_cyclic(component) {
            println!("   {}. {} {}", step + 1, names, "(cycle)".red());
        } else {
            println!("   {}. {}", step + 1, names);
        }
    }
    println!();

    let cycles = graph.find_cycles();
    if cycles.is_empty() {
        println!("{}", "✅ No circular references".green());
    } else {
        println!("{}", "❌ Circular references:".bold().red());
        for cycle in cycles {
            println!("   {}", cycle.join(" -> ").red());
        }
    }
    Ok(())
}

/// Execute the eval command - evaluate one expression against the document
pub fn eval(
    file: PathBuf,
    expression: String,
    config: Option<PathBuf>,
    format: OutputFormat,
) -> DocumentResult<()> {
    let config = load_config(config.as_deref())?;
    let document = Document::load(&file)?;
    let mut engine = FormulaEngine::with_config(document, config);

    let value = engine.evaluate_expression(&expression)?;
    match format {
        OutputFormat::Json => println!("{}", value_to_json(&value)),
        OutputFormat::Text => println!("{}", describe_value(&value)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("age=18").unwrap(),
            ("age".to_string(), Value::Number(18.0))
        );
        assert_eq!(
            parse_assignment("gender = Female").unwrap(),
            ("gender".to_string(), Value::from("Female"))
        );
        assert!(parse_assignment("age").is_err());
        assert!(parse_assignment("=3").is_err());
    }
}
