use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result};
use colored::Colorize;
use kgfl_session::{ApiRequest, EntityKind, SessionContext};
use serde_json::Value;

use crate::cli::{OutputFormat, WriteMethod};
use crate::output::{print_success, print_value};

fn read_body(file: Option<&str>) -> Result<Value> {
    let content = match file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}"))?
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            buf
        }
    };
    serde_json::from_str(&content).context("Invalid JSON body")
}

/// Kinds announced after the write: the explicit ones, then the inferred one.
pub fn affected_kinds(path: &str, explicit: &[String]) -> Vec<EntityKind> {
    let mut kinds: Vec<EntityKind> = Vec::new();
    let explicit = explicit
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| EntityKind::new(k.to_ascii_lowercase()));
    for kind in explicit.chain(EntityKind::from_path(path)) {
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    kinds
}

pub async fn send(
    ctx: &SessionContext,
    method: WriteMethod,
    path: &str,
    file: Option<&str>,
    invalidate: &[String],
    format: OutputFormat,
) -> Result<()> {
    if !path.starts_with('/') {
        anyhow::bail!("API path must start with '/': {path}");
    }
    let request = match method {
        WriteMethod::Post => ApiRequest::post(path).json(read_body(file)?),
        WriteMethod::Put => ApiRequest::put(path).json(read_body(file)?),
        WriteMethod::Patch => ApiRequest::patch(path).json(read_body(file)?),
        WriteMethod::Delete => ApiRequest::delete(path),
    };

    let kinds = affected_kinds(path, invalidate);
    let response = ctx.mutator().execute(request, kinds.clone()).await?;

    let published: Vec<String> = kinds.iter().map(ToString::to_string).collect();
    print_success(&format!(
        "{} {} ({}), invalidated: {}",
        format!("{method:?}").to_uppercase(),
        path.cyan(),
        response.status(),
        if published.is_empty() {
            "nothing".to_string()
        } else {
            published.join(", ")
        }
    ));
    if !response.text().trim().is_empty() {
        print_value(&response.json_value()?, format);
    }
    Ok(())
}
