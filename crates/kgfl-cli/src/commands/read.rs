use anyhow::{Context, Result};
use kgfl_session::endpoints::{self, ConsumerQuery};
use kgfl_session::{ApiRequest, EntityKind, FetchOutcome, SessionContext};
use serde_json::Value;
use tracing::debug;

use crate::cli::OutputFormat;
use crate::output::print_value;

/// Names accepted by `kgfl get` besides raw paths.
pub const NAMED_TARGETS: &[&str] = &[
    "clubs",
    "table",
    "players",
    "top-scorers",
    "matches",
    "transfers",
    "seasons",
    "referees",
    "management",
    "media",
];

fn named_query(name: &str) -> Option<ConsumerQuery> {
    let query = match name {
        "clubs" => endpoints::clubs(),
        "table" => endpoints::league_table(None),
        "players" => endpoints::players(),
        "top-scorers" => endpoints::top_scorers(),
        "matches" => endpoints::matches(),
        "transfers" => endpoints::transfers(),
        "seasons" => endpoints::seasons(),
        "referees" => endpoints::referees(),
        "management" => endpoints::management(),
        "media" => endpoints::media(),
        _ => return None,
    };
    Some(query)
}

pub fn resolve_target(target: &str, params: &[String]) -> Result<ConsumerQuery> {
    let mut query = match named_query(target) {
        Some(query) => query,
        None if target.starts_with('/') => ConsumerQuery::new(
            ApiRequest::get(target),
            EntityKind::from_path(target),
        ),
        None => anyhow::bail!(
            "Unknown target \"{target}\". Use an API path starting with '/' or one of: {}",
            NAMED_TARGETS.join(", ")
        ),
    };
    for param in params {
        let (key, value) = param
            .split_once('=')
            .with_context(|| format!("Invalid parameter \"{param}\". Expected key=value"))?;
        query.request = query.request.query(key, value);
    }
    Ok(query)
}

pub async fn get(
    ctx: &SessionContext,
    target: &str,
    params: &[String],
    format: OutputFormat,
) -> Result<()> {
    let query = resolve_target(target, params)?;
    debug!(path = %query.request.path(), kinds = ?query.kinds, "Reading");
    let consumer = ctx.consumer::<Value>(query);

    match consumer.refresh().await {
        FetchOutcome::Applied => {
            let value = consumer.result().unwrap_or(Value::Null);
            print_value(&value, format);
            Ok(())
        }
        _ => match consumer.state().error {
            Some(e) => Err(anyhow::anyhow!("{e}")),
            None => anyhow::bail!("Read of {target} did not complete"),
        },
    }
}
