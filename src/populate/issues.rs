use std::time::Duration;

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde_json::Value;

use super::{PopulateContext, Populator, Table};

/// Issues are fetched in windows of this many keys per search request.
const KEY_WINDOW: u64 = 1000;
const PAGE_SIZE: u64 = 100;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloads the project's issues from its tracker's REST search endpoint,
/// walking the key space in fixed windows up to the newest issue key.
pub struct IssuesPopulator;

impl Populator for IssuesPopulator {
    fn table(&self) -> Table {
        Table::Issues
    }

    fn generate(&mut self, ctx: &PopulateContext<'_>) -> Result<()> {
        // The backup is written even when there is nothing to fetch, so LOAD
        // always has a file to read for this project.
        let mut writer = ctx.backups.create_csv(&ctx.project.name, self.table().name())?;

        if !ctx.project.has_issue_tracker() {
            log::info!("{}: no issue tracker configured", ctx.project.name);
            writer.finish()?;
            return Ok(());
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(HTTP_TIMEOUT)
            .build();
        let base = ctx.project.issue_url.trim_end_matches('/').to_string();
        let prefix = ctx.project.issue_key_prefix();
        let moved_key = Regex::new(&format!(r"{}-(\d+)", regex::escape(&prefix)))?;

        let Some(newest) = newest_key_number(&agent, &base, &prefix)? else {
            log::info!("{}: tracker has no issues", ctx.project.name);
            writer.finish()?;
            return Ok(());
        };

        let mut count = 0usize;
        harvest_keyspace(newest, |lo, hi| {
            let issues = fetch_window(&agent, &base, &prefix, &moved_key, lo, hi)?;
            for issue in &issues {
                writer.write_record(issue_record(&ctx.project.name, issue))?;
                count += 1;
            }
            Ok(())
        })?;

        writer.finish()?;
        log::info!("{}: fetched {count} issues (newest key {newest})", ctx.project.name);
        Ok(())
    }
}

/// Highest key number the tracker knows for this project, from its most
/// recently created issue.
fn newest_key_number(agent: &ureq::Agent, base: &str, prefix: &str) -> Result<Option<u64>> {
    let page: Value = agent
        .get(&format!("{base}/rest/api/2/search"))
        .query("jql", &format!("project = {prefix} ORDER BY created DESC"))
        .query("maxResults", "1")
        .query("fields", "key")
        .call()
        .with_context(|| format!("failed to query newest issue of {prefix}"))?
        .into_json()
        .context("malformed tracker response")?;

    Ok(page["issues"]
        .as_array()
        .and_then(|issues| issues.first())
        .and_then(|issue| issue["key"].as_str())
        .and_then(key_number))
}

/// `FOO-4711` → 4711.
fn key_number(key: &str) -> Option<u64> {
    key.rsplit_once('-').and_then(|(_, number)| number.parse().ok())
}

/// Walk the key space in fixed windows up to `newest`, inclusive. Windows
/// with no issues are skipped over rather than ending the walk; the callback
/// may widen its window (moved-issue recovery), and the next window starts
/// after whatever bound it settled on.
fn harvest_keyspace<F>(newest: u64, mut fetch: F) -> Result<()>
where
    F: FnMut(&mut u64, &mut u64) -> Result<()>,
{
    let mut lo = 1u64;
    while lo <= newest {
        let mut hi = lo + KEY_WINDOW - 1;
        fetch(&mut lo, &mut hi)?;
        lo = hi + 1;
    }
    Ok(())
}

/// All issues whose key number lies in `[lo, hi]`, across however many pages
/// the tracker needs. A moved issue at a window edge makes the tracker reject
/// the whole search with a 400; the window bounds are nudged past it and the
/// search retried.
fn fetch_window(
    agent: &ureq::Agent,
    base: &str,
    prefix: &str,
    moved_key: &Regex,
    lo: &mut u64,
    hi: &mut u64,
) -> Result<Vec<Value>> {
    loop {
        match fetch_pages(agent, base, prefix, *lo, *hi) {
            Ok(issues) => return Ok(issues),
            Err(FetchError::MovedIssue(body)) => {
                let moved = moved_key
                    .captures(&body)
                    .and_then(|caps| caps[1].parse::<u64>().ok())
                    .with_context(|| format!("unrecognized tracker rejection: {body}"))?;
                let Some((new_lo, new_hi)) = adjust_window(moved, *lo, *hi) else {
                    bail!("issue {prefix}-{moved} inside window {lo}..{hi} was moved; cannot recover");
                };
                log::warn!(
                    "issue {prefix}-{moved} was moved; retrying window as {new_lo}..{new_hi}"
                );
                *lo = new_lo;
                *hi = new_hi;
            }
            Err(FetchError::Other(err)) => return Err(err),
        }
    }
}

enum FetchError {
    /// HTTP 400 whose body names a moved issue key.
    MovedIssue(String),
    Other(anyhow::Error),
}

fn fetch_pages(
    agent: &ureq::Agent,
    base: &str,
    prefix: &str,
    lo: u64,
    hi: u64,
) -> Result<Vec<Value>, FetchError> {
    let jql = format!("key >= {prefix}-{lo} AND key <= {prefix}-{hi} ORDER BY key ASC");
    let mut issues = Vec::new();
    let mut start_at = 0u64;

    loop {
        let page: Value = agent
            .get(&format!("{base}/rest/api/2/search"))
            .query("jql", &jql)
            .query("startAt", &start_at.to_string())
            .query("maxResults", &PAGE_SIZE.to_string())
            .call()
            .map_err(|err| match err {
                ureq::Error::Status(400, response) => {
                    FetchError::MovedIssue(response.into_string().unwrap_or_default())
                }
                other => FetchError::Other(other.into()),
            })?
            .into_json()
            .map_err(|err| FetchError::Other(err.into()))?;

        let batch = page["issues"].as_array().cloned().unwrap_or_default();
        let total = page["total"].as_u64().unwrap_or(0);
        start_at += batch.len() as u64;
        let done = batch.is_empty() || start_at >= total;
        issues.extend(batch);
        if done {
            return Ok(issues);
        }
    }
}

/// New window bounds after `moved` was reported moved, or `None` when the
/// moved issue sits strictly inside the window and the search cannot be
/// salvaged by shifting the edges.
fn adjust_window(moved: u64, lo: u64, hi: u64) -> Option<(u64, u64)> {
    if moved == lo {
        Some((lo + 1, hi + 1))
    } else if moved == hi {
        Some((lo, hi + 1))
    } else {
        None
    }
}

/// Flattens one tracker issue into the backup record shape.
fn issue_record(project: &str, issue: &Value) -> Vec<String> {
    let fields = &issue["fields"];
    vec![
        project.to_string(),
        text(&issue["key"]),
        date(&fields["created"]),
        date(&fields["resolutiondate"]),
        date(&fields["updated"]),
        date(&fields["duedate"]),
        text(&fields["resolution"]["name"]),
        text(&fields["issuetype"]["name"]),
        text(&fields["priority"]["name"]),
        names(&fields["fixVersions"]),
        names(&fields["versions"]),
        number(&fields["timespent"]),
        number(&fields["aggregatetimespent"]),
        number(&fields["timeestimate"]),
        number(&fields["aggregatetimeestimate"]),
        number(&fields["progress"]["percent"]),
        text(&fields["description"]),
        text(&fields["summary"]),
        number(&fields["watches"]["watchCount"]),
        number(&fields["votes"]["votes"]),
        text(&fields["creator"]["displayName"]),
        text(&fields["assignee"]["displayName"]),
        text(&fields["reporter"]["displayName"]),
    ]
}

fn text(value: &Value) -> String {
    value.as_str().unwrap_or("").to_string()
}

fn number(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Joined `name` fields of an array of versions.
fn names(value: &Value) -> String {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["name"].as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

/// Tracker dates arrive as ISO-8601 with milliseconds and offset; store them
/// in the same format the git-derived tables use.
fn date(value: &Value) -> String {
    let Some(raw) = value.as_str() else {
        return String::new();
    };
    match chrono::DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.3f%z")
        .or_else(|_| chrono::DateTime::parse_from_rfc3339(raw))
    {
        Ok(parsed) => parsed.format("%Y-%m-%d %H:%M:%S").to_string(),
        // Date-only fields like duedate carry no time component.
        Err(_) => raw.to_string(),
    }
}
