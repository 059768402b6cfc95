use regex::Regex;
use std::sync::LazyLock;

use crate::models::{ItemBody, QueueItem};

static TEMPLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("valid placeholder pattern"));

const KNOWN: &[&str] = &["item_id", "kind", "form_id", "stop_id"];

/// Replace {{placeholder}} segments in an endpoint path with values from the item.
/// Unknown or missing values render as empty.
pub fn render(template: &str, item: &QueueItem) -> String {
    TEMPLATE_RE
        .replace_all(template, |caps: &regex::Captures| {
            resolve(&caps[1], item).unwrap_or_default()
        })
        .to_string()
}

/// Reject templates that reference placeholders `render` cannot fill.
pub fn validate(template: &str) -> Result<(), String> {
    for caps in TEMPLATE_RE.captures_iter(template) {
        let name = &caps[1];
        if !KNOWN.contains(&name) {
            return Err(format!("unknown placeholder {{{{{name}}}}} in '{template}'"));
        }
    }
    Ok(())
}

fn resolve(name: &str, item: &QueueItem) -> Option<String> {
    match (name, &item.body) {
        ("item_id", _) => Some(item.id.to_string()),
        ("kind", _) => Some(item.kind().to_string()),
        ("form_id", ItemBody::Submission(p)) => Some(p.form_id.to_string()),
        ("stop_id", ItemBody::Submission(p)) => p.stop_id.map(|id| id.to_string()),
        _ => None,
    }
}
