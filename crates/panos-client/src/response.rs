//! PAN-OS XML API response parsing
//!
//! Every API call answers with `<response status="success|error" code="N">`.
//! These helpers pull out the handful of values the client cares about and
//! turn `status="error"` into [`GatewayError::Api`].

use crate::error::GatewayError;
use crate::models::{CommitJob, JobStatus};
use roxmltree::{Document, Node};

/// PAN-OS response code for "object doesn't exist"
const CODE_OBJECT_MISSING: &str = "7";

/// Parse a response document and fail on `status="error"`
pub(crate) fn parse_success(body: &str) -> Result<Document<'_>, GatewayError> {
    let doc = Document::parse(body)?;
    let root = doc.root_element();
    if !root.has_tag_name("response") {
        return Err(GatewayError::Xml(format!(
            "expected <response>, got <{}>",
            root.tag_name().name()
        )));
    }
    match root.attribute("status") {
        Some("success") => Ok(doc),
        status => Err(GatewayError::Api(format!(
            "status={} code={}: {}",
            status.unwrap_or("missing"),
            root.attribute("code").unwrap_or("-"),
            message(root).unwrap_or_else(|| "no message".to_string())
        ))),
    }
}

/// API key from a `type=keygen` response
pub(crate) fn parse_api_key(body: &str) -> Result<String, GatewayError> {
    let doc = parse_success(body).map_err(|e| GatewayError::Authentication(e.to_string()))?;
    first_text(doc.root_element(), "key")
        .ok_or_else(|| GatewayError::Authentication("keygen response carried no key".to_string()))
}

/// Job id from a `type=commit` response, `None` when nothing was queued
pub(crate) fn parse_commit_job_id(body: &str) -> Result<Option<u64>, GatewayError> {
    let doc = parse_success(body)?;
    match first_text(doc.root_element(), "job") {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| GatewayError::Xml(format!("commit job id {:?} is not a number", raw))),
        None => Ok(None),
    }
}

/// Job report from a `<show><jobs><id>N</id></jobs></show>` response
pub(crate) fn parse_job(body: &str, job_id: u64) -> Result<CommitJob, GatewayError> {
    let doc = parse_success(body)?;
    let job = doc
        .descendants()
        .find(|n| n.has_tag_name("job") && n.children().any(|c| c.is_element()))
        .ok_or_else(|| GatewayError::Xml(format!("no report for job {}", job_id)))?;

    let status = child_text(job, "status")
        .ok_or_else(|| GatewayError::Xml(format!("job {} report has no status", job_id)))?;
    let result = child_text(job, "result");
    let progress = child_text(job, "progress")
        .and_then(|p| p.parse::<u8>().ok())
        .unwrap_or(0);
    let details = job
        .children()
        .find(|n| n.has_tag_name("details"))
        .and_then(message)
        .unwrap_or_default();

    Ok(CommitJob {
        job_id,
        status: JobStatus::from_report(&status, result.as_deref()),
        progress,
        details,
    })
}

/// Entry returned by `action=get`, `None` when the object does not exist
pub(crate) fn parse_get_entry(body: &str) -> Result<Option<String>, GatewayError> {
    let doc = Document::parse(body)?;
    let root = doc.root_element();
    if root.attribute("status") != Some("success") {
        if root.attribute("code") == Some(CODE_OBJECT_MISSING) {
            return Ok(None);
        }
        parse_success(body)?;
    }

    let result = match root.children().find(|n| n.has_tag_name("result")) {
        Some(result) => result,
        None => return Ok(None),
    };
    if result.attribute("count") == Some("0") {
        return Ok(None);
    }
    Ok(result
        .children()
        .find(|n| n.is_element())
        .map(|entry| body[entry.range()].to_string()))
}

fn first_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    node.descendants()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// All text below `node`, one trimmed fragment per line
fn message(node: Node<'_, '_>) -> Option<String> {
    let lines: Vec<&str> = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    if lines.is_empty() { None } else { Some(lines.join("; ")) }
}
