//! PAN-OS models
//!
//! Commit jobs as reported by `<show><jobs><id>N</id></jobs></show>` and the
//! static-route entries we stage under a virtual router.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};

/// Device name PAN-OS uses for the local firewall in config XPaths
pub const LOCAL_DEVICE: &str = "localhost.localdomain";

/// Lifecycle of a commit job on the device
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    /// Queued (`PEND`)
    #[default]
    Pending,
    /// Being applied (`ACT`)
    Running,
    /// `FIN` with result `OK`
    FinishedOk,
    /// `FIN` with any other result
    FinishedError,
}

impl JobStatus {
    /// Map the raw `<status>` and `<result>` values of a job report
    pub fn from_report(status: &str, result: Option<&str>) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "FIN" => match result.map(|r| r.trim().to_ascii_uppercase()) {
                Some(r) if r == "OK" => JobStatus::FinishedOk,
                _ => JobStatus::FinishedError,
            },
            "ACT" => JobStatus::Running,
            _ => JobStatus::Pending,
        }
    }

    /// Whether the job will not change state again
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::FinishedOk | JobStatus::FinishedError)
    }
}

/// Snapshot of a commit job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitJob {
    /// Device job identifier (0 when the device committed without queueing a job)
    pub job_id: u64,
    pub status: JobStatus,
    /// Percent complete, as reported by the device
    #[serde(default)]
    pub progress: u8,
    /// Device-supplied details, joined line by line
    #[serde(default)]
    pub details: String,
}

impl CommitJob {
    /// A commit the device applied synchronously (no job id in the response)
    pub fn immediate() -> Self {
        Self {
            job_id: 0,
            status: JobStatus::FinishedOk,
            progress: 100,
            details: String::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::FinishedOk
    }
}

/// Host route staged under a virtual router's static-route table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StaticRoute {
    /// Entry name, also the association key on our side
    pub name: String,
    /// Destination in CIDR form, e.g. `10.1.2.3/32`
    pub destination: String,
    /// Next-hop IP address
    pub next_hop: String,
    /// Egress interface, when the route must be pinned to one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    pub metric: u32,
}

impl StaticRoute {
    /// XPath of this entry under `virtual_router`
    pub fn xpath(&self, virtual_router: &str) -> String {
        static_route_xpath(virtual_router, &self.name)
    }

    /// Element payload for `action=set`
    pub fn to_element(&self) -> String {
        let mut xml = String::new();
        xml.push_str("<nexthop><ip-address>");
        xml.push_str(&escape(&self.next_hop));
        xml.push_str("</ip-address></nexthop>");
        xml.push_str("<bfd><profile>None</profile></bfd>");
        if let Some(interface) = &self.interface {
            xml.push_str("<interface>");
            xml.push_str(&escape(interface));
            xml.push_str("</interface>");
        }
        xml.push_str(&format!("<metric>{}</metric>", self.metric));
        xml.push_str("<destination>");
        xml.push_str(&escape(&self.destination));
        xml.push_str("</destination>");
        xml.push_str("<route-table><unicast/></route-table>");
        xml
    }

    /// Parse an entry read back from the device (either the bare element
    /// payload or a full `<entry name=...>` node).
    pub fn from_element(name: &str, xml: &str) -> Result<Self, GatewayError> {
        let wrapped = format!("<root>{}</root>", xml);
        let doc = roxmltree::Document::parse(&wrapped)?;
        let text_of = |parent: Option<&str>, tag: &str| -> Option<String> {
            doc.descendants()
                .filter(|n| n.has_tag_name(tag))
                .find(|n| match parent {
                    Some(p) => n.parent().is_some_and(|up| up.has_tag_name(p)),
                    None => true,
                })
                .and_then(|n| n.text())
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
        };

        let destination = text_of(None, "destination")
            .ok_or_else(|| GatewayError::Xml(format!("route {} has no destination", name)))?;
        let next_hop = text_of(Some("nexthop"), "ip-address")
            .ok_or_else(|| GatewayError::Xml(format!("route {} has no next-hop address", name)))?;
        let metric = match text_of(None, "metric") {
            Some(raw) => raw
                .parse()
                .map_err(|_| GatewayError::Xml(format!("route {} has invalid metric {:?}", name, raw)))?,
            None => 10,
        };

        Ok(Self {
            name: name.to_string(),
            destination,
            next_hop,
            interface: text_of(None, "interface"),
            metric,
        })
    }

    /// Same forwarding parameters (name aside)
    pub fn same_parameters(&self, other: &StaticRoute) -> bool {
        self.destination == other.destination
            && self.next_hop == other.next_hop
            && self.interface == other.interface
            && self.metric == other.metric
    }
}

/// XPath of a named static route in a virtual router
pub fn static_route_xpath(virtual_router: &str, name: &str) -> String {
    format!(
        "/config/devices/entry[@name='{}']/network/virtual-router/entry[@name='{}']/routing-table/ip/static-route/entry[@name='{}']",
        LOCAL_DEVICE, virtual_router, name
    )
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
