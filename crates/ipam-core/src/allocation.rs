//! Allocation records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

/// State of an address within its pool
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStatus {
    /// Free to hand out (also the state of a released record)
    #[default]
    Available,
    /// Handed out to a device
    Allocated,
    /// Administratively withheld from automatic allocation
    Reserved,
}

impl AllocationStatus {
    /// Allocated and reserved addresses block new allocations
    pub fn is_held(self) -> bool {
        matches!(self, AllocationStatus::Allocated | AllocationStatus::Reserved)
    }
}

/// One address and who holds it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressAllocation {
    pub id: Uuid,
    pub address: IpAddr,
    pub pool_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_ref: Option<String>,
    pub status: AllocationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl AddressAllocation {
    /// A fresh `Allocated` record stamped with the current time
    pub fn allocated(address: IpAddr, pool_id: &str, request: &AllocationRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            address,
            pool_id: pool_id.to_string(),
            device_ref: request.device_ref.clone(),
            status: AllocationStatus::Allocated,
            allocated_at: Some(Utc::now()),
            expires_at: request.expires_at,
            notes: request.notes.clone(),
        }
    }

    /// A `Reserved` record (no device, no expiry)
    pub fn reserved(address: IpAddr, pool_id: &str, notes: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            address,
            pool_id: pool_id.to_string(),
            device_ref: None,
            status: AllocationStatus::Reserved,
            allocated_at: None,
            expires_at: None,
            notes,
        }
    }

    /// Whether the record carries an expiry at or before `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == AllocationStatus::Allocated && self.expires_at.is_some_and(|at| at <= now)
    }

    /// Turn the record back into a free one, dropping owner, timestamps and notes
    pub(crate) fn clear(&mut self) {
        self.status = AllocationStatus::Available;
        self.device_ref = None;
        self.allocated_at = None;
        self.expires_at = None;
        self.notes = None;
    }
}

/// Parameters of an allocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocationRequest {
    #[serde(default)]
    pub device_ref: Option<String>,
    /// Specific address to take instead of the first free one
    #[serde(default)]
    pub preferred_address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Free addresses of a pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailableAddresses {
    pub pool_id: String,
    /// Ascending, at most the requested limit
    pub addresses: Vec<IpAddr>,
    pub total_available: u128,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&AllocationStatus::Allocated).unwrap(), "\"allocated\"");
        assert!(AllocationStatus::Reserved.is_held());
        assert!(!AllocationStatus::Available.is_held());
    }

    #[test]
    fn test_clear_resets_ownership() {
        let request = AllocationRequest {
            device_ref: Some("vm-42".to_string()),
            notes: Some("web tier".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            ..Default::default()
        };
        let mut record = AddressAllocation::allocated("10.0.0.5".parse().unwrap(), "lab", &request);
        assert_eq!(record.status, AllocationStatus::Allocated);
        assert!(record.allocated_at.is_some());

        record.clear();
        assert_eq!(record.status, AllocationStatus::Available);
        assert_eq!(record.device_ref, None);
        assert_eq!(record.allocated_at, None);
        assert_eq!(record.expires_at, None);
        assert_eq!(record.notes, None);
    }

    #[test]
    fn test_expiry_only_applies_to_allocated_records() {
        let past = Utc::now() - Duration::minutes(5);
        let request = AllocationRequest {
            expires_at: Some(past),
            ..Default::default()
        };
        let mut record = AddressAllocation::allocated("10.0.0.5".parse().unwrap(), "lab", &request);
        assert!(record.is_expired(Utc::now()));
        record.clear();
        assert!(!record.is_expired(Utc::now()));
    }
}
