use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Lifecycle of a transfer.
///
/// `Pending -> Accepted -> Completed` or `Pending -> Rejected`. Nothing leaves
/// `Completed` or `Rejected`, and nothing re-enters `Pending`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Rejected | TransferStatus::Completed)
    }

    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        matches!(
            (self, next),
            (TransferStatus::Pending, TransferStatus::Accepted)
                | (TransferStatus::Pending, TransferStatus::Rejected)
                | (TransferStatus::Accepted, TransferStatus::Completed)
        )
    }
}

/// Which side of the handoff this node's copy represents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransferDirection {
    Outgoing,
    Incoming,
}

/// One node's copy of a file handoff attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub id: String,
    pub filename: String,
    pub size_bytes: u64,
    pub sender_name: String,
    pub sender_address: String,
    pub receiver_address: String,
    pub status: TransferStatus,
    pub direction: TransferDirection,
    /// Why the byte push failed; set only on `accepted` copies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Transfer metadata carried by the notify-transfer RPC
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferOffer {
    pub id: String,
    pub filename: String,
    pub size_bytes: u64,
    pub sender_name: String,
    pub sender_address: String,
    pub receiver_address: String,
}

/// Body of the transfer-failed RPC
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct TransferFailure {
    pub reason: String,
}

impl Transfer {
    /// New outgoing transfer with a time-ordered id
    pub fn outgoing(
        filename: String,
        size_bytes: u64,
        sender_name: String,
        sender_address: String,
        receiver_address: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            filename,
            size_bytes,
            sender_name,
            sender_address,
            receiver_address,
            status: TransferStatus::Pending,
            direction: TransferDirection::Outgoing,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Receiver-side copy of an offer; always starts pending
    pub fn incoming(offer: TransferOffer) -> Self {
        let now = Utc::now();
        Self {
            id: offer.id,
            filename: offer.filename,
            size_bytes: offer.size_bytes,
            sender_name: offer.sender_name,
            sender_address: offer.sender_address,
            receiver_address: offer.receiver_address,
            status: TransferStatus::Pending,
            direction: TransferDirection::Incoming,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn offer(&self) -> TransferOffer {
        TransferOffer {
            id: self.id.clone(),
            filename: self.filename.clone(),
            size_bytes: self.size_bytes,
            sender_name: self.sender_name.clone(),
            sender_address: self.sender_address.clone(),
            receiver_address: self.receiver_address.clone(),
        }
    }

    /// Apply a status change, refusing anything outside the lifecycle
    pub fn transition(&mut self, next: TransferStatus) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidState(format!(
                "Transfer {} is {}, cannot become {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl TransferOffer {
    /// Basic sanity checks on metadata received from the network
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("Transfer id is required".to_string());
        }
        if !self
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!("Invalid transfer id: {}", self.id));
        }
        if self.filename.trim().is_empty() {
            return Err("Filename is required".to_string());
        }
        if self.sender_address.is_empty() {
            return Err("Sender address is required".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TransferStatus; 4] = [
        TransferStatus::Pending,
        TransferStatus::Accepted,
        TransferStatus::Rejected,
        TransferStatus::Completed,
    ];

    #[test]
    fn test_only_lifecycle_transitions_are_allowed() {
        let allowed = [
            (TransferStatus::Pending, TransferStatus::Accepted),
            (TransferStatus::Pending, TransferStatus::Rejected),
            (TransferStatus::Accepted, TransferStatus::Completed),
        ];

        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_transition_rejects_with_invalid_state() {
        let mut transfer = Transfer::outgoing(
            "a.txt".to_string(),
            3,
            "alice".to_string(),
            "10.0.0.1:8080".to_string(),
            "10.0.0.2:8080".to_string(),
        );
        transfer.transition(TransferStatus::Rejected).unwrap();

        let err = transfer.transition(TransferStatus::Accepted).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(transfer.status, TransferStatus::Rejected);
    }

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!(
            "accepted".parse::<TransferStatus>().unwrap(),
            TransferStatus::Accepted
        );
        assert_eq!(TransferStatus::Completed.to_string(), "completed");
        assert!("done".parse::<TransferStatus>().is_err());
    }

    #[test]
    fn test_incoming_copy_starts_pending() {
        let outgoing = Transfer::outgoing(
            "report.pdf".to_string(),
            1024,
            "alice@laptop".to_string(),
            "10.0.0.1:8080".to_string(),
            "10.0.0.2:8080".to_string(),
        );
        let incoming = Transfer::incoming(outgoing.offer());

        assert_eq!(incoming.id, outgoing.id);
        assert_eq!(incoming.status, TransferStatus::Pending);
        assert_eq!(incoming.direction, TransferDirection::Incoming);
        assert_eq!(incoming.size_bytes, 1024);
    }

    #[test]
    fn test_offer_validation() {
        let mut offer = Transfer::outgoing(
            "x.bin".to_string(),
            1,
            "a".to_string(),
            "10.0.0.1:8080".to_string(),
            "10.0.0.2:8080".to_string(),
        )
        .offer();
        assert!(offer.validate().is_ok());

        offer.id = "../../etc/passwd".to_string();
        assert!(offer.validate().is_err());
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let offer = TransferOffer {
            id: "1".to_string(),
            filename: "f".to_string(),
            size_bytes: 7,
            sender_name: "s".to_string(),
            sender_address: "10.0.0.1:8080".to_string(),
            receiver_address: "10.0.0.2:8080".to_string(),
        };
        let json = serde_json::to_value(&offer).unwrap();
        assert_eq!(json["sizeBytes"], 7);
        assert_eq!(json["senderAddress"], "10.0.0.1:8080");
    }
}
