use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::discovery::PeerClient;
use crate::error::{AppError, AppResult};
use crate::hub::{Event, EventHub};
use crate::models::{DeviceIdentity, Transfer, TransferDirection, TransferOffer, TransferStatus};
use crate::peers::PeerRegistry;
use crate::staging::StagingStore;

/// Owns this node's transfer table and drives the push data path.
///
/// Sender: `initiate` stages bytes and offers them; `accept_remote` pushes
/// them to the receiver; `reject_remote` drops them.
/// Receiver: `notify` records the offer; `accept` asks the sender to push;
/// `receive_upload` stores the bytes; `reject` tells the sender no.
///
/// Every status change and its hub event happen under the table's write
/// lock. Network calls never run while the lock is held.
#[derive(Clone)]
pub struct TransferOrchestrator {
    transfers: Arc<RwLock<HashMap<String, Transfer>>>,
    registry: PeerRegistry,
    hub: EventHub,
    staging: StagingStore,
    inbox: StagingStore,
    client: PeerClient,
    identity: DeviceIdentity,
}

impl TransferOrchestrator {
    pub fn new(
        registry: PeerRegistry,
        hub: EventHub,
        staging: StagingStore,
        inbox: StagingStore,
        client: PeerClient,
        identity: DeviceIdentity,
    ) -> Self {
        Self {
            transfers: Arc::new(RwLock::new(HashMap::new())),
            registry,
            hub,
            staging,
            inbox,
            client,
            identity,
        }
    }

    /// All local copies, newest first
    pub async fn list(&self) -> Vec<Transfer> {
        let mut transfers: Vec<Transfer> = self.transfers.read().await.values().cloned().collect();
        transfers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        transfers
    }

    pub async fn get(&self, id: &str) -> AppResult<Transfer> {
        self.transfers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::not_found(&format!("Transfer {} not found", id)))
    }

    /// Stage `bytes` and offer them to `target` (an address or a display name).
    ///
    /// The local copy stays pending when the receiver cannot be reached; the
    /// error names the transfer so the user can retry by hand.
    pub async fn initiate(&self, filename: &str, bytes: Vec<u8>, target: &str) -> AppResult<Transfer> {
        let filename = sanitize_filename(filename)?;
        let receiver_address = self.resolve_target(target).await?;
        if receiver_address == self.identity.address {
            return Err(AppError::bad_request("Cannot send a file to this node"));
        }

        let transfer = Transfer::outgoing(
            filename,
            bytes.len() as u64,
            self.identity.name.clone(),
            self.identity.address.clone(),
            receiver_address,
        );

        self.staging.put(&transfer.id, &bytes).await?;
        self.transfers
            .write()
            .await
            .insert(transfer.id.clone(), transfer.clone());

        info!(
            transfer_id = %transfer.id,
            filename = %transfer.filename,
            size = transfer.size_bytes,
            receiver = %transfer.receiver_address,
            "Transfer initiated"
        );
        metrics::counter!("lanshare_transfers_total", 1, "event" => "initiated");

        if let Err(e) = self
            .client
            .notify_transfer(&transfer.receiver_address, &transfer.offer())
            .await
        {
            warn!(transfer_id = %transfer.id, "Receiver not notified: {}", e);
            return Err(AppError::Unreachable(format!(
                "Could not reach {} ({}); transfer {} left pending",
                transfer.receiver_address, e, transfer.id
            )));
        }

        Ok(transfer)
    }

    /// Record an incoming offer. Returns `false` for a duplicate.
    pub async fn notify(&self, offer: TransferOffer) -> AppResult<bool> {
        offer.validate().map_err(AppError::BadRequest)?;

        let sender_name = offer.sender_name.clone();
        let sender_address = offer.sender_address.clone();

        {
            let mut transfers = self.transfers.write().await;
            if transfers.contains_key(&offer.id) {
                debug!(transfer_id = %offer.id, "Duplicate offer ignored");
                return Ok(false);
            }

            let transfer = Transfer::incoming(offer);
            info!(
                transfer_id = %transfer.id,
                filename = %transfer.filename,
                sender = %transfer.sender_address,
                "Transfer offered"
            );
            transfers.insert(transfer.id.clone(), transfer.clone());
            self.hub.publish(Event::TransferRequest(transfer)).await;
        }

        // An offer is proof the sender is alive
        self.registry.upsert(&sender_name, &sender_address).await;

        Ok(true)
    }

    /// Receiver accepts; the sender is then asked to push the bytes
    pub async fn accept(&self, id: &str) -> AppResult<Transfer> {
        let transfer = self
            .apply(
                id,
                TransferDirection::Incoming,
                TransferStatus::Accepted,
                Event::TransferAccepted,
            )
            .await?;

        if let Err(e) = self
            .client
            .accept_remote(&transfer.sender_address, &transfer.id)
            .await
        {
            warn!(transfer_id = %transfer.id, "Sender not told about acceptance: {}", e);
            return Err(AppError::Unreachable(format!(
                "Transfer {} accepted but sender {} unreachable: {}",
                transfer.id, transfer.sender_address, e
            )));
        }

        Ok(transfer)
    }

    /// Receiver rejects; the sender is told in the background
    pub async fn reject(&self, id: &str) -> AppResult<Transfer> {
        let transfer = self
            .apply(
                id,
                TransferDirection::Incoming,
                TransferStatus::Rejected,
                Event::TransferRejected,
            )
            .await?;
        self.discard(&self.inbox, &transfer.id).await;
        metrics::counter!("lanshare_transfers_total", 1, "event" => "rejected");

        let client = self.client.clone();
        let notice = transfer.clone();
        tokio::spawn(async move {
            if let Err(e) = client.reject_remote(&notice.sender_address, &notice.id).await {
                warn!(transfer_id = %notice.id, "Sender not told about rejection: {}", e);
            }
        });

        Ok(transfer)
    }

    /// Sender learns the receiver accepted; bytes are pushed in the background
    pub async fn accept_remote(&self, id: &str) -> AppResult<Transfer> {
        let transfer = self
            .apply(
                id,
                TransferDirection::Outgoing,
                TransferStatus::Accepted,
                Event::TransferAccepted,
            )
            .await?;

        let this = self.clone();
        let transfer_id = transfer.id.clone();
        tokio::spawn(async move { this.push(&transfer_id).await });

        Ok(transfer)
    }

    /// Sender learns the receiver rejected
    pub async fn reject_remote(&self, id: &str) -> AppResult<Transfer> {
        let transfer = self
            .apply(
                id,
                TransferDirection::Outgoing,
                TransferStatus::Rejected,
                Event::TransferRejected,
            )
            .await?;
        self.discard(&self.staging, &transfer.id).await;
        metrics::counter!("lanshare_transfers_total", 1, "event" => "rejected");
        Ok(transfer)
    }

    /// Receiver learns the sender could not push the bytes
    pub async fn fail_remote(&self, id: &str, reason: String) -> AppResult<Transfer> {
        warn!(transfer_id = id, "Sender reported failure: {}", reason);
        self.record_failure(id, TransferDirection::Incoming, reason).await
    }

    /// Receiver stores pushed bytes and completes its copy
    pub async fn receive_upload(&self, id: &str, bytes: Vec<u8>) -> AppResult<Transfer> {
        let expected = {
            let transfers = self.transfers.read().await;
            let transfer = transfers
                .get(id)
                .ok_or_else(|| AppError::not_found(&format!("Transfer {} not found", id)))?;
            if transfer.direction != TransferDirection::Incoming {
                return Err(AppError::invalid_state(&format!(
                    "Transfer {} is not incoming",
                    id
                )));
            }
            if transfer.status != TransferStatus::Accepted {
                return Err(AppError::invalid_state(&format!(
                    "Transfer {} is {}, not accepted",
                    id, transfer.status
                )));
            }
            transfer.size_bytes
        };

        if bytes.len() as u64 != expected {
            return Err(AppError::BadRequest(format!(
                "Transfer {} expected {} bytes, got {}",
                id,
                expected,
                bytes.len()
            )));
        }

        self.inbox.put(id, &bytes).await?;
        let transfer = self
            .apply(
                id,
                TransferDirection::Incoming,
                TransferStatus::Completed,
                Event::TransferCompleted,
            )
            .await?;

        info!(transfer_id = %transfer.id, size = transfer.size_bytes, "Transfer received");
        metrics::counter!("lanshare_transfers_total", 1, "event" => "received");
        Ok(transfer)
    }

    /// Bytes of a completed incoming transfer
    pub async fn download(&self, id: &str) -> AppResult<(Transfer, Vec<u8>)> {
        let transfer = self.get(id).await?;
        if transfer.status != TransferStatus::Completed {
            return Err(AppError::invalid_state(&format!(
                "Transfer {} is {}, not completed",
                id, transfer.status
            )));
        }
        if transfer.direction != TransferDirection::Incoming {
            return Err(AppError::not_found(&format!(
                "Transfer {} was sent from this node; no bytes are kept",
                id
            )));
        }

        let bytes = self
            .inbox
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(&format!("File for transfer {} is gone", id)))?;

        Ok((transfer, bytes))
    }

    /// Upload staged bytes to the receiver, completing both copies on success
    async fn push(&self, id: &str) {
        let transfer = match self.get(id).await {
            Ok(t) => t,
            Err(e) => {
                warn!(transfer_id = id, "Nothing to push: {}", e);
                return;
            }
        };

        let bytes = match self.staging.get(id).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.abandon(&transfer, "Staged bytes are gone".to_string()).await;
                return;
            }
            Err(e) => {
                self.abandon(&transfer, format!("Failed to read staged bytes: {}", e))
                    .await;
                return;
            }
        };

        info!(transfer_id = id, receiver = %transfer.receiver_address, "Pushing bytes");
        if let Err(e) = self
            .client
            .upload(
                &transfer.receiver_address,
                id,
                &transfer.filename,
                &transfer.sender_name,
                bytes,
            )
            .await
        {
            self.abandon(&transfer, format!("Upload to receiver failed: {}", e))
                .await;
            return;
        }

        match self
            .apply(
                id,
                TransferDirection::Outgoing,
                TransferStatus::Completed,
                Event::TransferCompleted,
            )
            .await
        {
            Ok(_) => {
                self.discard(&self.staging, id).await;
                info!(transfer_id = id, "Transfer delivered");
                metrics::counter!("lanshare_transfers_total", 1, "event" => "delivered");
            }
            Err(e) => warn!(transfer_id = id, "Delivered but not completed locally: {}", e),
        }
    }

    /// Give up on a push: drop the staged bytes, record why on the local copy
    /// and tell the receiver. There is no retry; the user sends again.
    async fn abandon(&self, transfer: &Transfer, reason: String) {
        error!(transfer_id = %transfer.id, "Push failed: {}", reason);
        metrics::counter!("lanshare_transfers_total", 1, "event" => "failed");

        self.discard(&self.staging, &transfer.id).await;
        if let Err(e) = self
            .record_failure(&transfer.id, TransferDirection::Outgoing, reason.clone())
            .await
        {
            warn!(transfer_id = %transfer.id, "Failure not recorded: {}", e);
            return;
        }

        if let Err(e) = self
            .client
            .report_failure(&transfer.receiver_address, &transfer.id, &reason)
            .await
        {
            warn!(transfer_id = %transfer.id, "Receiver not told about the failure: {}", e);
        }
    }

    /// Mark an accepted copy as failed and publish `transfer_failed`.
    ///
    /// The status stays `accepted`: failure is not a lifecycle state.
    async fn record_failure(
        &self,
        id: &str,
        direction: TransferDirection,
        reason: String,
    ) -> AppResult<Transfer> {
        let mut transfers = self.transfers.write().await;
        let transfer = transfers
            .get_mut(id)
            .ok_or_else(|| AppError::not_found(&format!("Transfer {} not found", id)))?;

        if transfer.direction != direction || transfer.status != TransferStatus::Accepted {
            return Err(AppError::InvalidState(format!(
                "Transfer {} is {} {}, only an accepted push can fail",
                id, transfer.status, transfer.direction
            )));
        }
        transfer.failure = Some(reason);
        transfer.updated_at = Utc::now();

        let snapshot = transfer.clone();
        self.hub.publish(Event::TransferFailed(snapshot.clone())).await;
        Ok(snapshot)
    }

    /// Move one copy to `next` and publish the matching event
    async fn apply(
        &self,
        id: &str,
        direction: TransferDirection,
        next: TransferStatus,
        event: fn(Transfer) -> Event,
    ) -> AppResult<Transfer> {
        let mut transfers = self.transfers.write().await;
        let transfer = transfers
            .get_mut(id)
            .ok_or_else(|| AppError::not_found(&format!("Transfer {} not found", id)))?;

        if transfer.direction != direction {
            return Err(AppError::InvalidState(format!(
                "Transfer {} is {}, cannot become {} from this side",
                id, transfer.direction, next
            )));
        }
        transfer.transition(next)?;

        let snapshot = transfer.clone();
        self.hub.publish(event(snapshot.clone())).await;

        debug!(transfer_id = id, status = %next, "Transfer status changed");
        Ok(snapshot)
    }

    async fn discard(&self, store: &StagingStore, id: &str) {
        if let Err(e) = store.delete(id).await {
            warn!(transfer_id = id, "Failed to remove bytes: {}", e);
        }
    }

    /// Address for an explicit `host[:port]` or a known display name
    async fn resolve_target(&self, target: &str) -> AppResult<String> {
        let target = target.trim();
        if target.is_empty() {
            return Err(AppError::bad_request("Target is required"));
        }
        if let Ok(ip) = target.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.local_port()).to_string());
        }
        if is_host_port(target) || self.registry.get(target).await.is_some() {
            return Ok(target.to_string());
        }

        self.registry
            .resolve(target)
            .await
            .ok_or_else(|| AppError::not_found(&format!("No peer named {}", target)))
    }

    fn local_port(&self) -> u16 {
        self.identity
            .address
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
            .unwrap_or(8080)
    }
}

/// `host:port` with a numeric port, IPv6 hosts bracketed
fn is_host_port(target: &str) -> bool {
    match target.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty()
                && !host.contains(char::is_whitespace)
                && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}

/// Keep only the final path component of a client-supplied name
fn sanitize_filename(name: &str) -> AppResult<String> {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::bad_request("Filename is required"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    async fn orchestrator(hub: &EventHub) -> TransferOrchestrator {
        let root = std::env::temp_dir().join(format!("lanshare-orch-{}", uuid::Uuid::new_v4()));
        let registry = PeerRegistry::new(hub.clone(), Duration::from_secs(60), Duration::from_secs(300));
        let client = PeerClient::new(
            Duration::from_millis(200),
            Duration::from_millis(200),
            Duration::from_millis(200),
        )
        .unwrap();

        TransferOrchestrator::new(
            registry,
            hub.clone(),
            StagingStore::open(root.join("staging")).await.unwrap(),
            StagingStore::open(root.join("inbox")).await.unwrap(),
            client,
            DeviceIdentity {
                name: "bob@desk".to_string(),
                address: "127.0.0.1:9".to_string(),
            },
        )
    }

    fn offer(id: &str) -> TransferOffer {
        TransferOffer {
            id: id.to_string(),
            filename: "notes.txt".to_string(),
            size_bytes: 5,
            sender_name: "alice@laptop".to_string(),
            // Nothing listens on the discard port
            sender_address: "127.0.0.1:9".to_string(),
            receiver_address: "127.0.0.1:9".to_string(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_notify_is_idempotent() {
        let hub = EventHub::new(16);
        let orch = orchestrator(&hub).await;
        let mut sub = hub.subscribe().await;

        assert!(assert_ok!(orch.notify(offer("t-1")).await));
        assert!(!assert_ok!(orch.notify(offer("t-1")).await));

        assert_eq!(orch.list().await.len(), 1);
        assert!(matches!(sub.try_recv(), Some(Event::TransferRequest(_))));
        // The sender was registered as a peer, nothing else
        assert!(matches!(sub.try_recv(), Some(Event::PeerDiscovered(_))));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_accept_unknown_or_twice() {
        let hub = EventHub::new(16);
        let orch = orchestrator(&hub).await;

        let err = assert_err!(orch.accept("missing").await);
        assert!(matches!(err, AppError::NotFound(_)));

        orch.notify(offer("t-2")).await.unwrap();
        // Sender is unreachable, but the local copy is accepted
        let err = assert_err!(orch.accept("t-2").await);
        assert!(matches!(err, AppError::Unreachable(_)));
        assert_eq!(orch.get("t-2").await.unwrap().status, TransferStatus::Accepted);

        let err = assert_err!(orch.accept("t-2").await);
        assert!(matches!(err, AppError::InvalidState(_)));
        let err = assert_err!(orch.reject("t-2").await);
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_concurrent_accepts_single_winner() {
        let hub = EventHub::new(16);
        let orch = orchestrator(&hub).await;
        orch.notify(offer("t-3")).await.unwrap();

        let (a, b) = tokio::join!(orch.accept("t-3"), orch.accept("t-3"));
        let invalid = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Err(AppError::InvalidState(_))))
            .count();
        assert_eq!(invalid, 1);
    }

    #[tokio::test]
    async fn test_reject_is_terminal() {
        let hub = EventHub::new(16);
        let orch = orchestrator(&hub).await;
        orch.notify(offer("t-4")).await.unwrap();

        let rejected = orch.reject("t-4").await.unwrap();
        assert_eq!(rejected.status, TransferStatus::Rejected);

        let err = assert_err!(orch.receive_upload("t-4", b"hello".to_vec()).await);
        assert!(matches!(err, AppError::InvalidState(_)));
        let err = assert_err!(orch.download("t-4").await);
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_upload_requires_acceptance_and_matching_size() {
        let hub = EventHub::new(16);
        let orch = orchestrator(&hub).await;
        orch.notify(offer("t-5")).await.unwrap();

        let err = assert_err!(orch.receive_upload("t-5", b"hello".to_vec()).await);
        assert!(matches!(err, AppError::InvalidState(_)));

        let _ = orch.accept("t-5").await;
        let err = assert_err!(orch.receive_upload("t-5", b"too long".to_vec()).await);
        assert!(matches!(err, AppError::BadRequest(_)));

        let done = orch.receive_upload("t-5", b"hello".to_vec()).await.unwrap();
        assert_eq!(done.status, TransferStatus::Completed);

        let (_, bytes) = orch.download("t-5").await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn test_outgoing_side_cannot_accept_locally() {
        let hub = EventHub::new(16);
        let orch = orchestrator(&hub).await;

        // Staged and recorded even though the receiver is unreachable
        let err = assert_err!(orch.initiate("a.txt", b"abc".to_vec(), "127.0.0.1:1").await);
        assert!(matches!(err, AppError::Unreachable(_)));

        let sent = orch.list().await.pop().unwrap();
        assert_eq!(sent.status, TransferStatus::Pending);
        assert_eq!(sent.direction, TransferDirection::Outgoing);

        let err = assert_err!(orch.accept(&sent.id).await);
        assert!(matches!(err, AppError::InvalidState(_)));

        orch.reject_remote(&sent.id).await.unwrap();
        assert_eq!(orch.staging.get(&sent.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_target_name() {
        let hub = EventHub::new(16);
        let orch = orchestrator(&hub).await;

        let err = assert_err!(orch.initiate("a.txt", b"abc".to_vec(), "carol@nowhere").await);
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(orch.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_push_is_recorded_and_unstaged() {
        let hub = EventHub::new(16);
        let orch = orchestrator(&hub).await;

        // Nothing listens on port 1, so the offer and the later push both fail
        let _ = orch.initiate("a.txt", b"abc".to_vec(), "127.0.0.1:1").await;
        let sent = orch.list().await.pop().unwrap();
        let mut sub = hub.subscribe().await;

        let accepted = orch.accept_remote(&sent.id).await.unwrap();
        assert_eq!(accepted.status, TransferStatus::Accepted);

        let failed = loop {
            let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
                .await
                .expect("push failure never reported");
            match event {
                Some(Event::TransferFailed(t)) => break t,
                Some(_) => continue,
                None => panic!("subscriber dropped"),
            }
        };
        assert_eq!(failed.id, sent.id);
        assert_eq!(failed.status, TransferStatus::Accepted);
        assert!(failed.failure.as_deref().unwrap().contains("Upload"));

        let stored = orch.get(&sent.id).await.unwrap();
        assert_eq!(stored.failure, failed.failure);
        assert_eq!(orch.staging.get(&sent.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sender_failure_marks_receiver_copy() {
        let hub = EventHub::new(16);
        let orch = orchestrator(&hub).await;
        orch.notify(offer("t-6")).await.unwrap();

        // Only an accepted copy can fail
        let err = assert_err!(orch.fail_remote("t-6", "gone".to_string()).await);
        assert!(matches!(err, AppError::InvalidState(_)));

        let _ = orch.accept("t-6").await;
        let mut sub = hub.subscribe().await;
        let failed = orch
            .fail_remote("t-6", "Upload to receiver failed".to_string())
            .await
            .unwrap();
        assert_eq!(failed.status, TransferStatus::Accepted);
        assert_eq!(failed.failure.as_deref(), Some("Upload to receiver failed"));
        assert!(matches!(sub.try_recv(), Some(Event::TransferFailed(_))));

        let err = assert_err!(orch.fail_remote("missing", "x".to_string()).await);
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_target_forms() {
        let hub = EventHub::new(16);
        let orch = orchestrator(&hub).await;

        assert_eq!(
            orch.resolve_target("laptop.local:8080").await.unwrap(),
            "laptop.local:8080"
        );
        assert_eq!(orch.resolve_target("10.0.0.4:9000").await.unwrap(), "10.0.0.4:9000");
        // Bare IPs get this node's port
        assert_eq!(orch.resolve_target("10.0.0.4").await.unwrap(), "10.0.0.4:9");

        orch.registry.upsert("carol@studio", "10.0.0.7:8080").await;
        assert_eq!(orch.resolve_target("carol@studio").await.unwrap(), "10.0.0.7:8080");

        let err = assert_err!(orch.resolve_target("dave@nowhere").await);
        assert!(matches!(err, AppError::NotFound(_)));
        let err = assert_err!(orch.resolve_target("laptop.local:http").await);
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_filename("photo.jpg").unwrap(), "photo.jpg");
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("..").is_err());
    }
}
