//! Outbound RPC client used for probes and the transfer control/data plane

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Response;
use tracing::{debug, instrument};

use crate::error::{AppError, AppResult};
use crate::models::{DeviceIdentity, TransferFailure, TransferOffer};

/// HTTP client for talking to other nodes.
///
/// Each call class carries its own timeout: probes are short, control-plane
/// notifications moderate, byte uploads long.
#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
    probe_timeout: Duration,
    control_timeout: Duration,
    data_timeout: Duration,
}

impl PeerClient {
    pub fn new(
        probe_timeout: Duration,
        control_timeout: Duration,
        data_timeout: Duration,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(probe_timeout)
            .build()
            .map_err(|e| AppError::internal(&format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            probe_timeout,
            control_timeout,
            data_timeout,
        })
    }

    /// Ask a host who it is
    pub async fn probe(&self, address: &str) -> AppResult<DeviceIdentity> {
        let response = self
            .http
            .get(format!("http://{}/discover", address))
            .timeout(self.probe_timeout)
            .send()
            .await?;

        let identity = expect_success(response, "probe", address)
            .await?
            .json::<DeviceIdentity>()
            .await?;
        Ok(identity)
    }

    #[instrument(skip(self, offer), fields(transfer_id = %offer.id))]
    pub async fn notify_transfer(&self, address: &str, offer: &TransferOffer) -> AppResult<()> {
        let response = self
            .http
            .post(format!("http://{}/api/notify-transfer", address))
            .timeout(self.control_timeout)
            .json(offer)
            .send()
            .await?;

        expect_success(response, "notify-transfer", address).await?;
        debug!("Receiver notified");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn accept_remote(&self, address: &str, transfer_id: &str) -> AppResult<()> {
        let response = self
            .http
            .post(format!("http://{}/api/accept-remote/{}", address, transfer_id))
            .timeout(self.control_timeout)
            .send()
            .await?;

        expect_success(response, "accept-remote", address).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn reject_remote(&self, address: &str, transfer_id: &str) -> AppResult<()> {
        let response = self
            .http
            .post(format!("http://{}/api/reject-remote/{}", address, transfer_id))
            .timeout(self.control_timeout)
            .send()
            .await?;

        expect_success(response, "reject-remote", address).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn report_failure(
        &self,
        address: &str,
        transfer_id: &str,
        reason: &str,
    ) -> AppResult<()> {
        let response = self
            .http
            .post(format!("http://{}/api/transfer-failed/{}", address, transfer_id))
            .timeout(self.control_timeout)
            .json(&TransferFailure {
                reason: reason.to_string(),
            })
            .send()
            .await?;

        expect_success(response, "transfer-failed", address).await?;
        Ok(())
    }

    /// Push a transfer's bytes to the receiver
    #[instrument(skip(self, sender_name, bytes), fields(size = bytes.len()))]
    pub async fn upload(
        &self,
        address: &str,
        transfer_id: &str,
        filename: &str,
        sender_name: &str,
        bytes: Vec<u8>,
    ) -> AppResult<()> {
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(filename.to_string()))
            .text("from", sender_name.to_string());

        let response = self
            .http
            .post(format!("http://{}/api/upload/{}", address, transfer_id))
            .timeout(self.data_timeout)
            .multipart(form)
            .send()
            .await?;

        expect_success(response, "upload", address).await?;
        Ok(())
    }
}

/// Turn a non-2xx answer into an error carrying the remote's message
async fn expect_success(response: Response, call: &str, address: &str) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(AppError::Unreachable(format!(
        "{} to {} failed with {}: {}",
        call, address, status, body
    )))
}
