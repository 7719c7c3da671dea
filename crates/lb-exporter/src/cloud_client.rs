//! Thin wrapper over the vendor cloud HTTP API (§4.9).
//!
//! The real vendor routes are not part of this specification, so the
//! surface here is kept generic: trigger an OTP e-mail, exchange the code
//! for a bearer token, and fetch the account's device/group topology. A
//! production build would point these at the actual vendor endpoints;
//! this module only fixes the shape of the round trip.

use serde::{Deserialize, Serialize};

use crate::error::{ExporterError, ExporterResult};

#[derive(Debug, Serialize)]
struct OtpRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    email: &'a str,
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    access_token: String,
    expires_in: i64,
}

/// Raw device/group topology as returned by the vendor's device-list
/// endpoint, already shaped like [`lb_protocol::config::ControllerConfig`]
/// so it can be written straight to disk.
pub type CloudTopology = lb_protocol::config::ControllerConfig;

pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
}

impl CloudClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Trigger the vendor's OTP e-mail for `email`. No local state changes.
    pub async fn request_otp(&self, email: &str) -> ExporterResult<()> {
        let response = self
            .http
            .post(format!("{}/user/two_factor/email/verifycode", self.base_url))
            .json(&OtpRequest { email })
            .send()
            .await
            .map_err(|e| ExporterError::CloudLogin(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ExporterError::CloudLogin(format!(
                "otp request rejected with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Exchange an OTP `code` for a bearer token and its lifetime.
    pub async fn verify_otp(&self, email: &str, code: &str) -> ExporterResult<(String, i64)> {
        let response = self
            .http
            .post(format!("{}/user/two_factor/email/login", self.base_url))
            .json(&VerifyRequest { email, code })
            .send()
            .await
            .map_err(|e| ExporterError::CloudLogin(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ExporterError::CloudLogin(format!(
                "otp verification rejected with status {}",
                response.status()
            )));
        }
        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| ExporterError::CloudLogin(e.to_string()))?;
        Ok((body.access_token, body.expires_in))
    }

    /// Fetch the account's device and group topology, already reshaped to
    /// the persisted configuration schema.
    pub async fn list_devices(&self, token: &str) -> ExporterResult<CloudTopology> {
        let response = self
            .http
            .get(format!("{}/v2/user/{}/devices", self.base_url, token))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ExporterError::CloudLogin(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ExporterError::CloudLogin(format!(
                "device list request rejected with status {}",
                response.status()
            )));
        }
        response
            .json::<CloudTopology>()
            .await
            .map_err(|e| ExporterError::CloudLogin(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_a_base_url() {
        let client = CloudClient::new("https://api.example.com");
        assert_eq!(client.base_url, "https://api.example.com");
    }
}
