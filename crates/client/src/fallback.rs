//! Stateless HTTP route to the executor, used whenever no channel is open

use egress_tunnel_common::{
    FallbackError, FallbackRequest, HttpResponse, Result, StatusReport, TunnelError,
};
use reqwest::Client;
use tracing::debug;

use crate::ManagerConfig;

#[derive(Debug, Clone)]
pub(crate) struct FallbackClient {
    http: Client,
    fallback_url: String,
    status_url: String,
}

impl FallbackClient {
    pub(crate) fn new(config: &ManagerConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(TunnelError::transport)?;

        Ok(Self {
            http,
            fallback_url: config.fallback_url.clone(),
            status_url: config.status_url.clone(),
        })
    }

    /// Perform one request through `POST /api/proxy`
    ///
    /// An `{error, code}` reply means the executor ran the call and it failed, so it surfaces as
    /// [`TunnelError::Executor`]. Anything else that goes wrong is a transport failure.
    pub(crate) async fn request(&self, request: FallbackRequest) -> Result<HttpResponse> {
        debug!("Fallback request: {} {}", request.method, request.url);

        let response = self
            .http
            .post(&self.fallback_url)
            .json(&request)
            .send()
            .await
            .map_err(TunnelError::transport)?;

        let status = response.status();
        let body = response.bytes().await.map_err(TunnelError::transport)?;

        if status.is_success() {
            return serde_json::from_slice::<HttpResponse>(&body).map_err(TunnelError::transport);
        }

        match serde_json::from_slice::<FallbackError>(&body) {
            Ok(failure) => Err(TunnelError::Executor {
                message: failure.error,
                code: failure.code,
            }),
            Err(_) => Err(TunnelError::transport(std::io::Error::other(format!(
                "fallback endpoint returned {}",
                status
            )))),
        }
    }

    /// Probe the egress through `GET /api/status`
    ///
    /// The endpoint answers 500 with a well-formed report when the probe fails, so the body is
    /// parsed regardless of the status code.
    pub(crate) async fn status(&self) -> Result<StatusReport> {
        let response = self
            .http
            .get(&self.status_url)
            .send()
            .await
            .map_err(TunnelError::transport)?;

        let body = response.bytes().await.map_err(TunnelError::transport)?;
        serde_json::from_slice::<StatusReport>(&body).map_err(TunnelError::transport)
    }
}
