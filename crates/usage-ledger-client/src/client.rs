//! Usage ledger HTTP client implementation.

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use usage_ledger_core::SubscriptionId;

use crate::error::ClientError;
use crate::types::{
    ApiErrorResponse, HealthResponse, InsufficientBalanceDetails, LedgerResponse,
    ListEntriesResponse, PurchaseEmissionsRequest, PurchaseEmissionsResponse, TopUpRequest,
    TopUpResponse, UseCreditsRequest, UseCreditsResponse, UseEmissionRequest,
    UseEmissionResponse,
};

/// Usage ledger API client.
///
/// Provides methods for spending and buying emissions and credits and for
/// reading a subscription's ledger.
#[derive(Debug, Clone)]
pub struct LedgerClient {
    client: Client,
    base_url: String,
    api_key: String,
    service_name: String,
}

impl LedgerClient {
    /// Create a new usage ledger client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the ledger service (e.g., `"http://usage-ledger:8080"`)
    /// * `api_key` - Service API key for authentication
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new usage ledger client with custom options.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            service_name: options.service_name,
        })
    }

    /// Spend one emission of the account with this email.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InsufficientBalance`] when no emission is left,
    /// [`ClientError::NotFound`] when the account has no usable subscription.
    pub async fn use_emission(&self, email: &str) -> Result<UseEmissionResponse, ClientError> {
        self.post("/v1/emissions/use", &UseEmissionRequest { email })
            .await
    }

    /// Spend credits of the account with this email.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InsufficientBalance`] when the balance is too
    /// low and [`ClientError::BadRequest`] for non-positive amounts.
    pub async fn use_credits(
        &self,
        request: UseCreditsRequest,
    ) -> Result<UseCreditsResponse, ClientError> {
        self.post("/v1/credits/use", &request).await
    }

    /// Charge an emission pack to the customer and add its emissions.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn purchase_emissions(
        &self,
        request: PurchaseEmissionsRequest,
    ) -> Result<PurchaseEmissionsResponse, ClientError> {
        self.post("/v1/emissions/purchase", &request).await
    }

    /// Start a credit top-up and get the checkout URL.
    ///
    /// Credits land on the ledger once the checkout is paid.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn top_up_credits(&self, request: TopUpRequest) -> Result<TopUpResponse, ClientError> {
        self.post("/v1/credits/top-up", &request).await
    }

    /// Get the current counters of a subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_ledger(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<LedgerResponse, ClientError> {
        let url = format!("{}/v1/ledger/{subscription_id}", self.base_url);
        Self::send(self.authorized(self.client.get(&url))).await
    }

    /// List journal entries of a subscription, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_entries(
        &self,
        subscription_id: &SubscriptionId,
        limit: usize,
        offset: usize,
    ) -> Result<ListEntriesResponse, ClientError> {
        let url = format!("{}/v1/ledger/{subscription_id}/entries", self.base_url);
        let request = self
            .client
            .get(&url)
            .query(&[("limit", limit), ("offset", offset)]);

        Self::send(self.authorized(request)).await
    }

    /// Check that the service is up.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let url = format!("{}/health", self.base_url);
        Self::send(self.client.get(&url)).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = format!("{}{path}", self.base_url);
        Self::send(self.authorized(self.client.post(&url)).json(body))
            .await
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        tracing::debug!(
            url = %response.url(),
            status = %response.status(),
            "usage ledger response"
        );
        Self::handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => {
                let body = api_error.error;
                let code = body.code.as_str();

                // Map specific error codes to typed errors
                match code {
                    "insufficient_balance" => {
                        match body
                            .details
                            .map(serde_json::from_value::<InsufficientBalanceDetails>)
                        {
                            Some(Ok(details)) => Err(ClientError::InsufficientBalance {
                                counter: details.counter,
                                balance: details.balance,
                                required: details.required,
                            }),
                            _ => Err(ClientError::Api {
                                code: code.to_string(),
                                message: body.message,
                                status: status.as_u16(),
                            }),
                        }
                    }
                    "bad_request" => Err(ClientError::BadRequest {
                        message: body.message,
                    }),
                    "not_found" => Err(ClientError::NotFound {
                        message: body.message,
                    }),
                    "unauthorized" => Err(ClientError::Unauthorized),
                    "conflict" => Err(ClientError::Conflict {
                        message: body.message,
                    }),
                    _ => Err(ClientError::Api {
                        code: code.to_string(),
                        message: body.message,
                        status: status.as_u16(),
                    }),
                }
            }
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Service name to include in requests.
    pub service_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            service_name: "unknown".to_string(),
        }
    }
}

impl ClientOptions {
    /// Create options with a service name.
    #[must_use]
    pub fn with_service_name(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Self::default()
        }
    }
}
