use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::{
    quote::Quote,
    swap::{InstructionSet, SwapInstructionsRequest, SwapInstructionsResponse},
    SwapError,
};

const AGGREGATOR_API_URL: &str = "https://lite-api.jup.ag/swap/v1";

/// Turns a quote into the low-level instruction set for one requester.
#[async_trait]
pub trait SwapInstructionSource: Send + Sync {
    async fn fetch(
        &self,
        quote: &Quote,
        requester: &Pubkey,
        priority_fee_lamports: Option<u64>,
        fee_account: Option<&Pubkey>,
        slippage_bps: u16,
    ) -> Result<InstructionSet, SwapError>;
}

pub struct AggregatorClient {
    client: reqwest::Client,
    base_path: String,
    api_key: Option<String>,
}

impl AggregatorClient {
    pub fn new(
        base_path: Option<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SwapError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SwapError::Config(format!("aggregator http client: {e}")))?;

        Ok(Self {
            client,
            base_path: base_path
                .unwrap_or_else(|| AGGREGATOR_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
        })
    }

    async fn post_swap_instructions(
        &self,
        body: &SwapInstructionsRequest<'_>,
    ) -> Result<SwapInstructionsResponse, SwapError> {
        let mut request = self
            .client
            .post(format!("{}/swap-instructions", self.base_path))
            .header("Accept", "application/json")
            .json(body);
        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key);
        }

        let response = request.send().await.map_err(transport_error)?;
        let response = check_response(response).await?;
        let buffer = response.bytes().await.map_err(transport_error)?;

        serde_json::from_slice(&buffer)
            .map_err(|e| SwapError::InvalidQuote(format!("unexpected swap-instructions body: {e}")))
    }
}

#[async_trait]
impl SwapInstructionSource for AggregatorClient {
    async fn fetch(
        &self,
        quote: &Quote,
        requester: &Pubkey,
        priority_fee_lamports: Option<u64>,
        fee_account: Option<&Pubkey>,
        slippage_bps: u16,
    ) -> Result<InstructionSet, SwapError> {
        let body = SwapInstructionsRequest {
            quote_response: quote,
            user_public_key: requester.to_string(),
            fee_account: fee_account.map(|account| account.to_string()),
            slippage_bps,
            prioritization_fee_lamports: priority_fee_lamports,
            wrap_and_unwrap_sol: true,
            dynamic_compute_unit_limit: true,
        };

        let response = self.post_swap_instructions(&body).await?;

        if let Some(error) = &response.error {
            return Err(classify_rejection(
                StatusCode::OK,
                &format!("{} {}", response.error_code.as_deref().unwrap_or_default(), error),
            ));
        }

        let set = InstructionSet::try_from(response)?;
        debug!(
            instructions = set.instructions.len(),
            lookup_tables = set.address_lookup_table_addresses.len(),
            compute_unit_limit = set.compute_unit_limit,
            "fetched swap instructions"
        );
        Ok(set)
    }
}

async fn check_response(response: Response) -> Result<Response, SwapError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(classify_rejection(status, &body))
}

fn classify_rejection(status: StatusCode, body: &str) -> SwapError {
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        return SwapError::UpstreamUnavailable(format!("aggregator returned {status}"));
    }

    let lowered = body.to_ascii_lowercase();
    if lowered.contains("expired") || lowered.contains("stale") {
        return SwapError::QuoteExpired(format!("aggregator returned {status}: {body}"));
    }

    SwapError::InvalidQuote(format!("aggregator returned {status}: {body}"))
}

fn transport_error(error: reqwest::Error) -> SwapError {
    if error.is_timeout() {
        SwapError::UpstreamUnavailable(format!("aggregator timed out: {error}"))
    } else {
        SwapError::UpstreamUnavailable(format!("aggregator transport error: {error}"))
    }
}
