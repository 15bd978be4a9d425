use std::{sync::Arc, time::Duration};

use escrow_engine::{
    db_types::Cents,
    traits::{PaymentIntent, PaymentIntentStatus, PaymentMetadata, PaymentProcessor, PaymentProcessorError},
};
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client,
    RequestBuilder,
};
use serde::{de::DeserializeOwned, Deserialize};

use crate::{config::StripeConfig, errors::ServerError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// A [`PaymentProcessor`] backed by the Stripe payment intents REST API (or anything that speaks it, such as
/// `stripe-mock`).
#[derive(Clone)]
pub struct StripeProcessor {
    api_url: String,
    client: Arc<Client>,
}

#[derive(Debug, Clone, Deserialize)]
struct IntentResponse {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    status: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl StripeProcessor {
    pub fn new(config: &StripeConfig) -> Result<Self, ServerError> {
        let mut headers = HeaderMap::with_capacity(1);
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key.reveal()))
            .map_err(|e| ServerError::InitializeError(format!("Invalid payment processor key. {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
        Ok(Self { api_url: config.api_url.clone(), client: Arc::new(client) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.api_url)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, PaymentProcessorError> {
        let response = req.send().await.map_err(|e| PaymentProcessorError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            trace!("💳️ Payment processor replied {status}");
            return response.json::<T>().await.map_err(|e| PaymentProcessorError::InvalidResponse(e.to_string()));
        }
        let body = response.text().await.map_err(|e| PaymentProcessorError::Unavailable(e.to_string()))?;
        let message = error_message(&body);
        if status.is_server_error() || status.as_u16() == 429 {
            warn!("💳️ Payment processor is unavailable ({status}). {message}");
            Err(PaymentProcessorError::Unavailable(format!("{status}. {message}")))
        } else {
            warn!("💳️ Payment processor rejected the request ({status}). {message}");
            Err(PaymentProcessorError::Rejected { status: status.as_u16(), message })
        }
    }
}

impl PaymentProcessor for StripeProcessor {
    async fn create_payment_intent(
        &self,
        amount: Cents,
        currency: &str,
        metadata: &PaymentMetadata,
    ) -> Result<PaymentIntent, PaymentProcessorError> {
        debug!("💳️ Creating a payment intent of {amount} {currency} for {}", metadata.transaction_id);
        let form = intent_form(amount, currency, metadata);
        let req = self.client.post(self.url("payment_intents")).form(&form);
        let intent = self.send::<IntentResponse>(req).await?;
        let client_secret = intent.client_secret.ok_or_else(|| {
            PaymentProcessorError::InvalidResponse(format!("Payment intent {} has no client secret", intent.id))
        })?;
        info!("💳️ Payment intent {} created ({})", intent.id, intent.status);
        Ok(PaymentIntent { intent_id: intent.id, client_secret })
    }

    async fn payment_intent_status(&self, intent_id: &str) -> Result<PaymentIntentStatus, PaymentProcessorError> {
        let req = self.client.get(self.url(&format!("payment_intents/{intent_id}")));
        let intent = self.send::<IntentResponse>(req).await?;
        if intent.id != intent_id {
            return Err(PaymentProcessorError::InvalidResponse(format!(
                "Asked for payment intent {intent_id} but got {}",
                intent.id
            )));
        }
        debug!("💳️ Payment intent {intent_id} is {}", intent.status);
        Ok(PaymentIntentStatus::from(intent.status.as_str()))
    }
}

fn intent_form(amount: Cents, currency: &str, metadata: &PaymentMetadata) -> Vec<(String, String)> {
    let mut form = vec![
        ("amount".to_string(), amount.value().to_string()),
        ("currency".to_string(), currency.to_string()),
        ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
    ];
    form.extend(metadata.pairs().iter().map(|(k, v)| (format!("metadata[{k}]"), v.to_string())));
    form
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error: ErrorDetail { message: Some(m), code: Some(c) } }) => format!("{m} ({c})"),
        Ok(ErrorBody { error: ErrorDetail { message: Some(m), .. } }) => m,
        _ => body.chars().take(200).collect(),
    }
}
