use super::HttpClientError;
use crate::prelude::*;
use crate::{err, err_ctx, Result};
use async_trait::async_trait;
use easy_ext::ext;
use reqwest::Response;
use reqwest_middleware::RequestBuilder;
use serde::de::DeserializeOwned;

/// Error pages of the hosting providers may be whole HTML documents
const MAX_ERROR_BODY_CHARS: usize = 512;

#[ext(RequestBuilderExt)]
#[async_trait]
pub(crate) impl RequestBuilder {
    /// Sends the request and turns 4xx and 5xx responses into
    /// [`HttpClientError::BadResponseStatusCode`]
    async fn try_send(self) -> Result<Response> {
        let response = self
            .send()
            .await
            .map_err(err_ctx!(HttpClientError::Request))?;

        let status = response.status();
        if status.is_success() || status.is_redirection() || status.is_informational() {
            return Ok(response);
        }

        let body = match response.text().await {
            Ok(body) => body.truncate_chars(MAX_ERROR_BODY_CHARS).to_owned(),
            Err(err) => format!("<unreadable body: {}>", err.display_chain()),
        };

        Err(err!(HttpClientError::BadResponseStatusCode { status, body }))
    }

    async fn read_json<T: DeserializeOwned>(self) -> Result<T> {
        let response = self.try_send().await?;
        let url = response.url().clone();

        let payload = response
            .bytes()
            .await
            .map_err(err_ctx!(HttpClientError::ReadPayload))?;

        serde_json::from_slice(&payload).map_err(|source| {
            let body = String::from_utf8_lossy(&payload);
            let body = body.truncate_chars(MAX_ERROR_BODY_CHARS);
            warn!(%url, body, "Response is not the expected JSON");

            err!(HttpClientError::UnexpectedResponseJsonShape { source })
        })
    }
}
