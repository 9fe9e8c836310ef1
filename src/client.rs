use std::str::FromStr;

use crate::{ApiResponseOrError, Credentials, OpenAiError};
use anyhow::Result;
use reqwest::{
    header::{HeaderName, HeaderValue, AUTHORIZATION},
    multipart::Form,
    Client, Method, Response,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Shared handle to the OpenAI HTTP API.
///
/// Cloning is cheap: the underlying connection pool is reference counted, so
/// one client is built at startup and handed to every component.
#[derive(Clone)]
pub struct OpenAiClient {
    credentials: Credentials,
    client: Client,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OpenAiClient({})", self.credentials.base_url())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiErrorWrapper {
    error: OpenAiError,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Order {
    Asc,
    Desc,
}

impl OpenAiClient {
    pub fn new(credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .default_headers(
                [
                    (
                        AUTHORIZATION,
                        HeaderValue::from_str(&format!("Bearer {}", credentials.api_key()))?,
                    ),
                    (
                        HeaderName::from_str("OpenAI-Beta")?,
                        HeaderValue::from_str("assistants=v2")?,
                    ),
                ]
                .into_iter()
                .collect(),
            )
            .build()?;

        Ok(Self {
            credentials,
            client,
        })
    }

    async fn send(
        &self,
        method: Method,
        route: String,
        build: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    ) -> Result<Response, reqwest::Error> {
        let url = format!("{}{}", self.credentials.base_url(), route);
        tracing::debug!("OpenAI Request[{}] {}", method, url);

        let request = build(self.client.request(method.clone(), url.clone()));
        let response = request.send().await?;

        tracing::debug!(
            "OpenAI Response[{}] {} {url}",
            method,
            response.status().as_str()
        );
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> ApiResponseOrError<T> {
        if response.status().is_success() {
            return Ok(response.json::<T>().await?);
        }
        Err(Self::error_from(response).await)
    }

    async fn error_from(response: Response) -> OpenAiError {
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return e.into(),
        };
        match serde_json::from_str::<OpenAiErrorWrapper>(&body) {
            Ok(wrapper) => wrapper.error,
            Err(_) => OpenAiError::new(format!("HTTP {status}: {body}"), "unknown".to_string()),
        }
    }

    pub async fn request<S, R, T>(
        &self,
        method: Method,
        route: R,
        body: Option<S>,
    ) -> ApiResponseOrError<T>
    where
        R: Into<String>,
        S: Serialize,
        T: DeserializeOwned,
    {
        let response = self
            .send(method, route.into(), |request| match body {
                Some(body) => request.json(&body),
                None => request,
            })
            .await?;
        Self::decode(response).await
    }

    pub async fn get<R, T>(&self, route: R) -> ApiResponseOrError<T>
    where
        R: Into<String>,
        T: DeserializeOwned,
    {
        self.request::<(), R, T>(Method::GET, route, None).await
    }

    pub async fn post<S, R, T>(&self, route: R, body: S) -> ApiResponseOrError<T>
    where
        R: Into<String>,
        S: Serialize,
        T: DeserializeOwned,
    {
        self.request(Method::POST, route, Some(body)).await
    }

    pub async fn post_multipart<R, T>(&self, route: R, form: Form) -> ApiResponseOrError<T>
    where
        R: Into<String>,
        T: DeserializeOwned,
    {
        let response = self
            .send(Method::POST, route.into(), |request| request.multipart(form))
            .await?;
        Self::decode(response).await
    }

    /// Posts a JSON body and returns the raw response body, for endpoints
    /// that answer with binary content such as synthesized audio.
    pub async fn post_for_bytes<S, R>(&self, route: R, body: S) -> ApiResponseOrError<Vec<u8>>
    where
        R: Into<String>,
        S: Serialize,
    {
        let response = self
            .send(Method::POST, route.into(), |request| request.json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Fetches one page of a list endpoint.
    pub async fn list<R, T>(
        &self,
        route: R,
        order: Order,
        limit: u32,
    ) -> ApiResponseOrError<List<T>>
    where
        R: Into<String>,
        T: DeserializeOwned,
    {
        self.get(format!("{}?order={order}&limit={limit}", route.into()))
            .await
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct List<T> {
    pub first_id: Option<String>,
    pub last_id: Option<String>,
    pub data: Vec<T>,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_renders_as_query_value() {
        assert_eq!(Order::Desc.to_string(), "desc");
        assert_eq!(Order::Asc.to_string(), "asc");
    }

    #[test]
    fn list_page_decodes() {
        let page: List<serde_json::Value> = serde_json::from_str(
            r#"{"object":"list","data":[{"id":"msg_2"},{"id":"msg_1"}],"first_id":"msg_2","last_id":"msg_1","has_more":false}"#,
        )
        .unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.first_id.as_deref(), Some("msg_2"));
        assert!(!page.has_more);
    }

    #[test]
    fn client_builds_from_credentials() {
        let client =
            OpenAiClient::new(Credentials::new("sk-test", "http://localhost:9/v1")).unwrap();
        assert_eq!(format!("{client:?}"), "OpenAiClient(http://localhost:9/v1/)");
    }
}
