//! Client for the [Telegraph](https://telegra.ph/api) page publishing API.
mod nodes;

pub(crate) use nodes::*;

use crate::http;
use crate::prelude::*;
use crate::{err, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

#[derive(Clone, Deserialize)]
pub(crate) struct Config {
    /// Token of an existing account. A new account is created on startup
    /// when it is absent.
    pub(crate) access_token: Option<String>,

    #[serde(default = "default_name")]
    pub(crate) short_name: String,

    #[serde(default = "default_name")]
    pub(crate) author_name: String,

    #[serde(default = "default_footer_url")]
    pub(crate) footer_url: Url,

    #[serde(default = "default_name")]
    pub(crate) footer_text: String,

    #[serde(default = "default_api_url")]
    pub(crate) api_url: Url,
}

fn default_name() -> String {
    "DreamxBotz".to_owned()
}

fn default_footer_url() -> Url {
    Url::parse("https://t.me/DreamxBotz").unwrap_or_else(|err| panic!("BUG: bad footer URL: {err}"))
}

fn default_api_url() -> Url {
    Url::parse("https://api.telegra.ph").unwrap_or_else(|err| panic!("BUG: bad API URL: {err}"))
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum TelegraphError {
    #[error("Telegraph API method `{method}` failed: {message}")]
    Api {
        method: &'static str,
        message: String,
    },

    #[error("Telegraph account is not available, the page can't be published")]
    NoAccount,

    #[error("Tag <{tag}> is not allowed in Telegraph pages")]
    NotAllowedTag { tag: String },
}

/// Publishes the HTML fragment as a web page and returns its URL
#[async_trait]
pub(crate) trait PagePublisher: Send + Sync {
    async fn publish(&self, title: &str, html: &str) -> Result<Url>;
}

pub(crate) struct Telegraph {
    http: http::Client,
    api_url: Url,
    author_name: String,
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
}

#[derive(Serialize)]
struct CreateAccountRequest<'a> {
    short_name: &'a str,
    author_name: &'a str,
}

#[derive(Deserialize)]
struct Account {
    access_token: String,
}

#[derive(Serialize)]
struct CreatePageRequest<'a> {
    access_token: &'a str,
    title: &'a str,
    author_name: &'a str,
    content: Vec<Node>,
    return_content: bool,
}

#[derive(Deserialize)]
struct Page {
    url: Url,
}

impl Telegraph {
    /// Creates the client. If there is no access token in the config, then
    /// a new account is registered. A failure to do so is only logged, and
    /// every later publish attempt returns [`TelegraphError::NoAccount`].
    pub(crate) async fn init(cfg: Config, http: http::Client) -> Self {
        let mut telegraph = Self {
            http,
            api_url: cfg.api_url,
            author_name: cfg.author_name,
            access_token: cfg.access_token,
        };

        if telegraph.access_token.is_some() {
            return telegraph;
        }

        match telegraph.create_account(&cfg.short_name).await {
            Ok(token) => {
                info!(short_name = %cfg.short_name, "Created a new Telegraph account");
                telegraph.access_token = Some(token);
            }
            Err(err) => {
                error!(err = tracing_err(&err), "Failed to create Telegraph account at startup");
            }
        }

        telegraph
    }

    pub(crate) async fn create_account(&self, short_name: &str) -> Result<String> {
        let request = CreateAccountRequest {
            short_name,
            author_name: &self.author_name,
        };

        let account: Account = self.call("createAccount", &request).await?;
        Ok(account.access_token)
    }

    pub(crate) async fn create_page(&self, title: &str, html: &str) -> Result<Url> {
        let access_token = self
            .access_token
            .as_deref()
            .ok_or_else(|| err!(TelegraphError::NoAccount))?;

        let request = CreatePageRequest {
            access_token,
            title,
            author_name: &self.author_name,
            content: html_to_nodes(html)?,
            return_content: false,
        };

        let page: Page = self.call("createPage", &request).await?;
        Ok(page.url)
    }

    async fn call<Req, Res>(&self, method: &'static str, request: &Req) -> Result<Res>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let mut url = self.api_url.clone();
        url.set_path(method);

        let response: ApiResponse<Res> = self.http.post(url).json(request).read_json().await?;

        match response {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { error, .. } => Err(err!(TelegraphError::Api {
                method,
                message: error.unwrap_or_else(|| "no error description".to_owned()),
            })),
        }
    }
}

#[async_trait]
impl PagePublisher for Telegraph {
    async fn publish(&self, title: &str, html: &str) -> Result<Url> {
        self.create_page(title, html)
            .with_duration_log("Publishing Telegraph page")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_client(access_token: Option<&str>) -> Telegraph {
        Telegraph {
            http: http::create_client(),
            api_url: default_api_url(),
            author_name: default_name(),
            access_token: access_token.map(ToOwned::to_owned),
        }
    }

    #[test_log::test(tokio::test)]
    async fn publishing_without_account_fails_early() {
        let err = offline_client(None)
            .create_page("title", "<b>body</b>")
            .await
            .unwrap_err();

        assert!(
            matches!(
                err.kind(),
                crate::ErrorKind::Telegraph {
                    source: TelegraphError::NoAccount
                }
            ),
            "{err:?}"
        );
    }

    #[test_log::test(tokio::test)]
    async fn rejects_bad_markup_before_network_call() {
        let err = offline_client(Some("token"))
            .create_page("title", "<table></table>")
            .await
            .unwrap_err();

        assert!(
            matches!(
                err.kind(),
                crate::ErrorKind::Telegraph {
                    source: TelegraphError::NotAllowedTag { .. }
                }
            ),
            "{err:?}"
        );
    }

    #[test_log::test(tokio::test)]
    #[ignore = "talks to the live Telegraph API"]
    async fn sandbox_publish() {
        let http = http::create_client();
        let cfg = Config {
            access_token: None,
            short_name: "filebot-test".to_owned(),
            author_name: default_name(),
            footer_url: default_footer_url(),
            footer_text: default_name(),
            api_url: default_api_url(),
        };
        let telegraph = Telegraph::init(cfg, http).await;
        let url = telegraph
            .publish("Sandbox", "<h3>Hello</h3><br><i>world</i>")
            .await
            .unwrap();
        assert_eq!(url.host_str(), Some("telegra.ph"));
    }
}
