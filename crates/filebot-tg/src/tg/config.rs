use serde::Deserialize;
use teloxide::types::ChatId;
use url::Url;

#[derive(Deserialize, Clone)]
pub(crate) struct Config {
    pub(crate) token: String,

    /// Tokens of the additional bots used to spread the load
    #[serde(default)]
    pub(crate) extra_tokens: Vec<String>,

    /// Chat where the bot reports its restarts
    pub(crate) log_channel: ChatId,

    /// Archival chat where the stored files are re-sent to make them
    /// downloadable
    pub(crate) bin_channel: ChatId,

    /// URL of a self-hosted Bot API server. It lifts the 20 MB limit on
    /// the size of the files the bot can download.
    pub(crate) api_url: Option<Url>,
}
