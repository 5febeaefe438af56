use super::{create_bot, BotIdentity};
use crate::prelude::*;
use futures::future;
use teloxide::prelude::*;
use url::Url;

/// Additional bots used to spread the load.
///
/// Bot API sessions are stateless, so the pool only verifies the tokens at
/// startup and remembers whom they belong to.
#[derive(Default)]
pub(crate) struct ClientPool {
    clients: Vec<BotIdentity>,
}

impl ClientPool {
    /// Tokens that fail the verification are logged and left out of the pool
    pub(crate) async fn init(tokens: &[String], api_url: Option<&Url>) -> Self {
        let sessions = tokens.iter().enumerate().map(|(index, token)| async move {
            match create_bot(token, api_url).get_me().await {
                Ok(me) => Some(BotIdentity::from_me(&me)),
                Err(err) => {
                    error!(index, err = tracing_err(&err), "Failed to start additional client");
                    None
                }
            }
        });

        let clients: Vec<_> = future::join_all(sessions)
            .await
            .into_iter()
            .flatten()
            .collect();

        if tokens.is_empty() {
            info!("No additional clients configured");
        } else {
            info!(
                started = clients.len(),
                configured = tokens.len(),
                "Initialized additional clients"
            );
        }

        Self { clients }
    }

    pub(crate) fn usernames(&self) -> impl Iterator<Item = &str> {
        self.clients
            .iter()
            .map(|identity| identity.username.as_str())
    }
}
