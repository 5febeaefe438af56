mod ban;
mod cfg;
mod error;
mod media;
mod premium;
mod schema;

use crate::prelude::*;
use crate::{err_ctx, Result};
use sqlx::postgres::PgPoolOptions;

pub(crate) use ban::*;
pub(crate) use cfg::*;
pub(crate) use error::*;
pub(crate) use media::*;
pub(crate) use premium::*;

pub(crate) struct Db {
    pub(crate) media: MediaRepo,
    pub(crate) bans: BanRepo,
    pub(crate) premium: PremiumRepo,
    primary: sqlx::PgPool,
    secondary: Option<sqlx::PgPool>,
}

pub(crate) async fn init(cfg: Config) -> Result<Db> {
    let primary = connect("primary", &cfg.url, cfg.pool_size).await?;

    let secondary = match &cfg.secondary_url {
        Some(url) => Some(connect("secondary", url, cfg.pool_size).await?),
        None => None,
    };

    Ok(Db {
        media: MediaRepo::new(primary.clone(), secondary.clone()),
        bans: BanRepo::new(primary.clone()),
        premium: PremiumRepo::new(primary.clone()),
        primary,
        secondary,
    })
}

async fn connect(target: &'static str, url: &url::Url, pool_size: u32) -> Result<sqlx::PgPool> {
    // Verify that the connection is working early.
    PgPoolOptions::new()
        .max_connections(pool_size)
        .connect(url.as_str())
        .with_duration_log("Connecting to the database")
        .instrument(info_span!("db_connect", target))
        .await
        .map_err(err_ctx!(DbError::Connect { target }))
}

impl Db {
    /// Creates the missing tables. Nothing can be read before this is done.
    pub(crate) async fn ensure_schema(&self) -> Result {
        for (target, db) in self.targets() {
            schema::execute(target, db, &schema::tables(target)).await?;
        }
        Ok(())
    }

    /// Creates the missing indexes. Media tables live in every database
    /// target, the rest only in the primary one.
    pub(crate) async fn ensure_indexes(&self) -> Result {
        for (target, db) in self.targets() {
            schema::execute(target, db, &schema::indexes(target)).await?;
        }

        if self.secondary.is_some() {
            info!(
                "Multiple database mode is on. Files will be looked up \
                in the secondary database if the primary one misses them"
            );
        } else {
            info!("Single database mode is on");
        }

        Ok(())
    }

    fn targets(&self) -> impl Iterator<Item = (schema::Target, &sqlx::PgPool)> {
        let secondary = self
            .secondary
            .iter()
            .map(|secondary| (schema::Target::Secondary, secondary));

        std::iter::once((schema::Target::Primary, &self.primary)).chain(secondary)
    }
}
