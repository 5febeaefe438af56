use super::DbError;
use crate::Result;
use chrono::prelude::*;
use sea_query::{Expr, Iden, PostgresQueryBuilder, Query};
use sea_query_binder::SqlxBinder;
use teloxide::types::UserId;

#[derive(Iden)]
pub(super) enum PremiumUsers {
    Table,
    UserId,
    ExpiresAt,
}

pub(crate) struct PremiumRepo {
    db: sqlx::PgPool,
}

impl PremiumRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }

    /// Removes the premium grants that expired by `now`, returning their owners
    pub(crate) async fn take_expired(&self, now: DateTime<Utc>) -> Result<Vec<UserId>> {
        let (sql, values) = Query::delete()
            .from_table(PremiumUsers::Table)
            .and_where(Expr::col(PremiumUsers::ExpiresAt).lte(now))
            .returning_col(PremiumUsers::UserId)
            .build_sqlx(PostgresQueryBuilder);

        let ids: Vec<i64> = sqlx::query_scalar_with(&sql, values)
            .fetch_all(&self.db)
            .await
            .map_err(DbError::from)?;

        ids.into_iter()
            .map(|id| {
                u64::try_from(id)
                    .map(UserId)
                    .map_err(|_| DbError::OutOfRange { app_ty: "UserId", db_val: id }.into())
            })
            .collect()
    }
}
