use super::DbError;
use crate::Result;
use sea_query::{Iden, PostgresQueryBuilder, Query, QueryStatementWriter};
use std::collections::HashSet;
use teloxide::types::{ChatId, UserId};

#[derive(Iden)]
pub(super) enum BannedUsers {
    Table,
    UserId,
    Reason,
}

#[derive(Iden)]
pub(super) enum BannedChats {
    Table,
    ChatId,
    Reason,
}

/// Snapshot of the banned users and chats taken at startup
#[derive(Debug, Default, Clone)]
pub(crate) struct BannedSet {
    pub(crate) users: HashSet<UserId>,
    pub(crate) chats: HashSet<ChatId>,
}

impl BannedSet {
    pub(crate) fn is_banned(&self, user: Option<UserId>, chat: Option<ChatId>) -> bool {
        user.is_some_and(|user| self.users.contains(&user))
            || chat.is_some_and(|chat| self.chats.contains(&chat))
    }
}

pub(crate) struct BanRepo {
    db: sqlx::PgPool,
}

impl BanRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }

    pub(crate) async fn get_banned(&self) -> Result<BannedSet> {
        let users_sql = Query::select()
            .column(BannedUsers::UserId)
            .from(BannedUsers::Table)
            .to_string(PostgresQueryBuilder);

        let chats_sql = Query::select()
            .column(BannedChats::ChatId)
            .from(BannedChats::Table)
            .to_string(PostgresQueryBuilder);

        let users: Vec<i64> = sqlx::query_scalar(&users_sql)
            .fetch_all(&self.db)
            .await
            .map_err(DbError::from)?;

        let chats: Vec<i64> = sqlx::query_scalar(&chats_sql)
            .fetch_all(&self.db)
            .await
            .map_err(DbError::from)?;

        let users = users
            .into_iter()
            .map(|id| {
                u64::try_from(id)
                    .map(UserId)
                    .map_err(|_| DbError::OutOfRange { app_ty: "UserId", db_val: id })
            })
            .collect::<Result<_, _>>()?;

        Ok(BannedSet {
            users,
            chats: chats.into_iter().map(ChatId).collect(),
        })
    }
}
