use super::{BannedChats, BannedUsers, DbError, MediaFiles, PremiumUsers};
use crate::prelude::*;
use crate::{err_ctx, Result};
use sea_query::{ColumnDef, Index, PostgresQueryBuilder, SchemaStatementBuilder, Table};

/// Database the schema objects are created in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Target {
    /// Holds everything
    Primary,

    /// Holds only the media files
    Secondary,
}

impl Target {
    pub(super) fn name(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

/// Tables must exist before anything is read at startup
pub(super) fn tables(target: Target) -> Vec<String> {
    let media_files = Table::create()
        .table(MediaFiles::Table)
        .if_not_exists()
        .col(ColumnDef::new(MediaFiles::FileId).text().not_null().primary_key())
        .col(ColumnDef::new(MediaFiles::FileName).text().not_null())
        .col(ColumnDef::new(MediaFiles::FileSize).big_integer().not_null())
        .col(ColumnDef::new(MediaFiles::FileType).text().not_null())
        .col(ColumnDef::new(MediaFiles::MimeType).text())
        .col(ColumnDef::new(MediaFiles::Caption).text())
        .build(PostgresQueryBuilder);

    if target == Target::Secondary {
        return vec![media_files];
    }

    let banned_users = Table::create()
        .table(BannedUsers::Table)
        .if_not_exists()
        .col(ColumnDef::new(BannedUsers::UserId).big_integer().not_null().primary_key())
        .col(ColumnDef::new(BannedUsers::Reason).text())
        .build(PostgresQueryBuilder);

    let banned_chats = Table::create()
        .table(BannedChats::Table)
        .if_not_exists()
        .col(ColumnDef::new(BannedChats::ChatId).big_integer().not_null().primary_key())
        .col(ColumnDef::new(BannedChats::Reason).text())
        .build(PostgresQueryBuilder);

    let premium_users = Table::create()
        .table(PremiumUsers::Table)
        .if_not_exists()
        .col(ColumnDef::new(PremiumUsers::UserId).big_integer().not_null().primary_key())
        .col(
            ColumnDef::new(PremiumUsers::ExpiresAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .build(PostgresQueryBuilder);

    vec![media_files, banned_users, banned_chats, premium_users]
}

pub(super) fn indexes(target: Target) -> Vec<String> {
    let file_name = Index::create()
        .if_not_exists()
        .name("media_files_file_name_idx")
        .table(MediaFiles::Table)
        .col(MediaFiles::FileName)
        .build(PostgresQueryBuilder);

    if target == Target::Secondary {
        return vec![file_name];
    }

    let premium_expiry = Index::create()
        .if_not_exists()
        .name("premium_users_expires_at_idx")
        .table(PremiumUsers::Table)
        .col(PremiumUsers::ExpiresAt)
        .build(PostgresQueryBuilder);

    vec![file_name, premium_expiry]
}

#[instrument(skip(db, statements))]
pub(super) async fn execute(target: Target, db: &sqlx::PgPool, statements: &[String]) -> Result {
    for sql in statements {
        debug!(%sql, "Ensuring schema");

        sqlx::query(sql)
            .execute(db)
            .await
            .map_err(err_ctx!(DbError::EnsureSchema {
                target: target.name()
            }))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_and_indexes_are_separate() {
        for target in [Target::Primary, Target::Secondary] {
            for sql in tables(target) {
                assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS"), "{sql}");
            }
            for sql in indexes(target) {
                assert!(sql.starts_with("CREATE INDEX IF NOT EXISTS"), "{sql}");
            }
        }
    }

    #[test]
    fn secondary_database_holds_only_media() {
        let sql = [tables(Target::Secondary), indexes(Target::Secondary)].concat();

        assert_eq!(sql.len(), 2);
        assert!(sql.iter().all(|sql| sql.contains("\"media_files\"")), "{sql:#?}");

        let primary = tables(Target::Primary).join("\n");
        for table in ["banned_users", "banned_chats", "premium_users"] {
            assert!(primary.contains(&format!("\"{table}\"")), "{primary}");
        }
    }
}
