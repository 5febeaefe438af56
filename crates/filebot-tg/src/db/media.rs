use super::DbError;
use crate::prelude::*;
use crate::{err, Result};
use async_trait::async_trait;
use sea_query::{Expr, Iden, PostgresQueryBuilder, Query};
use sea_query_binder::SqlxBinder;

#[derive(Iden)]
pub(super) enum MediaFiles {
    Table,
    FileId,
    FileName,
    FileSize,
    FileType,
    MimeType,
    Caption,
}

/// The kind of the Telegram media the file was originally sent as.
/// Telegram rejects re-sending a file id with a method of a different kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum StoredFileKind {
    Video,
    Audio,
    Document,
}

#[derive(Debug, Clone)]
pub(crate) struct StoredFile {
    pub(crate) file_id: String,
    pub(crate) file_name: String,
    pub(crate) file_size: u64,
    pub(crate) kind: StoredFileKind,
}

#[derive(sqlx::FromRow)]
struct StoredFileRecord {
    file_id: String,
    file_name: String,
    file_size: i64,
    file_type: String,
}

impl StoredFileRecord {
    fn try_into_app(self) -> Result<StoredFile> {
        let file_size = u64::try_from(self.file_size).map_err(|_| {
            err!(DbError::OutOfRange {
                app_ty: "u64",
                db_val: self.file_size,
            })
        })?;

        // Unknown kinds may come from the files indexed by older versions
        // of the bot, and the document kind is the most permissive one.
        let kind = self.file_type.parse().unwrap_or_else(|_| {
            warn!(file_type = %self.file_type, "Unknown stored file type");
            StoredFileKind::Document
        });

        Ok(StoredFile {
            file_id: self.file_id,
            file_name: self.file_name,
            file_size,
            kind,
        })
    }
}

/// The lookup service of the stored files
#[async_trait]
pub(crate) trait FileLookup: Send + Sync {
    /// Absence of the file is a valid outcome, not an error
    async fn file_details(&self, file_id: &str) -> Result<Option<StoredFile>>;
}

pub(crate) struct MediaRepo {
    primary: sqlx::PgPool,
    secondary: Option<sqlx::PgPool>,
}

impl MediaRepo {
    pub(crate) fn new(primary: sqlx::PgPool, secondary: Option<sqlx::PgPool>) -> Self {
        Self { primary, secondary }
    }

    async fn find_in(db: &sqlx::PgPool, file_id: &str) -> Result<Option<StoredFile>> {
        let (sql, values) = Query::select()
            .columns([
                MediaFiles::FileId,
                MediaFiles::FileName,
                MediaFiles::FileSize,
                MediaFiles::FileType,
            ])
            .from(MediaFiles::Table)
            .and_where(Expr::col(MediaFiles::FileId).eq(file_id))
            .build_sqlx(PostgresQueryBuilder);

        sqlx::query_as_with::<_, StoredFileRecord, _>(&sql, values)
            .fetch_optional(db)
            .await
            .map_err(DbError::from)?
            .map(StoredFileRecord::try_into_app)
            .transpose()
    }
}

#[async_trait]
impl FileLookup for MediaRepo {
    #[instrument(skip(self))]
    async fn file_details(&self, file_id: &str) -> Result<Option<StoredFile>> {
        if let Some(file) = Self::find_in(&self.primary, file_id).await? {
            return Ok(Some(file));
        }

        let Some(secondary) = &self.secondary else {
            return Ok(None);
        };

        Self::find_in(secondary, file_id).await
    }
}
