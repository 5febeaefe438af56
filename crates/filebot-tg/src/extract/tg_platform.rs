use super::*;
use super::Request;
use crate::prelude::*;
use crate::db::StoredFileKind;
use crate::tg::{self, Bot};
use crate::util::DynResult;
use std::path::Path;
use std::sync::Arc;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileMeta, InputFile, MessageId, ReplyParameters};
use tokio_util::io::ReaderStream;

/// Telegram rejects longer callback query answers
const MAX_ALERT_CHARS: usize = 200;

/// [`Platform`] bound to a single callback query
pub(crate) struct TgPlatform<'a> {
    bot: &'a Bot,
    bin_channel: ChatId,
    query_id: String,
    chat_id: ChatId,
    message_id: MessageId,
}

#[async_trait]
impl Platform for TgPlatform<'_> {
    async fn edit_markup(&self, markup: InlineKeyboardMarkup) -> Result {
        self.bot
            .edit_message_reply_markup(self.chat_id, self.message_id)
            .reply_markup(markup)
            .await?;
        Ok(())
    }

    async fn alert(&self, text: &str) -> Result {
        self.bot
            .answer_callback_query(self.query_id.clone())
            .text(text.truncate_chars(MAX_ALERT_CHARS))
            .show_alert(true)
            .await?;
        Ok(())
    }

    async fn reply(&self, text: &str) -> Result {
        self.bot
            .send_message(self.chat_id, text)
            .reply_parameters(ReplyParameters::new(self.message_id))
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(kind = %file.kind))]
    async fn materialize(&self, file: &StoredFile) -> Result<Materialized> {
        let input = InputFile::file_id(file.file_id.clone());
        let chat = self.bin_channel;

        // A file id can only be re-sent with the method of its original kind
        let message = match file.kind {
            StoredFileKind::Video => self.bot.send_video(chat, input).await?,
            StoredFileKind::Audio => self.bot.send_audio(chat, input).await?,
            StoredFileKind::Document => self.bot.send_document(chat, input).await?,
        };

        let (meta, file_name) = downloadable_media(&message)
            .fatal_ctx(|| "Re-sent message carries no downloadable media")?;

        Ok(Materialized {
            file_id: meta.id.clone(),
            file_name: file_name.unwrap_or(&file.file_name).to_owned(),
            file_size: u64::from(meta.size),
        })
    }

    async fn stream(&self, file: &Materialized, _limit: u64) -> Result<ByteStream, StreamError> {
        let file = self
            .bot
            .get_file(file.file_id.clone())
            .await
            .map_err(resolve_error)?;

        if let Some(path) = local_file_path(&file.path) {
            debug!(path = %path.display(), "Reading the file from the local Bot API storage");
            return open_local(path).await;
        }

        let stream = self
            .bot
            .inner()
            .download_file_stream(&file.path)
            .map(|chunk| chunk.map_err(|err| StreamError::Download { source: err.into() }))
            .boxed();

        Ok(stream)
    }
}

/// A Bot API server started with `--local` returns absolute paths in its
/// own file system instead of paths relative to the download endpoint
fn local_file_path(path: &str) -> Option<&Path> {
    let path = Path::new(path);
    path.is_absolute().then_some(path)
}

async fn open_local(path: &Path) -> Result<ByteStream, StreamError> {
    let read_err = |source| StreamError::ReadLocal { source };

    let file = fs_err::tokio::File::open(path).await.map_err(read_err)?;

    let stream = ReaderStream::with_capacity(file, CHUNK_SIZE as usize)
        .map(move |chunk| chunk.map_err(read_err))
        .boxed();

    Ok(stream)
}

/// The public Bot API refuses to serve files over 20 MB
fn resolve_error(source: teloxide::RequestError) -> StreamError {
    if source.to_string().to_lowercase().contains("file is too big") {
        return StreamError::TooBig { source };
    }
    StreamError::Resolve { source }
}

fn downloadable_media(message: &Message) -> Option<(&FileMeta, Option<&str>)> {
    if let Some(video) = message.video() {
        return Some((&video.file, video.file_name.as_deref()));
    }
    if let Some(audio) = message.audio() {
        return Some((&audio.file, audio.file_name.as_deref()));
    }
    message
        .document()
        .map(|document| (&document.file, document.file_name.as_deref()))
}

#[instrument(skip_all, fields(
    from = %query.from.debug_id(),
    data = query.data.as_deref().unwrap_or("{none}"),
))]
pub(crate) async fn handle_extract_callback(ctx: Arc<tg::Ctx>, query: CallbackQuery) -> DynResult {
    let Some(data) = query.data.as_deref() else {
        warn!("Received empty callback data");
        return Ok(());
    };

    let Some(payload) = parse_callback_payload(data).filter(|payload| payload.is_extract()) else {
        warn!("Received malformed extraction callback data");
        return Ok(());
    };

    let Some(message) = &query.message else {
        warn!("Received extraction callback without a message");
        return Ok(());
    };

    let platform = TgPlatform {
        bot: &ctx.bot,
        bin_channel: ctx.cfg.bin_channel,
        query_id: query.id.clone(),
        chat_id: message.chat().id,
        message_id: message.id(),
    };

    let outcome = run_extraction(
        Seams {
            platform: &platform,
            lookup: &ctx.db.media,
            parser: &ctx.media_info,
            publisher: &ctx.telegraph,
        },
        Request {
            callback_data: data,
            file_id: payload.file_id,
            original_markup: message.regular_message().and_then(Message::reply_markup),
            temp_prefix: format!("acc_{}_{}", query.from.id, message.id().0),
        },
        Settings {
            cfg: &ctx.extract,
            footer: PageFooter {
                text: &ctx.telegraph_cfg.footer_text,
                url: &ctx.telegraph_cfg.footer_url,
            },
        },
    )
    .await;

    info!(?outcome, "Extraction finished");

    Ok(())
}
