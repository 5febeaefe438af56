use teloxide::types::{InlineKeyboardButton, InlineKeyboardButtonKind, InlineKeyboardMarkup};
use url::Url;

/// Prefix of the callback data of the buttons that trigger the extraction
pub(crate) const EXTRACT_ACTION: &str = "extract_data";

/// Callback data of the placeholder button shown while the extraction runs
pub(crate) const WAIT_ACTION: &str = "wait_data";

const WAITING_TEXT: &str = "ᴘʟᴇᴀꜱᴇ ᴡᴀɪᴛ... ⏳";
const VIEW_TRACKS_TEXT: &str = "📝 ᴠɪᴇᴡ ᴛʀᴀᴄᴋꜱ 📝";

/// Callback payload of the form `{action}:{file_id}`
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct CallbackPayload<'a> {
    pub(crate) action: &'a str,
    pub(crate) file_id: &'a str,
}

pub(crate) fn parse_callback_payload(data: &str) -> Option<CallbackPayload<'_>> {
    let (action, file_id) = data.split_once(':')?;

    if file_id.is_empty() || file_id.contains(':') {
        return None;
    }

    Some(CallbackPayload { action, file_id })
}

impl CallbackPayload<'_> {
    /// Other buttons may share the prefix, e.g. `extract_data_v2:...`
    pub(crate) fn is_extract(&self) -> bool {
        self.action == EXTRACT_ACTION
    }
}

/// Replaces the button that carries `clicked` callback data with the
/// "please wait" placeholder. Missing markup yields an empty keyboard.
pub(crate) fn with_waiting_button(
    markup: Option<&InlineKeyboardMarkup>,
    clicked: &str,
) -> InlineKeyboardMarkup {
    replace_button(markup, clicked, || {
        InlineKeyboardButton::callback(WAITING_TEXT, WAIT_ACTION)
    })
}

/// Replaces the button that carries `clicked` callback data with a link
pub(crate) fn with_link_button(
    markup: Option<&InlineKeyboardMarkup>,
    clicked: &str,
    url: &Url,
) -> InlineKeyboardMarkup {
    replace_button(markup, clicked, || {
        InlineKeyboardButton::url(VIEW_TRACKS_TEXT, url.clone())
    })
}

fn replace_button(
    markup: Option<&InlineKeyboardMarkup>,
    clicked: &str,
    replacement: impl Fn() -> InlineKeyboardButton,
) -> InlineKeyboardMarkup {
    let Some(markup) = markup else {
        return InlineKeyboardMarkup::default();
    };

    let rows = markup.inline_keyboard.iter().map(|row| {
        row.iter()
            .map(|button| match &button.kind {
                InlineKeyboardButtonKind::CallbackData(data) if data == clicked => replacement(),
                _ => button.clone(),
            })
            .collect::<Vec<_>>()
    });

    InlineKeyboardMarkup::new(rows)
}

/// Whether the markup still shows the "please wait" placeholder
#[cfg(test)]
pub(crate) fn is_waiting(markup: &InlineKeyboardMarkup) -> bool {
    markup.inline_keyboard.iter().flatten().any(|button| {
        matches!(&button.kind, InlineKeyboardButtonKind::CallbackData(data) if data == WAIT_ACTION)
    })
}
