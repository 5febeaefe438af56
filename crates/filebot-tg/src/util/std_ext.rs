use easy_ext::ext;

pub(crate) mod prelude {
    pub(crate) use super::{ErrorExt as _, StrExt as _};
}

#[ext(ErrorExt)]
pub(crate) impl<E> E
where
    E: std::error::Error + ?Sized,
{
    /// Renders the error together with all of its `source()`s
    fn display_chain(&self) -> display_error_chain::DisplayErrorChain<&Self> {
        display_error_chain::DisplayErrorChain::new(self)
    }
}

#[ext(StrExt)]
pub(crate) impl str {
    /// Cuts the string at `max_chars` characters, never splitting a char
    fn truncate_chars(&self, max_chars: usize) -> &str {
        match self.char_indices().nth(max_chars) {
            Some((end, _)) => &self[..end],
            None => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_at_char_boundary() {
        assert_eq!("ᴘʟᴇᴀꜱᴇ".truncate_chars(3), "ᴘʟᴇ");
        assert_eq!("short".truncate_chars(10), "short");
        assert_eq!("exact".truncate_chars(5), "exact");
        assert_eq!("".truncate_chars(0), "");
    }
}
