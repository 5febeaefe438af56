use super::{Error, ErrorKind, Result};
use crate::util::DynError;
use easy_ext::ext;

#[ext(ResultExt)]
pub(crate) impl<T, E> std::result::Result<T, E> {
    /// Marks the error as unrecoverable, keeping it as the source
    #[track_caller]
    fn fatal_ctx<M>(self, message: impl FnOnce() -> M) -> Result<T>
    where
        M: Into<String>,
        E: Into<Box<DynError>>,
    {
        match self {
            Ok(value) => Ok(value),
            Err(source) => Err(fatal(message().into(), Some(source.into()))),
        }
    }
}

#[ext(OptionExt)]
pub(crate) impl<T> Option<T> {
    /// Treats `None` as an unrecoverable error
    #[track_caller]
    fn fatal_ctx<M>(self, message: impl FnOnce() -> M) -> Result<T>
    where
        M: Into<String>,
    {
        match self {
            Some(value) => Ok(value),
            None => Err(fatal(message().into(), None)),
        }
    }
}

#[track_caller]
fn fatal(message: String, source: Option<Box<DynError>>) -> Error {
    Error::from(ErrorKind::Fatal { message, source })
}
