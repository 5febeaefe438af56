/// Wraps an error variant into the crate-level [`Error`]. Every field goes
/// through [`Into`], and the `field` shorthand is allowed:
///
/// ```ignore
/// err!(TelegraphError::Api { method, message: description })
/// ```
///
/// [`Error`]: crate::Error
macro_rules! err {
    ($($variant:ident)::+ $({ $($field:ident $(: $value:expr)?),* $(,)? })?) => {
        $crate::error::Error::from(
            $($variant)::+ $({$(
                $field: ::std::convert::Into::into($crate::error::field_value!($field $(, $value)?))
            ),*})?
        )
    };
}

#[doc(hidden)]
macro_rules! field_value {
    ($field:ident, $value:expr) => {
        $value
    };
    ($field:ident) => {
        $field
    };
}

/// `map_err` closure that puts the error into the `source` field of the
/// variant
macro_rules! err_ctx {
    ($($variant:ident)::+ $({ $($fields:tt)* })?) => {
        |source| $crate::error::err!($($variant)::+ { source, $($($fields)*)? })
    };
}

/// [`ErrorKind::Fatal`] with a formatted message and no source
///
/// [`ErrorKind::Fatal`]: crate::ErrorKind::Fatal
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::error::Error::from($crate::error::ErrorKind::Fatal {
            message: ::std::format!($($arg)*),
            source: ::std::option::Option::None,
        })
    };
}

pub(crate) use err;
pub(crate) use err_ctx;
pub(crate) use fatal;
pub(crate) use field_value;
