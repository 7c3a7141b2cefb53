//! Common error definitions.

use crate::{can::CanError, clocks::RccError, spi::SpiError, usart::UsartError};

macro_rules! impl_from_error {
    ($error:ident) => {
        impl From<$error> for Error {
            fn from(error: $error) -> Self {
                Self::$error(error)
            }
        }
    };
}

/// Alias for Result<T, Error>.
pub type Result<T> = core::result::Result<T, Error>;

/// Collection of all errors that can occur.
#[derive(Debug, Clone, Copy, Eq, PartialEq, defmt::Format)]
pub enum Error {
    /// Clock errors.
    RccError(RccError),
    UsartError(UsartError),
    SpiError(SpiError),
    CanError(CanError),
}

impl_from_error!(RccError);
impl_from_error!(UsartError);
impl_from_error!(SpiError);
impl_from_error!(CanError);
