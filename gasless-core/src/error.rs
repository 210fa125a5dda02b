use std::any::Any;
use std::error::Error as StdError;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;

/// The result of interacting with a chain.
pub type ChainResult<T> = Result<T, ChainCommunicationError>;

/// An "Any"-typed error.
pub trait RelayCustomError: StdError + Send + Sync + Any {}

impl<E: StdError + Send + Sync + Any> RelayCustomError for E {}

/// Thin wrapper around a boxed RelayCustomError so that it can live inside
/// `ChainCommunicationError` as a trait object.
#[repr(transparent)]
pub struct RelayCustomErrorWrapper(Box<dyn RelayCustomError>);

impl Debug for RelayCustomErrorWrapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", AsRef::<dyn RelayCustomError>::as_ref(&self))
    }
}

impl Display for RelayCustomErrorWrapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", AsRef::<dyn RelayCustomError>::as_ref(&self))
    }
}

impl StdError for RelayCustomErrorWrapper {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl AsRef<dyn RelayCustomError> for RelayCustomErrorWrapper {
    fn as_ref(&self) -> &dyn RelayCustomError {
        self.0.as_ref()
    }
}

impl Deref for RelayCustomErrorWrapper {
    type Target = Box<dyn RelayCustomError>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// ChainCommunicationError contains errors returned when attempting to
/// read chain state or broadcast a transaction
#[derive(Debug, thiserror::Error)]
pub enum ChainCommunicationError {
    /// The node answered, but without the data we asked for
    #[error("{0}")]
    CustomError(String),
    /// Any other error; does not implement `From` to prevent
    /// conflicting/absorbing other errors.
    #[error(transparent)]
    Other(RelayCustomErrorWrapper),
}

impl ChainCommunicationError {
    /// Create a chain communication error from any other existing error
    pub fn from_other<E: RelayCustomError>(err: E) -> Self {
        Self::Other(RelayCustomErrorWrapper(Box::new(err)))
    }

    /// Creates a chain communication error of the other error variant from a static string
    pub fn from_other_str(err: &'static str) -> Self {
        #[derive(Debug)]
        #[repr(transparent)]
        struct StringError(&'static str);
        impl Display for StringError {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.0)
            }
        }
        impl StdError for StringError {}

        Self::from_other(StringError(err))
    }
}
