use tch::TchError;
use thiserror::Error;
use dashrelay_core::error::DashError;

/// Error type of this crate, wraps [`DashError`] and errors of torch backend.
#[derive(Error, Debug)]
pub enum DashRlError{
    /// Variant - [`DashError`]
    #[error("Basic dashrelay error: {source}")]
    Core{
        #[source]
        source: DashError
    },
    /// Variant wrapping error captured by [`tch`]
    #[error("Torch error: {source} in context: {context:}")]
    Torch{
        #[source]
        source: TchError,
        context: String
    },
    #[error("Not enough samples in replay memory: {available} available, {required} required")]
    NotEnoughSamples{
        available: usize,
        required: usize,
    },
}

impl DashRlError{
    pub(crate) fn torch(context: &str) -> impl FnOnce(TchError) -> Self + '_{
        move |source| Self::Torch{source, context: context.to_string()}
    }
}

impl From<TchError> for DashRlError{
    fn from(value: TchError) -> Self {
        Self::Torch{
            source: value,
            context: String::from("unspecified")
        }
    }
}

impl From<DashError> for DashRlError{
    fn from(value: DashError) -> Self {
        Self::Core{source: value}
    }
}

impl From<DashRlError> for DashError{
    fn from(value: DashRlError) -> Self {
        match value{
            DashRlError::Core{source: n} => n,
            any => DashError::Agent{context: format!("{any}")}
        }
    }
}
