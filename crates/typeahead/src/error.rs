//! Error types surfaced through a [`QueryFuture`].
//!
//! ## Error Cases
//! - `Backend`: the backend failed while executing the freshest request.
//! - `Superseded`: a newer submission (or [`Coordinator::stop`]) made the
//!   request stale before its result could be delivered.
//! - `Shutdown`: the coordinator was closed before the request completed, or
//!   the request was submitted after [`Coordinator::close`] began.
//!
//! [`QueryFuture`]: crate::QueryFuture
//! [`Coordinator::stop`]: crate::Coordinator::stop
//! [`Coordinator::close`]: crate::Coordinator::close

pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Unified error type for a submitted query.
///
/// The generic parameter `E` is the backend's own error type. Backend errors
/// are only ever reported for the request that was still the freshest when
/// the backend returned; a stale request's failure is presumed to be a side
/// effect of being interrupted and is reported as [`Error::Superseded`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error<E>
where
    E: core::error::Error + 'static,
{
    /// The backend failed while executing this request.
    #[error("Backend error: {0}")]
    Backend(#[source] E),

    /// A newer submission made this request stale.
    #[error("Query superseded by a newer submission")]
    Superseded,

    /// The coordinator is shut down.
    #[error("Coordinator is shut down")]
    Shutdown,
}

impl<E> Error<E>
where
    E: core::error::Error + 'static,
{
    /// Returns `true` if the request lost freshness rather than failing.
    pub const fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded)
    }

    /// Returns `true` if the coordinator was closed underneath the request.
    pub const fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }

    /// Returns the backend error, if this is one.
    pub const fn backend(&self) -> Option<&E> {
        match self {
            Self::Backend(e) => Some(e),
            _ => None,
        }
    }
}
