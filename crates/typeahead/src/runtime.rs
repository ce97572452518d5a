use core::future::Future;

/// Abstracts over how the coordinator's worker task is started.
///
/// This allows a [`Coordinator`](crate::Coordinator) to run on runtimes like
/// `Tokio` or `Smol`. The worker is a single long-lived task that parks on a
/// notifier while idle, so any executor able to drive a `Send` future works.
pub trait Spawner {
    /// Detaches `future` onto the runtime. The future runs until the
    /// coordinator shuts down.
    fn spawn<F>(future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// A [`Spawner`] that uses [`tokio::spawn`].
///
/// Must be used from within a Tokio runtime.
#[cfg_attr(docsrs, doc(cfg(feature = "async-tokio")))]
#[cfg(feature = "async-tokio")]
pub struct TokioSpawner;

#[cfg(feature = "async-tokio")]
impl Spawner for TokioSpawner {
    fn spawn<F>(future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        drop(tokio::spawn(future));
    }
}

/// A [`Spawner`] that uses Smol's global executor.
#[cfg_attr(docsrs, doc(cfg(feature = "async-smol")))]
#[cfg(feature = "async-smol")]
pub struct SmolSpawner;

#[cfg(feature = "async-smol")]
impl Spawner for SmolSpawner {
    fn spawn<F>(future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        smol::spawn(future).detach();
    }
}
