//! The [`System`] capability trait.
//!
//! Anything with an `update` hook qualifies as a system; `initialize` and
//! `dispose` default to no-ops. The world calls:
//!
//! - `initialize` once at registration, outside the tick loop. An error
//!   rejects the system.
//! - `update` once per tick, possibly on a worker thread alongside the other
//!   systems of its wave. An error (or panic) discards that system's changes
//!   for the tick and is counted in its statistics.
//! - `dispose` once when the system is unregistered or the world is disposed.
//!   Errors are logged and otherwise ignored.

use anyhow::Result;

use crate::context::SystemContext;

/// A unit of update logic scheduled by the world.
pub trait System: Send {
    /// Prepare the system. Called once, before it is first scheduled.
    ///
    /// # Errors
    ///
    /// An error rejects the registration.
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Advance the system by one tick.
    ///
    /// # Errors
    ///
    /// An error discards every change buffered in `ctx` for this tick.
    fn update(&mut self, ctx: &mut SystemContext<'_>) -> Result<()>;

    /// Release resources. Called once at teardown.
    ///
    /// # Errors
    ///
    /// Errors are logged by the world and otherwise ignored.
    fn dispose(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: System + ?Sized> System for Box<S> {
    fn initialize(&mut self) -> Result<()> {
        (**self).initialize()
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>) -> Result<()> {
        (**self).update(ctx)
    }

    fn dispose(&mut self) -> Result<()> {
        (**self).dispose()
    }
}

/// A [`System`] backed by a closure.
///
/// Useful for small systems that need no initialisation or teardown.
pub struct FnSystem<F>
where
    F: FnMut(&mut SystemContext<'_>) -> Result<()> + Send,
{
    f: F,
}

impl<F> FnSystem<F>
where
    F: FnMut(&mut SystemContext<'_>) -> Result<()> + Send,
{
    /// Wrap a closure as a system.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&mut SystemContext<'_>) -> Result<()> + Send,
{
    fn update(&mut self, ctx: &mut SystemContext<'_>) -> Result<()> {
        (self.f)(ctx)
    }
}

impl<F> std::fmt::Debug for FnSystem<F>
where
    F: FnMut(&mut SystemContext<'_>) -> Result<()> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSystem").finish_non_exhaustive()
    }
}
