use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::MutexGuard};
use embassy_time::{with_timeout, Duration};

use crate::{
    adapter::{Adapter, Inner},
    chip::{Chip, Handle},
    error::{NativeStatus, SockError},
};

pub(crate) type Guard<'a, C> = MutexGuard<'a, CriticalSectionRawMutex, Inner<C>>;

impl<C: Chip> Adapter<C> {
    /// Parks the caller until the completion for `handle` arrives or `timeout`
    /// passes. The adapter lock is released for the duration of the wait.
    ///
    /// The caller must already have issued the native command while holding
    /// `guard`, and must have checked that nobody else waits on the socket.
    pub(crate) async fn wait_completion<'a>(
        &'a self,
        mut guard: Guard<'a, C>,
        handle: Handle,
        timeout: Duration,
    ) -> (Guard<'a, C>, Result<(), SockError>) {
        let generation = guard.table.generation(handle);
        match guard.table.get_mut(handle) {
            Ok(record) => record.waiting = true,
            Err(err) => return (guard, Err(err)),
        }
        let signal = &self.completions[handle.index()];
        drop(guard);

        let outcome = with_timeout(timeout, signal.wait()).await;

        let mut guard = self.inner.lock().await;
        // A completion posted while the lock was contended outranks the timeout.
        let posted = signal.try_take();
        signal.reset();
        if !guard.table.is_current(handle, generation) {
            return (guard, Err(SockError::ConnectionAborted));
        }
        if let Ok(record) = guard.table.get_mut(handle) {
            record.waiting = false;
        }
        let result = match outcome.ok().or(posted) {
            Some(status) => status.into_result(),
            None => {
                log::warn!("wincnet: sync call timed out handle={}", handle.raw());
                Err(SockError::TimedOut)
            }
        };
        (guard, result)
    }

    /// Hands `status` to a caller parked on `handle`, if there is one.
    pub(crate) fn wake(&self, inner: &mut Inner<C>, handle: Handle, status: NativeStatus) {
        if inner.table.get(handle).is_ok_and(|record| record.waiting) {
            self.completions[handle.index()].signal(status);
        }
    }

    pub(crate) fn arm_completion(&self, handle: Handle) {
        self.completions[handle.index()].reset();
    }
}
