//! Single-slot suspend/resume channel.
//!
//! One side parks on a [`Pending`] future while the other side is handed the
//! matching [`Slot`]. Filling the slot resumes the waiter exactly once;
//! dropping it resumes the waiter with `None`. There is no timeout: a waiter
//! stays parked until the slot is filled or dropped, or its task is aborted.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Creates a connected slot/waiter pair.
pub fn channel<T>() -> (Slot<T>, Pending<T>) {
    let (tx, rx) = oneshot::channel();
    (Slot(tx), Pending(rx))
}

/// The producing half. Consumed on fill, so a value is delivered at most once.
#[derive(Debug)]
pub struct Slot<T>(oneshot::Sender<T>);

impl<T> Slot<T> {
    /// Delivers `value` to the waiter, handing it back if the waiter is gone.
    pub fn fill(self, value: T) -> Result<(), T> {
        self.0.send(value)
    }
}

/// The waiting half.
#[derive(Debug)]
pub struct Pending<T>(oneshot::Receiver<T>);

impl<T> Future for Pending<T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().0).poll(cx).map(Result::ok)
    }
}
