use super::OpId;
use super::event_loop::Message;
use crate::error::Fault;

use std::any::Any;
use std::marker::PhantomData;
use std::sync::mpsc::Sender;

/// The producing side of a loop-registered operation.
///
/// `Completer` is `Send`: hand it to whatever thread or runtime performs the
/// I/O. It settles its operation at most once; dropping it unsettled rejects
/// the operation with [`Fault::Abandoned`] so the awaiting unit never hangs.
pub struct Completer<T> {
    op: OpId,
    tx: Option<Sender<Message>>,
    _payload: PhantomData<fn(T)>,
}

impl<T> Completer<T> {
    pub(crate) fn new(op: OpId, tx: Sender<Message>) -> Self {
        Self {
            op,
            tx: Some(tx),
            _payload: PhantomData,
        }
    }

    pub fn op(&self) -> OpId {
        self.op
    }

    fn send(&mut self, payload: Result<Box<dyn Any + Send>, Fault>) {
        if let Some(tx) = self.tx.take() {
            if tx.send(Message::Complete { op: self.op, payload }).is_err() {
                tracing::debug!(op = %self.op, "Event loop gone; completion dropped");
            }
        }
    }
}

impl<T: Send + 'static> Completer<T> {
    pub fn complete(mut self, outcome: Result<T, Fault>) {
        let payload = outcome.map(|value| Box::new(value) as Box<dyn Any + Send>);
        self.send(payload);
    }

    pub fn fulfill(self, value: T) {
        self.complete(Ok(value));
    }

    pub fn reject(self, fault: Fault) {
        self.complete(Err(fault));
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!(op = %self.op, "Completer dropped without settling its operation");
            self.send(Err(Fault::Abandoned));
        }
    }
}
