use std::sync::mpsc::{Receiver, TryRecvError};

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Settled<T> {
    Pending,
    Ready(T),
    /// The sender went away without answering.
    Lost,
}

pub(crate) fn poll<T>(receiver: &Receiver<T>) -> Settled<T> {
    match receiver.try_recv() {
        Ok(value) => Settled::Ready(value),
        Err(TryRecvError::Empty) => Settled::Pending,
        Err(TryRecvError::Disconnected) => Settled::Lost,
    }
}

/// Drains every value currently queued. The flag reports a disconnect.
pub(crate) fn drain<T>(receiver: &Receiver<T>) -> (Vec<T>, bool) {
    let mut values = Vec::new();
    loop {
        match poll(receiver) {
            Settled::Ready(value) => values.push(value),
            Settled::Pending => return (values, false),
            Settled::Lost => return (values, true),
        }
    }
}
