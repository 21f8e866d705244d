//! The single in-flight request cell.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::protocol::{DataFrame, FunctionId};

/// A request on the wire, waiting for its responses.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    id: u64,
    function: FunctionId,
    multi_response: bool,
    responses: Vec<DataFrame>,
    completion: Option<oneshot::Sender<Vec<DataFrame>>>,
}

impl PendingRequest {
    pub(crate) fn new(
        id: u64,
        request: &DataFrame,
        completion: oneshot::Sender<Vec<DataFrame>>,
    ) -> Self {
        let function = request.function();
        Self {
            id,
            function,
            multi_response: function.expects_multi_response(),
            responses: Vec::new(),
            completion: Some(completion),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn function(&self) -> FunctionId {
        self.function
    }

    /// Record a frame with the request's function code.
    ///
    /// Returns `true` when the request is now settled: on the first match for
    /// simple requests, and on the first Request-kind match (the callback)
    /// for send-data requests.
    pub(crate) fn accept(&mut self, frame: DataFrame) -> bool {
        let settles = !self.multi_response || frame.is_request();
        self.responses.push(frame);
        settles
    }

    /// Resolve the completion handle with the collected responses.
    pub(crate) fn complete(mut self) {
        if let Some(completion) = self.completion.take() {
            // The caller may already be gone (cancelled or dropped).
            let _ = completion.send(std::mem::take(&mut self.responses));
        }
    }
}

/// Mutex-guarded "current request" cell shared by `dispatch` and the read loop.
///
/// Critical sections are short and never span an `.await`.
#[derive(Debug, Default)]
pub(crate) struct PendingCell {
    current: Mutex<Option<PendingRequest>>,
}

impl PendingCell {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Option<PendingRequest>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn install(&self, request: PendingRequest) {
        let previous = self.lock().replace(request);
        debug_assert!(previous.is_none(), "in-flight slot held while cell occupied");
    }

    /// Remove the current request only if it is still request `id`.
    pub(crate) fn clear_if(&self, id: u64) -> Option<PendingRequest> {
        let mut current = self.lock();
        match current.as_ref() {
            Some(pending) if pending.id() == id => current.take(),
            _ => None,
        }
    }

    /// Remove whatever is in flight; its caller sees the completion dropped.
    pub(crate) fn take(&self) -> Option<PendingRequest> {
        self.lock().take()
    }

    pub(crate) fn current_function(&self) -> Option<FunctionId> {
        self.lock().as_ref().map(PendingRequest::function)
    }
}

/// Clears the cell when `dispatch` returns or its future is dropped.
pub(crate) struct PendingGuard<'a> {
    pub(crate) cell: &'a PendingCell,
    pub(crate) id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.cell.clear_if(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameType;

    fn request(function: FunctionId) -> DataFrame {
        DataFrame::request(function, &[]).unwrap()
    }

    #[test]
    fn test_simple_request_settles_on_response() {
        let (tx, mut rx) = oneshot::channel();
        let mut pending = PendingRequest::new(1, &request(FunctionId::GET_VERSION), tx);

        let response = DataFrame::response(FunctionId::GET_VERSION, &[0x01]).unwrap();
        assert!(pending.accept(response.clone()));
        pending.complete();

        assert_eq!(rx.try_recv().unwrap(), vec![response]);
    }

    #[test]
    fn test_send_data_waits_for_callback() {
        let (tx, mut rx) = oneshot::channel();
        let mut pending = PendingRequest::new(1, &request(FunctionId::SEND_DATA), tx);

        let immediate = DataFrame::response(FunctionId::SEND_DATA, &[0x01]).unwrap();
        let callback =
            DataFrame::new(FrameType::Request, FunctionId::SEND_DATA, vec![0x07, 0x00]).unwrap();

        assert!(!pending.accept(immediate.clone()));
        assert!(pending.accept(callback.clone()));
        pending.complete();

        assert_eq!(rx.try_recv().unwrap(), vec![immediate, callback]);
    }

    #[test]
    fn test_clear_if_checks_identity() {
        let cell = PendingCell::default();
        let (tx, _rx) = oneshot::channel();
        cell.install(PendingRequest::new(7, &request(FunctionId::GET_VERSION), tx));

        assert!(cell.clear_if(6).is_none());
        assert_eq!(cell.current_function(), Some(FunctionId::GET_VERSION));
        assert!(cell.clear_if(7).is_some());
        assert!(cell.current_function().is_none());
    }

    #[test]
    fn test_guard_clears_on_drop() {
        let cell = PendingCell::default();
        let (tx, mut rx) = oneshot::channel();
        cell.install(PendingRequest::new(3, &request(FunctionId::MEMORY_GET_ID), tx));

        drop(PendingGuard { cell: &cell, id: 3 });

        assert!(cell.take().is_none());
        assert!(rx.try_recv().is_err());
    }
}
