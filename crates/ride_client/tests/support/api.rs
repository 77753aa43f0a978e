use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ride_client::dispatch::{BookingApi, DispatchError, DriverAction};
use ride_core::booking::{BookingId, BookingRequest, BookingSnapshot};
use ride_core::test_helpers::snapshot;

#[derive(Debug, Default)]
struct Calls {
    submits: Vec<BookingRequest>,
    fetches: usize,
    responses: Vec<(BookingId, String, DriverAction)>,
    completions: Vec<(BookingId, String)>,
    cancels: Vec<BookingId>,
}

/// Booking backend double. Polls replay a script, then report REQUESTED.
#[derive(Debug, Clone)]
pub struct ScriptedApi {
    submit_result: Arc<Mutex<Result<BookingId, DispatchError>>>,
    polls: Arc<Mutex<VecDeque<Result<BookingSnapshot, DispatchError>>>>,
    fetch_delay: Duration,
    calls: Arc<Mutex<Calls>>,
}

impl ScriptedApi {
    pub fn new(booking_id: &str) -> Self {
        Self {
            submit_result: Arc::new(Mutex::new(Ok(BookingId::new(booking_id)))),
            polls: Arc::new(Mutex::new(VecDeque::new())),
            fetch_delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Calls::default())),
        }
    }

    /// Every poll answers only after `delay`.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn failing_submit(error: DispatchError) -> Self {
        let api = Self::new("unused");
        *api.submit_result.lock().expect("lock") = Err(error);
        api
    }

    /// Queue poll responses `(status, driver)` for booking `id`.
    pub fn queue_polls(&self, id: &str, polls: &[(&str, Option<&str>)]) {
        let mut queue = self.polls.lock().expect("lock");
        for (status, driver) in polls {
            queue.push_back(Ok(snapshot(id, status, *driver)));
        }
    }

    pub fn queue_poll_result(&self, result: Result<BookingSnapshot, DispatchError>) {
        self.polls.lock().expect("lock").push_back(result);
    }

    pub fn submit_calls(&self) -> usize {
        self.calls.lock().expect("lock").submits.len()
    }

    pub fn fetch_calls(&self) -> usize {
        self.calls.lock().expect("lock").fetches
    }

    pub fn responses(&self) -> Vec<(BookingId, String, DriverAction)> {
        self.calls.lock().expect("lock").responses.clone()
    }

    pub fn completions(&self) -> Vec<(BookingId, String)> {
        self.calls.lock().expect("lock").completions.clone()
    }

    pub fn cancels(&self) -> Vec<BookingId> {
        self.calls.lock().expect("lock").cancels.clone()
    }
}

impl BookingApi for ScriptedApi {
    async fn submit(&self, request: &BookingRequest) -> Result<BookingId, DispatchError> {
        self.calls.lock().expect("lock").submits.push(request.clone());
        self.submit_result.lock().expect("lock").clone()
    }

    async fn fetch(&self, id: &BookingId) -> Result<BookingSnapshot, DispatchError> {
        self.calls.lock().expect("lock").fetches += 1;
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        let next = self.polls.lock().expect("lock").pop_front();
        next.unwrap_or_else(|| Ok(snapshot(id.as_str(), "REQUESTED", None)))
    }

    async fn respond(
        &self,
        id: &BookingId,
        driver_id: &str,
        action: DriverAction,
    ) -> Result<BookingSnapshot, DispatchError> {
        self.calls
            .lock()
            .expect("lock")
            .responses
            .push((id.clone(), driver_id.to_string(), action));
        Ok(match action {
            DriverAction::Accept => snapshot(id.as_str(), "IN_PROGRESS", Some(driver_id)),
            DriverAction::Decline => snapshot(id.as_str(), "REQUESTED", None),
        })
    }

    async fn complete(&self, id: &BookingId, driver_id: &str) -> Result<(), DispatchError> {
        self.calls
            .lock()
            .expect("lock")
            .completions
            .push((id.clone(), driver_id.to_string()));
        Ok(())
    }

    async fn cancel(&self, id: &BookingId) -> Result<(), DispatchError> {
        self.calls.lock().expect("lock").cancels.push(id.clone());
        Ok(())
    }
}
