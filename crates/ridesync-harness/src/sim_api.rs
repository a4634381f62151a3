//! [`RideApi`] backed by the in-memory [`SimBackend`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use ridesync_client::{ApiCall, ApiError, ApiReply, RideApi};

use crate::sim_backend::{Push, SimBackend};

/// Shared handle to a simulated backend.
pub type SharedBackend = Arc<Mutex<SimBackend>>;

/// REST client for one simulated user.
///
/// Socket pushes produced by a call are collected, not delivered; the test
/// drains them with [`SimApi::take_pushes`].
#[derive(Debug, Clone)]
pub struct SimApi {
    backend: SharedBackend,
    user: String,
    pushes: Arc<Mutex<Vec<Push>>>,
    fail_next: Arc<Mutex<Option<ApiError>>>,
}

impl SimApi {
    /// Client acting as `user`.
    pub fn new(backend: SharedBackend, user: impl Into<String>) -> Self {
        Self {
            backend,
            user: user.into(),
            pushes: Arc::default(),
            fail_next: Arc::default(),
        }
    }

    /// User this client acts as.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Fail the next call with `err` without reaching the backend.
    pub fn fail_next(&self, err: ApiError) {
        *lock(&self.fail_next) = Some(err);
    }

    /// Pushes produced so far.
    pub fn take_pushes(&self) -> Vec<Push> {
        std::mem::take(&mut *lock(&self.pushes))
    }
}

#[async_trait]
impl RideApi for SimApi {
    async fn execute(&self, call: ApiCall) -> Result<ApiReply, ApiError> {
        if let Some(err) = lock(&self.fail_next).take() {
            return Err(err);
        }
        let (result, pushes) = lock(&self.backend).handle_call(&self.user, &call);
        lock(&self.pushes).extend(pushes);
        result
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
