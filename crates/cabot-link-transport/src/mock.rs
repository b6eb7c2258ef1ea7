//! In-memory [`GattPeripheral`] for tests and demos.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use crate::error::{Result, TransportError};
use crate::gatt::{Advertisement, AttRequest, AttResult, GattPeripheral, GattService};

#[derive(Debug, Default)]
struct State {
    services: Vec<GattService>,
    subscribers: HashMap<Uuid, usize>,
    updates: Vec<(Uuid, Vec<u8>)>,
    update_attempts: usize,
    reject_updates: usize,
    advertising: Option<Advertisement>,
    advertising_starts: usize,
    advertising_stops: usize,
    responses: Vec<(u64, AttResult)>,
    fail_add_service: bool,
    max_update_len: Option<usize>,
}

/// Records every call; subscriptions and rejections are scripted by the test.
#[derive(Debug, Default)]
pub struct MockPeripheral {
    state: Mutex<State>,
}

impl MockPeripheral {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, characteristic: Uuid) {
        *self.lock().subscribers.entry(characteristic).or_default() += 1;
    }

    pub fn unsubscribe_all(&self) {
        self.lock().subscribers.clear();
    }

    /// Make the next `n` calls to `update_value` report a full queue.
    pub fn reject_next_updates(&self, n: usize) {
        self.lock().reject_updates = n;
    }

    pub fn fail_add_service(&self, fail: bool) {
        self.lock().fail_add_service = fail;
    }

    pub fn set_maximum_update_value_length(&self, len: usize) {
        self.lock().max_update_len = Some(len);
    }

    /// Accepted updates, in order.
    pub fn updates(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.lock().updates.clone()
    }

    /// Accepted updates on one characteristic.
    pub fn updates_on(&self, characteristic: &Uuid) -> Vec<Vec<u8>> {
        self.lock()
            .updates
            .iter()
            .filter(|(uuid, _)| uuid == characteristic)
            .map(|(_, value)| value.clone())
            .collect()
    }

    pub fn update_attempts(&self) -> usize {
        self.lock().update_attempts
    }

    pub fn services(&self) -> Vec<GattService> {
        self.lock().services.clone()
    }

    pub fn responses(&self) -> Vec<(u64, AttResult)> {
        self.lock().responses.clone()
    }

    pub fn advertisement(&self) -> Option<Advertisement> {
        self.lock().advertising.clone()
    }

    /// `(starts, stops)` counted across the peripheral's lifetime.
    pub fn advertising_transitions(&self) -> (usize, usize) {
        let state = self.lock();
        (state.advertising_starts, state.advertising_stops)
    }
}

impl GattPeripheral for MockPeripheral {
    fn add_service(&self, service: &GattService) -> Result<()> {
        let mut state = self.lock();
        if state.fail_add_service {
            return Err(TransportError::ServiceRegistration(
                "mock refused service".to_string(),
            ));
        }
        state.services.push(service.clone());
        Ok(())
    }

    fn remove_all_services(&self) {
        self.lock().services.clear();
    }

    fn update_value(&self, characteristic: &Uuid, value: &[u8]) -> bool {
        let mut state = self.lock();
        state.update_attempts += 1;
        if state.reject_updates > 0 {
            state.reject_updates -= 1;
            return false;
        }
        state.updates.push((*characteristic, value.to_vec()));
        true
    }

    fn subscribed_centrals(&self, characteristic: &Uuid) -> usize {
        self.lock()
            .subscribers
            .get(characteristic)
            .copied()
            .unwrap_or(0)
    }

    fn start_advertising(&self, advertisement: &Advertisement) {
        let mut state = self.lock();
        state.advertising = Some(advertisement.clone());
        state.advertising_starts += 1;
    }

    fn stop_advertising(&self) {
        let mut state = self.lock();
        state.advertising = None;
        state.advertising_stops += 1;
    }

    fn is_advertising(&self) -> bool {
        self.lock().advertising.is_some()
    }

    fn respond(&self, request: &AttRequest, result: AttResult) {
        self.lock().responses.push((request.id, result));
    }

    fn maximum_update_value_length(&self) -> Option<usize> {
        self.lock().max_update_len
    }
}
