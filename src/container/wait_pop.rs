//! Wait-and-pop queues
//!
//! Single-consumer dequeue. A waiter either gets a record right away or is
//! queued until a write makes one available. Handing the record to the sink
//! removes it from the container: if the consumer goes away before using it,
//! the record is lost.

use crate::error::{HubError, Result};
use crate::event::{Event, EventKind, EventSink};
use crate::value::Value;

use super::Container;

/// Outcome of a wait-and-pop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopTicket {
    /// A record was handed to the sink before the call returned
    Delivered,
    /// The sink is queued under this id, usable for cancellation
    Queued(u64),
}

impl Container {
    /// Pop the front record into `sink` now, or queue `sink` (FIFO) until a
    /// push makes a record available
    pub fn wait_and_pop_next(&self, sink: EventSink) -> Result<PopTicket> {
        let guard = self.state.lock();

        let waiting = !guard.borrow().pop_next_waiters.is_empty();
        if !waiting && self.record_count()? > 0 {
            self.pop_front_into(&sink)?;
            return Ok(PopTicket::Delivered);
        }

        let mut state = guard.borrow_mut();
        state.next_waiter_id += 1;
        let id = state.next_waiter_id;
        state.pop_next_waiters.push_back((id, sink));
        Ok(PopTicket::Queued(id))
    }

    /// Returns false if no waiter with this id is queued
    pub fn cancel_wait_and_pop_next(&self, id: u64) -> bool {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let before = state.pop_next_waiters.len();
        state.pop_next_waiters.retain(|(waiter, _)| *waiter != id);
        state.pop_next_waiters.len() != before
    }

    /// Pop the record stored under `key` into `sink` now, or queue `sink`
    /// until that key is set or inserted
    pub fn wait_and_pop_key(&self, key: &Value, sink: EventSink) -> Result<PopTicket> {
        let key_bytes = key.as_bytes().ok_or(HubError::WrongKeyType)?.to_vec();
        let guard = self.state.lock();

        let waiting = guard
            .borrow()
            .pop_key_waiters
            .get(&key_bytes)
            .is_some_and(|queue| !queue.is_empty());

        if !waiting {
            let found = match self.attached()?.backend.get(key) {
                Ok(_) => true,
                Err(HubError::KeyNotFound) => false,
                Err(e) => return Err(e),
            };
            if found {
                self.pop_key_into(key, &sink)?;
                return Ok(PopTicket::Delivered);
            }
        }

        let mut state = guard.borrow_mut();
        state.next_waiter_id += 1;
        let id = state.next_waiter_id;
        state
            .pop_key_waiters
            .entry(key_bytes)
            .or_default()
            .push_back((id, sink));
        Ok(PopTicket::Queued(id))
    }

    /// Returns false if no waiter with this id is queued for `key`
    pub fn cancel_wait_and_pop_key(&self, key: &Value, id: u64) -> bool {
        let Some(key_bytes) = key.as_bytes() else {
            return false;
        };
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let Some(queue) = state.pop_key_waiters.get_mut(key_bytes) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|(waiter, _)| *waiter != id);
        let removed = queue.len() != before;
        if queue.is_empty() {
            state.pop_key_waiters.remove(key_bytes);
        }
        removed
    }

    pub fn waiting_pop_next(&self) -> usize {
        let guard = self.state.lock();
        let count = guard.borrow().pop_next_waiters.len();
        count
    }

    // =========================================================================
    // Delivery (called after writes, container lock held)
    // =========================================================================

    /// Hand front records to queued pop-next waiters, oldest first
    pub(super) fn deliver_pop_next(&self) -> Result<()> {
        loop {
            if self.attached()?.backend.record_count()? == 0 {
                return Ok(());
            }
            let guard = self.state.lock();
            let waiter = guard.borrow_mut().pop_next_waiters.pop_front();
            drop(guard);

            match waiter {
                Some((_, sink)) => self.pop_front_into(&sink)?,
                None => return Ok(()),
            }
        }
    }

    /// Hand the record under `key` to the oldest waiter for that key
    pub(super) fn deliver_pop_key(&self, key: &Value) -> Result<()> {
        let Some(key_bytes) = key.as_bytes() else {
            return Ok(());
        };

        let guard = self.state.lock();
        let waiter = {
            let mut state = guard.borrow_mut();
            let waiter = state
                .pop_key_waiters
                .get_mut(key_bytes)
                .and_then(|queue| queue.pop_front());
            if state
                .pop_key_waiters
                .get(key_bytes)
                .is_some_and(|queue| queue.is_empty())
            {
                state.pop_key_waiters.remove(key_bytes);
            }
            waiter
        };
        drop(guard);

        match waiter {
            Some((_, sink)) => self.pop_key_into(key, &sink),
            None => Ok(()),
        }
    }

    fn pop_front_into(&self, sink: &EventSink) -> Result<()> {
        let (record, event) = self.attached()?.backend.pop_front()?;
        self.raise(&event);
        sink(&Event::new(
            EventKind::WaitAndPopNext,
            record.key,
            record.value,
            record.metadata,
        ));
        Ok(())
    }

    fn pop_key_into(&self, key: &Value, sink: &EventSink) -> Result<()> {
        let record = self.attached()?.backend.get(key)?;
        let event = self.attached()?.backend.delete(key)?;
        self.raise(&event);
        sink(&Event::new(
            EventKind::WaitAndPopKey,
            record.key,
            record.value,
            record.metadata,
        ));
        Ok(())
    }
}
