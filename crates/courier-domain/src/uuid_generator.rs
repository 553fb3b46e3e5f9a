//! Identifier capability.

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Supplies fresh unique identifiers.
pub trait UuidGenerator: Send + Sync {
    fn new_uuid(&self) -> String;
}

/// UUID v4 generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomUuidGenerator;

impl UuidGenerator for RandomUuidGenerator {
    fn new_uuid(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic generator for tests.
///
/// Hands out queued ids first, then `00000000-0000-4000-8000-<counter>`.
#[derive(Debug, Default)]
pub struct TestUuidGenerator {
    inner: Mutex<TestUuidState>,
}

#[derive(Debug, Default)]
struct TestUuidState {
    queued: VecDeque<String>,
    counter: u64,
}

impl TestUuidGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let generator = Self::default();
        generator.push_ids(ids);
        generator
    }

    pub fn push_ids<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner
            .lock()
            .queued
            .extend(ids.into_iter().map(Into::into));
    }
}

impl UuidGenerator for TestUuidGenerator {
    fn new_uuid(&self) -> String {
        let mut state = self.inner.lock();
        if let Some(id) = state.queued.pop_front() {
            return id;
        }
        state.counter += 1;
        format!("00000000-0000-4000-8000-{:012x}", state.counter)
    }
}
