//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use dynotool::memory::MemoryClient;
use dynotool::progress::{Phase, ProgressSink};
use dynotool::retry::Sleeper;
use dynotool::{TableSchema, TaggedRecord, TaggedValue};

/// Records every backoff interval instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper(Mutex<Vec<Duration>>);

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.0.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.0.lock().unwrap().push(duration);
    }
}

/// Captures phase transitions and per-page callbacks.
#[derive(Default)]
pub struct PhaseLog {
    phases: Mutex<Vec<Phase>>,
    pages: Mutex<usize>,
}

impl PhaseLog {
    pub fn phases(&self) -> Vec<Phase> {
        self.phases.lock().unwrap().clone()
    }

    pub fn pages(&self) -> usize {
        *self.pages.lock().unwrap()
    }
}

impl ProgressSink for PhaseLog {
    fn on_phase(&self, _operation: &str, phase: Phase) {
        self.phases.lock().unwrap().push(phase);
    }

    fn on_page(&self, _records: usize, _pressure: dynotool::scanner::Pressure) {
        *self.pages.lock().unwrap() += 1;
    }
}

/// A record with a mix of every value kind the codec handles.
pub fn order(id: usize) -> TaggedRecord {
    let mut line = TaggedRecord::new();
    line.insert("sku".into(), TaggedValue::S(format!("sku-{}", id % 7)));
    line.insert("qty".into(), TaggedValue::N((id % 5 + 1).to_string()));

    let mut record = TaggedRecord::new();
    record.insert("id".into(), TaggedValue::S(format!("order-{:04}", id)));
    record.insert("total".into(), TaggedValue::N(format!("{}.{:02}", id * 3, id % 100)));
    record.insert("paid".into(), TaggedValue::Bool(id % 2 == 0));
    record.insert("tags".into(), TaggedValue::Ss(vec!["new".into(), format!("batch-{}", id / 10)]));
    record.insert("lines".into(), TaggedValue::L(vec![TaggedValue::M(line)]));
    if id % 3 == 0 {
        record.insert("note".into(), TaggedValue::Null);
    }
    record
}

/// A `MemoryClient` holding table `name` (hash key `id`) with `count` orders.
pub fn seeded_orders(name: &str, count: usize, page_size: usize) -> MemoryClient {
    let client = MemoryClient::new().with_page_size(page_size);
    client
        .create_table_with(TableSchema::simple(name, "id", None))
        .unwrap();
    for i in 0..count {
        client.insert(name, order(i)).unwrap();
    }
    client
}
