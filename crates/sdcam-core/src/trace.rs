use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct TraceEntry {
    pub timestamp: u64,
    pub direction: Direction,
    pub words: Vec<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Direction {
    Rx,
    Tx,
}

/// Bounded record of the frames exchanged with the device, oldest evicted first.
pub struct TraceStore {
    entries: VecDeque<TraceEntry>,
    max_entries: usize,
}

impl TraceStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries.min(1024)),
            max_entries,
        }
    }

    pub fn push(&mut self, direction: Direction, words: &[u16]) {
        if self.max_entries == 0 {
            return;
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        if self.entries.len() == self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(TraceEntry {
            timestamp,
            direction,
            words: words.to_vec(),
        });
    }

    pub fn entries(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_text(&self, show_timestamp: bool) -> String {
        let mut result = String::new();
        for entry in &self.entries {
            if show_timestamp {
                let secs = entry.timestamp / 1000;
                let millis = entry.timestamp % 1000;
                let hours = (secs / 3600) % 24;
                let minutes = (secs / 60) % 60;
                let seconds = secs % 60;
                result.push_str(&format!("[{hours:02}:{minutes:02}:{seconds:02}.{millis:03}] "));
            }
            result.push_str(match entry.direction {
                Direction::Rx => "RX:",
                Direction::Tx => "TX:",
            });
            for word in &entry.words {
                result.push_str(&format!(" {word:04X}"));
            }
            result.push('\n');
        }
        result
    }
}
