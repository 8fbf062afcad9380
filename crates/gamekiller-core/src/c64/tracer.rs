use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::Mutex;

#[doc(hidden)]
pub mod macros;
pub mod traceable;
pub use traceable::Traceable;

pub static TRACER: Lazy<Mutex<Tracer>> = Lazy::new(|| Mutex::new(Tracer::new(100_000)));

/// Global tracer
///
/// Keeps the most recent `capacity` lines. Only written to when the
/// `tracing` feature is enabled.
pub struct Tracer {
    history: VecDeque<String>,
    capacity: usize,
}

impl Tracer {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn write(&mut self, msg: String) {
        if self.capacity == 0 {
            return;
        }
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(msg);
    }

    pub fn print(&self) {
        for (i, line) in self.history.iter().enumerate() {
            println!("{:04}: {}", i, line);
        }
    }

    pub fn log<T: Traceable + ?Sized>(&mut self, thing: &T) {
        if let Some(trace) = thing.trace() {
            self.write(trace);
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}
