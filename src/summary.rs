//! Single-writer handoff cells between producers and render loops.

use std::sync::{Arc, Mutex, PoisonError};

/// Latest value published by a producer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Reading<T> {
    /// Nothing usable yet, or the last fetch failed.
    #[default]
    Unavailable,
    /// The producer's section is switched off.
    Disabled,
    Ready(T),
}

impl<T> Reading<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Reading::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Reading::Ready(_))
    }
}

/// Cloneable handle to a cell with its own lock.
///
/// The lock is only held to swap or clone the value, never across I/O, and is
/// unrelated to the configuration store's lock.
#[derive(Debug)]
pub struct SharedSummary<T> {
    cell: Arc<Mutex<Reading<T>>>,
}

impl<T> Clone for SharedSummary<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: Clone> SharedSummary<T> {
    /// A new cell holding [`Reading::Unavailable`].
    pub fn new() -> Self {
        Self {
            cell: Arc::new(Mutex::new(Reading::Unavailable)),
        }
    }

    pub fn publish(&self, reading: Reading<T>) {
        *self.cell.lock().unwrap_or_else(PoisonError::into_inner) = reading;
    }

    pub fn get(&self) -> Reading<T> {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T: Clone> Default for SharedSummary<T> {
    fn default() -> Self {
        Self::new()
    }
}
