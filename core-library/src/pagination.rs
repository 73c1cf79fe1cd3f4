//! Pagination helper types for cache reads

use serde::{Deserialize, Serialize};

/// Offset based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Position of the first row to return
    pub offset: u64,
    /// Maximum number of rows to return
    pub count: u64,
}

impl PageRequest {
    /// Create a new page request
    ///
    /// # Examples
    ///
    /// ```
    /// use core_library::PageRequest;
    ///
    /// let request = PageRequest::new(10, 5);
    /// assert_eq!(request.offset, 10);
    /// assert_eq!(request.end(), 15);
    /// ```
    pub fn new(offset: u64, count: u64) -> Self {
        Self { offset, count }
    }

    /// The whole result set.
    pub fn all() -> Self {
        Self {
            offset: 0,
            count: i64::MAX as u64,
        }
    }

    /// Exclusive end position
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.count)
    }

    /// SQL `LIMIT`, clamped to SQLite's signed integer range
    pub fn limit(&self) -> i64 {
        i64::try_from(self.count).unwrap_or(i64::MAX)
    }

    /// SQL `OFFSET`, clamped to SQLite's signed integer range
    pub fn sql_offset(&self) -> i64 {
        i64::try_from(self.offset).unwrap_or(i64::MAX)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            count: 50,
        }
    }
}

/// A window of a larger result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in this window
    pub items: Vec<T>,
    /// Total number of items across the whole result set
    pub total: u64,
    /// Position of the first item
    pub offset: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, offset: u64) -> Self {
        Self {
            items,
            total,
            offset,
        }
    }

    /// Whether rows exist after this window
    pub fn has_next(&self) -> bool {
        self.offset + (self.items.len() as u64) < self.total
    }

    /// Whether rows exist before this window
    pub fn has_previous(&self) -> bool {
        self.offset > 0
    }

    /// Map the items to a different type
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            offset: self.offset,
        }
    }
}
