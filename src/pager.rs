//! Page-wise view over an in-memory result list
//!
//! The list is fixed when the pager is built; paging never refetches.
//! Moving past either end clamps to the first or last page.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("page size must be positive")]
pub struct ZeroPageSize;

/// Ordered items plus a cursor that always sits on a page boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pager<T> {
    items: Vec<T>,
    page_size: usize,
    cursor: usize,
}

impl<T> Pager<T> {
    pub fn new(items: Vec<T>, page_size: usize) -> Result<Self, ZeroPageSize> {
        if page_size == 0 {
            return Err(ZeroPageSize);
        }
        Ok(Self {
            items,
            page_size,
            cursor: 0,
        })
    }

    /// Items on the current page; empty only when the list is empty
    pub fn current(&self) -> &[T] {
        let end = (self.cursor + self.page_size).min(self.items.len());
        self.items.get(self.cursor..end).unwrap_or(&[])
    }

    /// Advance one page, staying put on the last page
    pub fn next(&mut self) -> &[T] {
        let candidate = self.cursor + self.page_size;
        if candidate <= self.last_page_start() {
            self.cursor = candidate;
        }
        tracing::debug!(cursor = self.cursor, "pager next");
        self.current()
    }

    /// Go back one page, staying put on the first page
    pub fn prev(&mut self) -> &[T] {
        self.cursor = self.cursor.saturating_sub(self.page_size);
        tracing::debug!(cursor = self.cursor, "pager prev");
        self.current()
    }

    /// Item `index` of the current page
    pub fn get(&self, index: usize) -> Option<&T> {
        self.current().get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[cfg(test)]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Zero-based page index
    pub fn page_number(&self) -> usize {
        self.cursor / self.page_size
    }

    pub fn page_count(&self) -> usize {
        self.items.len().div_ceil(self.page_size)
    }

    pub fn is_first_page(&self) -> bool {
        self.cursor == 0
    }

    pub fn is_last_page(&self) -> bool {
        self.cursor == self.last_page_start()
    }

    fn last_page_start(&self) -> usize {
        match self.items.len() {
            0 => 0,
            n => (n - 1) / self.page_size * self.page_size,
        }
    }
}

impl<T: Display> Pager<T> {
    /// One block per item, in list order
    pub fn to_message(items: &[T]) -> String {
        let mut message = String::new();
        for item in items {
            message.push_str(&item.to_string());
            message.push_str("\n\n");
        }
        message
    }

    /// Current page with a position header and the available moves
    pub fn render(&self) -> String {
        if self.is_empty() {
            return "No results.".to_string();
        }
        let mut out = format!(
            "Page {}/{} ({} results)\n\n{}",
            self.page_number() + 1,
            self.page_count(),
            self.len(),
            Self::to_message(self.current())
        );
        let mut moves = Vec::new();
        if !self.is_first_page() {
            moves.push("page_prev for earlier results");
        }
        if !self.is_last_page() {
            moves.push("page_next for more");
        }
        if !moves.is_empty() {
            out.push_str(&format!("Send {}.", moves.join(", ")));
        }
        out
    }
}
