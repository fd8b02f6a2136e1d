// Page/limit handling shared by every listing endpoint

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Requested page, already clamped to sane bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    /// In-memory slice for stores that hold their rows in a Vec
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.offset() as usize)
            .take(self.limit as usize)
            .cloned()
            .collect()
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Query-string form of `PageRequest`
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl From<PageParams> for PageRequest {
    fn from(params: PageParams) -> Self {
        PageRequest::new(params.page, params.limit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        let pages = if total == 0 {
            0
        } else {
            (total + request.limit - 1) / request.limit
        };
        Self {
            items,
            total,
            page: request.page,
            limit: request.limit,
            pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            pages: self.pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_clamps() {
        let req = PageRequest::new(Some(0), Some(1000));
        assert_eq!(req.page, 1);
        assert_eq!(req.limit, MAX_PAGE_SIZE);

        let req = PageRequest::new(None, Some(-5));
        assert_eq!(req.limit, 1);
        assert_eq!(PageRequest::default().limit, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_offset_and_slice() {
        let req = PageRequest::new(Some(3), Some(2));
        assert_eq!(req.offset(), 4);
        let items: Vec<i32> = (0..7).collect();
        assert_eq!(req.slice(&items), vec![4, 5]);
        assert!(PageRequest::new(Some(9), Some(2)).slice(&items).is_empty());
    }

    #[test]
    fn test_page_count_rounds_up() {
        let req = PageRequest::new(Some(1), Some(10));
        assert_eq!(Page::new(vec![1], 21, req).pages, 3);
        assert_eq!(Page::<i32>::new(vec![], 0, req).pages, 0);
        assert_eq!(Page::new(vec![1], 10, req).pages, 1);
    }
}
