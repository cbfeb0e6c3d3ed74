//! Pagination of query results.

/// One page of a result set. Pages are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

/// Slice `items` into the requested page.
///
/// Page 0 is treated as page 1 and a page size of 0 as 1. Pages past the end
/// are empty.
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Page<T> {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total = items.len();
    let total_pages = total.div_ceil(page_size);

    let start = (page - 1).saturating_mul(page_size).min(total);
    let end = start.saturating_add(page_size).min(total);

    Page {
        items: items[start..end].to_vec(),
        page,
        page_size,
        total,
        total_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_middle_page() {
        let items: Vec<u32> = (1..=10).collect();
        let page = paginate(&items, 2, 3);
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total_pages, 4);
        assert!(page.has_next());
        assert!(page.has_previous());
    }

    #[test]
    fn test_last_partial_page() {
        let items: Vec<u32> = (1..=10).collect();
        let page = paginate(&items, 4, 3);
        assert_eq!(page.items, vec![10]);
        assert!(!page.has_next());
    }

    #[test]
    fn test_out_of_range_and_degenerate_inputs() {
        let items: Vec<u32> = (1..=3).collect();
        assert!(paginate(&items, 9, 2).items.is_empty());
        assert_eq!(paginate(&items, 0, 0).items, vec![1]);
        let empty: Vec<u32> = Vec::new();
        assert_eq!(paginate(&empty, 1, 10).total_pages, 0);
    }
}
