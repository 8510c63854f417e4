//! Paginated fetches.

use serde::Serialize;

use super::{Entity, EntityIter};
use crate::error::{OrmError, OrmResult};

/// Page metadata of a paginated fetch.
///
/// Pages are 1-based and rows 0-based. A page past the end is clamped to the
/// last page, so an empty result reports page 0 of 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Paged {
    pub page_size: i64,
    pub items_on_page: i64,
    pub current_page: i64,
    pub current_row: i64,
    pub total_rows: i64,
    pub last_row: i64,
    pub total_pages: i64,
    pub has_previous: bool,
    pub previous_page: i64,
    pub previous_row: i64,
    pub has_next: bool,
    pub next_page: i64,
    pub next_row: i64,
}

struct Window {
    page: i64,
    offset: i64,
    total: i64,
    last_row: i64,
    total_pages: i64,
}

impl Paged {
    fn new(size: i64, w: &Window, items_on_page: usize) -> Self {
        Self {
            page_size: size,
            items_on_page: i64::try_from(items_on_page).unwrap_or(i64::MAX),
            current_page: w.page,
            current_row: w.offset,
            total_rows: w.total,
            last_row: w.last_row,
            total_pages: w.total_pages,
            has_previous: w.offset > 0,
            previous_page: (w.page - 1).max(1),
            previous_row: (w.offset - size).max(0),
            has_next: w.page < w.total_pages,
            next_page: w.total_pages.min(w.page + 1),
            next_row: w.last_row.min(w.offset + size),
        }
    }
}

impl Entity {
    /// Count the pending query's rows, then position the page window.
    fn page_window(&mut self, page: i64, page_size: i64, by_rows: bool) -> OrmResult<Window> {
        if page_size <= 0 {
            return Err(OrmError::query_build(format!(
                "page size must be positive, got {page_size}"
            )));
        }
        let page = if by_rows { 1 + page.max(0) / page_size } else { page };
        let mut page = page.max(1);
        let mut offset = page_size * (page - 1);

        let mut count_query = self.get_clone();
        count_query.query.select.clear();
        count_query.query.order_by.clear();
        let total = if count_query.query.distinct {
            count_query.count_distinct(&[], None)?
        } else {
            count_query.count()?
        };

        let last_row = page_size * (total / page_size);
        let total_pages = (total + page_size - 1) / page_size;
        if offset >= last_row {
            // An exact multiple leaves no partial page at `last_row`.
            offset = if total > 0 && total % page_size == 0 {
                page_size * (total_pages - 1)
            } else {
                last_row
            };
            page = total_pages;
        }
        Ok(Window {
            page,
            offset,
            total,
            last_row,
            total_pages,
        })
    }

    /// Fetch one page of the pending query.
    ///
    /// With `by_rows`, `page` is a 0-based row number and the page containing
    /// it is fetched.
    pub fn get_paged(&mut self, page: i64, page_size: i64, by_rows: bool) -> OrmResult<Paged> {
        let window = self.page_window(page, page_size, by_rows)?;
        self.get(Some(page_size as u64), Some(window.offset as u64))?;
        Ok(Paged::new(page_size, &window, self.result_count()))
    }

    /// [`get_paged`](Self::get_paged), streaming the page's rows.
    pub fn get_paged_iterated(
        &mut self,
        page: i64,
        page_size: i64,
        by_rows: bool,
    ) -> OrmResult<(EntityIter, Paged)> {
        let window = self.page_window(page, page_size, by_rows)?;
        let rows = self.get_iterated(Some(page_size as u64), Some(window.offset as u64))?;
        let paged = Paged::new(page_size, &window, rows.len());
        Ok((rows, paged))
    }
}
