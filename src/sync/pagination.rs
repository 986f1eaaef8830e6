//! Cursor-following pagination
//!
//! Generic over the page element type. The walker owns no HTTP concerns:
//! it is handed the first page and a function that fetches a page by its
//! cursor URL.

use std::future::Future;

use crate::models::Page;

/// Collect every item reachable from `first` by following `next` cursors
///
/// Items keep API order within and across pages. The walk stops when a
/// page's cursor is null or empty; there is no page-count cap.
pub async fn walk_pages<T, E, F, Fut>(first: Page<T>, mut follow: F) -> Result<Vec<T>, E>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let mut next = first.next_cursor().map(str::to_string);
    let mut items = first.items;

    while let Some(cursor) = next.take() {
        let page = follow(cursor).await?;
        next = page.next_cursor().map(str::to_string);
        items.extend(page.items);
    }

    Ok(items)
}
