//! Listing pages.
//!
//! Listings are spread over record maps named `market:<page>`, 27 to a page.

/// Listings shown on one page.
pub const LISTINGS_PER_PAGE: usize = 27;

/// Id prefix shared by every page map.
pub const PAGE_PREFIX: &str = "market:";

/// The page holding listing number `count` (1-based). `0` maps to page 1.
pub fn page_for(count: usize) -> u32 {
    if count == 0 {
        return 1;
    }
    ((count - 1) / LISTINGS_PER_PAGE + 1) as u32
}

/// Record map id of `page`.
pub fn page_id(page: u32) -> String {
    format!("{PAGE_PREFIX}{page}")
}

/// Page number of a record map id, if it is a page map.
pub fn parse_page_id(id: &str) -> Option<u32> {
    id.strip_prefix(PAGE_PREFIX)?
        .parse()
        .ok()
        .filter(|page| *page > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_hold_27_listings() {
        assert_eq!(page_for(0), 1);
        assert_eq!(page_for(1), 1);
        assert_eq!(page_for(27), 1);
        assert_eq!(page_for(28), 2);
        assert_eq!(page_for(54), 2);
        assert_eq!(page_for(55), 3);
    }

    #[test]
    fn page_ids() {
        assert_eq!(page_id(3), "market:3");
        assert_eq!(parse_page_id("market:12"), Some(12));
        assert_eq!(parse_page_id("market:0"), None);
        assert_eq!(parse_page_id("market:abc"), None);
        assert_eq!(parse_page_id("money"), None);
    }
}
