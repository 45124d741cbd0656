use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub skip: u64,
    pub limit: i64,
}

impl ListParams {
    /// Clamp to sane bounds: 1..=100 items per page, 1-based pages.
    pub fn paging(&self) -> Paging {
        let limit = self.limit.unwrap_or(10).clamp(1, 100);
        let page = self.page.unwrap_or(1).max(1);
        Paging {
            skip: ((page - 1) * limit) as u64,
            limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_first_page_of_ten() {
        let paging = ListParams { limit: None, page: None }.paging();
        assert_eq!(paging, Paging { skip: 0, limit: 10 });
    }

    #[test]
    fn skip_accounts_for_earlier_pages() {
        let paging = ListParams { limit: Some(20), page: Some(3) }.paging();
        assert_eq!(paging, Paging { skip: 40, limit: 20 });
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let paging = ListParams { limit: Some(10_000), page: Some(0) }.paging();
        assert_eq!(paging, Paging { skip: 0, limit: 100 });
    }
}
