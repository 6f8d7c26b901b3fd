//! Transaction history view
//!
//! Fees are bookkeeping for the sender's balance and are hidden here; the
//! debit they belong to already shows the transfer.

use chrono::NaiveDate;
use serde::Serialize;

use crate::core_types::UserId;
use crate::models::{Transaction, TxKind, TxStatus};

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Filters and page selection. Pages are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub status: Option<TxStatus>,
    /// First day included (UTC)
    pub from: Option<NaiveDate>,
    /// Last day included (UTC), up to 23:59:59.999
    pub to: Option<NaiveDate>,
    pub page: usize,
    pub per_page: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            status: None,
            from: None,
            to: None,
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl HistoryQuery {
    fn matches(&self, tx: &Transaction) -> bool {
        let day = tx.created_at.date_naive();
        self.status.is_none_or(|status| tx.status == status)
            && self.from.is_none_or(|from| day >= from)
            && self.to.is_none_or(|to| day <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub items: Vec<Transaction>,
    pub page: usize,
    pub per_page: usize,
    /// Entries matching the filters, across all pages
    pub total_items: usize,
    pub total_pages: usize,
}

/// Select, sort newest first and slice one page of `user_id`'s history
pub fn history_page<'a, I>(transactions: I, user_id: &UserId, query: &HistoryQuery) -> HistoryPage
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut matching: Vec<&Transaction> = transactions
        .into_iter()
        .filter(|tx| &tx.user_id == user_id && !tx.is_deleted())
        .filter(|tx| tx.kind != TxKind::Fee)
        .filter(|tx| query.matches(tx))
        .collect();
    matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let per_page = query.per_page.max(1);
    let page = query.page.max(1);
    let total_items = matching.len();

    HistoryPage {
        items: matching
            .into_iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .cloned()
            .collect(),
        page,
        per_page,
        total_items,
        total_pages: total_items.div_ceil(per_page),
    }
}
