use std::collections::HashSet;

use crate::models::{Concall, RawListing};

/// Collapses listing rows into unique concalls, first occurrence wins.
#[derive(Debug)]
pub struct Deduper {
    seen: HashSet<(String, String, String)>,
    concalls: Vec<Concall>,
    cap: usize,
}

impl Deduper {
    pub fn new(cap: usize) -> Self {
        Self {
            seen: HashSet::new(),
            concalls: Vec::new(),
            cap,
        }
    }

    /// Offer one row. Returns true when it was kept.
    pub fn push(&mut self, row: RawListing) -> bool {
        if self.is_full() {
            return false;
        }

        let Some(company) = non_blank(row.company) else {
            return false;
        };
        let Some(document_url) = non_blank(row.document_url) else {
            return false;
        };
        let date = row.date.unwrap_or_default();
        let time = row.time.unwrap_or_default();

        let key = (company.clone(), date.clone(), time.clone());
        if !self.seen.insert(key) {
            return false;
        }

        self.concalls
            .push(Concall::new(company, date, time, document_url));
        true
    }

    pub fn is_full(&self) -> bool {
        self.concalls.len() >= self.cap
    }

    pub fn len(&self) -> usize {
        self.concalls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concalls.is_empty()
    }

    pub fn into_concalls(self) -> Vec<Concall> {
        self.concalls
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Deduplicate rows in order and cap the result at `cap` entries.
pub fn dedup_listings<I>(rows: I, cap: usize) -> Vec<Concall>
where
    I: IntoIterator<Item = RawListing>,
{
    let mut deduper = Deduper::new(cap);
    for row in rows {
        if deduper.is_full() {
            break;
        }
        deduper.push(row);
    }
    deduper.into_concalls()
}
