use crate::access::value::Value;
use crate::storage::page::PageId;
use std::cmp::Ordering;

/// Location of a tuple: the page it lives on and its slot within that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TupleId {
    pub page_id: PageId,
    pub slot_id: u16,
}

impl TupleId {
    pub fn new(page_id: PageId, slot_id: u16) -> Self {
        Self { page_id, slot_id }
    }
}

impl PartialOrd for TupleId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TupleId {
    fn cmp(&self, other: &Self) -> Ordering {
        // First compare by page, then by slot
        match self.page_id.cmp(&other.page_id) {
            Ordering::Equal => self.slot_id.cmp(&other.slot_id),
            other => other,
        }
    }
}

/// Represents a row in the database
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    pub tuple_id: TupleId,
    pub values: Vec<Value>,
}

impl Tuple {
    pub fn new(tuple_id: TupleId, values: Vec<Value>) -> Self {
        Self { tuple_id, values }
    }
}
