use crate::access::schema::Schema;
use crate::access::tuple::{Tuple, TupleId};
use crate::access::value::{deserialize_values, serialize_values, Value};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageId};
use crate::storage::PAGE_SIZE;
use std::sync::Arc;

// Layout: occupancy bitmap header (one bit per slot, LSB first) followed by
// `num_slots` fixed-size records. Trailing bytes are padding.

/// Number of tuple slots a page holds for the given schema.
pub fn slots_per_page(schema: &Schema) -> usize {
    (PAGE_SIZE * 8) / (schema.tuple_size() * 8 + 1)
}

fn header_size(num_slots: usize) -> usize {
    num_slots.div_ceil(8)
}

/// A parsed, immutable heap page.
///
/// Every occupied slot is decoded when the page is built, so a page that
/// exists is known to be well formed under its schema.
#[derive(Debug)]
pub struct HeapPage {
    page_id: PageId,
    data: Box<[u8; PAGE_SIZE]>,
    slots: Vec<Option<Tuple>>,
}

impl HeapPage {
    pub fn from_bytes(
        page_id: PageId,
        schema: &Schema,
        data: Box<[u8; PAGE_SIZE]>,
    ) -> StorageResult<Self> {
        let num_slots = slots_per_page(schema);
        let header = header_size(num_slots);
        let tuple_size = schema.tuple_size();

        // Bits past the last slot must be clear
        for bit in num_slots..header * 8 {
            if data[bit / 8] & (1 << (bit % 8)) != 0 {
                return Err(StorageError::Format {
                    page_id,
                    reason: format!("occupancy bit {} set beyond {} slots", bit, num_slots),
                });
            }
        }

        let mut slots = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if data[slot / 8] & (1 << (slot % 8)) == 0 {
                slots.push(None);
                continue;
            }
            let start = header + slot * tuple_size;
            let values = deserialize_values(&data[start..start + tuple_size], schema.types())
                .map_err(|e| StorageError::Format {
                    page_id,
                    reason: format!("slot {}: {}", slot, e),
                })?;
            slots.push(Some(Tuple::new(TupleId::new(page_id, slot as u16), values)));
        }

        Ok(Self {
            page_id,
            data,
            slots,
        })
    }

    /// Builds a page image with the given tuples in slots `0..tuples.len()`.
    pub fn encode(schema: &Schema, tuples: &[Vec<Value>]) -> StorageResult<Box<[u8; PAGE_SIZE]>> {
        let slots: Vec<Option<&[Value]>> = tuples.iter().map(|t| Some(t.as_slice())).collect();
        Self::encode_slots(schema, &slots)
    }

    /// Builds a page image slot by slot; `None` leaves a slot empty.
    pub fn encode_slots(
        schema: &Schema,
        slots: &[Option<&[Value]>],
    ) -> StorageResult<Box<[u8; PAGE_SIZE]>> {
        let num_slots = slots_per_page(schema);
        if slots.len() > num_slots {
            return Err(StorageError::SchemaMismatch(format!(
                "{} tuples do not fit in a page of {} slots",
                slots.len(),
                num_slots
            )));
        }

        let header = header_size(num_slots);
        let tuple_size = schema.tuple_size();
        let mut data = Self::empty_page_data();

        for (slot, values) in slots.iter().enumerate() {
            let Some(values) = values else { continue };
            let record = serialize_values(values, schema.types())?;
            let start = header + slot * tuple_size;
            data[start..start + tuple_size].copy_from_slice(&record);
            data[slot / 8] |= 1 << (slot % 8);
        }

        Ok(data)
    }

    /// A page image with no occupied slots.
    pub fn empty_page_data() -> Box<[u8; PAGE_SIZE]> {
        Box::new([0u8; PAGE_SIZE])
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn num_empty_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    pub fn tuple_count(&self) -> usize {
        self.num_slots() - self.num_empty_slots()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Some(_)))
    }

    pub fn get_tuple(&self, slot: usize) -> Option<&Tuple> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Iterates the occupied slots in slot order.
    ///
    /// The iterator owns a handle on the page, so it can outlive the borrow
    /// it was created from.
    pub fn iter(self: &Arc<Self>) -> HeapPageIter {
        HeapPageIter {
            page: Arc::clone(self),
            slot: 0,
        }
    }
}

impl Page for HeapPage {
    fn page_id(&self) -> PageId {
        self.page_id
    }

    fn data(&self) -> &[u8] {
        &self.data[..]
    }
}

pub struct HeapPageIter {
    page: Arc<HeapPage>,
    slot: usize,
}

impl Iterator for HeapPageIter {
    type Item = Tuple;

    fn next(&mut self) -> Option<Tuple> {
        while self.slot < self.page.slots.len() {
            let slot = self.slot;
            self.slot += 1;
            if let Some(tuple) = &self.page.slots[slot] {
                return Some(tuple.clone());
            }
        }
        None
    }
}
