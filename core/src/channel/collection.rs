//! Bounded, typed collections of wire entities.
//!
//! A collection is configured with the highest index it may hold, so its
//! capacity is `maximum_index + 1`; inserting past that is a hard error.
//! Aggregate binary length takes an O(1) path while every element observed
//! at insertion shares one length, and degrades to an O(n) sum otherwise.
//! Elements are expected to be fully shaped before insertion; the fast path
//! keys on the lengths recorded as items were added.

use super::common::ChannelError;
use super::definition::Indexed;
use super::image::BinaryLength;
use super::value::ChannelValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum UniformLength {
    Empty,
    Uniform(usize),
    Mixed,
}

/// A bounded ordered sequence of wire entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelCollection<T> {
    items: Vec<T>,
    maximum_index: usize,
    uniform: UniformLength,
}

impl<T: BinaryLength> ChannelCollection<T> {
    /// Creates a collection whose highest valid index is `maximum_index`.
    pub fn new(maximum_index: usize) -> Self {
        ChannelCollection {
            items: Vec::new(),
            maximum_index,
            uniform: UniformLength::Empty,
        }
    }

    pub fn maximum_index(&self) -> usize {
        self.maximum_index
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    /// Appends an element, failing once the maximum index is occupied.
    pub fn push(&mut self, item: T) -> Result<(), ChannelError> {
        if self.items.len() > self.maximum_index {
            return Err(ChannelError::CollectionFull {
                maximum_index: self.maximum_index,
            });
        }
        let length = item.binary_length();
        self.uniform = match self.uniform {
            UniformLength::Empty => UniformLength::Uniform(length),
            UniformLength::Uniform(existing) if existing == length => {
                UniformLength::Uniform(existing)
            }
            _ => UniformLength::Mixed,
        };
        self.items.push(item);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.uniform = UniformLength::Empty;
    }

    /// Aggregate serialized length of all elements.
    pub fn binary_length(&self) -> usize {
        match self.uniform {
            UniformLength::Empty => 0,
            UniformLength::Uniform(length) => length * self.items.len(),
            UniformLength::Mixed => self.items.iter().map(|item| item.binary_length()).sum(),
        }
    }

    fn is_uniform(&self) -> bool {
        !matches!(self.uniform, UniformLength::Mixed)
    }
}

impl<'a, T> IntoIterator for &'a ChannelCollection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A collection of channel definitions. Definitions are self-numbering:
/// every push re-assigns the added item's index to its insertion position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionCollection<T> {
    inner: ChannelCollection<T>,
}

impl<T: BinaryLength + Indexed> DefinitionCollection<T> {
    pub fn new(maximum_index: usize) -> Self {
        DefinitionCollection {
            inner: ChannelCollection::new(maximum_index),
        }
    }

    pub fn push(&mut self, mut item: T) -> Result<(), ChannelError> {
        item.set_index(self.inner.len());
        self.inner.push(item)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn maximum_index(&self) -> usize {
        self.inner.maximum_index()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.inner.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.inner.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.inner.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.inner.iter_mut()
    }

    pub fn binary_length(&self) -> usize {
        self.inner.binary_length()
    }
}

impl<'a, T> IntoIterator for &'a DefinitionCollection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.items.iter()
    }
}

/// Cells that can be told to pad their serialized length to a 32-bit
/// boundary.
pub trait Aligned {
    fn align_on_dword_boundary(&self) -> bool;
    fn set_align_on_dword_boundary(&mut self, align: bool);
}

/// A collection of addressable cells. When d-word alignment is enabled, the
/// option is propagated to every cell as it is inserted, so each cell's
/// reported length (and therefore the aggregate) is rounded up to the next
/// multiple of four.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellCollection<T> {
    inner: ChannelCollection<T>,
    align_on_dword_boundary: bool,
}

impl<T: BinaryLength + Aligned> CellCollection<T> {
    pub fn new(maximum_index: usize, align_on_dword_boundary: bool) -> Self {
        CellCollection {
            inner: ChannelCollection::new(maximum_index),
            align_on_dword_boundary,
        }
    }

    pub fn align_on_dword_boundary(&self) -> bool {
        self.align_on_dword_boundary
    }

    pub fn push(&mut self, mut item: T) -> Result<(), ChannelError> {
        item.set_align_on_dword_boundary(self.align_on_dword_boundary);
        self.inner.push(item)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn maximum_index(&self) -> usize {
        self.inner.maximum_index()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.inner.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.inner.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.inner.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.inner.iter_mut()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn binary_length(&self) -> usize {
        self.inner.binary_length()
    }
}

impl<'a, T> IntoIterator for &'a CellCollection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.items.iter()
    }
}

/// A collection of measurement values. Fixed- and floating-format elements
/// are tallied separately so the O(1) aggregate path only fires when the
/// collection is provably homogeneous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCollection<T> {
    inner: ChannelCollection<T>,
    fixed_count: usize,
    float_count: usize,
}

impl<T: ChannelValue> ValueCollection<T> {
    pub fn new(maximum_index: usize) -> Self {
        ValueCollection {
            inner: ChannelCollection::new(maximum_index),
            fixed_count: 0,
            float_count: 0,
        }
    }

    pub fn push(&mut self, item: T) -> Result<(), ChannelError> {
        let fixed = item.is_fixed_format();
        self.inner.push(item)?;
        if fixed {
            self.fixed_count += 1;
        } else {
            self.float_count += 1;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn maximum_index(&self) -> usize {
        self.inner.maximum_index()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.inner.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.inner.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.inner.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.inner.iter_mut()
    }

    pub fn fixed_count(&self) -> usize {
        self.fixed_count
    }

    pub fn float_count(&self) -> usize {
        self.float_count
    }

    /// True while every element shares one wire format.
    pub fn is_homogeneous(&self) -> bool {
        self.fixed_count == 0 || self.float_count == 0
    }

    pub fn binary_length(&self) -> usize {
        if self.is_homogeneous() && self.inner.is_uniform() {
            self.inner.binary_length()
        } else {
            self.inner
                .items
                .iter()
                .map(|item| item.binary_length())
                .sum()
        }
    }

    /// True while every contained value still has an unassigned slot.
    pub fn all_empty(&self) -> bool {
        self.inner.iter().all(|item| item.is_empty())
    }
}

impl<'a, T> IntoIterator for &'a ValueCollection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::definition::{
        Indexed, PhasorDefinition, PhasorKind, DEFAULT_LABEL_LENGTH,
    };
    use crate::channel::value::{PhasorFormat, PhasorValue};

    #[test]
    fn test_capacity_is_maximum_index_plus_one() {
        // Maximum index 2 means insertions 0, 1, 2 succeed and the fourth fails
        let mut collection = ChannelCollection::new(2);
        for i in 0..3 {
            collection
                .push(PhasorValue::empty(PhasorFormat::IntRect))
                .unwrap_or_else(|_| panic!("insertion {} should fit", i));
        }
        let overflow = collection.push(PhasorValue::empty(PhasorFormat::IntRect));
        assert!(matches!(
            overflow,
            Err(ChannelError::CollectionFull { maximum_index: 2 })
        ));
        assert_eq!(collection.len(), 3);
    }

    #[test]
    fn test_uniform_fast_path_and_mixed_sum() {
        let mut collection = ChannelCollection::new(15);
        collection
            .push(PhasorValue::empty(PhasorFormat::IntRect))
            .unwrap();
        collection
            .push(PhasorValue::empty(PhasorFormat::IntPolar))
            .unwrap();
        assert!(collection.is_uniform());
        assert_eq!(collection.binary_length(), 8);

        collection
            .push(PhasorValue::empty(PhasorFormat::FloatRect))
            .unwrap();
        assert!(!collection.is_uniform());
        assert_eq!(collection.binary_length(), 4 + 4 + 8);
    }

    #[test]
    fn test_definitions_are_self_numbering() {
        let mut definitions = DefinitionCollection::new(31);
        for label in ["VA", "VB", "VC", "IA"] {
            let mut definition =
                PhasorDefinition::new(label, PhasorKind::Voltage, DEFAULT_LABEL_LENGTH).unwrap();
            // Whatever the caller pre-set is overwritten at insertion
            definition.set_index(99);
            definitions.push(definition).unwrap();
        }
        for (position, definition) in definitions.iter().enumerate() {
            assert_eq!(definition.index(), position);
        }
    }

    #[test]
    fn test_value_collection_format_tallies() {
        let mut values = ValueCollection::new(15);
        values.push(PhasorValue::empty(PhasorFormat::IntRect)).unwrap();
        values.push(PhasorValue::empty(PhasorFormat::IntRect)).unwrap();
        assert!(values.is_homogeneous());
        assert_eq!(values.binary_length(), 8);

        values
            .push(PhasorValue::empty(PhasorFormat::FloatPolar))
            .unwrap();
        assert_eq!(values.fixed_count(), 2);
        assert_eq!(values.float_count(), 1);
        assert!(!values.is_homogeneous());
        assert_eq!(values.binary_length(), 4 + 4 + 8);
    }

    #[test]
    fn test_all_empty() {
        let mut values = ValueCollection::new(3);
        values.push(PhasorValue::empty(PhasorFormat::IntRect)).unwrap();
        assert!(values.all_empty());
        values
            .push(PhasorValue::from_raw(PhasorFormat::IntRect, 1.0, 2.0))
            .unwrap();
        assert!(!values.all_empty());
    }
}
