use crate::decoder::HasLocation;
use crate::errors::LifecycleError;
use crate::filter::{Filter, Filterable};
use crate::geometry::Rect;

/// Results of the most recent fetch cycle, in submission order.
#[derive(Debug)]
pub struct ResultStore<T> {
    results: Vec<T>,
}

impl<T> Default for ResultStore<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
        }
    }
}

impl<T: HasLocation> ResultStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the previous cycle's results.
    pub fn publish(&mut self, results: Vec<T>) {
        self.results = results;
    }

    pub fn clear(&mut self) {
        self.results.clear();
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.results.get(index)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.results
    }

    pub fn location(&self, index: usize) -> Result<Rect, LifecycleError> {
        self.results
            .get(index)
            .map(HasLocation::location)
            .ok_or(LifecycleError::IndexOutOfRange {
                index,
                len: self.results.len(),
            })
    }

    pub fn filtered(&self, filter: &Filter) -> Vec<&T>
    where
        T: Filterable,
    {
        self.results.iter().filter(|r| filter.matches(*r)).collect()
    }

    pub fn filtered_locations(&self, filter: &Filter) -> Vec<Rect>
    where
        T: Filterable,
    {
        self.results
            .iter()
            .filter(|r| filter.matches(*r))
            .map(HasLocation::location)
            .collect()
    }
}
