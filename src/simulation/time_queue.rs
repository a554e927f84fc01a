use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub trait EndTime {
    fn end_time(&self, now: u32) -> u32;
}

struct Entry<T> {
    end_time: u32,
    order: usize,
    value: T,
}

impl<T> PartialEq<Self> for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.end_time == other.end_time && self.order == other.order
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd<Self> for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed, BinaryHeap is a max heap. Insertion order breaks ties, so that values with the
        // same end time come out first in first out.
        other
            .end_time
            .cmp(&self.end_time)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Min heap of values ordered by their end time and then by insertion order.
pub struct TimeQueue<T>
where
    T: EndTime,
{
    q: BinaryHeap<Entry<T>>,
    counter: usize,
}

impl<T> Default for TimeQueue<T>
where
    T: EndTime,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimeQueue<T>
where
    T: EndTime,
{
    pub fn new() -> Self {
        TimeQueue {
            q: BinaryHeap::new(),
            counter: 0,
        }
    }

    pub fn add(&mut self, value: T, now: u32) {
        let end_time = value.end_time(now);
        let order = self.counter;
        self.counter += 1;
        self.q.push(Entry {
            end_time,
            order,
            value,
        });
    }

    /// Removes all values with an end time of `now` or earlier.
    pub fn pop(&mut self, now: u32) -> Vec<T> {
        let mut result: Vec<T> = Vec::new();
        while self.q.peek().is_some_and(|entry| entry.end_time <= now) {
            if let Some(entry) = self.q.pop() {
                result.push(entry.value);
            }
        }
        result
    }

    /// End time of the next value to come out.
    pub fn next_end_time(&self) -> Option<u32> {
        self.q.peek().map(|entry| entry.end_time)
    }

    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }
}
