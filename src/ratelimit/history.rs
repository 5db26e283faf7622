use std::collections::VecDeque;

/// Fixed-capacity history that evicts its oldest entry when full
#[derive(Debug, Clone)]
pub struct History<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> History<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The `count` most recent entries, oldest first
    pub fn latest(&self, count: usize) -> impl Iterator<Item = &T> {
        self.entries.iter().skip(self.entries.len().saturating_sub(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = History::new(3);
        for i in 1..=4 {
            history.push(i);
        }
        assert_eq!(history.len(), 3);
        let values: Vec<_> = history.latest(3).copied().collect();
        assert_eq!(values, vec![2, 3, 4]);
    }

    #[test]
    fn test_latest_shorter_than_requested() {
        let mut history = History::new(10);
        history.push(1);
        history.push(2);
        let values: Vec<_> = history.latest(5).copied().collect();
        assert_eq!(values, vec![1, 2]);
        assert_eq!(history.latest(1).next(), Some(&2));
    }

    #[test]
    fn test_zero_capacity_stays_empty() {
        let mut history = History::new(0);
        history.push(1);
        assert_eq!(history.len(), 0);
    }
}
