//! Round-robin interleaving of review batches by theme.

use std::collections::{HashMap, VecDeque};

use super::Card;

/// Bucket for items that carry no theme.
pub const DEFAULT_THEME: &str = "General";

/// Anything that can be grouped by topic.
pub trait Themed {
    fn theme(&self) -> Option<&str>;
}

impl Themed for Card {
    fn theme(&self) -> Option<&str> {
        self.theme.as_deref()
    }
}

fn theme_key<T: Themed>(item: &T) -> String {
    match item.theme().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => DEFAULT_THEME.to_string(),
    }
}

/// Reorder `items` so consecutive items come from different themes
/// whenever more than one theme still has items left.
///
/// Themes are visited in order of first appearance; items keep their
/// relative order within a theme.
pub fn interleave_by_theme<T: Themed>(items: Vec<T>) -> Vec<T> {
    let total = items.len();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut queues: Vec<VecDeque<T>> = Vec::new();

    for item in items {
        let key = theme_key(&item);
        let slot = *index.entry(key).or_insert_with(|| {
            queues.push(VecDeque::new());
            queues.len() - 1
        });
        queues[slot].push_back(item);
    }

    let mut ordered = Vec::with_capacity(total);
    while ordered.len() < total {
        for queue in queues.iter_mut() {
            if let Some(item) = queue.pop_front() {
                ordered.push(item);
            }
        }
    }
    ordered
}
