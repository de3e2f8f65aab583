//! Prefix tree over prefix-free command names

use std::collections::HashMap;

#[derive(Debug)]
struct Node<V> {
    children: HashMap<char, Node<V>>,
    value: Option<V>,
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self {
            children: HashMap::new(),
            value: None,
        }
    }
}

/// Deepest registered node reached while walking a text
#[derive(Debug, PartialEq, Eq)]
pub struct TrieMatch<'a, V> {
    /// Byte length of the consumed prefix of the walked text
    pub len: usize,
    pub value: &'a V,
}

/// Prefix tree mapping command names to values
#[derive(Debug)]
pub struct CommandTrie<V> {
    root: Node<V>,
    len: usize,
}

impl<V> Default for CommandTrie<V> {
    fn default() -> Self {
        Self {
            root: Node::default(),
            len: 0,
        }
    }
}

impl<V> CommandTrie<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered names
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Register `name`, returning the value it replaced
    pub fn insert(&mut self, name: &str, value: V) -> Option<V> {
        let mut node = &mut self.root;
        for ch in name.chars() {
            node = node.children.entry(ch).or_default();
        }

        let previous = node.value.replace(value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Walk `text` character by character and return the longest registered
    /// name it starts with
    ///
    /// With `fold_case`, each character of `text` is lower-cased before it is
    /// walked, so names must have been inserted in lower case. The reported
    /// length always refers to the original `text`.
    #[must_use]
    pub fn find_longest(&self, text: &str, fold_case: bool) -> Option<TrieMatch<'_, V>> {
        let mut node = &self.root;
        let mut best = None;

        for (idx, ch) in text.char_indices() {
            let next = if fold_case {
                walk(node, ch.to_lowercase())
            } else {
                node.children.get(&ch)
            };
            let Some(next) = next else {
                break;
            };
            node = next;

            if let Some(value) = node.value.as_ref() {
                best = Some(TrieMatch {
                    len: idx + ch.len_utf8(),
                    value,
                });
            }
        }

        best
    }
}

fn walk<V>(mut node: &Node<V>, chars: impl Iterator<Item = char>) -> Option<&Node<V>> {
    for ch in chars {
        node = node.children.get(&ch)?;
    }
    Some(node)
}
