use std::{iter::FusedIterator, rc::Rc};

use imbl_sized_chunks::SparseChunk;

use crate::{
    edit::{acquire_editable, Owner, OwnerId},
    BITS, BRANCHING, MASK,
};

type Leaf<T> = SparseChunk<T, BRANCHING>;
type Branch<T> = SparseChunk<Rc<Node<T>>, BRANCHING>;

// Whether a node is a leaf or a branch is always determined by its height
// (leaves are at height zero). The tree walks assert that the two agree.
#[derive(Clone)]
enum Slots<T> {
    Leaf(Leaf<T>),
    Branch(Branch<T>),
}

/// A node with [`BRANCHING`] slots, each of which is either occupied or
/// empty. Slots are addressed by absolute position and never move, which is
/// what allows the relaxed layout to fill nodes from the right.
#[derive(Clone)]
pub(crate) struct Node<T> {
    /// The edit session that created this node.
    owner: Option<OwnerId>,
    /// The number of elements in this subtree.
    filled: usize,
    slots: Slots<T>,
}

/// `pos` is the global position within the root node, and we are some
/// possibly-intermediate node at height `height` (where the leaf is at height
/// zero). Which of our slots does the global position belong to?
pub(crate) fn extract_index(pos: usize, height: u32) -> usize {
    (pos >> (BITS * height)) & MASK
}

/// The number of positions a node at `height` can address.
pub(crate) fn capacity(height: u32) -> usize {
    1 << (BITS * (height + 1))
}

impl<T> Node<T> {
    pub(crate) fn unit_leaf(owner: &Owner, pos: usize, value: T) -> Self {
        let mut data = SparseChunk::new();
        data.insert(pos & MASK, value);
        Node {
            owner: Some(owner.id()),
            filled: 1,
            slots: Slots::Leaf(data),
        }
    }

    /// A branch holding the given children, keyed by slot index.
    pub(crate) fn branch(
        owner: &Owner,
        children: impl IntoIterator<Item = (usize, Rc<Node<T>>)>,
    ) -> Self {
        let mut slots = SparseChunk::new();
        let mut filled = 0;
        for (slot, child) in children {
            filled += child.len();
            slots.insert(slot, child);
        }
        Node {
            owner: Some(owner.id()),
            filled,
            slots: Slots::Branch(slots),
        }
    }

    /// Puts `node` (of height `from`) at the bottom of a chain of fresh
    /// single-child branches, so that it ends up at position `pos` of a
    /// subtree of height `to`.
    pub(crate) fn wrap(
        owner: &Owner,
        mut node: Rc<Node<T>>,
        from: u32,
        to: u32,
        pos: usize,
    ) -> Rc<Node<T>> {
        for height in from + 1..=to {
            node = Rc::new(Node::branch(owner, [(extract_index(pos, height), node)]));
        }
        node
    }

    /// A minimal subtree of height `height` holding only `value`, at
    /// position `pos`.
    pub(crate) fn path(owner: &Owner, height: u32, pos: usize, value: T) -> Rc<Node<T>> {
        Node::wrap(
            owner,
            Rc::new(Node::unit_leaf(owner, pos, value)),
            0,
            height,
            pos,
        )
    }

    pub(crate) fn len(&self) -> usize {
        self.filled
    }

    pub(crate) fn is_owned_by(&self, owner: &Owner) -> bool {
        self.owner == Some(owner.id())
    }

    /// If this node is at height `height`, try to get the element at the given
    /// position.
    pub(crate) fn get(&self, height: u32, pos: usize) -> Option<&T> {
        match &self.slots {
            Slots::Leaf(data) => {
                debug_assert_eq!(height, 0);
                data.get(pos & MASK)
            }
            Slots::Branch(children) => children
                .get(extract_index(pos, height))
                .and_then(|child| child.get(height - 1, pos)),
        }
    }

    pub(crate) fn child(&self, slot: usize) -> Option<&Rc<Node<T>>> {
        match &self.slots {
            Slots::Leaf(_) => None,
            Slots::Branch(children) => children.get(slot),
        }
    }

    /// Checks that the node variants agree with the heights and that the
    /// fill counts are accurate. Returns the number of elements in this
    /// subtree.
    pub(crate) fn check(&self, height: u32) -> usize {
        let count = match &self.slots {
            Slots::Leaf(data) => {
                assert_eq!(height, 0, "leaf above the bottom of the tree");
                data.len()
            }
            Slots::Branch(children) => {
                assert!(height > 0, "branch at the bottom of the tree");
                assert!(!children.is_empty(), "empty branch");
                children.iter().map(|child| child.check(height - 1)).sum()
            }
        };
        assert_eq!(count, self.filled, "stale fill count");
        count
    }
}

impl<T: Clone> Node<T> {
    /// A shallow copy of this node, tagged with `owner`.
    pub(crate) fn clone_for(&self, owner: &Owner) -> Self {
        Node {
            owner: Some(owner.id()),
            filled: self.filled,
            slots: self.slots.clone(),
        }
    }

    /// Stores `value` at position `pos` of this subtree (which has height
    /// `height`), copying every node on the way down that `owner` may not
    /// mutate, and building the missing part of the path if there is one.
    ///
    /// Returns the value previously stored at `pos`, if any. This is the one
    /// primitive behind update, append and prepend.
    ///
    /// `self` must already be editable by `owner`.
    pub(crate) fn put(&mut self, owner: &Owner, height: u32, pos: usize, value: T) -> Option<T> {
        let old = match &mut self.slots {
            Slots::Leaf(data) => {
                debug_assert_eq!(height, 0);
                data.insert(pos & MASK, value)
            }
            Slots::Branch(children) => {
                debug_assert!(height > 0);
                let slot = extract_index(pos, height);
                match children.get_mut(slot) {
                    Some(child) => {
                        acquire_editable(child, owner).put(owner, height - 1, pos, value)
                    }
                    None => {
                        children.insert(slot, Node::path(owner, height - 1, pos, value));
                        None
                    }
                }
            }
        };
        if old.is_none() {
            self.filled += 1;
        }
        old
    }

    /// Attaches a leaf at position `pos` of this subtree (which has height
    /// `height`). The leaf's slots must not be occupied yet.
    ///
    /// `self` must already be editable by `owner`.
    pub(crate) fn graft(&mut self, owner: &Owner, height: u32, pos: usize, leaf: Rc<Node<T>>) {
        let Slots::Branch(children) = &mut self.slots else {
            unreachable!("grafting into a leaf");
        };
        let added = leaf.len();
        let slot = extract_index(pos, height);
        if height == 1 {
            let prev = children.insert(slot, leaf);
            debug_assert!(prev.is_none());
        } else {
            match children.get_mut(slot) {
                Some(child) => acquire_editable(child, owner).graft(owner, height - 1, pos, leaf),
                None => {
                    children.insert(slot, Node::wrap(owner, leaf, 0, height - 1, pos));
                }
            }
        }
        self.filled += added;
    }
}

/// An in-order iterator over the elements of one or two trees.
///
/// Every occupied slot of a tree holds an element of the sequence, so walking
/// the occupied slots from left to right visits the elements in order.
pub struct Iter<'a, T> {
    stack: Vec<(&'a Branch<T>, usize)>,
    leaf: Option<(&'a Leaf<T>, usize)>,
    // The baseline vector stores its elements in two trees (the trie and the
    // tail). This is the one we'll walk after the first one runs out.
    pending: Option<&'a Node<T>>,
    remaining: usize,
}

impl<'a, T> Iter<'a, T> {
    pub(crate) fn new(first: Option<&'a Node<T>>, then: Option<&'a Node<T>>, len: usize) -> Self {
        let mut iter = Iter {
            stack: Vec::new(),
            leaf: None,
            pending: then,
            remaining: len,
        };
        if let Some(node) = first {
            iter.enter(node);
        }
        iter
    }

    fn enter(&mut self, node: &'a Node<T>) {
        match &node.slots {
            Slots::Leaf(data) => self.leaf = Some((data, 0)),
            Slots::Branch(children) => self.stack.push((children, 0)),
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((data, pos)) = self.leaf.as_mut() {
                let data = *data;
                let next = (*pos..BRANCHING).find_map(|slot| data.get(slot).map(|elt| (slot, elt)));
                if let Some((slot, elt)) = next {
                    *pos = slot + 1;
                    self.remaining -= 1;
                    return Some(elt);
                }
                self.leaf = None;
            }

            let Some((children, pos)) = self.stack.last_mut() else {
                let node = self.pending.take()?;
                self.enter(node);
                continue;
            };
            let children = *children;
            let next =
                (*pos..BRANCHING).find_map(|slot| children.get(slot).map(|child| (slot, child)));
            match next {
                Some((slot, child)) => {
                    *pos = slot + 1;
                    self.enter(child);
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}
