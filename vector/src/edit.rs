//! Edit sessions and the copy-on-write decision.
//!
//! Every node remembers which edit session created it. A session holds an
//! [`Owner`] token, and may mutate a node in place only if the node bears
//! that token's identity and nobody else holds a reference to it. Anything
//! else gets copied (shallowly: children stay shared) before it is modified,
//! and the copy is tagged with the session's identity so that later steps of
//! the same session can keep mutating it.

use std::{
    marker::PhantomData,
    num::NonZeroU64,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::node::Node;

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// The identity stamped on nodes created by an edit session.
///
/// Identities are never reused, so a node stamped by a session that has
/// ended can never be mistaken for one belonging to a live session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct OwnerId(NonZeroU64);

/// The capability to mutate nodes in place.
///
/// An `Owner` is created when an edit session begins and dropped when it
/// ends. It is neither `Clone` nor `Send`: a session's nodes can only ever
/// be mutated from the one place holding the token.
#[derive(Debug)]
pub struct Owner {
    id: OwnerId,
    // The trees an owner edits are `Rc`-based, so it must stay on one thread.
    _not_send: PhantomData<Rc<()>>,
}

impl Owner {
    pub(crate) fn new() -> Self {
        let raw = NEXT_OWNER.fetch_add(1, Ordering::Relaxed);
        // The counter starts at one and a u64 won't wrap around in practice.
        let id = NonZeroU64::new(raw).map_or(OwnerId(NonZeroU64::MIN), OwnerId);
        log::trace!("edit session {} started", id.0);
        Owner {
            id,
            _not_send: PhantomData,
        }
    }

    pub(crate) fn id(&self) -> OwnerId {
        self.id
    }
}

impl Drop for Owner {
    fn drop(&mut self) {
        log::trace!("edit session {} ended", self.id.0);
    }
}

/// Returns a node that `owner` may mutate in place.
///
/// If `node` was created by `owner`'s session and is not shared, it is
/// returned as is. Otherwise `node` is replaced by a shallow copy tagged
/// with `owner`, and the copy is returned. The previous node is left
/// untouched for whoever else still refers to it.
///
/// This is the only way the vectors get mutable access to a node that is
/// already part of a tree.
pub(crate) fn acquire_editable<'a, T: Clone>(
    node: &'a mut Rc<Node<T>>,
    owner: &Owner,
) -> &'a mut Node<T> {
    if !node.is_owned_by(owner) {
        *node = Rc::new(node.clone_for(owner));
    }
    // If the node is ours but somebody still holds a reference to it (which
    // only happens if a session's tree was cloned mid-edit), `make_mut` falls
    // back to cloning, and the clone keeps our tag.
    Rc::make_mut(node)
}
