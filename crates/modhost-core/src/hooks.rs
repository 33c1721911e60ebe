//! Per-event subscriber lists and the priority resolver that reorders them.
//!
//! [`HookTable`] keeps one ordered list per [`EventKind`]. The order of a list
//! is the call order during dispatch. Subscribers are compared with
//! `PartialEq`; the runtime stores `Arc` handles whose equality is identity.
//!
//! # Reordering
//!
//! [`HookTable::set_priority`] moves one subscriber relative to the list ends
//! or to a pivot subscriber. The move is a rotation of the slice between the
//! old and the new index, so subscribers that are not involved keep their
//! relative order:
//!
//! ```text
//! [A, B, C]   set_priority(C, Before(A))   →   [C, A, B]
//! ```
//!
//! `Before` only searches positions before the subscriber and `After` only
//! positions after it. A pivot outside that range means the constraint already
//! holds (or the pivot is not attached), and the call changes nothing. This
//! directional search is what keeps two compatible constraints from
//! oscillating across passes.

use std::fmt;

use crate::event::EventKind;

/// Placement rule for [`HookTable::set_priority`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Priority<T> {
    /// Move to the front of the list.
    First,
    /// Move to the back of the list.
    Last,
    /// Move directly in front of the pivot if the pivot currently precedes it.
    Before(T),
    /// Move directly behind the pivot if the pivot currently follows it.
    After(T),
}

/// Result of a single [`HookTable::set_priority`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reposition {
    /// The subscriber is not attached to this kind.
    NotAttached,
    /// The rule already holds, or the pivot is not in the searched range.
    Satisfied,
    /// The subscriber was moved.
    Moved,
}

impl Reposition {
    /// Returns `true` unless the subscriber was not attached.
    pub fn is_success(self) -> bool {
        self != Reposition::NotAttached
    }
}

/// Ordered subscriber lists, one per [`EventKind`].
#[derive(Clone)]
pub struct HookTable<T> {
    lists: Vec<Vec<T>>,
    /// Incremented on every move; lets callers detect convergence.
    reorders: u64,
}

impl<T: Clone + PartialEq> HookTable<T> {
    /// Creates a table with an empty list for every kind.
    pub fn new() -> Self {
        Self {
            lists: vec![Vec::new(); EventKind::COUNT],
            reorders: 0,
        }
    }

    fn list(&self, kind: EventKind) -> &Vec<T> {
        &self.lists[kind as usize]
    }

    fn list_mut(&mut self, kind: EventKind) -> &mut Vec<T> {
        &mut self.lists[kind as usize]
    }

    /// Appends `item` to the subscribers of `kind`.
    ///
    /// Returns `false` and changes nothing if it is already attached.
    pub fn attach(&mut self, kind: EventKind, item: T) -> bool {
        let list = self.list_mut(kind);
        if list.contains(&item) {
            return false;
        }
        list.push(item);
        true
    }

    /// Attaches `item` to every kind in `kinds`.
    pub fn attach_many(&mut self, kinds: &[EventKind], item: &T) {
        for &kind in kinds {
            self.attach(kind, item.clone());
        }
    }

    /// Removes `item` from the subscribers of `kind`, keeping the rest in order.
    ///
    /// Returns `false` if it was not attached.
    pub fn detach(&mut self, kind: EventKind, item: &T) -> bool {
        let list = self.list_mut(kind);
        match list.iter().position(|x| x == item) {
            Some(pos) => {
                list.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Detaches `item` from every kind it is attached to.
    pub fn detach_all(&mut self, item: &T) {
        for &kind in EventKind::ALL {
            self.detach(kind, item);
        }
    }

    /// Returns the current subscribers of `kind` in call order.
    pub fn subscribers(&self, kind: EventKind) -> &[T] {
        self.list(kind)
    }

    /// Returns an owned copy of the subscribers of `kind`.
    ///
    /// Dispatch iterates this copy so that handlers may attach, detach or
    /// reorder while they are being called.
    pub fn snapshot(&self, kind: EventKind) -> Vec<T> {
        self.list(kind).clone()
    }

    /// Returns `true` if `item` is attached to `kind`.
    pub fn is_attached(&self, kind: EventKind, item: &T) -> bool {
        self.list(kind).contains(item)
    }

    /// Returns every kind `item` is attached to.
    pub fn kinds_of(&self, item: &T) -> Vec<EventKind> {
        EventKind::ALL
            .iter()
            .copied()
            .filter(|&kind| self.is_attached(kind, item))
            .collect()
    }

    /// Total number of subscriptions across all kinds.
    pub fn subscription_count(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    /// Number of moves performed since the table was created.
    pub fn reorders(&self) -> u64 {
        self.reorders
    }

    /// Applies `rule` to `item` within the subscribers of `kind`.
    pub fn set_priority(&mut self, kind: EventKind, item: &T, rule: &Priority<T>) -> Reposition {
        let list = &mut self.lists[kind as usize];
        let Some(pos) = list.iter().position(|x| x == item) else {
            return Reposition::NotAttached;
        };

        let target = match rule {
            Priority::First => 0,
            Priority::Last => list.len() - 1,
            // Latest matching position strictly after us.
            Priority::After(pivot) => match list[pos + 1..].iter().rposition(|x| x == pivot) {
                Some(offset) => pos + 1 + offset,
                None => return Reposition::Satisfied,
            },
            // Earliest matching position strictly before us.
            Priority::Before(pivot) => match list[..pos].iter().position(|x| x == pivot) {
                Some(index) => index,
                None => return Reposition::Satisfied,
            },
        };

        if target == pos {
            return Reposition::Satisfied;
        }
        if target > pos {
            list[pos..=target].rotate_left(1);
        } else {
            list[target..=pos].rotate_right(1);
        }
        self.reorders += 1;
        Reposition::Moved
    }

    /// Applies `rule` to `item` on every kind.
    ///
    /// Kinds the subscriber is not attached to are skipped. A single call does
    /// not guarantee global consistency when several subscribers constrain each
    /// other; callers re-run their rules until [`reorders`](Self::reorders)
    /// stops changing, up to a bounded number of passes.
    ///
    /// Returns `true` if anything moved.
    pub fn set_priority_all(&mut self, item: &T, rule: &Priority<T>) -> bool {
        let mut moved = false;
        for &kind in EventKind::ALL {
            moved |= self.set_priority(kind, item, rule) == Reposition::Moved;
        }
        moved
    }
}

impl<T: Clone + PartialEq> Default for HookTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HookTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookTable")
            .field("subscriptions", &self.lists.iter().map(Vec::len).sum::<usize>())
            .field("reorders", &self.reorders)
            .finish()
    }
}
