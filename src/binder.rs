use std::collections::HashMap;
use std::sync::Arc;

use crate::expression::ArrayBase;

/// How array identities translate into argument slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingPolicy {
    /// Every occurrence of the same array shares one id.
    Sequential,
    /// Occurrences written by the expression get their own id, so the
    /// generated kernel never aliases an input with an output.
    Independent,
}

/// Allocates the stable integer ids behind `objN` names.
///
/// Ids come from a single counter, which is what keeps names unique within
/// one mapping; arrays are memoized by handle identity so reuse within an
/// expression resolves to the same name.
#[derive(Debug)]
pub struct SymbolicBinder {
    policy: BindingPolicy,
    next: u32,
    bound: HashMap<*const ArrayBase, u32>,
}

impl SymbolicBinder {
    #[must_use]
    pub fn new(policy: BindingPolicy) -> Self {
        Self {
            policy,
            next: 0,
            bound: HashMap::new(),
        }
    }

    /// Fresh id for an intermediate (dot, cast, host scalar, ...).
    pub fn get(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Id for an array handle, reusing the previous binding when the
    /// policy allows it.
    pub fn get_array(&mut self, array: &Arc<ArrayBase>, is_assigned: bool) -> u32 {
        let key = Arc::as_ptr(array);
        if self.policy == BindingPolicy::Independent && is_assigned {
            let id = self.get();
            self.bound.insert(key, id);
            return id;
        }
        if let Some(&id) = self.bound.get(&key) {
            return id;
        }
        let id = self.get();
        self.bound.insert(key, id);
        id
    }
}

impl Default for SymbolicBinder {
    fn default() -> Self {
        Self::new(BindingPolicy::Sequential)
    }
}
