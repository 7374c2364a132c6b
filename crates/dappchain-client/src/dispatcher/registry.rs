//! Reference-counted listener registry.

use dappchain_types::{Address, ChainEvent};
use std::sync::Arc;

/// Receives events emitted by one contract.
///
/// Closures taking `&ChainEvent` implement this directly.
pub trait EventListener: Send + Sync + 'static {
    fn on_event(&self, event: &ChainEvent);
}

impl<F> EventListener for F
where
    F: Fn(&ChainEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &ChainEvent) {
        self(event)
    }
}

/// Listener identity is the allocation, not the vtable.
fn same_listener(a: &Arc<dyn EventListener>, b: &Arc<dyn EventListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

struct Registration {
    contract: Address,
    listener: Arc<dyn EventListener>,
    refs: usize,
}

/// Listeners keyed by contract, each with a registration count.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    entries: Vec<Registration>,
}

impl ListenerRegistry {
    /// Add one reference for `listener` on `contract`.
    ///
    /// Returns the listener's reference count after the call.
    pub(crate) fn register(&mut self, contract: Address, listener: Arc<dyn EventListener>) -> usize {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.contract == contract && same_listener(&e.listener, &listener))
        {
            entry.refs += 1;
            return entry.refs;
        }

        self.entries.push(Registration {
            contract,
            listener,
            refs: 1,
        });
        1
    }

    /// Drop one reference for `listener` on `contract`.
    ///
    /// Returns `None` if it was not registered, otherwise the remaining
    /// reference count.
    pub(crate) fn unregister(
        &mut self,
        contract: &Address,
        listener: &Arc<dyn EventListener>,
    ) -> Option<usize> {
        let index = self
            .entries
            .iter()
            .position(|e| &e.contract == contract && same_listener(&e.listener, listener))?;

        let entry = &mut self.entries[index];
        entry.refs -= 1;
        let remaining = entry.refs;
        if remaining == 0 {
            self.entries.remove(index);
        }
        Some(remaining)
    }

    /// Listeners registered for `contract`, in registration order.
    pub(crate) fn matching(&self, contract: &Address) -> Vec<Arc<dyn EventListener>> {
        self.entries
            .iter()
            .filter(|e| &e.contract == contract)
            .map(|e| Arc::clone(&e.listener))
            .collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct (contract, listener) registrations.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of distinct contracts with at least one listener.
    pub(crate) fn contract_count(&self) -> usize {
        let mut contracts: Vec<&Address> = self.entries.iter().map(|e| &e.contract).collect();
        contracts.sort();
        contracts.dedup();
        contracts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dappchain_types::LocalAddress;

    fn addr(byte: u8) -> Address {
        Address::new("default", LocalAddress::new([byte; 20]))
    }

    fn listener() -> Arc<dyn EventListener> {
        Arc::new(|_: &ChainEvent| {})
    }

    #[test]
    fn test_refcounting() {
        let mut registry = ListenerRegistry::default();
        let l = listener();

        assert_eq!(registry.register(addr(1), l.clone()), 1);
        assert_eq!(registry.register(addr(1), l.clone()), 2);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.matching(&addr(1)).len(), 1);

        assert_eq!(registry.unregister(&addr(1), &l), Some(1));
        assert!(!registry.is_empty());
        assert_eq!(registry.unregister(&addr(1), &l), Some(0));
        assert!(registry.is_empty());
        assert_eq!(registry.unregister(&addr(1), &l), None);
    }

    #[test]
    fn test_identity_is_per_allocation() {
        let mut registry = ListenerRegistry::default();
        let a = listener();
        let b = listener();

        registry.register(addr(1), a.clone());
        registry.register(addr(1), b.clone());
        registry.register(addr(2), a.clone());

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.contract_count(), 2);
        assert_eq!(registry.matching(&addr(1)).len(), 2);
        assert_eq!(registry.unregister(&addr(2), &b), None);
    }
}
