//! # Shared Parameter Storage
//!
//! Cross-subset parameter linkage works by handing the *same* storage handle
//! to more than one holder. Linkage detection therefore compares handle
//! identity (which allocation a handle points at), never the stored values:
//! two handles holding numerically equal values are still distinct parameters.
//!
//! [`Shared`] wraps `Rc<RefCell<T>>` and exposes identity through
//! [`Shared::same`] and an opaque [`Shared::token`] suitable for keying
//! seen-sets during linkage discovery.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

/// Reference-counted, identity-comparable parameter storage.
pub struct Shared<T>(Rc<RefCell<T>>);

/// Positive scalar parameter (omega, rate variance, pinvar).
pub type RealParam = Shared<f64>;

/// Vector parameter (state frequencies, exchangeabilities).
pub type VectorParam = Shared<Vec<f64>>;

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Shared(Rc::new(RefCell::new(value)))
    }

    /// True iff both handles point at the identical allocation.
    pub fn same(&self, other: &Shared<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Opaque identity token; equal tokens mean the identical allocation.
    pub fn token(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    /// Replace the stored value, writing through the shared allocation so
    /// every holder referencing it observes the change.
    pub fn set(&self, value: T) {
        *self.0.borrow_mut() = value;
    }
}

impl<T: Copy> Shared<T> {
    pub fn get(&self) -> T {
        *self.0.borrow()
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared(Rc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shared({:?})", self.0.borrow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_not_value() {
        let a = VectorParam::new(vec![0.25; 4]);
        let b = VectorParam::new(vec![0.25; 4]);
        let c = a.clone();

        // Equal values, distinct storage
        assert!(!a.same(&b));
        assert_ne!(a.token(), b.token());

        // Cloned handle, identical storage
        assert!(a.same(&c));
        assert_eq!(a.token(), c.token());
    }

    #[test]
    fn test_write_through_visible_to_all_handles() {
        let a = RealParam::new(1.0);
        let b = a.clone();
        b.set(2.5);
        assert_eq!(a.get(), 2.5);
    }
}
