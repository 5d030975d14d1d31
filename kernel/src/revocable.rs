// SPDX-License-Identifier: GPL-2.0

//! Revocable objects.
//!
//! The [`Revocable`] type wraps other types and allows access to them to be revoked. The
//! existence of a [`Revocable`] instance does not guarantee that the object is still
//! available, so every access has to go through [`Revocable::try_access_with`].

use spin::RwLock;

/// An object that can become inaccessible at runtime.
///
/// Once access is revoked and all concurrent users of the object have finished, the
/// object is dropped.
///
/// # Examples
///
/// ```
/// # use kernel::revocable::Revocable;
/// struct Example {
///     a: u32,
///     b: u32,
/// }
///
/// fn add_two(v: &Revocable<Example>) -> Option<u32> {
///     v.try_access_with(|e| e.a + e.b)
/// }
///
/// let v = Revocable::new(Example { a: 10, b: 20 });
/// assert_eq!(add_two(&v), Some(30));
/// v.revoke();
/// assert_eq!(add_two(&v), None);
/// ```
pub struct Revocable<T> {
    data: RwLock<Option<T>>,
}

impl<T> Revocable<T> {
    /// Creates a new revocable instance of the given data.
    pub fn new(data: T) -> Self {
        Self {
            data: RwLock::new(Some(data)),
        }
    }

    /// Runs `f` on the wrapped object if it is still accessible.
    ///
    /// Revocation waits for `f` to return, so the object stays alive for the whole call.
    /// Returns `None` if the object has been revoked.
    pub fn try_access_with<R, F: FnOnce(&T) -> R>(&self, f: F) -> Option<R> {
        let guard = self.data.read();
        guard.as_ref().map(f)
    }

    /// Returns `true` until the object is revoked.
    pub fn is_available(&self) -> bool {
        self.data.read().is_some()
    }

    /// Revokes access to and drops the wrapped object.
    ///
    /// Access to the object is revoked immediately to new callers of
    /// [`Revocable::try_access_with`]. Callers already inside it are waited for. Returns
    /// `true` if this call did the revocation.
    pub fn revoke(&self) -> bool {
        let data = self.data.write().take();
        data.is_some()
    }
}
