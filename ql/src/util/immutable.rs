use std::ops::Deref;

/// Wrapper signaling that the contained value stays untouched for the rest of its lifetime
pub struct Immutable<T>(T);

impl<T> Immutable<T> {
    pub fn new(value: T) -> Self { Immutable(value) }
}

impl<T> Deref for Immutable<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target { &self.0 }
}
