use std::fmt;

type ReleaseFn<T> = Box<dyn FnOnce(T) + Send>;

/// Owns one engine resource and runs its release function exactly once,
/// either through [`Handle::release`] or when the handle is dropped.
pub struct Handle<T: Copy> {
    raw: T,
    release: Option<ReleaseFn<T>>,
}

impl<T: Copy> Handle<T> {
    pub fn acquire(raw: T, release: impl FnOnce(T) + Send + 'static) -> Self {
        Self {
            raw,
            release: Some(Box::new(release)),
        }
    }

    /// The raw resource. Ownership stays with the handle.
    pub fn value(&self) -> T {
        self.raw
    }

    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }

    /// Returns `true` if this call performed the release.
    pub fn release(&mut self) -> bool {
        match self.release.take() {
            Some(release) => {
                release(self.raw);
                true
            }
            None => false,
        }
    }
}

impl<T: Copy> Drop for Handle<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("raw", &self.raw)
            .field("released", &self.is_released())
            .finish()
    }
}
