//! Consumer process identifier.

use std::fmt;

/// Identifies a consumer task contending for the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub u32);

impl Pid {
    /// Create a new Pid.
    #[inline]
    pub fn new(id: u32) -> Self {
        Pid(id)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Process({})", self.0)
    }
}
