//! Concrete plugin implementations built on the generic runtime in
//! `crate::plugin`.

pub mod cros_ec;
pub mod interfaces;
