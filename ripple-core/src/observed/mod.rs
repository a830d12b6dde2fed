//! Observed State
//!
//! The dynamic surface of the runtime: raw value graphs ([`Value`],
//! [`RawObject`], [`RawArray`]) and the tracked views over them
//! ([`ObservedObject`], [`ObservedArray`]).
//!
//! Reading a field through a view records the edge `(object, key)` for the
//! running computation. Writing a field notifies that edge. Objects and
//! arrays found while reading come back wrapped; primitives come back as
//! they are.
//!
//! Raw values are never tracked. Writes through a [`RawObject`] are invisible
//! to the runtime, which makes them useful for setup and for tests.

mod array;
mod object;
mod value;

pub use array::ObservedArray;
pub use object::{Computed, ObservedObject};
pub use value::{Observed, RawArray, RawObject, Reactive, Value};
