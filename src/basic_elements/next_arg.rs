use alloy_primitives::{Address, B256, U256};
use anyhow::{Result, bail};

use crate::types::WireKind;

use super::args::Args;

/// Reads one untagged payload of the requested wire kind as `T`.
/// Asking for a kind that does not decode to `T` is a type mismatch.
pub trait NextArg<T> {
    fn next_arg(&mut self, kind: WireKind) -> Result<T>;
}

macro_rules! impl_next_arg {
    ($ty:ty, $kind:path, $read:ident) => {
        impl NextArg<$ty> for Args {
            fn next_arg(&mut self, kind: WireKind) -> Result<$ty> {
                if kind == $kind {
                    self.$read()
                } else {
                    bail!(
                        "Type mismatch: Expected {:?}, but got request for {}",
                        kind,
                        stringify!($ty)
                    );
                }
            }
        }
    };
}

impl_next_arg!(Address, WireKind::Address, next_address);
impl_next_arg!(bool, WireKind::Bool, next_bool);
impl_next_arg!(U256, WireKind::Uint, next_u256);
impl_next_arg!(Vec<u8>, WireKind::Bytes, next_bytes);
impl_next_arg!(B256, WireKind::FixedBytes, next_b256);
impl_next_arg!(String, WireKind::String, next_string);
