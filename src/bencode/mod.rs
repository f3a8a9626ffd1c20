//! Bencode codec
//!
//! Bencode format:
//! - Integers:   `i<number>e`        Example: `i42e`
//! - Strings:    `<length>:<data>`   Example: `4:spam`
//! - Lists:      `l<items>e`         Example: `l4:spami42ee`
//! - Dicts:      `d<pairs>e`         Example: `d3:cow3:moo4:spam4:eggse`
//!
//! Decoding is strict: only the canonical form of each value is accepted, so
//! `encode(&decode(x)?) == x` holds for every input `decode` accepts.

mod decode;
mod encode;
mod value;


pub use decode::{decode, decode_prefix, locate, MAX_DEPTH};
pub use encode::{encode, encode_into};
pub use value::Value;
