//! Chain primitives shared across the drip workspace.

pub mod types;

pub use types::{Address, ParseHexError, TxHash, ADDRESS_LENGTH, HASH_LENGTH};
