//! Decryption hand-off
//!
//! DRM removal is not done here. Packaged archives can be passed to a
//! [`Decryptor`] implementation, such as [`CommandDecryptor`] which runs an
//! external program.

pub mod command;
pub mod decryptor;

pub use command::CommandDecryptor;
pub use decryptor::{decrypt_in_place, Decryptor};
