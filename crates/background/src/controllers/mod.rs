//! Multi-step operations behind the listeners.

mod secret_decrypt;
mod use_resource;

pub use secret_decrypt::{DecryptedSecret, Plaintext, Resource, SecretDecryptController};
pub use use_resource::UseResourceController;
