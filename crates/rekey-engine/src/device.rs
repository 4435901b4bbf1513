//! The local device a rotation engine acts as.

use std::fmt;

use rekey_core::{Environment, Identity, UserId};
use rekey_crypto::BoxKeyPair;

/// A user's device: the key pair seed boxes are opened with, and the
/// credential epoch that key pair belongs to.
#[derive(Clone)]
pub struct Device {
    user_id: UserId,
    eldest_seqno: u64,
    keys: BoxKeyPair,
}

impl Device {
    /// Device from existing key material.
    pub fn new(user_id: UserId, eldest_seqno: u64, keys: BoxKeyPair) -> Self {
        Self { user_id, eldest_seqno, keys }
    }

    /// Fresh device with a random box key.
    pub fn provision<E: Environment>(env: &E, user_id: UserId, eldest_seqno: u64) -> Self {
        let keys = BoxKeyPair::from_secret_bytes(env.random_array());
        Self::new(user_id, eldest_seqno, keys)
    }

    /// User this device belongs to.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Credential epoch of this device's key pair.
    pub fn eldest_seqno(&self) -> u64 {
        self.eldest_seqno
    }

    /// Key pair boxes are opened with.
    pub fn keys(&self) -> &BoxKeyPair {
        &self.keys
    }

    /// Public identity to register with the ledger.
    pub fn identity(&self) -> Identity {
        Identity { eldest_seqno: self.eldest_seqno, box_key: self.keys.public_key() }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("user_id", &self.user_id)
            .field("eldest_seqno", &self.eldest_seqno)
            .finish_non_exhaustive()
    }
}
