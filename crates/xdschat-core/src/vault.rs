//! Key vault capability
//!
//! The coordinator only needs to wipe the in-memory master key at shutdown. The
//! unlock path (passphrase, key derivation) belongs to the encrypted store and is
//! consumed through `MasterKeyVault::unlock`.

use crate::errors::ChatResult;
use std::sync::Mutex;
use zeroize::Zeroizing;

/// Capability to clear sensitive key material from memory
pub trait KeyVault: Send + Sync {
    /// Wipe the master random key.
    ///
    /// Must succeed when the vault was never unlocked and when called repeatedly.
    fn clear_master_random_key(&self) -> ChatResult<()>;
}

/// Holds the unlocked master random key in zeroizing memory
#[derive(Debug, Default)]
pub struct MasterKeyVault {
    master_key: Mutex<Option<Zeroizing<Vec<u8>>>>,
}

impl MasterKeyVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the master random key; any previous key is wiped first
    pub fn unlock(&self, key: Vec<u8>) -> ChatResult<()> {
        let mut slot = self
            .master_key
            .lock()
            .map_err(|_| crate::ChatError::Vault("master key lock poisoned".to_string()))?;
        *slot = Some(Zeroizing::new(key));
        Ok(())
    }

    pub fn is_unlocked(&self) -> bool {
        self.master_key
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }
}

impl KeyVault for MasterKeyVault {
    fn clear_master_random_key(&self) -> ChatResult<()> {
        // A poisoned lock still holds the key, so recover the guard and wipe anyway.
        let mut slot = match self.master_key.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Dropping the Zeroizing buffer overwrites it.
        slot.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_without_unlock() {
        let vault = MasterKeyVault::new();
        assert!(!vault.is_unlocked());
        vault.clear_master_random_key().unwrap();
        vault.clear_master_random_key().unwrap();
    }

    #[test]
    fn test_unlock_then_clear() {
        let vault = MasterKeyVault::new();
        vault.unlock(vec![0xAB; 32]).unwrap();
        assert!(vault.is_unlocked());

        vault.clear_master_random_key().unwrap();
        assert!(!vault.is_unlocked());
    }
}
