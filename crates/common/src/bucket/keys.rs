use super::error::BucketError;
use super::types::BucketMeta;

/// Block-height windows in which one key commitment per participant is valid.
///
/// Epoch `e` covers heights `genesis + e * size ..= genesis + (e + 1) * size - 1`.
/// There is no fallback between epochs: a key set for epoch 2 says nothing
/// about epoch 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEpochs {
    genesis: u64,
    size: u64,
}

impl KeyEpochs {
    pub fn new(genesis: u64, size: u64) -> Self {
        Self {
            genesis,
            // a zero width is rejected by config validation
            size: size.max(1),
        }
    }

    pub fn genesis(&self) -> u64 {
        self.genesis
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn epoch_of(&self, height: u64) -> Result<u64, BucketError> {
        if height < self.genesis {
            return Err(BucketError::BeforeGenesis {
                height,
                genesis: self.genesis,
            });
        }
        Ok((height - self.genesis) / self.size)
    }

    /// Epoch a key may be written for at `height`, given the chain is at `current`
    pub fn writable_epoch(&self, height: u64, current: u64) -> Result<u64, BucketError> {
        let epoch = self.epoch_of(height)?;
        if height > current {
            return Err(BucketError::InFuture { height, current });
        }
        Ok(epoch)
    }

    /// First height of `epoch`
    pub fn start_of(&self, epoch: u64) -> u64 {
        self.genesis.saturating_add(epoch.saturating_mul(self.size))
    }
}

impl From<&BucketMeta> for KeyEpochs {
    fn from(meta: &BucketMeta) -> Self {
        Self::new(meta.genesis, meta.epoch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_boundaries() {
        let epochs = KeyEpochs::new(1_000, 100);
        assert_eq!(epochs.epoch_of(1_000).unwrap(), 0);
        assert_eq!(epochs.epoch_of(1_099).unwrap(), 0);
        assert_eq!(epochs.epoch_of(1_100).unwrap(), 1);
        assert_eq!(epochs.start_of(3), 1_300);
    }

    #[test]
    fn test_before_genesis() {
        let epochs = KeyEpochs::new(1_000, 100);
        let err = epochs.epoch_of(999).unwrap_err();
        assert!(matches!(err, BucketError::BeforeGenesis { height: 999, genesis: 1_000 }));
        assert!(err.to_string().contains("before genesis"));
    }

    #[test]
    fn test_writable_epoch_rejects_future() {
        let epochs = KeyEpochs::new(10, 5);
        assert_eq!(epochs.writable_epoch(17, 17).unwrap(), 1);
        let err = epochs.writable_epoch(18, 17).unwrap_err();
        assert!(matches!(err, BucketError::InFuture { height: 18, current: 17 }));
    }
}
