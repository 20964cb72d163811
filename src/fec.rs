//! Thin wrapper around the systematic erasure coder used to produce and
//! recover code-group symbols. See [`FecCoder`].

use reed_solomon_erasure::galois_8::ReedSolomon;

/// The erasure coder declined to construct or reconstruct a group.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FecError {
    /// Shard counts were invalid (zero shards, or too many for the coder).
    #[error("invalid shard configuration: {0}")]
    InvalidShards(String),
    /// Too few shards survived to reconstruct the group.
    #[error("not enough shards to reconstruct group")]
    Infeasible,
}

impl From<reed_solomon_erasure::Error> for FecError {
    fn from(err: reed_solomon_erasure::Error) -> Self {
        match err {
            reed_solomon_erasure::Error::TooFewShardsPresent
            | reed_solomon_erasure::Error::TooManyErrors => FecError::Infeasible,
            other => FecError::InvalidShards(other.to_string()),
        }
    }
}

/// Produces recovery symbols for a closed group, and reconstructs missing
/// originals given enough surviving symbols.
#[derive(Debug)]
pub struct FecCoder {
    coder: ReedSolomon,
}

impl FecCoder {
    /// Builds a coder for a group with `originals` original and `recovery`
    /// recovery symbols.
    pub fn new(originals: u16, recovery: u16) -> Result<Self, FecError> {
        let coder = ReedSolomon::new(usize::from(originals), usize::from(recovery))
            .map_err(FecError::from)?;
        Ok(Self { coder })
    }

    /// Computes `recovery` recovery shards from `originals`, all shards
    /// sharing the same `symbol_len`.
    ///
    /// `originals` must have exactly `originals` (the count this coder was
    /// built with) entries, each `symbol_len` bytes long.
    pub fn encode(&self, originals: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, FecError> {
        let symbol_len = originals.first().map_or(0, Vec::len);
        let recovery_count = self.coder.parity_shard_count();

        let mut shards: Vec<Vec<u8>> = originals.to_vec();
        shards.extend(std::iter::repeat(vec![0u8; symbol_len]).take(recovery_count));

        self.coder.encode(&mut shards).map_err(FecError::from)?;

        Ok(shards.split_off(originals.len()))
    }

    /// Reconstructs every original given a full shard set where missing
    /// symbols are `None`. Returns the originals in order.
    pub fn decode(&self, mut shards: Vec<Option<Vec<u8>>>) -> Result<Vec<Vec<u8>>, FecError> {
        self.coder.reconstruct(&mut shards).map_err(FecError::from)?;

        let original_count = self.coder.data_shard_count();
        Ok(shards
            .into_iter()
            .take(original_count)
            .map(|shard| shard.expect("reconstruct guarantees all shards present on success"))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_full_decode_recovers_originals() {
        let originals = vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8], vec![9, 10, 11, 12]];
        let coder = FecCoder::new(3, 2).unwrap();
        let recovery = coder.encode(&originals).unwrap();
        assert_eq!(recovery.len(), 2);

        let mut shards: Vec<Option<Vec<u8>>> =
            originals.iter().cloned().map(Some).collect();
        shards.extend(recovery.into_iter().map(Some));

        // drop two originals, rely purely on recovery symbols
        shards[0] = None;
        shards[1] = None;

        let recovered = coder.decode(shards).unwrap();
        assert_eq!(recovered, originals);
    }

    #[test]
    fn too_few_shards_is_infeasible() {
        let originals = vec![vec![1, 2], vec![3, 4], vec![5, 6]];
        let coder = FecCoder::new(3, 1).unwrap();
        let recovery = coder.encode(&originals).unwrap();

        let mut shards: Vec<Option<Vec<u8>>> =
            originals.iter().cloned().map(Some).collect();
        shards.extend(recovery.into_iter().map(Some));

        shards[0] = None;
        shards[1] = None;

        assert!(matches!(coder.decode(shards), Err(FecError::Infeasible)));
    }
}
