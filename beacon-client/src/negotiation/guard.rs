use beacon_core::PeerId;
use std::collections::HashSet;

/// Remote identities whose incoming session description is being applied.
///
/// The viewer claims an entry for each remote offer it answers, the streamer
/// for each remote answer it applies. Either way a second description from
/// the same peer is dropped until the first one settles.
#[derive(Debug, Default)]
pub struct OfferProcessingGuard {
    processing: HashSet<PeerId>,
}

impl OfferProcessingGuard {
    /// Marks `remote` as busy. Returns `false` if it already was.
    pub fn try_begin(&mut self, remote: &PeerId) -> bool {
        self.processing.insert(remote.clone())
    }

    pub fn finish(&mut self, remote: &PeerId) {
        self.processing.remove(remote);
    }

    pub fn is_processing(&self, remote: &PeerId) -> bool {
        self.processing.contains(remote)
    }

    pub fn clear(&mut self) {
        self.processing.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.processing.is_empty()
    }
}
