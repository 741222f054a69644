// ============================================================
// Layer 4 — DROP Dataset
// ============================================================
// Wraps loaded instances in Burn's Dataset trait so the
// DataLoader can index them.

use burn::data::dataset::Dataset;

use crate::domain::instance::DropInstance;

pub struct DropDataset {
    instances: Vec<DropInstance>,
}

impl DropDataset {
    pub fn new(instances: Vec<DropInstance>) -> Self { Self { instances } }

    /// Instances with at least one usable gold representation.
    pub fn supervisable_count(&self) -> usize {
        self.instances.iter().filter(|i| i.answer.is_supervisable()).count()
    }

    pub fn instances(&self) -> &[DropInstance] {
        &self.instances
    }
}

impl Dataset<DropInstance> for DropDataset {
    fn get(&self, index: usize) -> Option<DropInstance> {
        self.instances.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.instances.len()
    }
}
