use anyhow::Result;
use crate::model::Sequence;

#[cfg_attr(test, mockall::automock)]
pub trait SequenceSource {
    /// Load a whole recording. Validation errors from the data model surface here.
    fn load(&self) -> Result<Sequence>;
}

#[cfg_attr(test, mockall::automock)]
pub trait SequenceSink {
    fn save(&mut self, sequence: &Sequence) -> Result<()>;
}
