//! Original-to-synthesized type mapping for one module and generation

use super::synthesizer::SynthesizedType;
use hotswap_kernel::{Generation, OriginalTypeId, TypeRef};
use std::collections::HashMap;
use std::fmt;

/// Maps a module's dependent types to their current-generation stand-ins
///
/// Built while a module is processed, then frozen behind an `Arc` and shared
/// by every descriptor of that module and generation.
#[derive(Clone, Default)]
pub struct SubstitutionTable {
    module: String,
    generation: Generation,
    entries: HashMap<OriginalTypeId, SynthesizedType>,
}

impl SubstitutionTable {
    pub fn new(module: &str, generation: Generation) -> Self {
        Self {
            module: module.to_string(),
            generation,
            entries: HashMap::new(),
        }
    }

    /// Record a mapping, returning the one it replaced
    pub fn record(
        &mut self,
        original: OriginalTypeId,
        synthesized: SynthesizedType,
    ) -> Option<SynthesizedType> {
        self.entries.insert(original, synthesized)
    }

    /// Synthesized identity if one is recorded, else the original unchanged
    pub fn resolve(&self, original: &OriginalTypeId) -> TypeRef {
        match self.entries.get(original) {
            Some(synthesized) => TypeRef::Synthesized(synthesized.id().clone()),
            None => TypeRef::Original(original.clone()),
        }
    }

    pub fn lookup(&self, original: &OriginalTypeId) -> Option<&SynthesizedType> {
        self.entries.get(original)
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OriginalTypeId, &SynthesizedType)> {
        self.entries.iter()
    }
}

impl fmt::Debug for SubstitutionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<(String, &str)> = self
            .entries
            .iter()
            .map(|(original, synthesized)| (original.to_string(), synthesized.id().name()))
            .collect();
        entries.sort();
        f.debug_struct("SubstitutionTable")
            .field("module", &self.module)
            .field("generation", &self.generation)
            .field("entries", &entries)
            .finish()
    }
}
