//! The registry document and the validated system tree built from it.
mod ignore;
mod load;
mod types;

pub use ignore::IgnoreFilter;
pub use load::{
    codebase_entry, discover_registry, load_registry, locate_registry, ArtifactEntry,
    CodebaseEntry, Origin, Registry, SystemNode,
};
pub use types::{
    ArtifactPattern, AutodetectRule, AutodetectValidation, BlockComment, CodebaseDoc, IgnoreRule,
    Traceability,
};
