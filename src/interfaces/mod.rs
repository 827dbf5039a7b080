pub mod curator;

pub use curator::{
    remove_dead, CurationOutcome, Curator, CuratorConfig, CuratorConfigBuilder, OutputLayout,
    PersistReport, PortPartition,
};
