//! The Route Handler (spec §4.8): the only query-time entry point, fusing
//! dense passage retrieval, query-to-triple linking, and Personalized
//! PageRank into one evidence set before handing it to a `Synthesizer`.

pub mod hipporag2;
pub mod seeds;

pub use hipporag2::{GroupContext, HipporagRoute};
