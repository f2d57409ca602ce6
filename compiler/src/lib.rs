// bonsaic — Bonsai tree compiler
//
// Library root. Converts annotated bidding decision trees into Bonsai
// bidding-tree scripts via a fixed pipeline of in-place graph passes;
// see `pipeline::convert` for the entry point.

pub mod config;
pub mod dot;
pub mod emit;
pub mod error;
pub mod input;
pub mod layout;
pub mod normalize;
pub mod order;
pub mod pass;
pub mod pipeline;
pub mod rules;
pub mod slice;
pub mod tree;
pub mod validate;
