// rca: Reactor causality analyzer
//
// Library root. The analysis passes run in this order: graph, cycles,
// priority, boundary. `pipeline` orchestrates them.

pub mod boundary;
pub mod cycles;
pub mod diag;
pub mod dot;
pub mod emit;
pub mod error;
pub mod graph;
pub mod id;
pub mod lexer;
pub mod model;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod priority;
pub mod program_index;
pub mod time;
