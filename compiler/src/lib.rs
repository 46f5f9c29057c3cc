// pdim — Parallel dimension resolution for fused GPU kernels
//
// Library root. Front end (lexer, parser, lower) builds the fusion model;
// compute_at merges fused axes; parallel_dims resolves one launch dimension
// per parallel axis.

pub mod ast;
pub mod compute_at;
pub mod diag;
pub mod expr;
pub mod fusion;
pub mod id;
pub mod lexer;
pub mod lower;
pub mod parallel;
pub mod parallel_dims;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod program_query;
