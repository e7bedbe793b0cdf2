pub mod analyze;
pub mod ast;
pub mod builtins;
pub mod common;
pub mod cst;
pub mod interpreter;
pub mod lower;
pub mod parser;
pub mod pipeline;
pub mod runfile;
