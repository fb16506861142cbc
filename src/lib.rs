//! kaon: declarative YAML API test-suite runner with reusable
//! executor libraries.
//!
//! A suite document declares setup steps and ordered test cases;
//! a library directory provides named executors (reusable step
//! sequences with declared input and computed output). Steps
//! issue HTTP calls or invoke executors, and every recorded
//! output is addressable by later steps through `{{...}}`
//! placeholders.

pub mod context;
pub mod history;
pub mod http;
pub mod library;
pub mod model;
pub mod runner;
pub mod template;

pub use context::*;
pub use history::*;
pub use model::*;
pub use runner::*;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
