//! # markup-core
//!
//!     The processing core of a configuration-driven lightweight-markup compiler: a line-oriented
//!     input reader, a fixed-priority block lexer, an attribute/substitution evaluator, and a
//!     template-and-tag renderer, all parameterized by backend configuration loaded at runtime
//!     rather than wired into code.
//!
//! Pipeline
//!
//!     Reader -> Lexer -> Recognizer -> (Attribute Evaluator x Configuration Store) -> Writer
//!
//!     1. `reader` reads physical lines, expands tabs, resolves `ifdef`/`ifndef`/`endif` and the
//!        `eval::`/`sys::`/`sys2::`/`include::`/`include1::` block macros, and exposes an
//!        unbounded-pushback cursor stream.
//!     2. `lexer` peeks that stream (with the two-line lookahead titles need) and classifies what
//!        comes next via `recognizers::identify`.
//!     3. `recognizers` translates each classified element: attribute entries/lists, titles, block
//!        titles, paragraphs, lists, delimited blocks, tables.
//!     4. `eval`/`subst`/`attrs`/`expr` form the attribute evaluator: reference resolution, system
//!        attributes, the ordered substitution-pass pipeline, attribute-list parsing, and the small
//!        restricted expression language behind `eval:`/`ifdef` conditions.
//!     5. `config` loads and validates the backend description (tags, templates, titles, macros,
//!        block/list/table definitions) from the cascade of configuration files.
//!     6. `writer` emits the rendered output.
//!
//! Driving the pipeline
//!
//!     `driver::Driver` sequences a whole document through the pipeline (header, preamble/sections,
//!     footer). `engine::Engine` is the single public entry point: it owns the configuration
//!     cascade, the reader stack, the document and its diagnostics, and the callout map for the
//!     span of one `translate` call.

pub mod attrs;
pub mod callouts;
pub mod config;
pub mod document;
pub mod driver;
pub mod engine;
pub mod error;
pub mod eval;
pub mod expr;
pub mod lexer;
pub mod reader;
pub mod recognizers;
pub mod subst;
pub mod writer;

pub use engine::{Engine, EngineOptions, Input, RunSummary};
pub use error::{MarkupError, Result};
