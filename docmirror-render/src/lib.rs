//! # docmirror-render
//!
//! Tera-based default content generator. Renders one documentation artifact
//! per top-level template (`primary`, `history`, plus any user template) for a
//! single source file.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use std::path::PathBuf;
//!
//! use docmirror_core::{ContentGenerator, GenerationRequest};
//! use docmirror_render::TemplateGenerator;
//!
//! fn render_one() {
//!     if let Ok(generator) = TemplateGenerator::new(None) {
//!         let request = GenerationRequest {
//!             source_path: PathBuf::from("/work/src/lib.rs"),
//!             relative_path: "lib.rs".to_string(),
//!             variables: BTreeMap::new(),
//!         };
//!         if let Ok(artifacts) = generator.generate(&request) {
//!             for (kind, text) in artifacts {
//!                 println!("{kind}: {} bytes", text.len());
//!             }
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::DocContext;
pub use engine::{TemplateEngine, TemplateGenerator};
pub use error::RenderError;
