pub mod builder;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod guard;
pub mod ident;
pub mod layout;
pub mod resize;
pub mod sanitize;
pub mod structure;
pub mod tree;

pub use builder::{AttachContext, FormBuilder, Hooks, LoadOptions, LoadOutcome, NoopHooks};
pub use config::{Config, load_config};
pub use guard::{FixedMeasure, Measure};
pub use ident::IdRegistry;
pub use layout::LayoutError;
pub use resize::ResizeDrag;
pub use structure::{ColumnData, Item, PageData, SectionData};
pub use tree::{NameState, NodeId, NodeKind, Tree};

#[cfg(feature = "cli")]
pub use cli::run;
