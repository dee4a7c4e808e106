//! Resource repositories.
//!
//! Two kinds of repository implement [`ResourceRepository`]:
//!
//! - [`SourceRepository`]: a leaf over one location, publishing immutable
//!   snapshots produced by a [`ResourceParser`].
//! - [`CompositeRepository`]: an ordered, bucketed shadowing merge of other
//!   repositories.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use resview::model::{RegistryKey, ResourceNamespace, ResourceType};
//! use resview::repository::{
//!     Bucket, CompositeRepository, FileLayoutParser, Generations, SourceRepository,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let generations = Arc::new(Generations::new());
//! let app = Arc::new(SourceRepository::new(
//!     RegistryKey::flat("app/res"),
//!     Arc::new(FileLayoutParser::new()),
//!     generations,
//! ));
//! app.scan(&CancellationToken::new())?;
//!
//! let merged = CompositeRepository::new("app");
//! merged.add_child(Bucket::Primary, app);
//! let title = merged.lookup(&ResourceNamespace::res_auto(), ResourceType::String, "title")?;
//! ```

mod composite;
mod error;
mod generation;
mod layout;
mod links;
mod parser;
mod snapshot;
mod source;
mod traits;

pub use composite::{Bucket, CompositeRepository, RepositoryRef};
pub use error::{ParseError, RepositoryError};
pub use generation::{DerivedGeneration, Generations};
pub use layout::{parse_values, FileLayoutParser, VALUES_EXTENSION, VALUES_FOLDER};
pub use links::ParentLinks;
pub use parser::{ResourceParser, StaticParser};
pub use snapshot::ResourceSnapshot;
pub use source::SourceRepository;
pub use traits::{Records, RepositoryId, ResourceRepository, VisitResult};
