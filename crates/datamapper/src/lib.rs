//! # datamapper
//!
//! A relationship-aware data mapper.
//!
//! Models are declared once (fields come from the database, relationships
//! and validation from a [`ModelDef`]) and shared by every entity of that
//! model. An [`Entity`] builds its query through relationship-qualified
//! methods, loads rows into itself, and writes changes back with only the
//! columns that changed.
//!
//! ## Features
//!
//! - **Relationship resolution**: `where_related("author/company", "name", ..)` joins
//!   through foreign keys or join tables with stable aliases
//! - **Dirty tracking**: `save()` updates changed columns only, and skips no-op writes
//! - **Relationship persistence**: join-table upserts and one-to-one exclusivity
//! - **Validation**: ordered rule chains with per-field messages, including
//!   cardinality rules on relationships
//! - **Streaming**: `get_iterated()` materializes one row at a time
//! - **Transactions**: optional automatic transaction around every save/delete
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use datamapper::{Config, Mapper, MemoryDatabase, ModelDef, RelationDef, Registry};
//!
//! let registry = Arc::new(Registry::new(Config::default()));
//! registry.register(ModelDef::new("post").has_many(RelationDef::new("comment")));
//! registry.register(ModelDef::new("comment").has_one(RelationDef::new("post")));
//!
//! let db = Arc::new(
//!     MemoryDatabase::new()
//!         .with_table("posts", &["id", "title"])
//!         .with_table("comments", &["id", "body", "post_id"]),
//! );
//! let mapper = Mapper::new(registry, db);
//!
//! let mut comment = mapper.entity("comment")?;
//! comment.where_related("post", "title", "Hello").get(None, None)?;
//! ```
//!
//! ## Modules
//!
//! - [`registry`]: model definitions, descriptors and the verb table
//! - [`query`]: clause state and SQL compilation
//! - [`entity`]: entities, relationship resolution, fetching and persistence
//! - [`validation`]: rule engine and messages
//! - [`db`]: the database trait and its backends

pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod ident;
pub mod inflect;
pub mod mapper;
pub mod query;
pub mod registry;
pub mod row;
pub mod trace;
pub mod validation;
pub mod value;

pub use config::{Config, ModelConfig};
#[cfg(feature = "postgres")]
pub use db::PgDatabase;
pub use db::{Database, FieldMeta, MemoryDatabase, TransactionState};
pub use entity::{Arg, ClauseOperand, Entity, EntityIter, Paged, Related, Subquery};
pub use error::{OrmError, OrmResult};
pub use mapper::Mapper;
pub use query::{ClauseKind, Expr, LikeSide, Operator};
pub use registry::{FieldDef, ModelDef, ModelRegistration, RelationDef, Registry, Rule};
pub use row::{FromRow, ResultSet, Row};
pub use trace::{QueryType, TracingDatabase};
pub use validation::{ErrorSet, RuleContext, RuleOutcome};
pub use value::{FromValue, Value};

// Re-export inventory for static model registration
pub use inventory;
