//! # Ride Assets
//!
//! Image asset pipeline for a community ride directory. Riders upload photos
//! for rides and small icons for ride groups straight to a staging bucket;
//! this crate turns each completed upload into the published assets the web
//! and map clients read.
//!
//! # Architecture
//!
//! ```text
//! trigger {imageUUID, cityCode, entityID, entityType}
//!    │
//!    ├── ride  ─► Optimizer ─────► {city}/rides/{id}/{id}_{w}w.webp  (+ _optimized alias)
//!    │                             rides.image_url ← alias URL
//!    │
//!    └── group ─► MarkerPipeline ─► {city}/groups/{key}/marker.png
//!                     │
//!                     └─► Synchronizer ─► sprites/{city}/markers.png + markers.json
//! ```
//!
//! Every step talks to object storage through [`storage::BlobStore`] and to
//! the database through [`catalog::GroupCatalog`], so the pipelines run the
//! same against GCS, a local directory tree, or in-memory fakes.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | Trigger validation, dispatch, deadline, URL persistence |
//! | [`optimizer`] | Photo → WebP derivatives at each configured width |
//! | [`marker`] | Group icon → fixed-size marker PNG, then spritesheet refresh |
//! | [`sprites`] | Reconcile the city's marker set and repack the atlas |
//! | [`staging`] | Find an upload whose extension is unknown, clean it up |
//! | [`storage`] | `BlobStore` trait over `object_store` backends |
//! | [`catalog`] | `GroupCatalog` trait over a SQLite pool |
//! | [`imaging`] | Decode, resize, mask, encode; marker renderers |
//! | [`layout`] | Bucket path conventions and public URLs |
//! | [`slug`] | Marker keys and public ids from free text |
//! | [`config`] | `config.toml` loading, merging, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## One Sheet Per City
//!
//! The map client loads a single PNG atlas plus a JSON position table per
//! city instead of one request per group icon. The atlas is rebuilt from
//! scratch on every marker change: it is small, and rebuilding from the
//! reconciled set means a lost or corrupt marker drops out instead of
//! poisoning the sheet.
//!
//! ## Three Sources, One Marker Set
//!
//! The existing metadata file, the active groups in the database, and the
//! objects actually present in storage can disagree. Metadata wins where it
//! has a path, the database fills gaps, and storage has the final say for
//! database-only keys. See [`sprites::reconcile`].
//!
//! ## Serialised Rebuilds
//!
//! Rebuilding a sheet is a read-modify-write of two shared objects.
//! [`sprites::Synchronizer`] holds a per-city lock for the whole cycle so two
//! uploads for the same city cannot drop each other's marker. The lock is
//! in-process; run one instance per bucket.

pub mod catalog;
pub mod config;
pub mod imaging;
pub mod layout;
pub mod marker;
pub mod optimizer;
pub mod output;
pub mod pipeline;
pub mod slug;
pub mod sprites;
pub mod staging;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_helpers;
