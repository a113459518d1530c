//! Domain services behind the panel surface.
//!
//! ARCHITECTURE
//! ============
//! Service modules own reconciliation, author resolution, and display
//! grouping so the backend seam stays a thin query layer and the panel
//! handle stays pure command plumbing.

pub mod directory;
pub mod feed;
pub mod grouping;
