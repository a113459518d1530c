//! firmchat — firm message stream reconciler.
//!
//! ARCHITECTURE
//! ============
//! A panel owns a locally-consistent, chronologically-ordered view of one
//! firm's chat feed. The view merges a one-time historical fetch with a live
//! push stream delivered by the backend, resolves author display identity
//! lazily, and publishes immutable snapshots over a watch channel. All state
//! mutation happens on a single spawned driver task; hosts talk to it through
//! a command channel.
//!
//! DESIGN
//! ======
//! - `backend` is the seam to the hosted data service: bulk query, batched
//!   point query, insert, identity lookup, and a live insert subscription.
//! - `services::feed` is the reconciler: init, live append, send, firm
//!   switch, teardown, and reconnect with capped backoff.
//! - `services::grouping` partitions the ordered feed into calendar-day
//!   buckets for display without ever re-sorting it.

pub mod backend;
pub mod db;
pub mod message;
pub mod services;
pub mod state;
