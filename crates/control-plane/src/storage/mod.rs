// Storage layer for the Lendwise control-plane
// Decision: Entity data is held in memory; the notification job queue has its own
// store (in-memory or PostgreSQL) in lendwise-durable
//
// - InMemoryLibraryStore: implements LibraryStore for books, people, transactions and loans

pub mod memory;

pub use memory::InMemoryLibraryStore;
