//! Record contract for every persisted type.
//!
//! # Responsibility
//! - Define the identity, audit and concurrency-token shape all records share.
//! - Keep the contract structural so repository code never inspects types at runtime.
//!
//! # Invariants
//! - Identity and version are written only by stores.
//! - Audit stamps are written only by repository write operations.

pub mod key;
pub mod record;
pub mod validation;
