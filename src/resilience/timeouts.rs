//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap session I/O with an optional deadline
//! - Keep timeout errors distinct from I/O errors
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - `None` means wait indefinitely

use std::future::Future;
use std::time::Duration;

use tokio::time::error::Elapsed;

/// Await `fut`, failing with [`Elapsed`] if `limit` passes first.
pub async fn within<F>(limit: Option<Duration>, fut: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await,
        None => Ok(fut.await),
    }
}
