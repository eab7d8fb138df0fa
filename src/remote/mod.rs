//! Remote Operation Client - the provider behind each job
//!
//! This module provides:
//! - The `RemoteClient` start/poll/download contract
//! - Quota classification of provider failures
//! - `GeminiClient`, the HTTP implementation
//! - `MockRemoteClient`, a scripted client for tests

pub mod client;
pub mod gemini;
pub mod mock;

pub use client::{Artifact, GenerationRequest, Operation, RemoteClient, RemoteError, is_quota_message};
pub use gemini::{GeminiClient, GeminiConfig};
pub use mock::MockRemoteClient;
