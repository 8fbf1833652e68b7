//! Testing utilities for Cadence workflows.
//!
//! Recording mocks for every collaborator contract plus assertion macros.
//! Workflow tests wire the mocks into an engine built on the in-memory
//! stores, so they run without a database or a host platform.
//!
//! # Example
//!
//! ```ignore
//! let transport = Arc::new(MockNotificationTransport::new());
//! let tasks = Arc::new(MockTaskStore::new());
//! // ... build the engine and dispatch an event ...
//! transport.assert_send_count(1);
//! tasks.assert_created("Schedule phone screen");
//! ```

pub mod assertions;
pub mod mock_collaborators;

pub use mock_collaborators::{
    CreatedTask, EntityWrite, MockEntityStore, MockNoteStore, MockNotificationTransport,
    MockTaskStore, SentNotification,
};
