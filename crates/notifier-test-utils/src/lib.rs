//! # Notifier Test Utilities
//!
//! Mock adapters and fixtures for exercising the live notifier without a
//! stream gateway, room API or chat bridge.
//!
//! ## Modules
//!
//! - `mock_stream` - Scripted `StreamClient` with per-room controllable links
//! - `mock_sender` - Recording `MessageSender` with scripted failures
//! - `mock_resolver` - Static `NameResolver`
//! - `fixtures` - Registry builders and event constructors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use notifier_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let stream = MockStreamClient::new();
//!     let sender = RecordingSender::new();
//!     sender.fail_first("group-b", 1);
//!
//!     let fixture = RegistryFixture::new()
//!         .room(12_725_169, "Streamer")
//!         .subscribe(12_725_169, "group-a", TestConfig::at_all())
//!         .build()
//!         .await;
//!
//!     stream.emit(RoomId(12_725_169), live(12_725_169)).await;
//! }
//! ```

pub mod fixtures;
pub mod mock_resolver;
pub mod mock_sender;
pub mod mock_stream;

pub use fixtures::*;
pub use mock_resolver::*;
pub use mock_sender::*;
pub use mock_stream::*;
