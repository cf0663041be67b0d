//! Prelude module - commonly used test helpers for convenient import.
//!
//! Use `use capgate_test::prelude::*;` to import all essential helpers.

// Mocks
pub use crate::{FailingHandler, PanickingHandler, RecordingHandler, SlowHandler};

// Fixtures
pub use crate::{
    ESSENTIAL_CAPABILITIES, assign_tier, capability_names, test_config_toml, test_dispatcher,
    test_manager, test_manager_with_essentials,
};

// Harness
pub use crate::{setup_test_logging, setup_test_logging_default, test_file};
