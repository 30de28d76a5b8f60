//! Store configuration.

use alloc::string::String;
use syncview_incremental::ViewOptions;

/// Subscriber identity used when no user is signed in.
pub const ANONYMOUS_SUBSCRIBER: &str = "anon";

/// Configuration of a `ViewStore`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Identity substituted for a missing subscriber id.
    pub anonymous_id: String,
    /// Options for every view the store materializes.
    pub view_options: ViewOptions,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            anonymous_id: ANONYMOUS_SUBSCRIBER.into(),
            view_options: ViewOptions::default(),
        }
    }
}

impl StoreConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the anonymous subscriber identity.
    pub fn with_anonymous_id(mut self, id: impl Into<String>) -> Self {
        self.anonymous_id = id.into();
        self
    }

    /// Sets the view options.
    pub fn with_view_options(mut self, options: ViewOptions) -> Self {
        self.view_options = options;
        self
    }
}
