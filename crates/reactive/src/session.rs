//! Signed-in user identity and the query entry point for UI code.

use crate::handle::QueryHandle;
use crate::store::ViewStore;
use alloc::rc::Rc;
use alloc::string::String;
use core::cell::RefCell;
use syncview_incremental::Query;
use tracing::debug;

/// The current user of the client, if any.
///
/// Clones share the identity, so signing in or out is seen by every holder.
#[derive(Clone, Debug, Default)]
pub struct Session {
    user_id: Rc<RefCell<Option<String>>>,
}

impl Session {
    /// Creates a session with nobody signed in.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Creates a session for a signed-in user.
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        let session = Self::default();
        session.sign_in(user_id);
        session
    }

    /// Returns the signed-in user's id.
    pub fn user_id(&self) -> Option<String> {
        self.user_id.borrow().clone()
    }

    /// Replaces the signed-in user.
    pub fn sign_in(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        debug!(user = %user_id, "session signed in");
        *self.user_id.borrow_mut() = Some(user_id);
    }

    /// Clears the signed-in user.
    pub fn sign_out(&self) {
        debug!("session signed out");
        self.user_id.borrow_mut().take();
    }

    /// Returns the identity queries are cached under: the user id, or
    /// `anonymous` when nobody is signed in.
    pub fn subscriber_id(&self, anonymous: &str) -> String {
        self.user_id().unwrap_or_else(|| anonymous.into())
    }
}

/// Returns the shared handle for `query` on behalf of the session's user.
///
/// Handles already obtained keep the identity they were created with; a
/// change of user only affects later calls.
pub fn use_query(store: &ViewStore, session: &Session, query: Rc<dyn Query>, enabled: bool) -> QueryHandle {
    let subscriber = session.subscriber_id(&store.config().anonymous_id);
    store.get_or_create(Some(&subscriber), query, enabled)
}
