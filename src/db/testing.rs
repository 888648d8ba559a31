//! Per-test isolation against a real PostgreSQL database.
//!
//! Each test runs inside one outer transaction that is never committed. The
//! session handed to application code sees a savepoint as its unit of work, so
//! `commit()` only releases the savepoint and a listener immediately opens the
//! next one. Writes are visible for the rest of the test and gone afterwards.
//!
//! ```text
//! BEGIN                      -- outer transaction
//! SAVEPOINT test_isolation   -- first unit of work
//!   ... app writes ...
//! RELEASE SAVEPOINT ...      -- app commit
//! SAVEPOINT test_isolation   -- reopened by the listener
//!   ...
//! ROLLBACK                   -- finish(): everything discarded
//! ```

use std::sync::Arc;

use sqlx::{Executor, PgPool};
use tokio::sync::Mutex;

use crate::db::session::{AfterEnd, Session, SessionHandle, SharedSessions};

const SAVEPOINT: &str = "test_isolation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    SavepointOpen,
    SavepointClosed,
    RolledBack,
}

/// Owns the isolated session for one test.
///
/// Call [`TransactionalHarness::finish`] at the end of the test to roll back
/// and return the connection to the pool. If the harness is dropped instead
/// (for example by a failed assertion), the session closes its connection and
/// the server discards the outer transaction.
pub struct TransactionalHarness {
    session: Arc<Mutex<Session>>,
}

impl TransactionalHarness {
    pub async fn begin(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        (&mut *conn).execute("BEGIN").await?;

        let mut session = Session::nested(conn, SAVEPOINT);
        session.on_transaction_end(|end| {
            if end.nested {
                AfterEnd::Reopen
            } else {
                AfterEnd::Continue
            }
        });
        session.begin().await?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
        })
    }

    /// Provider that hands this test's session to every request.
    pub fn sessions(&self) -> SharedSessions {
        SharedSessions::new(self.session.clone())
    }

    pub async fn session(&self) -> SessionHandle {
        SessionHandle::Shared(self.session.clone().lock_owned().await)
    }

    pub async fn state(&self) -> HarnessState {
        let session = self.session.lock().await;
        match (session.is_nested(), session.in_unit_of_work()) {
            (true, true) => HarnessState::SavepointOpen,
            (true, false) => HarnessState::SavepointClosed,
            (false, _) => HarnessState::RolledBack,
        }
    }

    /// Rolls back the outer transaction, discarding every write of the test.
    pub async fn finish(self) -> Result<(), sqlx::Error> {
        let mut session = self.session.lock().await;
        session.discard().await?;
        Ok(())
    }
}
