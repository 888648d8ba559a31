use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// How a unit of work is opened and closed on the session's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    /// `BEGIN` / `COMMIT`: the connection is not inside any transaction.
    Transaction,
    /// `SAVEPOINT` / `RELEASE SAVEPOINT`: an enclosing transaction is already open.
    Savepoint(&'static str),
}

/// Passed to listeners whenever a unit of work ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionEnd {
    pub nested: bool,
    pub committed: bool,
}

/// What the session should do after its listeners have run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterEnd {
    Continue,
    Reopen,
}

type TransactionListener = Box<dyn Fn(&TransactionEnd) -> AfterEnd + Send + Sync>;

/// Request-scoped storage handle bound to one pooled connection.
///
/// Reads run directly on the connection. Writes are wrapped in
/// [`Session::begin`] / [`Session::commit`]. `begin` is a no-op while a unit of
/// work is already open, so callers never nest.
///
/// Dropping a session while a unit of work (or an enclosing transaction) is
/// still open closes the connection instead of returning it to the pool; the
/// server then rolls everything back.
pub struct Session {
    conn: Option<PoolConnection<Postgres>>,
    boundary: Boundary,
    open: bool,
    listeners: Vec<TransactionListener>,
}

impl Session {
    pub fn new(conn: PoolConnection<Postgres>) -> Self {
        Self {
            conn: Some(conn),
            boundary: Boundary::Transaction,
            open: false,
            listeners: Vec::new(),
        }
    }

    /// Session over a connection that already has a transaction open.
    /// Units of work become savepoints named `savepoint`.
    pub fn nested(conn: PoolConnection<Postgres>, savepoint: &'static str) -> Self {
        Self {
            conn: Some(conn),
            boundary: Boundary::Savepoint(savepoint),
            open: false,
            listeners: Vec::new(),
        }
    }

    pub fn connection(&mut self) -> Result<&mut PgConnection, sqlx::Error> {
        self.conn.as_deref_mut().ok_or(sqlx::Error::PoolClosed)
    }

    pub fn is_nested(&self) -> bool {
        matches!(self.boundary, Boundary::Savepoint(_))
    }

    pub fn in_unit_of_work(&self) -> bool {
        self.open
    }

    pub fn on_transaction_end<F>(&mut self, listener: F)
    where
        F: Fn(&TransactionEnd) -> AfterEnd + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub async fn begin(&mut self) -> Result<(), sqlx::Error> {
        if self.open {
            return Ok(());
        }
        let statement = match self.boundary {
            Boundary::Transaction => "BEGIN".to_string(),
            Boundary::Savepoint(name) => format!("SAVEPOINT {}", name),
        };
        self.connection()?.execute(statement.as_str()).await?;
        self.open = true;
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<(), sqlx::Error> {
        if !self.open {
            return Ok(());
        }
        let statement = match self.boundary {
            Boundary::Transaction => "COMMIT".to_string(),
            Boundary::Savepoint(name) => format!("RELEASE SAVEPOINT {}", name),
        };
        self.connection()?.execute(statement.as_str()).await?;
        self.open = false;
        self.finish_unit_of_work(true).await
    }

    pub async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        if !self.open {
            return Ok(());
        }
        match self.boundary {
            Boundary::Transaction => {
                self.connection()?.execute("ROLLBACK").await?;
            }
            Boundary::Savepoint(name) => {
                let conn = self.connection()?;
                (&mut *conn)
                    .execute(format!("ROLLBACK TO SAVEPOINT {}", name).as_str())
                    .await?;
                conn.execute(format!("RELEASE SAVEPOINT {}", name).as_str())
                    .await?;
            }
        }
        self.open = false;
        self.finish_unit_of_work(false).await
    }

    /// Rolls back the enclosing transaction of a nested session, discarding
    /// every savepoint committed on it. The connection is clean afterwards and
    /// goes back to the pool on drop.
    pub async fn discard(&mut self) -> Result<(), sqlx::Error> {
        if !self.is_nested() {
            return self.rollback().await;
        }
        self.connection()?.execute("ROLLBACK").await?;
        self.open = false;
        self.boundary = Boundary::Transaction;
        self.listeners.clear();
        Ok(())
    }

    async fn finish_unit_of_work(&mut self, committed: bool) -> Result<(), sqlx::Error> {
        let end = TransactionEnd {
            nested: self.is_nested(),
            committed,
        };
        let reopen = self
            .listeners
            .iter()
            .map(|listener| listener(&end))
            .fold(false, |reopen, action| reopen || action == AfterEnd::Reopen);

        if reopen {
            self.begin().await?;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.open && !self.is_nested() {
            return;
        }
        if let Some(conn) = self.conn.take() {
            tracing::warn!("Session dropped inside a transaction; closing its connection");
            drop(conn.detach());
        }
    }
}

/// A session owned by one request, or a shared one borrowed for its duration.
pub enum SessionHandle {
    Owned(Session),
    Shared(OwnedMutexGuard<Session>),
}

impl Deref for SessionHandle {
    type Target = Session;

    fn deref(&self) -> &Session {
        match self {
            SessionHandle::Owned(session) => session,
            SessionHandle::Shared(guard) => &**guard,
        }
    }
}

impl DerefMut for SessionHandle {
    fn deref_mut(&mut self) -> &mut Session {
        match self {
            SessionHandle::Owned(session) => session,
            SessionHandle::Shared(guard) => &mut **guard,
        }
    }
}

/// Hands out one storage handle per inbound request.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self) -> Result<SessionHandle, sqlx::Error>;
}

#[async_trait]
impl SessionProvider for PgPool {
    async fn acquire(&self) -> Result<SessionHandle, sqlx::Error> {
        let conn = PgPool::acquire(self).await?;
        Ok(SessionHandle::Owned(Session::new(conn)))
    }
}

/// Gives every request the same session, one request at a time.
#[derive(Clone)]
pub struct SharedSessions {
    session: Arc<Mutex<Session>>,
}

impl SharedSessions {
    pub fn new(session: Arc<Mutex<Session>>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl SessionProvider for SharedSessions {
    async fn acquire(&self) -> Result<SessionHandle, sqlx::Error> {
        Ok(SessionHandle::Shared(self.session.clone().lock_owned().await))
    }
}
