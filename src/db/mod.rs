pub mod item_repository;
pub mod pool;
pub mod session;
pub mod testing;

pub use item_repository::{ItemRepository, PgItemRepository};
pub use pool::{create_pool, run_migrations};
pub use session::{
    AfterEnd, Session, SessionHandle, SessionProvider, SharedSessions, TransactionEnd,
};
