pub mod categories;
pub mod events;
pub mod files;
pub mod tasks;

pub use categories::CategoryStore;
pub use events::EventStore;
pub use files::FileStore;
pub use tasks::TaskStore;
