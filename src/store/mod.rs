//! Result persistence

pub mod profiles;
pub mod reporter;
pub mod supabase;

pub use profiles::ProfileStore;
pub use reporter::{LogReporter, ResultReporter};
pub use supabase::SupabaseClient;
