pub mod backup;
pub mod runtime_config;
pub mod server;
pub mod supabase;
