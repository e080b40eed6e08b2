pub mod capture; // Portal row → stored report screenshot
pub mod diagnostic; // Failure dumps (LABSYNC_DUMP_DIR)
pub mod extraction;
pub mod list_cache;
pub mod persistence;
pub mod screenshots;
pub mod sync;
